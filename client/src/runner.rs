use crate::cli::{CaptureArgs, Cli, LevelFilter, SubCommands};
use crate::settings::{Settings, default_config_location};
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cwlite_capture::{Capture, acquire, random_plaintext};
use cwlite_types::HardwareType;
use cwlite_usb::{CwLiteUsb, find_devices};
use cwlite_usb::adc::Adc;
use cwlite_usb::fpga::{Bitstream, Fpga};
use log::{info, warn};
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};
use std::path::{Path, PathBuf};

pub fn run_cli() -> Result<()> {
    let args: Cli = Cli::parse();

    CombinedLogger::init(vec![TermLogger::new(
        match args.log_level {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        },
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .context("Could not configure the logger")?;

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_location()
            .ok_or_else(|| anyhow!("Could not determine the settings location"))?,
    };
    let settings = Settings::read(&config_path)?;

    match args.command {
        SubCommands::Capture { capture, output } => run_capture(&settings, &capture, output),
        SubCommands::Info => show_board(),
        SubCommands::ProgramFpga { bitstream } => match bitstream {
            Some(path) => program_fpga(&Bitstream::File(path)),
            None => program_fpga(&settings.bitstream()),
        },
        SubCommands::Show { file, traces } => show_capture(&file, traces),
    }
}

fn run_capture(settings: &Settings, args: &CaptureArgs, output: Option<PathBuf>) -> Result<()> {
    let settings = settings.merge(args);
    let key = settings.key_bytes()?;
    let config = settings.acquire_config();

    let capture = acquire(&config, &key, random_plaintext(key.len()))
        .context("Capture run failed")?;

    match output {
        Some(path) => {
            capture
                .save(&path)
                .context(format!("Unable to save capture to {}", path.to_string_lossy()))?;
            info!("Saved {} traces to {}", capture.len(), path.to_string_lossy());
        }
        None => {
            warn!("No output file given, the capture will not be kept");
            summarise(&capture);
        }
    }
    Ok(())
}

fn show_board() -> Result<()> {
    let boards = find_devices();
    if boards.len() > 1 {
        warn!("{} capture boards connected, using the first", boards.len());
    }

    let usb = CwLiteUsb::open().context("Unable to open the capture board")?;
    println!("Firmware: {}", usb.firmware());
    if let (Some(bus), Some(address)) = (usb.usb_bus_number(), usb.usb_address()) {
        println!("USB: bus {}, address {}", bus, address);
    }

    let fpga = Fpga::new(&usb);
    if !fpga.is_programmed()? {
        println!("FPGA: not programmed, run program-fpga first");
        return Ok(());
    }
    println!("FPGA: programmed");

    let adc = Adc::new(&fpga).context("Unable to set up the ADC")?;
    let version = adc.version()?;
    let board = match version.hardware_type {
        HardwareType::ChipWhispererLite => "ChipWhisperer-Lite".to_string(),
        other => other.to_string(),
    };
    println!(
        "Hardware: {} rev {}, registers v{}",
        board, version.hardware_revision, version.register_version
    );
    println!("System clock: {} Hz", adc.sys_freq()?);
    println!("Clock generator: {} Hz", adc.clkgen_output_freq()?);
    println!("Clock generator DCM locked: {}", adc.clkgen_dcm_locked()?);
    println!("ADC clock: {} Hz", adc.adc_freq()?);
    println!("ADC DCM locked: {}", adc.dcm_locked()?);
    println!("Gain: {} ({})", adc.gain()?, adc.gain_mode()?);
    println!("Trigger: {} on {:?}", adc.trigger_mode()?, adc.trigger_target_io_pins()?);
    println!(
        "Samples: {} of at most {}",
        adc.total_samples()?,
        adc.max_samples()
    );
    Ok(())
}

fn program_fpga(bitstream: &Bitstream) -> Result<()> {
    let usb = CwLiteUsb::open().context("Unable to open the capture board")?;
    let reader = bitstream.open().context("Unable to read the bitstream")?;

    Fpga::new(&usb)
        .program(reader)
        .context("Unable to program the FPGA")?;
    info!("FPGA programmed");
    Ok(())
}

fn show_capture(file: &Path, traces: bool) -> Result<()> {
    let capture = Capture::load(file)
        .context(format!("Unable to load capture from {}", file.to_string_lossy()))?;
    summarise(&capture);

    if traces {
        for (index, trace) in capture.iter().enumerate() {
            let (min, max) = trace
                .power_measurements
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
                    (min.min(v), max.max(v))
                });
            println!(
                "{:>5}: pt {} ct {} samples {} range {:.4}..{:.4}",
                index,
                hex::encode(&trace.plaintext),
                hex::encode(&trace.ciphertext),
                trace.power_measurements.len(),
                min,
                max
            );
        }
    }
    Ok(())
}

fn summarise(capture: &Capture) {
    println!("Traces: {}", capture.len());
    let Some(first) = capture.traces().first() else {
        return;
    };
    println!("Key: {}", hex::encode(&first.key));
    match capture.samples_matrix() {
        Ok(matrix) => println!("Samples: {} x {}", matrix.nrows(), matrix.ncols()),
        Err(_) => println!("Samples: traces differ in length"),
    }
}
