use crate::error::CaptureError;
use crate::simple_serial::{CipherTarget, SimpleSerial};
use crate::trace::{Capture, Trace};
use cwlite_usb::adc::{Adc, DEFAULT_TRIGGER_TIMEOUT, TraceSource};
use cwlite_usb::fpga::{Bitstream, Fpga};
use cwlite_usb::usart::{self, CommandChannel, Usart, UsartConfig};
use cwlite_usb::CwLiteUsb;
use log::{debug, info, warn};
use std::time::Duration;

/// How a capture run is shaped.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub samples: u32,
    pub traces: usize,
    pub offset: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            samples: 1500,
            traces: 50,
            offset: 0,
        }
    }
}

/// Everything needed to bring the board up before capturing.
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub capture: CaptureSettings,
    pub bitstream: Bitstream,
    pub trigger_timeout: Duration,
    pub serial_timeout: Duration,
    pub usart: UsartConfig,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            bitstream: Bitstream::default(),
            trigger_timeout: DEFAULT_TRIGGER_TIMEOUT,
            serial_timeout: usart::DEFAULT_TIMEOUT,
            usart: UsartConfig::default(),
        }
    }
}

/// Opens the first capture board, brings up the FPGA, ADC and target link, then records traces.
///
/// Everything opened here is closed again, in reverse order, before returning.
pub fn acquire<G>(config: &AcquireConfig, key: &[u8], plaintext: G) -> Result<Capture, CaptureError>
where
    G: FnMut() -> Vec<u8>,
{
    let usb = CwLiteUsb::open()?;
    info!("Opened capture board, firmware {}", usb.firmware());

    let fpga = Fpga::open(&usb, &config.bitstream)?;
    let mut adc = Adc::new(&fpga)?;
    adc.set_trigger_timeout(config.trigger_timeout);

    let mut channel = Usart::new(&usb, config.usart)?;
    channel.set_timeout(config.serial_timeout);
    let mut target = SimpleSerial::new(channel)?;

    capture(&mut adc, &mut target, key, plaintext, &config.capture)
}

/// Records `settings.traces` traces of `key` encrypting generated plaintexts.
///
/// Trigger timeouts, empty traces and a silent target restart the current trace; anything else
/// ends the run.
pub fn capture<A, T, G>(
    adc: &mut A,
    target: &mut T,
    key: &[u8],
    mut plaintext: G,
    settings: &CaptureSettings,
) -> Result<Capture, CaptureError>
where
    A: TraceSource + ?Sized,
    T: CipherTarget + ?Sized,
    G: FnMut() -> Vec<u8>,
{
    adc.set_total_samples(settings.samples)?;
    adc.set_trigger_offset(settings.offset)?;
    target.write_key(key)?;

    let mut capture = Capture::new();
    let mut attempts = 0;
    while capture.len() < settings.traces {
        attempts += 1;
        info!("Starting trace [{}/{}]", capture.len() + 1, settings.traces);

        let pt = plaintext();
        adc.arm()?;
        target.write_plaintext(&pt)?;

        if adc.wait_for_trigger()? {
            // The target may still answer the abandoned plaintext.
            warn!("Timed out during capture. Re-trying");
            target.flush()?;
            continue;
        }

        let ct = match target.read_ciphertext() {
            Ok(ct) => ct,
            Err(error) if error.is_retryable() => {
                warn!("No response from target ({}). Re-trying", error);
                target.flush()?;
                continue;
            }
            Err(error) => return Err(error),
        };

        let power_measurements = adc.trace_data()?;
        if power_measurements.is_empty() {
            warn!("TraceData did not return measurements. Re-trying");
            continue;
        }

        capture.push(Trace {
            key: key.to_vec(),
            plaintext: pt,
            ciphertext: ct,
            power_measurements,
        });
    }

    debug!("Captured {} traces in {} attempts", capture.len(), attempts);
    Ok(capture)
}
