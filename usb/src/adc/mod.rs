// Analog-Digital-Converter (OpenADC) register model. Nothing is cached here, every getter is a
// fresh read of the FPGA register and every setter is a (usually verified) write.
use crate::device::base::CwLiteTransport;
use crate::error::CommandError;
use crate::fpga::Fpga;
use crate::memory::{Address, Memory};
use cwlite_types::{
    AdcClockSource, GainMode, HardwareType, HardwareVersion, Hs2Mode, TargetIoMode, TriggerMode,
    TriggerTargetIoPin,
};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

mod clock;
mod io;
mod pipeline;
mod trace;

pub use clock::{AdvancedClock, ClockSetting, calc_clkgen_mul_div};
pub use io::SpecialGpio;
pub use pipeline::Pipeline;
pub use trace::{SYNC_BYTE, decode_trace_data};

pub(crate) const ADDR_GAIN: Address = 0;
pub(crate) const ADDR_SETTINGS: Address = 1;
pub(crate) const ADDR_STATUS: Address = 2;
pub(crate) const ADDR_ADC_DATA: Address = 3;
pub(crate) const ADDR_FREQ: Address = 5;
pub(crate) const ADDR_ADV_CLK: Address = 6;
pub(crate) const ADDR_SYS_FREQ: Address = 7;
pub(crate) const ADDR_ADC_FREQ: Address = 8;
pub(crate) const ADDR_VERSIONS: Address = 10;
pub(crate) const ADDR_DECIMATE: Address = 15;
pub(crate) const ADDR_SAMPLES: Address = 16;
pub(crate) const ADDR_PRESAMPLES: Address = 17;
pub(crate) const ADDR_BYTES_TO_RX: Address = 18;
pub(crate) const ADDR_TRIGGER_DUR: Address = 20;
pub(crate) const ADDR_OFFSET: Address = 26;
pub(crate) const ADDR_EXT_CLK: Address = 38;
pub(crate) const ADDR_TRIG_SRC: Address = 39;
pub(crate) const ADDR_IO_ROUTE: Address = 55;

const SETTINGS_RESET: u8 = 0x01;
const SETTINGS_GAIN_HIGH: u8 = 0x02;
const SETTINGS_TRIG_HIGH: u8 = 0x04;
const SETTINGS_ARM: u8 = 0x08;
const SETTINGS_WAIT: u8 = 0x20;
const SETTINGS_TRIG_NOW: u8 = 0x40;

const STATUS_ARM: u8 = 0x01;
const STATUS_FIFO: u8 = 0x02;
const STATUS_EXT: u8 = 0x04;

pub const MAX_GAIN: u8 = 78;
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_secs(2);

// The reported sample count overshoots what the FIFO can actually hold.
const MAX_SAMPLES_MARGIN: u32 = 45;

// Packed words carry three samples in four bytes, plus some slack for the sync byte.
const TRACE_READ_SLACK: u32 = 256;

/// The operations a capture loop needs from a digitiser.
pub trait TraceSource {
    fn set_total_samples(&mut self, samples: u32) -> Result<(), CommandError>;
    fn set_trigger_offset(&mut self, offset: u32) -> Result<(), CommandError>;
    fn arm(&mut self) -> Result<(), CommandError>;

    /// Blocks until the board triggers, returning `true` if the deadline passed and a trigger
    /// had to be forced.
    fn wait_for_trigger(&mut self) -> Result<bool, CommandError>;

    /// Decoded samples of the last capture, empty if the board has nothing pending.
    fn trace_data(&mut self) -> Result<Vec<f64>, CommandError>;
}

pub struct Adc<'a, D: CwLiteTransport + ?Sized> {
    memory: Memory<'a, D>,
    max_samples: u32,
    ext_clock_freq: u32,
    trigger_timeout: Duration,
}

impl<'a, D: CwLiteTransport + ?Sized> Adc<'a, D> {
    /// Resets the ADC, pushes every parameter back through its setter, then applies the
    /// CW-Lite defaults if that's what we're attached to.
    pub fn new(fpga: &Fpga<'a, D>) -> Result<Self, CommandError> {
        let mut adc = Self::attach(fpga.memory(), 0);
        adc.pipeline()
            .then(Self::set_reset_on)
            .then(Self::set_reset_off)
            .then(Self::refresh)
            .then(Self::default_setup)
            .finish()?;
        Ok(adc)
    }

    /// Wraps the register space without touching the hardware.
    pub fn attach(memory: Memory<'a, D>, max_samples: u32) -> Self {
        Self {
            memory,
            max_samples,
            ext_clock_freq: 10_000_000,
            trigger_timeout: DEFAULT_TRIGGER_TIMEOUT,
        }
    }

    pub fn pipeline(&mut self) -> Pipeline<'_, 'a, D> {
        Pipeline::new(self)
    }

    pub(crate) fn memory(&self) -> &Memory<'a, D> {
        &self.memory
    }

    //
    // Hardware information.
    //
    pub fn version(&self) -> Result<HardwareVersion, CommandError> {
        let buf = self.memory.read(ADDR_VERSIONS, 6)?;
        Ok(HardwareVersion {
            register_version: buf[0],
            hardware_type: HardwareType::from_id(buf[1] >> 3),
            hardware_revision: buf[1] & 0x07,
        })
    }

    pub fn sys_freq(&self) -> Result<u32, CommandError> {
        self.memory.read_u32(ADDR_SYS_FREQ)
    }

    pub fn max_samples(&self) -> u32 {
        self.max_samples
    }

    pub fn trigger_timeout(&self) -> Duration {
        self.trigger_timeout
    }

    pub fn set_trigger_timeout(&mut self, timeout: Duration) {
        self.trigger_timeout = timeout;
    }

    //
    // Gain settings.
    //
    pub fn gain_mode(&self) -> Result<GainMode, CommandError> {
        match self.settings()? & SETTINGS_GAIN_HIGH {
            0 => Ok(GainMode::Low),
            _ => Ok(GainMode::High),
        }
    }

    /// Low mode ranges from -4.5dB to +43.5dB, High mode from +7.5dB to +55.5dB.
    pub fn set_gain_mode(&mut self, mode: GainMode) -> Result<(), CommandError> {
        let settings = self.settings()?;
        let settings = match mode {
            GainMode::High => settings | SETTINGS_GAIN_HIGH,
            GainMode::Low => settings & !SETTINGS_GAIN_HIGH,
        };
        self.set_settings(settings, true)
    }

    pub fn gain(&self) -> Result<u8, CommandError> {
        self.memory.read_u8(ADDR_GAIN)
    }

    /// Unitless AD8331 gain, from 0 to 78.
    pub fn set_gain(&mut self, gain: u8) -> Result<(), CommandError> {
        if gain > MAX_GAIN {
            return Err(CommandError::InvalidParameter(format!(
                "Invalid gain ({gain}), range 0-{MAX_GAIN} only"
            )));
        }
        self.memory.write_u8(ADDR_GAIN, gain, true)
    }

    //
    // Trigger settings.
    //
    pub fn trigger_pin_state(&self) -> Result<bool, CommandError> {
        Ok(self.status()? & STATUS_EXT != 0)
    }

    pub fn trigger_mode(&self) -> Result<TriggerMode, CommandError> {
        let settings = self.settings()?;
        let high = settings & SETTINGS_TRIG_HIGH != 0;
        let wait = settings & SETTINGS_WAIT != 0;
        Ok(match (high, wait) {
            (true, true) => TriggerMode::RisingEdge,
            (false, true) => TriggerMode::FallingEdge,
            (true, false) => TriggerMode::High,
            (false, false) => TriggerMode::Low,
        })
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), CommandError> {
        let mut settings = self.settings()? & !(SETTINGS_TRIG_HIGH | SETTINGS_WAIT);
        settings |= match mode {
            TriggerMode::RisingEdge => SETTINGS_TRIG_HIGH | SETTINGS_WAIT,
            TriggerMode::FallingEdge => SETTINGS_WAIT,
            TriggerMode::High => SETTINGS_TRIG_HIGH,
            TriggerMode::Low => 0,
        };
        self.set_settings(settings, true)
    }

    /// Samples to skip after the trigger before recording, in ADC clock cycles.
    pub fn trigger_offset(&self) -> Result<u32, CommandError> {
        self.memory.read_u32(ADDR_OFFSET)
    }

    pub fn set_trigger_offset(&mut self, offset: u32) -> Result<(), CommandError> {
        self.memory.write_u32(ADDR_OFFSET, offset, true)
    }

    pub fn pre_trigger_samples(&self) -> Result<u32, CommandError> {
        let samples = self.memory.read_u32(ADDR_PRESAMPLES)?;

        // The CW-Lite and CW1200 count these in packed words of three
        match self.version()?.hardware_type.supports_pre_trigger() {
            true => Ok(samples.saturating_mul(3)),
            false => Ok(samples),
        }
    }

    pub fn set_pre_trigger_samples(&mut self, samples: u32) -> Result<(), CommandError> {
        let version = self.version()?;
        if !version.hardware_type.supports_pre_trigger() {
            return Err(CommandError::UnsupportedOperation(format!(
                "Pre-trigger samples are not reliable on {}",
                version.hardware_type
            )));
        }
        self.memory.write_u32(ADDR_PRESAMPLES, samples / 3, true)
    }

    pub fn total_samples(&self) -> Result<u32, CommandError> {
        self.memory.read_u32(ADDR_SAMPLES)
    }

    pub fn set_total_samples(&mut self, samples: u32) -> Result<(), CommandError> {
        if samples > self.max_samples {
            return Err(CommandError::InvalidParameter(format!(
                "samples ({}) outside limit ({})",
                samples, self.max_samples
            )));
        }
        self.memory.write_u32(ADDR_SAMPLES, samples, true)
    }

    /// Keeps one of every `factor` samples. Pre-trigger capture is disabled above 1.
    pub fn downsample_factor(&self) -> Result<u16, CommandError> {
        Ok(self.memory.read_u16(ADDR_DECIMATE)?.wrapping_add(1))
    }

    pub fn set_downsample_factor(&mut self, factor: u16) -> Result<(), CommandError> {
        if factor == 0 {
            return Err(CommandError::InvalidParameter(
                "Downsample factor must be at least 1".to_string(),
            ));
        }
        self.memory.write_u16(ADDR_DECIMATE, factor - 1, true)
    }

    /// ADC clock cycles during which the trigger was active.
    pub fn active_count(&self) -> Result<u32, CommandError> {
        self.memory.read_u32(ADDR_TRIGGER_DUR)
    }

    //
    // Capture.
    //
    pub fn arm(&mut self) -> Result<(), CommandError> {
        debug!("[adc] arming");
        let settings = self.settings()?;
        self.set_settings(settings | SETTINGS_ARM, true)
    }

    pub fn disarm(&mut self) -> Result<(), CommandError> {
        debug!("[adc] disarming");
        let settings = self.settings()?;
        self.set_settings(settings & !SETTINGS_ARM, true)
    }

    pub fn wait_for_trigger(&mut self) -> Result<bool, CommandError> {
        let deadline = Instant::now() + self.trigger_timeout;
        let waited = self.poll_trigger(deadline);

        // Disarm regardless, but report the first failure.
        let disarmed = self.disarm();
        let timed_out = waited?;
        disarmed?;
        Ok(timed_out)
    }

    fn poll_trigger(&self, deadline: Instant) -> Result<bool, CommandError> {
        loop {
            if Instant::now() >= deadline {
                warn!("Timed out waiting for trigger. Forcing trigger");
                self.trigger_now()?;
                return Ok(true);
            }

            let status = self.status()?;
            if status & STATUS_ARM == 0 && status & STATUS_FIFO != 0 {
                debug!("triggered! (status = {:#04x})", status);
                return Ok(false);
            }
        }
    }

    fn trigger_now(&self) -> Result<(), CommandError> {
        let initial = self.settings()?;
        self.set_settings(initial | SETTINGS_TRIG_NOW, true)?;
        self.set_settings(initial & !SETTINGS_TRIG_NOW, true)
    }

    pub fn trace_data(&mut self) -> Result<Vec<f64>, CommandError> {
        let pending = self.memory.read_u32(ADDR_BYTES_TO_RX)?;
        if pending == 0 {
            return Ok(vec![]);
        }

        // If pending is huge, only read what is needed.
        let samples = self.total_samples()?;
        let words = samples.div_ceil(3).saturating_mul(4);
        let to_read = pending.min(words.saturating_add(TRACE_READ_SLACK));

        debug!("Reading trace data. samples: {}, to read: {}", samples, to_read);
        let data = self.memory.read(ADDR_ADC_DATA, to_read as usize)?;

        let mut measurements = decode_trace_data(&data)?;
        measurements.truncate(samples as usize);
        Ok(measurements)
    }

    //
    // Support functions.
    //
    fn status(&self) -> Result<u8, CommandError> {
        self.memory.read_u8(ADDR_STATUS)
    }

    fn settings(&self) -> Result<u8, CommandError> {
        self.memory.read_u8(ADDR_SETTINGS)
    }

    fn set_settings(&self, settings: u8, verify: bool) -> Result<(), CommandError> {
        self.memory.write_u8(ADDR_SETTINGS, settings, verify)
    }

    fn set_reset_on(&mut self) -> Result<(), CommandError> {
        debug!("[adc] setting reset on");
        let settings = self.settings()?;
        self.set_settings(settings | SETTINGS_RESET, false)?;

        let reported = self.total_samples()?;
        self.max_samples = reported.saturating_sub(MAX_SAMPLES_MARGIN);
        debug!("[adc] max samples: {}", self.max_samples);
        self.memory.write_u32(ADDR_SAMPLES, self.max_samples, true)
    }

    fn set_reset_off(&mut self) -> Result<(), CommandError> {
        debug!("[adc] setting reset off");
        let settings = self.settings()?;
        self.set_settings(settings & !SETTINGS_RESET, true)
    }

    fn refresh(&mut self) -> Result<(), CommandError> {
        debug!("[adc] refreshing parameters");
        let supports_pre_trigger = self.version()?.hardware_type.supports_pre_trigger();

        self.set_gain_mode(self.gain_mode()?)?;
        self.set_gain(self.gain()?)?;
        self.set_trigger_mode(self.trigger_mode()?)?;
        self.set_trigger_offset(self.trigger_offset()?)?;
        if supports_pre_trigger {
            self.set_pre_trigger_samples(self.pre_trigger_samples()?)?;
        }
        self.set_total_samples(self.total_samples()?)?;
        self.set_downsample_factor(self.downsample_factor()?)?;
        self.set_adc_clock_source(self.adc_clock_source()?)?;
        self.set_freq_counter_source(self.freq_counter_source()?)?;
        self.set_clkgen_input_source(self.clkgen_input_source()?)?;
        self.set_ext_clock_freq(self.ext_clock_freq());
        self.set_clkgen_output_freq(self.clkgen_output_freq()?)
    }

    fn default_setup(&mut self) -> Result<(), CommandError> {
        if self.version()?.hardware_type != HardwareType::ChipWhispererLite {
            return Ok(());
        }

        info!("[adc] default setup for CW-Lite");
        self.pipeline()
            .then(|adc| adc.set_gain(45))
            .then(|adc| adc.set_total_samples(3000))
            .then(|adc| adc.set_trigger_offset(0))
            .then(|adc| adc.set_trigger_mode(TriggerMode::RisingEdge))
            .then(|adc| adc.set_clkgen_output_freq(7_370_000))
            .then(|adc| adc.set_adc_clock_source(AdcClockSource::CLK_GEN_X4_VIA_DCM))
            .then(|adc| adc.set_trigger_target_io_pin(TriggerTargetIoPin::Pin4))
            .then(|adc| adc.set_target_io1(TargetIoMode::SerialRx))
            .then(|adc| adc.set_target_io2(TargetIoMode::SerialTx))
            .then(|adc| adc.set_hs2(Hs2Mode::ClkGen))
            .finish()
    }
}

impl<D: CwLiteTransport + ?Sized> TraceSource for Adc<'_, D> {
    fn set_total_samples(&mut self, samples: u32) -> Result<(), CommandError> {
        Adc::set_total_samples(self, samples)
    }

    fn set_trigger_offset(&mut self, offset: u32) -> Result<(), CommandError> {
        Adc::set_trigger_offset(self, offset)
    }

    fn arm(&mut self) -> Result<(), CommandError> {
        Adc::arm(self)
    }

    fn wait_for_trigger(&mut self) -> Result<bool, CommandError> {
        Adc::wait_for_trigger(self)
    }

    fn trace_data(&mut self) -> Result<Vec<f64>, CommandError> {
        Adc::trace_data(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{RegisterFile, Transcript};

    fn adc(dev: &Transcript) -> Adc<'_, Transcript> {
        Adc::attach(Memory::new(dev), 24_000)
    }

    // hardware type lives in the top five bits of the second byte
    fn version_bytes(hardware: u8) -> [u8; 6] {
        [1, hardware << 3, 0, 0, 0, 0]
    }

    #[test]
    fn gain_above_range_is_rejected_without_touching_hardware() {
        let dev = Transcript::new();
        let result = adc(&dev).set_gain(79);
        assert!(matches!(result, Err(CommandError::InvalidParameter(_))));
        assert_eq!(dev.calls(), 0);
    }

    #[test]
    fn gain_is_written_and_verified() {
        let dev = Transcript::new();
        dev.expect_verified_write(ADDR_GAIN, [45]);
        adc(&dev).set_gain(45).unwrap();
        dev.assert_finished();
    }

    #[test]
    fn total_samples_is_bounded_by_hardware_maximum() {
        let dev = Transcript::new();
        let mut adc = adc(&dev);
        let result = adc.set_total_samples(24_001);
        assert!(matches!(result, Err(CommandError::InvalidParameter(_))));

        dev.expect_verified_write(ADDR_SAMPLES, 24_000u32.to_le_bytes());
        adc.set_total_samples(24_000).unwrap();
        dev.assert_finished();
    }

    #[test]
    fn pre_trigger_samples_need_capable_hardware() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_VERSIONS, version_bytes(5));
        let result = adc(&dev).set_pre_trigger_samples(30);
        assert!(matches!(result, Err(CommandError::UnsupportedOperation(_))));
        dev.assert_finished();
    }

    #[test]
    fn pre_trigger_samples_are_counted_in_words_on_cw_lite() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_VERSIONS, version_bytes(8))
            .expect_verified_write(ADDR_PRESAMPLES, 10u32.to_le_bytes())
            .expect_memory_read(ADDR_PRESAMPLES, 10u32.to_le_bytes())
            .expect_memory_read(ADDR_VERSIONS, version_bytes(8));

        let mut adc = adc(&dev);
        adc.set_pre_trigger_samples(30).unwrap();
        assert_eq!(adc.pre_trigger_samples().unwrap(), 30);
        dev.assert_finished();
    }

    #[test]
    fn trigger_mode_bits() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_SETTINGS, [SETTINGS_TRIG_HIGH | SETTINGS_WAIT])
            .expect_memory_read(ADDR_SETTINGS, [SETTINGS_TRIG_HIGH | SETTINGS_ARM])
            .expect_verified_write(ADDR_SETTINGS, [SETTINGS_ARM | SETTINGS_WAIT]);

        let mut adc = adc(&dev);
        assert_eq!(adc.trigger_mode().unwrap(), TriggerMode::RisingEdge);
        adc.set_trigger_mode(TriggerMode::FallingEdge).unwrap();
        dev.assert_finished();
    }

    #[test]
    fn trigger_observed_before_deadline() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_STATUS, [STATUS_ARM])
            .expect_memory_read(ADDR_STATUS, [STATUS_FIFO])
            // disarm
            .expect_memory_read(ADDR_SETTINGS, [SETTINGS_ARM | SETTINGS_WAIT])
            .expect_verified_write(ADDR_SETTINGS, [SETTINGS_WAIT]);

        let timed_out = adc(&dev).wait_for_trigger().unwrap();
        assert!(!timed_out);
        dev.assert_finished();
    }

    #[test]
    fn deadline_forces_a_single_trigger() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_SETTINGS, [SETTINGS_ARM])
            .expect_verified_write(ADDR_SETTINGS, [SETTINGS_ARM | SETTINGS_TRIG_NOW])
            .expect_verified_write(ADDR_SETTINGS, [SETTINGS_ARM])
            // disarm
            .expect_memory_read(ADDR_SETTINGS, [SETTINGS_ARM])
            .expect_verified_write(ADDR_SETTINGS, [0]);

        let mut adc = adc(&dev);
        adc.set_trigger_timeout(Duration::ZERO);
        assert!(adc.wait_for_trigger().unwrap());
        dev.assert_finished();
    }

    #[test]
    fn nothing_pending_means_no_trace() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_BYTES_TO_RX, 0u32.to_le_bytes());
        assert!(adc(&dev).trace_data().unwrap().is_empty());
        dev.assert_finished();
    }

    #[test]
    fn trace_is_read_decoded_and_truncated() {
        let dev = Transcript::new();
        let mut raw = vec![SYNC_BYTE];
        // one word before the trigger, then two full words
        raw.extend_from_slice(&(3u32 << 30).to_be_bytes());
        raw.extend_from_slice(&(512u32 | (512 << 10) | (512 << 20)).to_be_bytes());
        raw.extend_from_slice(&(256u32 | (768 << 10) | (1023 << 20)).to_be_bytes());

        dev.expect_memory_read(ADDR_BYTES_TO_RX, (raw.len() as u32).to_le_bytes())
            .expect_memory_read(ADDR_SAMPLES, 5u32.to_le_bytes())
            .expect_memory_read(ADDR_ADC_DATA, raw.clone());

        let samples = adc(&dev).trace_data().unwrap();
        assert_eq!(samples, vec![0.0, 0.0, 0.0, -0.25, 0.25]);
        dev.assert_finished();
    }

    #[test]
    fn trace_read_length_is_bounded_by_sample_count() {
        let dev = Transcript::new();
        let mut raw = vec![SYNC_BYTE];
        raw.extend(std::iter::repeat_n(0u8, 4 + TRACE_READ_SLACK as usize - 1));

        // 3 samples need one word, so only 4 + 256 of the 10000 pending bytes are fetched
        dev.expect_memory_read(ADDR_BYTES_TO_RX, 10_000u32.to_le_bytes())
            .expect_memory_read(ADDR_SAMPLES, 3u32.to_le_bytes())
            .expect_memory_read(ADDR_ADC_DATA, raw);

        let samples = adc(&dev).trace_data().unwrap();
        assert_eq!(samples.len(), 3);
        dev.assert_finished();
    }

    #[test]
    fn bad_sync_byte_fails_trace_read() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_BYTES_TO_RX, 5u32.to_le_bytes())
            .expect_memory_read(ADDR_SAMPLES, 3u32.to_le_bytes())
            .expect_memory_read(ADDR_ADC_DATA, [0x00, 0, 0, 0, 0]);

        let result = adc(&dev).trace_data();
        assert!(matches!(result, Err(CommandError::Framing(Some(0x00)))));
    }

    #[test]
    fn reset_captures_max_samples() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_SETTINGS, [0])
            .expect_memory_write(ADDR_SETTINGS, [SETTINGS_RESET])
            .expect_memory_read(ADDR_SAMPLES, 24_445u32.to_le_bytes())
            .expect_verified_write(ADDR_SAMPLES, 24_400u32.to_le_bytes())
            .expect_memory_read(ADDR_SETTINGS, [SETTINGS_RESET])
            .expect_verified_write(ADDR_SETTINGS, [0]);

        let mut adc = Adc::attach(Memory::new(&dev), 0);
        adc.set_reset_on().unwrap();
        adc.set_reset_off().unwrap();
        assert_eq!(adc.max_samples(), 24_400);
        dev.assert_finished();
    }

    #[test]
    fn pre_trigger_word_count_saturates() {
        let dev = Transcript::new();
        dev.expect_memory_read(ADDR_PRESAMPLES, u32::MAX.to_le_bytes())
            .expect_memory_read(ADDR_VERSIONS, version_bytes(8));
        assert_eq!(adc(&dev).pre_trigger_samples().unwrap(), u32::MAX);
    }

    #[test]
    fn huge_sample_count_reads_only_what_is_pending() {
        let dev = Transcript::new();
        let mut raw = vec![SYNC_BYTE];
        raw.extend(std::iter::repeat_n(0u8, 12));
        dev.expect_memory_read(ADDR_BYTES_TO_RX, (raw.len() as u32).to_le_bytes())
            .expect_memory_read(ADDR_SAMPLES, u32::MAX.to_le_bytes())
            .expect_memory_read(ADDR_ADC_DATA, raw);

        assert_eq!(adc(&dev).trace_data().unwrap(), vec![-0.5; 9]);
        dev.assert_finished();
    }

    // A freshly configured FPGA: everything zeroed apart from the registers the firmware fills.
    fn board(hardware: u8) -> RegisterFile {
        RegisterFile::new()
            .with(ADDR_VERSIONS, version_bytes(hardware))
            .with(ADDR_SYS_FREQ, 96_000_000u32.to_le_bytes())
            .with(ADDR_SAMPLES, 24_045u32.to_le_bytes())
            .with(ADDR_GAIN, [10])
            .with(ADDR_ADV_CLK, [0x00, 3, 0, 0x02])
    }

    #[test]
    fn construction_resets_then_refreshes_other_boards_without_defaults() {
        // SAKURA-G
        let board = board(7);
        let fpga = Fpga::new(&board);
        let adc = Adc::new(&fpga).unwrap();

        let writes = board.writes();
        assert_eq!(writes[0], (ADDR_SETTINGS, vec![SETTINGS_RESET]));
        assert_eq!(writes[1], (ADDR_SAMPLES, 24_000u32.to_le_bytes().to_vec()));
        assert_eq!(writes[2], (ADDR_SETTINGS, vec![0]));
        assert_eq!(adc.max_samples(), 24_000);

        // the refresh pass writes back what it read
        assert_eq!(board.writes_to(ADDR_GAIN), vec![vec![10]]);
        assert_eq!(adc.total_samples().unwrap(), 24_000);

        // no pre-trigger on this board, and none of the CW-Lite defaults
        assert!(board.writes_to(ADDR_PRESAMPLES).is_empty());
        assert!(board.writes_to(ADDR_TRIG_SRC).is_empty());
        assert!(board.writes_to(ADDR_IO_ROUTE).is_empty());
        assert!(board.writes_to(ADDR_EXT_CLK).is_empty());
    }

    #[test]
    fn construction_applies_cw_lite_defaults() {
        let board = board(8);
        let fpga = Fpga::new(&board);
        let adc = Adc::new(&fpga).unwrap();

        assert_eq!(adc.gain().unwrap(), 45);
        assert_eq!(adc.total_samples().unwrap(), 3000);
        assert_eq!(adc.trigger_offset().unwrap(), 0);
        assert_eq!(adc.trigger_mode().unwrap(), TriggerMode::RisingEdge);
        assert_eq!(
            adc.adc_clock_source().unwrap(),
            AdcClockSource::CLK_GEN_X4_VIA_DCM
        );
        assert_eq!(
            adc.trigger_target_io_pins().unwrap(),
            enumset::EnumSet::only(TriggerTargetIoPin::Pin4)
        );
        assert_eq!(adc.target_io1().unwrap(), TargetIoMode::SerialRx);
        assert_eq!(adc.target_io2().unwrap(), TargetIoMode::SerialTx);
        assert_eq!(adc.hs2().unwrap(), Hs2Mode::ClkGen);

        let setting = calc_clkgen_mul_div(7_370_000, 96_000_000).unwrap();
        let expected = 96_000_000u64 * u64::from(setting.multiplier) / u64::from(setting.divider);
        assert_eq!(u64::from(adc.clkgen_output_freq().unwrap()), expected);

        // the CW-Lite reports pre-trigger samples, so the refresh pass covers them
        assert_eq!(board.writes_to(ADDR_PRESAMPLES).len(), 1);
    }

    #[test]
    fn refresh_failure_fails_construction() {
        // a gain the setter refuses to write back
        let board = board(8).with(ADDR_GAIN, [200]);
        let fpga = Fpga::new(&board);

        let result = Adc::new(&fpga);
        assert!(matches!(result, Err(CommandError::InvalidParameter(_))));

        assert!(board.writes_to(ADDR_GAIN).is_empty());
        assert!(board.writes_to(ADDR_OFFSET).is_empty());
        assert!(board.writes_to(ADDR_IO_ROUTE).is_empty());
    }
}
