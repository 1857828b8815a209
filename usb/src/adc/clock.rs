// Clock generator (CLKGEN) and ADC DCM control, all of which live in the advanced clock register.
use super::{ADDR_ADC_FREQ, ADDR_ADV_CLK, ADDR_FREQ, Adc};
use crate::device::base::CwLiteTransport;
use crate::error::CommandError;
use crate::memory::Address;
use cwlite_types::{
    AdcClockSource, AdcSource, ClkGenInputSource, DcmInput, DcmOutput, FreqCounterSource,
};
use log::debug;

// Bits 1 of the flags byte and the status bits of the first byte are read only.
const ADV_CLK_READ_MASK: [u8; 4] = [0x1f, 0xff, 0xff, 0xfd];

const SRC_ADC_EXT_CLK: u8 = 0x01;
const SRC_DCM_X1: u8 = 0x02;
const SRC_DCM_INPUT_EXT_CLK: u8 = 0x04;
const SRC_CLKGEN_INPUT_EXT_CLK: u8 = 0x08;
const SRC_RESET_ADC: u8 = 0x10;
const STATUS_CLKGEN_DCM_LOCKED: u8 = 0x20;
const STATUS_DCM_LOCKED: u8 = 0x40;

const FLAG_LOAD: u8 = 0x01;
const FLAG_MUL_DIV_VALID: u8 = 0x02;
const FLAG_RESET: u8 = 0x04;
const FLAG_FREQ_COUNTER_CLKGEN: u8 = 0x08;

const MUL_RANGE: std::ops::RangeInclusive<u32> = 2..=256;
const DIV_RANGE: std::ops::RangeInclusive<u32> = 1..=256;

// Frequency registers count ticks over 2^23 system clock cycles.
const FREQ_WINDOW: f64 = (1u32 << 23) as f64;

// Below this input frequency the DCM datasheet limits the divider.
const DIV_LIMIT_FREQ: u32 = 52_000_000;
const DIV_LIMIT_STEP: u32 = 500_000;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvancedClock {
    pub src_and_status: u8,
    pub mul: u8,
    pub div: u8,
    pub flags: u8,
}

impl AdvancedClock {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            src_and_status: bytes[0],
            mul: bytes[1],
            div: bytes[2],
            flags: bytes[3],
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.src_and_status, self.mul, self.div, self.flags]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClockSetting {
    pub multiplier: u32,
    pub divider: u32,
}

impl ClockSetting {
    pub fn output(&self, input: u32) -> f64 {
        input as f64 * self.multiplier as f64 / self.divider as f64
    }
}

/// Finds the multiplier / divider pair getting closest to `target` from `input`.
///
/// Ties keep the first pair found, searching multipliers then dividers in ascending order.
/// Returns `None` when the input is too slow to allow any divider.
pub fn calc_clkgen_mul_div(target: u32, input: u32) -> Option<ClockSetting> {
    let max_div = match input < DIV_LIMIT_FREQ {
        true => (input / DIV_LIMIT_STEP).min(*DIV_RANGE.end()),
        false => *DIV_RANGE.end(),
    };

    let mut best: Option<(ClockSetting, f64)> = None;
    for multiplier in MUL_RANGE {
        for divider in 1..=max_div {
            let setting = ClockSetting {
                multiplier,
                divider,
            };
            let error = (target as f64 - setting.output(input)).abs();
            if best.is_none_or(|(_, lowest)| error < lowest) {
                best = Some((setting, error));
            }
        }
    }
    best.map(|(setting, _)| setting)
}

impl<D: CwLiteTransport + ?Sized> Adc<'_, D> {
    pub fn adc_clock_source(&self) -> Result<AdcClockSource, CommandError> {
        let src = self.adv_clock()?.src_and_status;
        Ok(AdcClockSource {
            source: match src & SRC_ADC_EXT_CLK {
                0 => AdcSource::Dcm,
                _ => AdcSource::ExtClk,
            },
            dcm_output: match src & SRC_DCM_X1 {
                0 => DcmOutput::X4,
                _ => DcmOutput::X1,
            },
            dcm_input: match src & SRC_DCM_INPUT_EXT_CLK {
                0 => DcmInput::ClkGen,
                _ => DcmInput::ExtClk,
            },
        })
    }

    pub fn set_adc_clock_source(&mut self, source: AdcClockSource) -> Result<(), CommandError> {
        let mut settings = self.adv_clock()?;
        settings.src_and_status &= !(SRC_ADC_EXT_CLK | SRC_DCM_X1 | SRC_DCM_INPUT_EXT_CLK);
        if source.dcm_input == DcmInput::ExtClk {
            settings.src_and_status |= SRC_DCM_INPUT_EXT_CLK;
        }
        if source.dcm_output == DcmOutput::X1 {
            settings.src_and_status |= SRC_DCM_X1;
        }
        if source.source == AdcSource::ExtClk {
            settings.src_and_status |= SRC_ADC_EXT_CLK;
        }
        self.set_adv_clock(settings, true)?;
        self.reset_adc()
    }

    /// The ADC clock frequency in Hz, as measured by the FPGA.
    pub fn adc_freq(&self) -> Result<u32, CommandError> {
        self.measured_freq(ADDR_ADC_FREQ)
    }

    /// The ADC clock frequency after decimation.
    pub fn adc_sample_rate(&self) -> Result<u32, CommandError> {
        let factor = self.downsample_factor()?.max(1);
        Ok(self.adc_freq()? / u32::from(factor))
    }

    pub fn dcm_locked(&self) -> Result<bool, CommandError> {
        Ok(self.adv_clock()?.src_and_status & STATUS_DCM_LOCKED != 0)
    }

    /// The frequency seen by the frequency counter, see [`Adc::freq_counter_source`].
    pub fn freq_counter(&self) -> Result<u32, CommandError> {
        self.measured_freq(ADDR_FREQ)
    }

    pub fn freq_counter_source(&self) -> Result<FreqCounterSource, CommandError> {
        match self.adv_clock()?.flags & FLAG_FREQ_COUNTER_CLKGEN {
            0 => Ok(FreqCounterSource::ExtClkInput),
            _ => Ok(FreqCounterSource::ClkGenOutput),
        }
    }

    pub fn set_freq_counter_source(&mut self, source: FreqCounterSource) -> Result<(), CommandError> {
        let mut settings = self.adv_clock()?;
        settings.flags &= !FLAG_FREQ_COUNTER_CLKGEN;
        if source == FreqCounterSource::ClkGenOutput {
            settings.flags |= FLAG_FREQ_COUNTER_CLKGEN;
        }
        self.set_adv_clock(settings, true)?;
        self.reset_clkgen()?;
        self.reset_adc()
    }

    pub fn clkgen_input_source(&self) -> Result<ClkGenInputSource, CommandError> {
        match self.adv_clock()?.src_and_status & SRC_CLKGEN_INPUT_EXT_CLK {
            0 => Ok(ClkGenInputSource::System),
            _ => Ok(ClkGenInputSource::ExtClk),
        }
    }

    pub fn set_clkgen_input_source(&mut self, source: ClkGenInputSource) -> Result<(), CommandError> {
        let mut settings = self.adv_clock()?;
        settings.src_and_status &= !SRC_CLKGEN_INPUT_EXT_CLK;
        if source == ClkGenInputSource::ExtClk {
            settings.src_and_status |= SRC_CLKGEN_INPUT_EXT_CLK;
        }
        self.set_adv_clock(settings, true)
    }

    /// The frequency fed into EXTCLK, used when the clock generator runs from it.
    pub fn ext_clock_freq(&self) -> u32 {
        self.ext_clock_freq
    }

    pub fn set_ext_clock_freq(&mut self, freq: u32) {
        self.ext_clock_freq = freq;
    }

    pub fn clkgen_output_freq(&self) -> Result<u32, CommandError> {
        let input = self.clkgen_input_freq()?;
        let multiplier = self.clkgen_mul()?;
        let divider = self.clkgen_div()?;
        let output = u64::from(input) * u64::from(multiplier) / u64::from(divider);
        Ok(u32::try_from(output).unwrap_or(u32::MAX))
    }

    pub fn set_clkgen_output_freq(&mut self, freq: u32) -> Result<(), CommandError> {
        let input = self.clkgen_input_freq()?;
        let setting = calc_clkgen_mul_div(freq, input).ok_or_else(|| {
            CommandError::InvalidParameter(format!(
                "No clock generator setting reaches {freq}Hz from {input}Hz"
            ))
        })?;
        debug!(
            "[adc] clkgen {}Hz from {}Hz: mul {} div {}",
            freq, input, setting.multiplier, setting.divider
        );

        self.set_clkgen_mul(setting.multiplier)?;
        self.set_clkgen_div(setting.divider)?;
        self.reset_clkgen()?;
        self.reset_adc()
    }

    pub fn clkgen_dcm_locked(&self) -> Result<bool, CommandError> {
        Ok(self.adv_clock()?.src_and_status & STATUS_CLKGEN_DCM_LOCKED != 0)
    }

    fn clkgen_input_freq(&self) -> Result<u32, CommandError> {
        match self.clkgen_input_source()? {
            ClkGenInputSource::ExtClk => Ok(self.ext_clock_freq),
            ClkGenInputSource::System => self.sys_freq(),
        }
    }

    fn measured_freq(&self, address: Address) -> Result<u32, CommandError> {
        let sys_freq = self.sys_freq()?;
        let count = self.memory().read_u32(address)?;
        Ok((f64::from(count) * (f64::from(sys_freq) / FREQ_WINDOW)) as u32)
    }

    pub(crate) fn adv_clock(&self) -> Result<AdvancedClock, CommandError> {
        let mut bytes = [0; 4];
        self.memory().read_into(ADDR_ADV_CLK, &mut bytes)?;
        Ok(AdvancedClock::from_bytes(bytes))
    }

    fn set_adv_clock(&self, settings: AdvancedClock, verify: bool) -> Result<(), CommandError> {
        self.memory().write(
            ADDR_ADV_CLK,
            &settings.to_bytes(),
            verify,
            Some(&ADV_CLK_READ_MASK),
        )
    }

    // Pulses the load flag so the DCM picks up the new multiplier and divider.
    fn load_adv_clock(&self, mut settings: AdvancedClock) -> Result<(), CommandError> {
        settings.flags |= FLAG_LOAD;
        self.set_adv_clock(settings, true)?;
        settings.flags &= !FLAG_LOAD;
        self.set_adv_clock(settings, true)
    }

    fn clkgen_mul(&self) -> Result<u32, CommandError> {
        for _ in 0..2 {
            let settings = self.adv_clock()?;
            if settings.mul == 0 {
                // Freshly configured FPGAs come up with an invalid multiplier
                self.set_clkgen_mul(*MUL_RANGE.start())?;
                continue;
            }
            if settings.flags & FLAG_MUL_DIV_VALID != 0 {
                return Ok(u32::from(settings.mul) + 1);
            }
            self.reload_clkgen()?;
        }
        Err(CommandError::UnexpectedRegister(
            "Failed to read CLKGEN multiplier".to_string(),
        ))
    }

    fn set_clkgen_mul(&self, multiplier: u32) -> Result<(), CommandError> {
        if !MUL_RANGE.contains(&multiplier) {
            return Err(CommandError::InvalidParameter(format!(
                "CLKGEN multiplier {multiplier} out of range"
            )));
        }
        let mut settings = self.adv_clock()?;
        settings.mul = (multiplier - 1) as u8;
        self.load_adv_clock(settings)
    }

    fn clkgen_div(&self) -> Result<u32, CommandError> {
        for _ in 0..2 {
            let settings = self.adv_clock()?;
            if settings.flags & FLAG_MUL_DIV_VALID != 0 {
                return Ok(u32::from(settings.div) + 1);
            }
            self.reload_clkgen()?;
        }
        Err(CommandError::UnexpectedRegister(
            "Failed to read CLKGEN divider".to_string(),
        ))
    }

    fn set_clkgen_div(&self, divider: u32) -> Result<(), CommandError> {
        if !DIV_RANGE.contains(&divider) {
            return Err(CommandError::InvalidParameter(format!(
                "CLKGEN divider {divider} out of range"
            )));
        }
        let mut settings = self.adv_clock()?;
        settings.div = (divider - 1) as u8;
        self.load_adv_clock(settings)
    }

    fn reload_clkgen(&self) -> Result<(), CommandError> {
        let settings = self.adv_clock()?;
        self.load_adv_clock(settings)
    }

    fn reset_clkgen(&self) -> Result<(), CommandError> {
        let mut settings = self.adv_clock()?;
        settings.flags |= FLAG_RESET;
        self.set_adv_clock(settings, false)?;
        settings.flags &= !FLAG_RESET;
        self.set_adv_clock(settings, false)?;
        self.reload_clkgen()
    }

    fn reset_adc(&self) -> Result<(), CommandError> {
        let mut settings = self.adv_clock()?;
        settings.src_and_status |= SRC_RESET_ADC;
        self.set_adv_clock(settings, false)?;
        settings.src_and_status &= !SRC_RESET_ADC;
        self.set_adv_clock(settings, false)
    }
}
