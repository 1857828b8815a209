#[cfg(feature = "clap")]
use clap::ValueEnum;
use enumset::EnumSetType;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;
use strum::{Display, EnumCount, EnumIter};

// Board identifiers, as reported in the upper five bits of the second version byte.
#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HardwareType {
    Unknown,
    Lx9MicroBoard,
    SaseboW,
    ChipWhispererRev2Lx25,
    Reserved,
    ZedBoard,
    PapilioPro,
    SakuraG,
    ChipWhispererLite,
    ChipWhispererCw1200,
}

impl HardwareType {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => HardwareType::Lx9MicroBoard,
            2 => HardwareType::SaseboW,
            3 => HardwareType::ChipWhispererRev2Lx25,
            4 => HardwareType::Reserved,
            5 => HardwareType::ZedBoard,
            6 => HardwareType::PapilioPro,
            7 => HardwareType::SakuraG,
            8 => HardwareType::ChipWhispererLite,
            9 => HardwareType::ChipWhispererCw1200,
            _ => HardwareType::Unknown,
        }
    }

    /// The CW-Lite and CW1200 report pre-trigger samples in words of three.
    pub fn supports_pre_trigger(&self) -> bool {
        matches!(
            self,
            HardwareType::ChipWhispererLite | HardwareType::ChipWhispererCw1200
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HardwareVersion {
    pub register_version: u8,
    pub hardware_type: HardwareType,
    pub hardware_revision: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub debug: u8,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.debug)
    }
}

impl std::fmt::Debug for FirmwareVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.debug)
    }
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GainMode {
    High,
    Low,
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TriggerMode {
    RisingEdge,
    FallingEdge,
    Low,
    High,
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AdcSource {
    Dcm,
    ExtClk,
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DcmInput {
    ClkGen,
    ExtClk,
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DcmOutput {
    X1,
    X4,
}

/// Where the ADC sample clock comes from.
///
/// | Name              | Input Freq Range                  | Fine Phase Adj. |
/// |-------------------|-----------------------------------|-----------------|
/// | EXTCLK Direct     | 1-105 MHz                         | No              |
/// | EXTCLK xN via DCM | 5-105 MHz (x1), 5-26.25 MHz (x4)  | Yes             |
/// | CLKGEN xN via DCM | 5-105 MHz (x1), 5-26.25 MHz (x4)  | Yes             |
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdcClockSource {
    pub source: AdcSource,
    pub dcm_output: DcmOutput,
    pub dcm_input: DcmInput,
}

impl AdcClockSource {
    pub const EXT_CLK_DIRECT: Self = Self::new(AdcSource::ExtClk, DcmOutput::X4, DcmInput::ClkGen);
    pub const EXT_CLK_X4_VIA_DCM: Self =
        Self::new(AdcSource::Dcm, DcmOutput::X4, DcmInput::ExtClk);
    pub const EXT_CLK_X1_VIA_DCM: Self =
        Self::new(AdcSource::Dcm, DcmOutput::X1, DcmInput::ExtClk);
    pub const CLK_GEN_X4_VIA_DCM: Self =
        Self::new(AdcSource::Dcm, DcmOutput::X4, DcmInput::ClkGen);
    pub const CLK_GEN_X1_VIA_DCM: Self =
        Self::new(AdcSource::Dcm, DcmOutput::X1, DcmInput::ClkGen);

    pub const fn new(source: AdcSource, dcm_output: DcmOutput, dcm_input: DcmInput) -> Self {
        Self {
            source,
            dcm_output,
            dcm_input,
        }
    }
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FreqCounterSource {
    ExtClkInput,
    ClkGenOutput,
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClkGenInputSource {
    System,
    ExtClk,
}

#[derive(Debug, Display, EnumIter, EnumCount, EnumSetType)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TriggerTargetIoPin {
    Pin1,
    Pin2,
    Pin3,
    Pin4,
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TargetIoMode {
    SerialRx,
    SerialTx,
    HighZ,
    GpioLow,
    GpioHigh,
    GpioDisabled,
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Hs2Mode {
    Disabled,
    ClkGen,
    Glitch,
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GpioMode {
    Low,
    High,
    Disabled,
}
