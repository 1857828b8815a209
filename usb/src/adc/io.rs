// Target IO routing: which pins feed the trigger, what the serial / GPIO lines do, and whether
// HS2 carries a clock out to the target.
use super::{ADDR_EXT_CLK, ADDR_IO_ROUTE, ADDR_TRIG_SRC, Adc};
use crate::device::base::CwLiteTransport;
use crate::error::CommandError;
use cwlite_types::{GpioMode, Hs2Mode, TargetIoMode, TriggerTargetIoPin};
use enumset::EnumSet;

const PIN_RTIO1: u8 = 0x04;
const PIN_RTIO2: u8 = 0x08;
const PIN_RTIO3: u8 = 0x10;
const PIN_RTIO4: u8 = 0x20;
const TRIGGER_MODE_OR: u8 = 0x00;

const ROUTE_HIGHZ: u8 = 0x00;
const ROUTE_STX: u8 = 0x01;
const ROUTE_SRX: u8 = 0x02;
const ROUTE_USIO: u8 = 0x04;
const ROUTE_USII: u8 = 0x08;
const ROUTE_GPIO: u8 = 0x40;
const ROUTE_GPIOE: u8 = 0x80;

const IO_ROUTE_LEN: usize = 8;
const SPECIAL_GPIO_BYTE: usize = 6;

const HS2_SHIFT: u8 = 5;
const HS2_MASK: u8 = 0x03 << HS2_SHIFT;

/// The programming lines, which share one byte of the routing register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpecialGpio {
    Nrst,
    Pdid,
    Pdic,
}

impl SpecialGpio {
    // Enable bit; the level bit sits directly above it.
    fn bit(&self) -> u8 {
        match self {
            SpecialGpio::Nrst => 0,
            SpecialGpio::Pdid => 2,
            SpecialGpio::Pdic => 4,
        }
    }
}

fn pin_mask(pin: TriggerTargetIoPin) -> u8 {
    match pin {
        TriggerTargetIoPin::Pin1 => PIN_RTIO1,
        TriggerTargetIoPin::Pin2 => PIN_RTIO2,
        TriggerTargetIoPin::Pin3 => PIN_RTIO3,
        TriggerTargetIoPin::Pin4 => PIN_RTIO4,
    }
}

impl<D: CwLiteTransport + ?Sized> Adc<'_, D> {
    pub fn trigger_target_io_pins(&self) -> Result<EnumSet<TriggerTargetIoPin>, CommandError> {
        let pins = self.memory().read_u8(ADDR_TRIG_SRC)?;
        Ok(EnumSet::all()
            .iter()
            .filter(|pin| pins & pin_mask(*pin) != 0)
            .collect())
    }

    /// Triggers on a single target IO pin, replacing any previous selection.
    pub fn set_trigger_target_io_pin(&mut self, pin: TriggerTargetIoPin) -> Result<(), CommandError> {
        let pins = pin_mask(pin) | (TRIGGER_MODE_OR << 6);
        self.memory().write_u8(ADDR_TRIG_SRC, pins, true)
    }

    pub fn target_io1(&self) -> Result<TargetIoMode, CommandError> {
        self.target_io(0)
    }

    pub fn set_target_io1(&mut self, mode: TargetIoMode) -> Result<(), CommandError> {
        self.set_target_io(0, mode)
    }

    pub fn target_io2(&self) -> Result<TargetIoMode, CommandError> {
        self.target_io(1)
    }

    pub fn set_target_io2(&mut self, mode: TargetIoMode) -> Result<(), CommandError> {
        self.set_target_io(1, mode)
    }

    pub fn special_gpio(&self, pin: SpecialGpio) -> Result<GpioMode, CommandError> {
        let route = self.io_route()?[SPECIAL_GPIO_BYTE];
        let bit = pin.bit();
        if route & (1 << bit) == 0 {
            return Ok(GpioMode::Disabled);
        }
        match route & (1 << (bit + 1)) {
            0 => Ok(GpioMode::Low),
            _ => Ok(GpioMode::High),
        }
    }

    pub fn set_special_gpio(&mut self, pin: SpecialGpio, mode: GpioMode) -> Result<(), CommandError> {
        let mut route = self.io_route()?;
        let bit = pin.bit();
        let byte = &mut route[SPECIAL_GPIO_BYTE];
        match mode {
            GpioMode::Disabled => *byte &= !(1 << bit),
            GpioMode::High => *byte |= (1 << bit) | (1 << (bit + 1)),
            GpioMode::Low => {
                *byte |= 1 << bit;
                *byte &= !(1 << (bit + 1));
            }
        }
        self.memory().write(ADDR_IO_ROUTE, &route, true, None)
    }

    pub fn nrst(&self) -> Result<GpioMode, CommandError> {
        self.special_gpio(SpecialGpio::Nrst)
    }

    pub fn set_nrst(&mut self, mode: GpioMode) -> Result<(), CommandError> {
        self.set_special_gpio(SpecialGpio::Nrst, mode)
    }

    pub fn pdic(&self) -> Result<GpioMode, CommandError> {
        self.special_gpio(SpecialGpio::Pdic)
    }

    pub fn set_pdic(&mut self, mode: GpioMode) -> Result<(), CommandError> {
        self.set_special_gpio(SpecialGpio::Pdic, mode)
    }

    pub fn pdid(&self) -> Result<GpioMode, CommandError> {
        self.special_gpio(SpecialGpio::Pdid)
    }

    pub fn set_pdid(&mut self, mode: GpioMode) -> Result<(), CommandError> {
        self.set_special_gpio(SpecialGpio::Pdid, mode)
    }

    pub fn hs2(&self) -> Result<Hs2Mode, CommandError> {
        let data = self.memory().read_u8(ADDR_EXT_CLK)?;
        match (data & HS2_MASK) >> HS2_SHIFT {
            0 => Ok(Hs2Mode::Disabled),
            2 => Ok(Hs2Mode::ClkGen),
            3 => Ok(Hs2Mode::Glitch),
            other => Err(CommandError::UnexpectedRegister(format!(
                "Unknown HS2 clock output {other}"
            ))),
        }
    }

    pub fn set_hs2(&mut self, mode: Hs2Mode) -> Result<(), CommandError> {
        let clock_out = match mode {
            Hs2Mode::Disabled => 0,
            Hs2Mode::ClkGen => 2,
            Hs2Mode::Glitch => 3,
        };
        let data = self.memory().read_u8(ADDR_EXT_CLK)? & !HS2_MASK;
        self.memory()
            .write_u8(ADDR_EXT_CLK, data | (clock_out << HS2_SHIFT), true)
    }

    fn io_route(&self) -> Result<[u8; IO_ROUTE_LEN], CommandError> {
        let mut route = [0; IO_ROUTE_LEN];
        self.memory().read_into(ADDR_IO_ROUTE, &mut route)?;
        Ok(route)
    }

    fn target_io(&self, pin: usize) -> Result<TargetIoMode, CommandError> {
        let route = self.io_route()?[pin];

        // The GPIO level doesn't take part in the mode
        match route & !ROUTE_GPIO {
            ROUTE_STX => Ok(TargetIoMode::SerialTx),
            ROUTE_SRX => Ok(TargetIoMode::SerialRx),
            ROUTE_HIGHZ => Ok(TargetIoMode::HighZ),
            ROUTE_GPIOE => match route & ROUTE_GPIO {
                0 => Ok(TargetIoMode::GpioLow),
                _ => Ok(TargetIoMode::GpioHigh),
            },
            mode @ (ROUTE_USIO | ROUTE_USII) => Err(CommandError::UnsupportedOperation(format!(
                "Target IO{} is routed to USI ({mode:#04x})",
                pin + 1
            ))),
            mode => Err(CommandError::UnexpectedRegister(format!(
                "Unknown target IO{} mode {mode:#04x}",
                pin + 1
            ))),
        }
    }

    fn set_target_io(&mut self, pin: usize, mode: TargetIoMode) -> Result<(), CommandError> {
        let mut route = self.io_route()?;
        route[pin] = match mode {
            TargetIoMode::SerialRx => ROUTE_SRX,
            TargetIoMode::SerialTx => ROUTE_STX,
            TargetIoMode::HighZ => ROUTE_HIGHZ,
            TargetIoMode::GpioLow => ROUTE_GPIOE,
            TargetIoMode::GpioHigh => ROUTE_GPIOE | ROUTE_GPIO,
            TargetIoMode::GpioDisabled => {
                return Err(CommandError::UnsupportedOperation(format!(
                    "Target IO{} can't be set to a disabled GPIO",
                    pin + 1
                )));
            }
        };
        self.memory().write(ADDR_IO_ROUTE, &route, true, None)
    }
}
