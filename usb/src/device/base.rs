use crate::commands::Request;
use crate::error::CommandError;
use cwlite_types::FirmwareVersion;
use log::debug;

// The raw pipes of the capture board. Everything above this layer (memory, fpga, adc, usart)
// only ever talks to the device through these four calls.
pub trait CwLiteTransport {
    /// Performs a vendor IN control transfer, filling the whole of `buf`.
    fn control_in(&self, request: Request, value: u16, buf: &mut [u8])
    -> Result<(), CommandError>;

    /// Performs a vendor OUT control transfer of exactly `data.len()` bytes.
    fn control_out(&self, request: Request, value: u16, data: &[u8]) -> Result<(), CommandError>;

    fn read_bulk(&self, buf: &mut [u8]) -> Result<usize, CommandError>;
    fn write_bulk(&self, data: &[u8]) -> Result<usize, CommandError>;
}

// Requests that can be made on any transport, built on top of the raw pipes.
pub trait CwLiteCommands: CwLiteTransport {
    fn firmware_version(&self) -> Result<FirmwareVersion, CommandError> {
        let mut buf = [0; 3];
        self.control_in(Request::FirmwareVersion, 0, &mut buf)?;
        let version = FirmwareVersion {
            major: buf[0],
            minor: buf[1],
            debug: buf[2],
        };
        debug!("Firmware Version: {}", version);
        Ok(version)
    }
}

impl<T: CwLiteTransport + ?Sized> CwLiteCommands for T {}

// We primarily need the bus number, and address for comparison..
#[derive(Debug, Clone)]
pub struct CwLiteDevice {
    pub(crate) bus_number: u8,
    pub(crate) address: u8,
}

impl CwLiteDevice {
    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }
    pub fn address(&self) -> u8 {
        self.address
    }
}
