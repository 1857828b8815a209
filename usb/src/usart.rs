// USART bridge to the target board, proxied by the microcontroller over control transfers.
use crate::commands::{Request, UsartCommand};
use crate::device::base::CwLiteTransport;
use crate::error::CommandError;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, trace};
use std::thread::sleep;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(750);

// Largest payload the firmware accepts in one data write.
const WRITE_CHUNK: usize = 58;
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A byte stream to the device under test with a bounded read.
pub trait CommandChannel {
    fn write(&mut self, data: &[u8]) -> Result<usize, CommandError>;

    /// Reads until `buf` is full or the timeout passes. Returns what was read, or
    /// [`CommandError::Timeout`] if nothing arrived at all.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CommandError>;

    /// Discards anything waiting to be read.
    fn flush(&mut self) -> Result<(), CommandError>;

    fn timeout(&self) -> Duration;
    fn set_timeout(&mut self, timeout: Duration);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopBits {
    One = 0,
    OneAndHalf = 1,
    Two = 2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UsartConfig {
    pub baud: u32,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub data_bits: u8,
}

impl Default for UsartConfig {
    fn default() -> Self {
        Self {
            baud: 38400,
            stop_bits: StopBits::One,
            parity: Parity::None,
            data_bits: 8,
        }
    }
}

impl UsartConfig {
    /// The layout the firmware expects with the init command.
    pub fn to_bytes(&self) -> [u8; 7] {
        let mut bytes = [0; 7];
        LittleEndian::write_u32(&mut bytes[0..4], self.baud);
        bytes[4] = self.stop_bits as u8;
        bytes[5] = self.parity as u8;
        bytes[6] = self.data_bits;
        bytes
    }
}

pub struct Usart<'a, D: CwLiteTransport + ?Sized> {
    dev: &'a D,
    timeout: Duration,
}

impl<'a, D: CwLiteTransport + ?Sized> Usart<'a, D> {
    pub fn new(dev: &'a D, config: UsartConfig) -> Result<Self, CommandError> {
        info!("USART configuration: {:?}", config);
        let usart = Self {
            dev,
            timeout: DEFAULT_TIMEOUT,
        };
        usart.config_write(UsartCommand::Init, &config.to_bytes())?;
        usart.config_write(UsartCommand::Enable, &[])?;
        debug!("USART initialised");
        Ok(usart)
    }

    /// Bytes the microcontroller is holding for us.
    pub fn in_waiting(&self) -> Result<usize, CommandError> {
        let mut count = [0; 4];
        self.dev
            .control_in(Request::Usart0Config, UsartCommand::BytesWaiting.value(), &mut count)?;
        Ok(LittleEndian::read_u32(&count) as usize)
    }

    fn config_write(&self, command: UsartCommand, data: &[u8]) -> Result<(), CommandError> {
        debug!("[usart-config-write]: cmd = {:?}", command);
        self.dev
            .control_out(Request::Usart0Config, command.value(), data)
    }

    fn data_read(&self, buf: &mut [u8]) -> Result<(), CommandError> {
        trace!("[usart-data-read]: len = {}", buf.len());
        self.dev.control_in(Request::Usart0Data, 0, buf)
    }

    fn data_write(&self, data: &[u8]) -> Result<(), CommandError> {
        trace!("[usart-data-write]: data = {:02x?}", data);
        self.dev.control_out(Request::Usart0Data, 0, data)
    }
}

impl<D: CwLiteTransport + ?Sized> CommandChannel for Usart<'_, D> {
    fn write(&mut self, data: &[u8]) -> Result<usize, CommandError> {
        for chunk in data.chunks(WRITE_CHUNK) {
            self.data_write(chunk)?;
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CommandError> {
        let deadline = Instant::now() + self.timeout;
        let mut read = 0;

        while read < buf.len() {
            if Instant::now() >= deadline {
                debug!("USART read timed out after {} of {} bytes", read, buf.len());
                return match read {
                    0 => Err(CommandError::Timeout),
                    _ => Ok(read),
                };
            }

            let waiting = self.in_waiting()?.min(buf.len() - read);
            if waiting == 0 {
                sleep(POLL_INTERVAL);
                continue;
            }

            self.data_read(&mut buf[read..read + waiting])?;
            read += waiting;
        }
        Ok(read)
    }

    fn flush(&mut self) -> Result<(), CommandError> {
        loop {
            let waiting = self.in_waiting()?;
            if waiting == 0 {
                return Ok(());
            }
            let mut discard = vec![0; waiting];
            self.data_read(&mut discard)?;
            debug!("Flushed {} bytes from USART", waiting);
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;

    fn expect_init(dev: &Transcript) {
        dev.expect_control_out(
            Request::Usart0Config,
            0x10,
            [0x00, 0x96, 0x00, 0x00, 0, 0, 8],
        )
        .expect_control_out(Request::Usart0Config, 0x11, [0u8; 0]);
    }

    fn expect_waiting(dev: &Transcript, count: u32) {
        dev.expect_control_in(Request::Usart0Config, 0x14, count.to_le_bytes());
    }

    #[test]
    fn default_config_layout() {
        let bytes = UsartConfig::default().to_bytes();
        assert_eq!(bytes, [0x00, 0x96, 0x00, 0x00, 0, 0, 8]);
    }

    #[test]
    fn writes_are_split_into_firmware_sized_chunks() {
        let dev = Transcript::new();
        let data: Vec<u8> = (0..130).collect();
        expect_init(&dev);
        dev.expect_control_out(Request::Usart0Data, 0, data[..58].to_vec())
            .expect_control_out(Request::Usart0Data, 0, data[58..116].to_vec())
            .expect_control_out(Request::Usart0Data, 0, data[116..].to_vec());

        let mut usart = Usart::new(&dev, UsartConfig::default()).unwrap();
        assert_eq!(usart.write(&data).unwrap(), 130);
        dev.assert_finished();
    }

    #[test]
    fn read_collects_until_buffer_is_full() {
        let dev = Transcript::new();
        expect_init(&dev);
        expect_waiting(&dev, 0);
        expect_waiting(&dev, 2);
        dev.expect_control_in(Request::Usart0Data, 0, *b"r0");
        // more is waiting than fits, only the remainder is read
        expect_waiting(&dev, 10);
        dev.expect_control_in(Request::Usart0Data, 0, *b"12\n");

        let mut usart = Usart::new(&dev, UsartConfig::default()).unwrap();
        let mut buf = [0; 5];
        assert_eq!(usart.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"r012\n");
        dev.assert_finished();
    }

    #[test]
    fn read_with_nothing_waiting_times_out() {
        let dev = Transcript::new();
        expect_init(&dev);

        let mut usart = Usart::new(&dev, UsartConfig::default()).unwrap();
        usart.set_timeout(Duration::ZERO);
        let mut buf = [0; 4];
        let result = usart.read(&mut buf);
        assert!(matches!(result, Err(CommandError::Timeout)));
        assert!(result.unwrap_err().is_retryable());
        dev.assert_finished();
    }

    #[test]
    fn flush_drains_everything_waiting() {
        let dev = Transcript::new();
        expect_init(&dev);
        expect_waiting(&dev, 3);
        dev.expect_control_in(Request::Usart0Data, 0, [1, 2, 3]);
        expect_waiting(&dev, 1);
        dev.expect_control_in(Request::Usart0Data, 0, [4]);
        expect_waiting(&dev, 0);

        let mut usart = Usart::new(&dev, UsartConfig::default()).unwrap();
        usart.flush().unwrap();
        dev.assert_finished();
    }
}
