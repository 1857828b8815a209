// The simple-serial protocol spoken by the target firmware: single letter commands followed by
// hex payloads, one per line.
use crate::error::CaptureError;
use cwlite_usb::error::CommandError;
use cwlite_usb::usart::CommandChannel;
use log::{debug, trace};
use std::thread::sleep;
use std::time::{Duration, Instant};

// A run of 'x' drops whatever the target was parsing and returns it to idle.
const IDLE_FLUSH: &[u8] = b"xxxxxxxxxxxxxxxxxxx\n";
const IDLE_SETTLE: Duration = Duration::from_millis(10);
const VERSION_RESPONSE_LEN: usize = 4;
// Well past the longest reply, a 64 byte block in hex.
const MAX_LINE_LEN: usize = 256;

/// An encryption device that can be keyed, fed plaintexts and asked for the result.
pub trait CipherTarget {
    fn write_key(&mut self, key: &[u8]) -> Result<(), CaptureError>;
    fn write_plaintext(&mut self, plaintext: &[u8]) -> Result<(), CaptureError>;
    fn read_ciphertext(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Drops any partial response so the next exchange starts clean.
    fn flush(&mut self) -> Result<(), CaptureError>;
}

pub struct SimpleSerial<C: CommandChannel> {
    channel: C,
}

impl<C: CommandChannel> SimpleSerial<C> {
    /// Resets the target to idle and checks it speaks simple-serial 1.1.
    pub fn new(channel: C) -> Result<Self, CaptureError> {
        debug!("Opening SimpleSerial");
        let mut serial = Self { channel };
        serial.idle()?;
        serial.check_version()?;
        Ok(serial)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn idle(&mut self) -> Result<(), CaptureError> {
        self.channel.write(IDLE_FLUSH)?;
        sleep(IDLE_SETTLE);
        self.channel.flush()?;
        Ok(())
    }

    fn check_version(&mut self) -> Result<(), CaptureError> {
        self.channel.flush()?;
        self.channel.write(b"v\n")?;

        let mut response = [0; VERSION_RESPONSE_LEN];
        self.channel.read(&mut response)?;
        if response[0] != b'z' {
            return Err(CaptureError::UnsupportedProtocol);
        }
        Ok(())
    }

    fn command(&mut self, command: char, payload: &[u8]) -> Result<(), CaptureError> {
        let line = format!("{}{}\n", command, hex::encode(payload));
        trace!("simple-serial > {}", line.trim_end());
        self.channel.write(line.as_bytes())?;
        Ok(())
    }

    /// Reads up to and including the next newline, returned without it.
    ///
    /// The channel timeout bounds the whole line, not each byte.
    pub fn response_line(&mut self) -> Result<String, CaptureError> {
        let deadline = Instant::now() + self.channel.timeout();
        let mut line = Vec::new();
        let mut byte = [0; 1];
        loop {
            self.channel.read(&mut byte)?;
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);

            if line.len() > MAX_LINE_LEN {
                return Err(CaptureError::Response(
                    String::from_utf8_lossy(&line).to_string(),
                ));
            }
            if Instant::now() >= deadline {
                debug!("Response timed out after {} bytes", line.len());
                return Err(CommandError::Timeout.into());
            }
        }

        let line = String::from_utf8_lossy(&line).trim_end_matches('\r').to_string();
        trace!("simple-serial < {}", line);
        Ok(line)
    }
}

impl<C: CommandChannel> CipherTarget for SimpleSerial<C> {
    fn write_key(&mut self, key: &[u8]) -> Result<(), CaptureError> {
        self.command('k', key)?;
        let ack = self.response_line()?;
        if !ack.starts_with('z') {
            return Err(CaptureError::Acknowledgement(ack));
        }
        Ok(())
    }

    fn write_plaintext(&mut self, plaintext: &[u8]) -> Result<(), CaptureError> {
        self.command('p', plaintext)
    }

    fn read_ciphertext(&mut self) -> Result<Vec<u8>, CaptureError> {
        let line = self.response_line()?;
        match line.strip_prefix('r') {
            Some(payload) => Ok(hex::decode(payload)?),
            None => Err(CaptureError::Response(line)),
        }
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        self.channel.flush()?;
        Ok(())
    }
}
