use crate::commands::{FpgaProgramCommand, Request};
use crate::device::base::CwLiteTransport;
use crate::error::CommandError;
use crate::memory::Memory;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

// Where packaged builds install the interface bitstream.
pub const DEFAULT_BITSTREAM: &str = "/usr/share/cwlite/cwlite_interface.bit";

/// The OpenADC interface bitstream, built into the library.
#[cfg(feature = "bundled-bitstream")]
pub const BUNDLED_BITSTREAM: &[u8] = include_bytes!("../assets/cwlite_interface.bit");

const PROGRAM_DELAY: Duration = Duration::from_millis(10);
const DONE_ATTEMPTS: usize = 5;
const CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bitstream {
    #[cfg(feature = "bundled-bitstream")]
    Bundled,
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl Default for Bitstream {
    #[cfg(feature = "bundled-bitstream")]
    fn default() -> Self {
        Bitstream::Bundled
    }

    #[cfg(not(feature = "bundled-bitstream"))]
    fn default() -> Self {
        Bitstream::File(PathBuf::from(DEFAULT_BITSTREAM))
    }
}

impl Bitstream {
    pub fn open(&self) -> Result<Box<dyn Read + '_>, CommandError> {
        match self {
            #[cfg(feature = "bundled-bitstream")]
            Bitstream::Bundled => {
                debug!("Loading bundled bitstream");
                Ok(Box::new(BUNDLED_BITSTREAM))
            }
            Bitstream::File(path) => {
                debug!("Loading bitstream from {}", path.to_string_lossy());
                let file = File::open(path).map_err(CommandError::Bitstream)?;
                Ok(Box::new(BufReader::new(file)))
            }
            Bitstream::Bytes(bytes) => Ok(Box::new(bytes.as_slice())),
        }
    }
}

pub struct Fpga<'a, D: CwLiteTransport + ?Sized> {
    dev: &'a D,
}

impl<'a, D: CwLiteTransport + ?Sized> Fpga<'a, D> {
    pub fn new(dev: &'a D) -> Self {
        Self { dev }
    }

    /// Attaches to the FPGA, loading `bitstream` first if it isn't already configured.
    pub fn open(dev: &'a D, bitstream: &Bitstream) -> Result<Self, CommandError> {
        let fpga = Self::new(dev);
        if !fpga.is_programmed()? {
            info!("FPGA is not programmed, loading bitstream");
            fpga.program(bitstream.open()?)?;
        }
        Ok(fpga)
    }

    pub fn memory(&self) -> Memory<'a, D> {
        Memory::new(self.dev)
    }

    pub fn is_programmed(&self) -> Result<bool, CommandError> {
        let mut status = [0; 4];
        self.dev.control_in(Request::FpgaStatus, 0, &mut status)?;
        let programmed = LittleEndian::read_u32(&status) & 1 == 1;
        debug!("FPGA programmed: {}", programmed);
        Ok(programmed)
    }

    fn program_control(&self, command: FpgaProgramCommand) -> Result<(), CommandError> {
        self.dev
            .control_out(Request::FpgaProgram, command.value(), &[])
    }

    pub fn program(&self, mut bitstream: impl Read) -> Result<(), CommandError> {
        info!("Programming FPGA");

        // Erase the FPGA by toggling PROGRAM, then put the microcontroller into programming mode
        self.program_control(FpgaProgramCommand::Erase)?;
        sleep(PROGRAM_DELAY);
        self.program_control(FpgaProgramCommand::Arm)?;
        sleep(PROGRAM_DELAY);

        let mut chunk = vec![0; CHUNK_SIZE];
        let mut total = 0;
        loop {
            let count = bitstream.read(&mut chunk).map_err(CommandError::Bitstream)?;
            if count == 0 {
                break;
            }
            let written = self.dev.write_bulk(&chunk[..count])?;
            if written != count {
                return Err(CommandError::ShortBulkTransfer {
                    expected: count,
                    actual: written,
                });
            }
            total += count;
        }
        debug!("Sent {} bytes of bitstream", total);

        let mut ready = false;
        for attempt in 1..=DONE_ATTEMPTS {
            if self.is_programmed()? {
                ready = true;
                break;
            }
            if attempt < DONE_ATTEMPTS {
                sleep(PROGRAM_DELAY);
            }
        }

        // Leave programming mode whether or not DONE came up.
        self.program_control(FpgaProgramCommand::Exit)?;

        if !ready {
            warn!("FPGA DONE did not go high after {} attempts", DONE_ATTEMPTS);
            return Err(CommandError::ProgrammingFailed);
        }
        info!("FPGA programmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;
    use std::time::Instant;

    fn expect_program_start(dev: &Transcript, bitstream: &[u8]) {
        dev.expect_control_out(Request::FpgaProgram, 0xa0, [0u8; 0])
            .expect_control_out(Request::FpgaProgram, 0xa1, [0u8; 0])
            .expect_bulk_out(bitstream.to_vec());
    }

    #[test]
    fn done_on_first_poll_skips_retries() {
        let dev = Transcript::new();
        let bitstream = vec![0xff, 0xff, 0xaa, 0x99, 0x55, 0x66];
        expect_program_start(&dev, &bitstream);
        dev.expect_control_in(Request::FpgaStatus, 0, [1, 0, 0, 0])
            .expect_control_out(Request::FpgaProgram, 0xa2, [0u8; 0]);

        let started = Instant::now();
        Fpga::new(&dev).program(bitstream.as_slice()).unwrap();

        dev.assert_finished();
        assert!(started.elapsed() < PROGRAM_DELAY * 4);
    }

    #[test]
    fn not_done_after_five_polls_fails_but_exits_programming() {
        let dev = Transcript::new();
        let bitstream = vec![1, 2, 3];
        expect_program_start(&dev, &bitstream);
        for _ in 0..DONE_ATTEMPTS {
            dev.expect_control_in(Request::FpgaStatus, 0, [0, 0, 0, 0]);
        }
        dev.expect_control_out(Request::FpgaProgram, 0xa2, [0u8; 0]);

        let result = Fpga::new(&dev).program(bitstream.as_slice());
        assert!(matches!(result, Err(CommandError::ProgrammingFailed)));
        dev.assert_finished();
    }

    #[test]
    fn done_on_third_poll() {
        let dev = Transcript::new();
        let bitstream = vec![7; 10];
        expect_program_start(&dev, &bitstream);
        dev.expect_control_in(Request::FpgaStatus, 0, [0, 0, 0, 0])
            .expect_control_in(Request::FpgaStatus, 0, [2, 0, 0, 0])
            .expect_control_in(Request::FpgaStatus, 0, [3, 0, 0, 0])
            .expect_control_out(Request::FpgaProgram, 0xa2, [0u8; 0]);

        Fpga::new(&dev).program(bitstream.as_slice()).unwrap();
        dev.assert_finished();
    }

    #[test]
    fn open_skips_programming_when_already_configured() {
        let dev = Transcript::new();
        dev.expect_control_in(Request::FpgaStatus, 0, [1, 0, 0, 0]);

        Fpga::open(&dev, &Bitstream::Bytes(vec![1, 2, 3])).unwrap();
        dev.assert_finished();
    }

    #[test]
    fn open_programs_an_empty_fpga() {
        let dev = Transcript::new();
        let bitstream = vec![4, 5, 6];
        dev.expect_control_in(Request::FpgaStatus, 0, [0, 0, 0, 0]);
        expect_program_start(&dev, &bitstream);
        dev.expect_control_in(Request::FpgaStatus, 0, [1, 0, 0, 0])
            .expect_control_out(Request::FpgaProgram, 0xa2, [0u8; 0]);

        Fpga::open(&dev, &Bitstream::Bytes(bitstream)).unwrap();
        dev.assert_finished();
    }

    #[cfg(feature = "bundled-bitstream")]
    #[test]
    fn bundled_bitstream_is_the_default() {
        assert_eq!(Bitstream::default(), Bitstream::Bundled);

        let mut loaded = Vec::new();
        Bitstream::default()
            .open()
            .unwrap()
            .read_to_end(&mut loaded)
            .unwrap();
        assert_eq!(loaded, BUNDLED_BITSTREAM);
    }

    #[cfg(not(feature = "bundled-bitstream"))]
    #[test]
    fn installed_bitstream_is_the_default() {
        assert_eq!(
            Bitstream::default(),
            Bitstream::File(PathBuf::from(DEFAULT_BITSTREAM))
        );
    }

    #[test]
    fn missing_bitstream_file_is_reported() {
        let bitstream = Bitstream::File(PathBuf::from("/nonexistent/cwlite.bit"));
        let result = bitstream.open();
        assert!(matches!(result, Err(CommandError::Bitstream(_))));
    }

    #[test]
    fn status_transfer_errors_propagate() {
        let dev = Transcript::new();
        dev.expect_failure(rusb::Error::Pipe);

        let result = Fpga::new(&dev).is_programmed();
        assert!(matches!(
            result,
            Err(CommandError::UsbError(rusb::Error::Pipe))
        ));
    }
}
