// External memory interface. The FPGA exposes its registers as a flat address space, which the
// USB microcontroller proxies for us. Small transfers ride on the control pipe, larger ones on the
// bulk pipe; the split point is fixed by the firmware.
use crate::commands::Request;
use crate::device::base::CwLiteTransport;
use crate::error::CommandError;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

pub type Address = u32;

/// Transfers of this many bytes or more go over the bulk pipe.
pub const BULK_THRESHOLD: usize = 48;

// { data length: u32, address: u32 }, little endian.
pub(crate) fn address_block(address: Address, length: usize) -> [u8; 8] {
    let mut block = [0; 8];
    LittleEndian::write_u32(&mut block[0..4], length as u32);
    LittleEndian::write_u32(&mut block[4..8], address);
    block
}

pub struct Memory<'a, D: CwLiteTransport + ?Sized> {
    dev: &'a D,
}

impl<D: CwLiteTransport + ?Sized> Clone for Memory<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: CwLiteTransport + ?Sized> Copy for Memory<'_, D> {}

impl<'a, D: CwLiteTransport + ?Sized> Memory<'a, D> {
    pub fn new(dev: &'a D) -> Self {
        Self { dev }
    }

    pub fn device(&self) -> &'a D {
        self.dev
    }

    pub fn read(&self, address: Address, length: usize) -> Result<Vec<u8>, CommandError> {
        let mut data = vec![0; length];
        self.read_into(address, &mut data)?;
        Ok(data)
    }

    /// Fills `data` from memory starting at `address`.
    pub fn read_into(&self, address: Address, data: &mut [u8]) -> Result<(), CommandError> {
        debug!("[ext-mem-read]: addr = {}, dlen = {}", address, data.len());

        let request = match data.len() < BULK_THRESHOLD {
            true => Request::MemReadCtrl,
            false => Request::MemReadBulk,
        };

        self.dev
            .control_out(request, 0, &address_block(address, data.len()))?;

        if request == Request::MemReadCtrl {
            return self.dev.control_in(Request::MemReadCtrl, 0, data);
        }

        let read = self.dev.read_bulk(data)?;
        if read != data.len() {
            return Err(CommandError::ShortBulkTransfer {
                expected: data.len(),
                actual: read,
            });
        }
        Ok(())
    }

    /// Writes `data` at `address`. When `verify` is set the region is read back and compared,
    /// after masking both sides with `mask` if one is given.
    pub fn write(
        &self,
        address: Address,
        data: &[u8],
        verify: bool,
        mask: Option<&[u8]>,
    ) -> Result<(), CommandError> {
        debug!("[ext-mem-write]: addr = {}, dlen = {}", address, data.len());

        if let Some(mask) = mask {
            if mask.len() != data.len() {
                return Err(CommandError::MaskLength {
                    mask: mask.len(),
                    data: data.len(),
                });
            }
        }

        let header = address_block(address, data.len());
        if data.len() < BULK_THRESHOLD {
            let mut packet = Vec::with_capacity(header.len() + data.len());
            packet.extend_from_slice(&header);
            packet.extend_from_slice(data);
            self.dev.control_out(Request::MemWriteCtrl, 0, &packet)?;
        } else {
            self.dev.control_out(Request::MemWriteBulk, 0, &header)?;
            let written = self.dev.write_bulk(data)?;
            if written != data.len() {
                return Err(CommandError::ShortBulkTransfer {
                    expected: data.len(),
                    actual: written,
                });
            }
        }

        if !verify {
            return Ok(());
        }

        let mut actual = self.read(address, data.len())?;
        let mut expected = data.to_vec();
        if let Some(mask) = mask {
            for ((actual, expected), mask) in actual.iter_mut().zip(expected.iter_mut()).zip(mask)
            {
                *actual &= mask;
                *expected &= mask;
            }
        }

        if expected != actual {
            debug!("Verify mismatch, wrote {:02x?}, read {:02x?}", expected, actual);
            return Err(CommandError::VerificationFailed { address });
        }
        Ok(())
    }

    pub fn read_u8(&self, address: Address) -> Result<u8, CommandError> {
        let mut buf = [0; 1];
        self.read_into(address, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&self, address: Address) -> Result<u16, CommandError> {
        let mut buf = [0; 2];
        self.read_into(address, &mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    pub fn read_u32(&self, address: Address) -> Result<u32, CommandError> {
        let mut buf = [0; 4];
        self.read_into(address, &mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    pub fn write_u8(&self, address: Address, value: u8, verify: bool) -> Result<(), CommandError> {
        self.write(address, &[value], verify, None)
    }

    pub fn write_u16(&self, address: Address, value: u16, verify: bool) -> Result<(), CommandError> {
        let mut buf = [0; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.write(address, &buf, verify, None)
    }

    pub fn write_u32(&self, address: Address, value: u32, verify: bool) -> Result<(), CommandError> {
        let mut buf = [0; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write(address, &buf, verify, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;

    const ADDR: Address = 0x11223344;

    #[test]
    fn small_read_uses_control_pipe() {
        let dev = Transcript::new();
        dev.expect_control_out(Request::MemReadCtrl, 0, [3, 0, 0, 0, 0x44, 0x33, 0x22, 0x11])
            .expect_control_in(Request::MemReadCtrl, 0, [0xaa, 0xbb, 0xcc]);

        let data = Memory::new(&dev).read(ADDR, 3).unwrap();
        assert_eq!(data, vec![0xaa, 0xbb, 0xcc]);
        dev.assert_finished();
    }

    #[test]
    fn read_switches_to_bulk_at_threshold() {
        let dev = Transcript::new();
        let below = vec![0x5a; BULK_THRESHOLD - 1];
        let at = vec![0xa5; BULK_THRESHOLD];
        dev.expect_control_out(Request::MemReadCtrl, 0, address_block(ADDR, below.len()))
            .expect_control_in(Request::MemReadCtrl, 0, below.clone())
            .expect_control_out(Request::MemReadBulk, 0, address_block(ADDR, at.len()))
            .expect_bulk_in(at.clone());

        let memory = Memory::new(&dev);
        assert_eq!(memory.read(ADDR, 47).unwrap(), below);
        assert_eq!(memory.read(ADDR, 48).unwrap(), at);
        dev.assert_finished();
    }

    #[test]
    fn short_bulk_read_is_an_error() {
        let dev = Transcript::new();
        dev.expect_control_out(Request::MemReadBulk, 0, address_block(ADDR, 64))
            .expect_bulk_in(vec![0; 60]);

        let result = Memory::new(&dev).read(ADDR, 64);
        assert!(matches!(
            result,
            Err(CommandError::ShortBulkTransfer {
                expected: 64,
                actual: 60
            })
        ));
    }

    #[test]
    fn small_write_sends_header_and_data_together() {
        let dev = Transcript::new();
        dev.expect_control_out(
            Request::MemWriteCtrl,
            0,
            [3, 0, 0, 0, 0x44, 0x33, 0x22, 0x11, 0xaa, 0xbb, 0xcc],
        );

        Memory::new(&dev)
            .write(ADDR, &[0xaa, 0xbb, 0xcc], false, None)
            .unwrap();
        dev.assert_finished();
    }

    #[test]
    fn write_switches_to_bulk_at_threshold() {
        let dev = Transcript::new();
        let below = vec![1; BULK_THRESHOLD - 1];
        let at = vec![2; BULK_THRESHOLD];

        let mut packet = address_block(ADDR, below.len()).to_vec();
        packet.extend_from_slice(&below);
        dev.expect_control_out(Request::MemWriteCtrl, 0, packet)
            .expect_control_out(Request::MemWriteBulk, 0, address_block(ADDR, at.len()))
            .expect_bulk_out(at.clone());

        let memory = Memory::new(&dev);
        memory.write(ADDR, &below, false, None).unwrap();
        memory.write(ADDR, &at, false, None).unwrap();
        dev.assert_finished();
    }

    #[test]
    fn verified_write_passes_on_identical_read_back() {
        let dev = Transcript::new();
        dev.expect_memory_write(ADDR, [0xaa, 0xbb, 0xcc])
            .expect_memory_read(ADDR, [0xaa, 0xbb, 0xcc]);

        Memory::new(&dev)
            .write(ADDR, &[0xaa, 0xbb, 0xcc], true, None)
            .unwrap();
        dev.assert_finished();
    }

    #[test]
    fn verified_write_fails_on_mismatch() {
        let dev = Transcript::new();
        dev.expect_memory_write(ADDR, [0xaa, 0xbb, 0xcc])
            .expect_memory_read(ADDR, [0xaa, 0xdd, 0xcc]);

        let result = Memory::new(&dev).write(ADDR, &[0xaa, 0xbb, 0xcc], true, None);
        assert!(matches!(
            result,
            Err(CommandError::VerificationFailed { address: ADDR })
        ));
    }

    #[test]
    fn mask_hides_ignored_bytes() {
        let dev = Transcript::new();
        dev.expect_memory_write(ADDR, [0xaa, 0xbb, 0xcc])
            .expect_memory_read(ADDR, [0xaa, 0xdd, 0xcc]);

        Memory::new(&dev)
            .write(ADDR, &[0xaa, 0xbb, 0xcc], true, Some(&[0xff, 0x00, 0xff]))
            .unwrap();
        dev.assert_finished();
    }

    #[test]
    fn mask_length_must_match() {
        let dev = Transcript::new();
        let result = Memory::new(&dev).write(ADDR, &[1, 2, 3], true, Some(&[0xff]));
        assert!(matches!(
            result,
            Err(CommandError::MaskLength { mask: 1, data: 3 })
        ));
        dev.assert_finished();
    }
}
