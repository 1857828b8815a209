//! A recorded-transcript stand-in for the board.
//!
//! Tests queue up the exact exchanges they expect, in order, and hand the transcript to any
//! component that takes a [`CwLiteTransport`]. Each call is checked against the head of the queue
//! and answered with the recorded reply. A call that doesn't match the transcript panics, naming
//! both the expected and actual exchange.
//!
//! [`RegisterFile`] is the looser alternative for long register sequences: it keeps whatever was
//! last written to each address and logs every write in order.
use crate::commands::Request;
use crate::device::base::CwLiteTransport;
use crate::error::CommandError;
use crate::memory::{Address, BULK_THRESHOLD, address_block};
use byteorder::{ByteOrder, LittleEndian};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub enum Exchange {
    ControlIn {
        request: Request,
        value: u16,
        reply: Vec<u8>,
    },
    ControlOut {
        request: Request,
        value: u16,
        data: Vec<u8>,
    },
    BulkIn {
        reply: Vec<u8>,
    },
    BulkOut {
        data: Vec<u8>,
    },
    Failure(rusb::Error),
}

#[derive(Debug, Default)]
pub struct Transcript {
    expected: RefCell<VecDeque<Exchange>>,
    calls: RefCell<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&self, exchange: Exchange) -> &Self {
        self.expected.borrow_mut().push_back(exchange);
        self
    }

    pub fn expect_control_in(
        &self,
        request: Request,
        value: u16,
        reply: impl Into<Vec<u8>>,
    ) -> &Self {
        self.expect(Exchange::ControlIn {
            request,
            value,
            reply: reply.into(),
        })
    }

    pub fn expect_control_out(
        &self,
        request: Request,
        value: u16,
        data: impl Into<Vec<u8>>,
    ) -> &Self {
        self.expect(Exchange::ControlOut {
            request,
            value,
            data: data.into(),
        })
    }

    pub fn expect_bulk_in(&self, reply: impl Into<Vec<u8>>) -> &Self {
        self.expect(Exchange::BulkIn {
            reply: reply.into(),
        })
    }

    pub fn expect_bulk_out(&self, data: impl Into<Vec<u8>>) -> &Self {
        self.expect(Exchange::BulkOut { data: data.into() })
    }

    /// The next call, whatever it is, fails with `error`.
    pub fn expect_failure(&self, error: rusb::Error) -> &Self {
        self.expect(Exchange::Failure(error))
    }

    /// Queues the exchanges of one external memory read returning `data`.
    pub fn expect_memory_read(&self, address: Address, data: impl Into<Vec<u8>>) -> &Self {
        let data = data.into();
        let header = address_block(address, data.len());
        if data.len() < BULK_THRESHOLD {
            self.expect_control_out(Request::MemReadCtrl, 0, header)
                .expect_control_in(Request::MemReadCtrl, 0, data)
        } else {
            self.expect_control_out(Request::MemReadBulk, 0, header)
                .expect_bulk_in(data)
        }
    }

    /// Queues the exchanges of one (unverified) external memory write of `data`.
    pub fn expect_memory_write(&self, address: Address, data: impl Into<Vec<u8>>) -> &Self {
        let data = data.into();
        let header = address_block(address, data.len());
        if data.len() < BULK_THRESHOLD {
            let mut packet = header.to_vec();
            packet.extend_from_slice(&data);
            self.expect_control_out(Request::MemWriteCtrl, 0, packet)
        } else {
            self.expect_control_out(Request::MemWriteBulk, 0, header)
                .expect_bulk_out(data)
        }
    }

    /// A verified write: the write itself, then the read back of the same bytes.
    pub fn expect_verified_write(&self, address: Address, data: impl Into<Vec<u8>>) -> &Self {
        let data = data.into();
        self.expect_memory_write(address, data.clone())
            .expect_memory_read(address, data)
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }

    pub fn assert_finished(&self) {
        let expected = self.expected.borrow();
        assert!(
            expected.is_empty(),
            "transcript not finished, {} exchanges left, next: {:?}",
            expected.len(),
            expected.front()
        );
    }

    fn next(&self, actual: &str) -> Result<Exchange, CommandError> {
        *self.calls.borrow_mut() += 1;
        match self.expected.borrow_mut().pop_front() {
            Some(Exchange::Failure(error)) => Err(CommandError::UsbError(error)),
            Some(exchange) => Ok(exchange),
            None => panic!("unexpected {actual}, transcript is empty"),
        }
    }
}

impl CwLiteTransport for Transcript {
    fn control_in(
        &self,
        request: Request,
        value: u16,
        buf: &mut [u8],
    ) -> Result<(), CommandError> {
        let actual = format!("control in {request:?} value {value:#x} len {}", buf.len());
        match self.next(&actual)? {
            Exchange::ControlIn {
                request: expected,
                value: expected_value,
                reply,
            } if expected == request && expected_value == value => {
                let count = reply.len().min(buf.len());
                buf[..count].copy_from_slice(&reply[..count]);
                if reply.len() != buf.len() {
                    return Err(CommandError::ShortControlTransfer {
                        expected: buf.len(),
                        actual: reply.len(),
                    });
                }
                Ok(())
            }
            other => panic!("expected {other:?}, got {actual}"),
        }
    }

    fn control_out(&self, request: Request, value: u16, data: &[u8]) -> Result<(), CommandError> {
        let actual = format!("control out {request:?} value {value:#x} data {data:02x?}");
        match self.next(&actual)? {
            Exchange::ControlOut {
                request: expected,
                value: expected_value,
                data: expected_data,
            } if expected == request && expected_value == value && expected_data == data => Ok(()),
            other => panic!("expected {other:?}, got {actual}"),
        }
    }

    fn read_bulk(&self, buf: &mut [u8]) -> Result<usize, CommandError> {
        let actual = format!("bulk in len {}", buf.len());
        match self.next(&actual)? {
            Exchange::BulkIn { reply } => {
                let count = reply.len().min(buf.len());
                buf[..count].copy_from_slice(&reply[..count]);
                Ok(count)
            }
            other => panic!("expected {other:?}, got {actual}"),
        }
    }

    fn write_bulk(&self, data: &[u8]) -> Result<usize, CommandError> {
        let actual = format!("bulk out data {data:02x?}");
        match self.next(&actual)? {
            Exchange::BulkOut { data: expected } if expected == data => Ok(data.len()),
            other => panic!("expected {other:?}, got {actual}"),
        }
    }
}

/// Plain memory behind the external memory interface. Reads of an address never written come
/// back as zeros.
#[derive(Debug, Default)]
pub struct RegisterFile {
    registers: RefCell<HashMap<Address, Vec<u8>>>,
    pending: RefCell<Option<(Address, usize)>>,
    writes: RefCell<Vec<(Address, Vec<u8>)>>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presets a register without logging a write.
    pub fn with(self, address: Address, data: impl Into<Vec<u8>>) -> Self {
        self.registers.borrow_mut().insert(address, data.into());
        self
    }

    pub fn register(&self, address: Address) -> Vec<u8> {
        self.registers
            .borrow()
            .get(&address)
            .cloned()
            .unwrap_or_default()
    }

    /// Every write so far, oldest first.
    pub fn writes(&self) -> Vec<(Address, Vec<u8>)> {
        self.writes.borrow().clone()
    }

    pub fn writes_to(&self, address: Address) -> Vec<Vec<u8>> {
        self.writes
            .borrow()
            .iter()
            .filter(|(written, _)| *written == address)
            .map(|(_, data)| data.clone())
            .collect()
    }

    fn header(data: &[u8]) -> (Address, usize) {
        (
            LittleEndian::read_u32(&data[4..8]),
            LittleEndian::read_u32(&data[0..4]) as usize,
        )
    }

    fn store(&self, address: Address, data: &[u8]) {
        self.registers.borrow_mut().insert(address, data.to_vec());
        self.writes.borrow_mut().push((address, data.to_vec()));
    }

    fn load(&self, buf: &mut [u8]) -> Result<usize, CommandError> {
        let (address, length) = self.pending.borrow_mut().take().ok_or_else(|| {
            CommandError::UnsupportedOperation("read without an address block".to_string())
        })?;
        let mut data = self.register(address);
        data.resize(length, 0);

        let count = length.min(buf.len());
        buf[..count].copy_from_slice(&data[..count]);
        Ok(count)
    }
}

impl CwLiteTransport for RegisterFile {
    fn control_in(
        &self,
        request: Request,
        _value: u16,
        buf: &mut [u8],
    ) -> Result<(), CommandError> {
        match request {
            Request::MemReadCtrl => {
                let read = self.load(buf)?;
                if read != buf.len() {
                    return Err(CommandError::ShortControlTransfer {
                        expected: buf.len(),
                        actual: read,
                    });
                }
                Ok(())
            }
            other => Err(CommandError::UnsupportedOperation(format!("{other:?}"))),
        }
    }

    fn control_out(&self, request: Request, _value: u16, data: &[u8]) -> Result<(), CommandError> {
        match request {
            Request::MemReadCtrl | Request::MemReadBulk | Request::MemWriteBulk => {
                *self.pending.borrow_mut() = Some(Self::header(data));
                Ok(())
            }
            Request::MemWriteCtrl => {
                let (address, length) = Self::header(data);
                self.store(address, &data[8..8 + length]);
                Ok(())
            }
            other => Err(CommandError::UnsupportedOperation(format!("{other:?}"))),
        }
    }

    fn read_bulk(&self, buf: &mut [u8]) -> Result<usize, CommandError> {
        self.load(buf)
    }

    fn write_bulk(&self, data: &[u8]) -> Result<usize, CommandError> {
        let (address, _) = self.pending.borrow_mut().take().ok_or_else(|| {
            CommandError::UnsupportedOperation("write without an address block".to_string())
        })?;
        self.store(address, data);
        Ok(data.len())
    }
}
