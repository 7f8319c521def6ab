//! In-memory serial endpoints for tests.

use std::collections::VecDeque;
use std::vec::Vec;

use embedded_hal_nb::serial::{ErrorKind, ErrorType, Read, Write};

/// Collects everything written. Can be made to refuse bytes, either for a
/// few attempts per byte or permanently once `capacity` bytes are held.
#[derive(Debug, Default)]
pub struct TxBuffer {
    pub data: Vec<u8>,
    pub capacity: Option<usize>,
    pub stall_per_byte: u32,
    stalled: u32,
    pub attempts: usize,
}

impl TxBuffer {
    pub fn new() -> TxBuffer {
        TxBuffer::default()
    }

    pub fn with_capacity(capacity: usize) -> TxBuffer {
        TxBuffer {
            capacity: Some(capacity),
            ..TxBuffer::default()
        }
    }

    /// Every byte is declined `stalls` times before it is taken.
    pub fn stalling(stalls: u32) -> TxBuffer {
        TxBuffer {
            stall_per_byte: stalls,
            ..TxBuffer::default()
        }
    }
}

impl ErrorType for TxBuffer {
    type Error = ErrorKind;
}

impl Write for TxBuffer {
    fn write(&mut self, c: u8) -> nb::Result<(), Self::Error> {
        self.attempts += 1;
        if self.capacity.is_some_and(|cap| self.data.len() >= cap) {
            return Err(nb::Error::WouldBlock);
        }
        if self.stalled < self.stall_per_byte {
            self.stalled += 1;
            return Err(nb::Error::WouldBlock);
        }
        self.stalled = 0;
        self.data.push(c);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}

/// Hands out queued bytes one at a time, then `WouldBlock`.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    pub data: VecDeque<u8>,
    /// Returned once, at this many bytes left in the queue.
    pub fail_at: Option<(usize, ErrorKind)>,
}

impl ReadBuffer {
    pub fn new() -> ReadBuffer {
        ReadBuffer::default()
    }

    pub fn from_iter(data: impl IntoIterator<Item = u8>) -> ReadBuffer {
        ReadBuffer {
            data: VecDeque::from_iter(data),
            fail_at: None,
        }
    }

    pub fn extend(&mut self, data: impl IntoIterator<Item = u8>) {
        self.data.extend(data);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl ErrorType for ReadBuffer {
    type Error = ErrorKind;
}

impl Read for ReadBuffer {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        if let Some((left, kind)) = self.fail_at {
            if left == self.data.len() {
                self.fail_at = None;
                return Err(nb::Error::Other(kind));
            }
        }
        self.data.pop_front().ok_or(nb::Error::WouldBlock)
    }
}
