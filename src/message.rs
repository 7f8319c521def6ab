use core::{array, fmt, iter::Chain, iter::Copied, slice};

use heapless::LinearMap;

use crate::{Encode, checksum::RunningCrc};

/// Value of each of the two synchronization bytes.
pub const SYNC_BYTE: u8 = 0xFF;
/// Start of every frame on the wire.
pub const SYNC: [u8; 2] = [SYNC_BYTE, SYNC_BYTE];
/// Sync: 2, Id: 2, Crc: 2
pub const OVERHEAD: usize = 6;

/// Bytes a frame carrying `len` payload bytes occupies on the wire.
pub const fn frame_len(len: usize) -> usize {
    len + OVERHEAD
}

/// Message object flags. Numeric values match the flag word used by the
/// C firmware on the other end of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    NoFlags,
    /// Frame received and its CRC checked out.
    NewData,
    /// Frame received but the CRC did not match. Payload holds whatever arrived.
    DataLost,
}

impl Status {
    pub const fn flags(&self) -> u32 {
        match self {
            Status::NoFlags => 0x0000_0000,
            Status::NewData => 0x0000_0080,
            Status::DataLost => 0x0000_0100,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::NoFlags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    /// `expected_length` is larger than the payload buffer.
    PayloadTooShort { expected: usize, found: usize },
    EncodeBufferTooSmall { expected: usize, found: usize },
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::PayloadTooShort { expected, found } => write!(
                f,
                "payload buffer holds {found} bytes, message needs {expected}"
            ),
            MessageError::EncodeBufferTooSmall { expected, found } => write!(
                f,
                "encode buffer holds {found} bytes, frame needs {expected}"
            ),
        }
    }
}

impl core::error::Error for MessageError {}

/// A message exchanged between the application and the codec.
///
/// The payload buffer belongs to the caller. Encoding reads
/// `payload[..expected_length]`, decoding writes it. The same buffer can be
/// recycled for the next transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<B> {
    pub id: u16,
    pub payload: B,
    pub expected_length: usize,
    pub status: Status,
}

impl<B: AsRef<[u8]>> Message<B> {
    /// Message carrying all of `payload`.
    pub fn new(id: u16, payload: B) -> Message<B> {
        let expected_length = payload.as_ref().len();
        Message {
            id,
            payload,
            expected_length,
            status: Status::NoFlags,
        }
    }

    /// Empty message for the decoder to fill in. `expected_length` is set once
    /// the id has been read.
    pub fn receive_into(buffer: B) -> Message<B> {
        Message {
            id: 0,
            payload: buffer,
            expected_length: 0,
            status: Status::NoFlags,
        }
    }

    pub fn with_length(mut self, expected_length: usize) -> Message<B> {
        self.expected_length = expected_length;
        self
    }

    pub fn capacity(&self) -> usize {
        self.payload.as_ref().len()
    }

    /// The first `expected_length` bytes of the buffer, clamped to its capacity.
    pub fn payload(&self) -> &[u8] {
        let p = self.payload.as_ref();
        &p[..self.expected_length.min(p.len())]
    }

    /// True only for a frame that was received and validated.
    pub fn is_new_data(&self) -> bool {
        self.status == Status::NewData
    }

    pub fn frame_len(&self) -> usize {
        frame_len(self.expected_length)
    }

    fn checked_payload(&self) -> Result<&[u8], MessageError> {
        let p = self.payload.as_ref();
        p.get(..self.expected_length)
            .ok_or(MessageError::PayloadTooShort {
                expected: self.expected_length,
                found: p.len(),
            })
    }

    /// CRC over id (big endian) followed by the payload.
    pub fn crc(&self) -> Result<u16, MessageError> {
        let payload = self.checked_payload()?;
        Ok(RunningCrc::new()
            .update_slice(&self.id.to_be_bytes())
            .update_slice(payload)
            .value())
    }

    /// Every byte of this message's frame, in transmission order.
    pub fn wire_bytes(&self) -> Result<WireBytes<'_>, MessageError> {
        let payload = self.checked_payload()?;
        let crc = self.crc()?;
        let inner = SYNC
            .into_iter()
            .chain(self.id.to_be_bytes())
            .chain(payload.iter().copied())
            .chain(crc.to_be_bytes());
        Ok(WireBytes { inner, crc })
    }
}

type WireChain<'a> = Chain<
    Chain<Chain<array::IntoIter<u8, 2>, array::IntoIter<u8, 2>>, Copied<slice::Iter<'a, u8>>>,
    array::IntoIter<u8, 2>,
>;

/// Iterator over a frame's bytes: `FF FF id_hi id_lo payload.. crc_hi crc_lo`.
#[derive(Debug, Clone)]
pub struct WireBytes<'a> {
    inner: WireChain<'a>,
    crc: u16,
}

impl WireBytes<'_> {
    /// CRC carried in the trailing two bytes.
    pub fn crc(&self) -> u16 {
        self.crc
    }
}

impl Iterator for WireBytes<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<B: AsRef<[u8]>> Encode for Message<B> {
    type Error = MessageError;

    fn encode(&self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let size = self.frame_len();
        if buffer.len() < size {
            return Err(MessageError::EncodeBufferTooSmall {
                expected: size,
                found: buffer.len(),
            });
        }
        for (slot, b) in buffer.iter_mut().zip(self.wire_bytes()?) {
            *slot = b;
        }
        Ok(size)
    }
}

/// Maps a message id to the payload length both ends agreed on. The wire
/// carries no length, so the decoder asks this right after reading the id.
pub trait LengthResolver {
    /// `None` for ids this end does not know about.
    fn expected_length(&self, id: u16) -> Option<usize>;
}

/// Every id carries the same number of payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLength(pub usize);

impl LengthResolver for FixedLength {
    fn expected_length(&self, _id: u16) -> Option<usize> {
        Some(self.0)
    }
}

impl<F> LengthResolver for F
where
    F: Fn(u16) -> Option<usize>,
{
    fn expected_length(&self, id: u16) -> Option<usize> {
        self(id)
    }
}

/// Fixed capacity id -> length table.
#[derive(Debug, Clone, Default)]
pub struct LengthTable<const N: usize> {
    lengths: LinearMap<u16, usize, N>,
}

impl<const N: usize> LengthTable<N> {
    pub fn new() -> LengthTable<N> {
        LengthTable {
            lengths: LinearMap::new(),
        }
    }

    /// Register `len` for `id`. Gives the entry back when the table is full.
    pub fn insert(&mut self, id: u16, len: usize) -> Result<Option<usize>, (u16, usize)> {
        self.lengths.insert(id, len)
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

impl<const N: usize> LengthResolver for LengthTable<N> {
    fn expected_length(&self, id: u16) -> Option<usize> {
        self.lengths.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum;

    #[test]
    fn wire_layout() {
        let msg = Message::new(0x0102, [0x0Au8, 0x0B]);
        let crc = checksum(&[0x01, 0x02, 0x0A, 0x0B]);
        let bytes: Vec<u8> = msg.wire_bytes().unwrap().collect();
        assert_eq!(
            bytes,
            vec![0xFF, 0xFF, 0x01, 0x02, 0x0A, 0x0B, (crc >> 8) as u8, crc as u8]
        );
        assert_eq!(msg.crc().unwrap(), crc);
        assert_eq!(msg.frame_len(), bytes.len());
    }

    #[test]
    fn encode_into_buffer() {
        let msg = Message::new(0xBEEF, [1u8, 2, 3]);
        let mut buf = [0; 16];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(n, 9);
        assert_eq!(&buf[..4], &[0xFF, 0xFF, 0xBE, 0xEF]);
        assert_eq!(&buf[4..7], &[1, 2, 3]);
        assert!(buf[9..].iter().all(|b| *b == 0));
    }

    #[test]
    fn encode_buffer_too_small() {
        let msg = Message::new(1, [0u8; 4]);
        let mut buf = [0; 9];
        assert_eq!(
            msg.encode(&mut buf),
            Err(MessageError::EncodeBufferTooSmall {
                expected: 10,
                found: 9
            })
        );
    }

    #[test]
    fn expected_length_limits_payload() {
        let msg = Message::new(7, [9u8, 8, 7, 6]).with_length(2);
        assert_eq!(msg.payload(), &[9, 8]);
        let bytes: Vec<u8> = msg.wire_bytes().unwrap().collect();
        assert_eq!(bytes.len(), frame_len(2));

        let msg = Message::new(7, [9u8, 8]).with_length(5);
        assert_eq!(msg.payload(), &[9, 8]);
        assert_eq!(
            msg.crc(),
            Err(MessageError::PayloadTooShort {
                expected: 5,
                found: 2
            })
        );
    }

    #[test]
    fn status_flags() {
        assert_eq!(Status::NoFlags.flags(), 0);
        assert_eq!(Status::NewData.flags(), 0x80);
        assert_eq!(Status::DataLost.flags(), 0x100);
        assert!(!Status::NoFlags.is_terminal());
        assert!(Status::DataLost.is_terminal());
    }

    #[test]
    fn resolvers() {
        assert_eq!(FixedLength(3).expected_length(0xFFFF), Some(3));

        let by_fn = |id: u16| if id < 0x10 { Some(id as usize) } else { None };
        assert_eq!(by_fn.expected_length(4), Some(4));
        assert_eq!(by_fn.expected_length(0x20), None);

        let mut table = LengthTable::<2>::new();
        assert!(table.is_empty());
        assert_eq!(table.insert(0x0102, 2), Ok(None));
        assert_eq!(table.insert(0x0102, 3), Ok(Some(2)));
        assert_eq!(table.insert(0x0200, 8), Ok(None));
        assert_eq!(table.insert(0x0300, 1), Err((0x0300, 1)));
        assert_eq!(table.len(), 2);
        assert_eq!(table.expected_length(0x0102), Some(3));
        assert_eq!(table.expected_length(0x0999), None);
    }
}
