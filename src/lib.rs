//! Point to point message framing over a UART.
//!
//! A frame on the wire is `FF FF <id_hi> <id_lo> <payload..> <crc_hi> <crc_lo>`,
//! with the CRC-16 covering id and payload. There is no length field, both ends
//! know the payload length for each id up front. A payload holding `FF FF` can
//! be mistaken for a frame start by a receiver that is hunting for sync; the
//! format has no escaping to prevent that.
#![cfg_attr(not(test), no_std)]

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod message;
pub mod serial;

#[cfg(test)]
mod mock;

pub trait Encode {
    type Error;

    /// Write into the front of `buffer`, returning how many bytes were used.
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, Self::Error>;
}

pub use checksum::RunningCrc;
pub use decoder::{DecodeError, Decoder, DecoderConfig, Received, State};
pub use encoder::{EncodeError, Encoder, EncoderConfig, Sent};
pub use message::{
    FixedLength, LengthResolver, LengthTable, Message, MessageError, OVERHEAD, SYNC, SYNC_BYTE,
    Status, WireBytes, frame_len,
};
pub use serial::{ErrorShim, IoSerial};
