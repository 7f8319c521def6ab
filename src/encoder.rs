use core::fmt;

use embedded_hal_nb::serial::Write;
use log::{debug, warn};

use crate::{
    checksum::RunningCrc,
    message::{Message, MessageError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderConfig {
    /// How many extra times a declined byte is offered again before the
    /// frame is abandoned. 0 gives up on the first `WouldBlock`.
    pub write_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError<E> {
    /// The transport stopped taking bytes. `written` bytes of the frame already
    /// went out, so the peer sees a truncated frame and has to resync.
    TransportBusy { written: usize },
    Message(MessageError),
    Write(E),
}

impl<E> From<MessageError> for EncodeError<E> {
    fn from(value: MessageError) -> Self {
        EncodeError::Message(value)
    }
}

impl<E: fmt::Debug> fmt::Display for EncodeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::TransportBusy { written } => {
                write!(f, "transport busy after {written} bytes of frame")
            }
            EncodeError::Message(e) => write!(f, "{e}"),
            EncodeError::Write(e) => write!(f, "transport write failed: {e:?}"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for EncodeError<E> {}

/// Result of a frame that went out whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    /// CRC placed on the wire, over id and payload.
    pub crc: u16,
    /// CRC over every byte sent, sync and trailer included.
    pub stream_crc: u16,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Encoder {
        Encoder { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Write one whole frame for `msg` to `tx`.
    ///
    /// Nothing is retried across calls: either every byte was accepted, or
    /// the error says how far the frame got.
    pub fn send<Tx, B>(&self, tx: &mut Tx, msg: &Message<B>) -> Result<Sent, EncodeError<Tx::Error>>
    where
        Tx: Write,
        B: AsRef<[u8]>,
    {
        let wire = msg.wire_bytes()?;
        let crc = wire.crc();
        let mut stream = RunningCrc::new();
        let mut written = 0;
        for b in wire {
            self.put(tx, b, written)?;
            stream = stream.update(b);
            written += 1;
        }
        debug!(
            "sent frame id={:#06x} len={} crc={:#06x}",
            msg.id, msg.expected_length, crc
        );
        Ok(Sent {
            crc,
            stream_crc: stream.value(),
            bytes: written,
        })
    }

    fn put<Tx: Write>(&self, tx: &mut Tx, b: u8, written: usize) -> Result<(), EncodeError<Tx::Error>> {
        let mut attempts = 0;
        loop {
            match tx.write(b) {
                Ok(()) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(EncodeError::Write(e)),
                Err(nb::Error::WouldBlock) if attempts < self.config.write_retries => attempts += 1,
                Err(nb::Error::WouldBlock) => {
                    warn!("transport declined byte {written} of frame, abandoning");
                    return Err(EncodeError::TransportBusy { written });
                }
            }
        }
    }
}
