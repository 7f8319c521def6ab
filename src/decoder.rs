use core::{convert::Infallible, fmt};

use embedded_hal_nb::serial::Read;
use log::{debug, trace, warn};

use crate::{
    checksum::RunningCrc,
    message::{LengthResolver, Message, SYNC_BYTE, Status},
};

/// Where the decoder is inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    WaitSync1,
    WaitSync2,
    ReadId,
    ReadPayload,
    ReadCrc,
}

impl State {
    /// Past the sync pair and not yet finished.
    pub fn in_frame(&self) -> bool {
        matches!(self, State::ReadId | State::ReadPayload | State::ReadCrc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderConfig {
    /// Ticks a frame may sit half read before it is dropped. `None` never
    /// drops it, which leaves a frame that lost a byte waiting for bytes of the
    /// next one.
    pub max_idle_ticks: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError<E> {
    /// Watchdog expired while a frame was open.
    Truncated { state: State },
    /// No length is known for this id, so the payload cannot be delimited.
    UnknownId { id: u16 },
    /// The agreed length does not fit the receive buffer.
    PayloadTooLarge {
        id: u16,
        expected: usize,
        capacity: usize,
    },
    Read(E),
}

impl DecodeError<Infallible> {
    fn widen<E>(self) -> DecodeError<E> {
        match self {
            DecodeError::Truncated { state } => DecodeError::Truncated { state },
            DecodeError::UnknownId { id } => DecodeError::UnknownId { id },
            DecodeError::PayloadTooLarge {
                id,
                expected,
                capacity,
            } => DecodeError::PayloadTooLarge {
                id,
                expected,
                capacity,
            },
            DecodeError::Read(never) => match never {},
        }
    }
}

impl<E: fmt::Debug> fmt::Display for DecodeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { state } => write!(f, "frame stalled in {state:?}"),
            DecodeError::UnknownId { id } => write!(f, "no payload length known for id {id:#06x}"),
            DecodeError::PayloadTooLarge {
                id,
                expected,
                capacity,
            } => write!(
                f,
                "id {id:#06x} carries {expected} bytes, receive buffer holds {capacity}"
            ),
            DecodeError::Read(e) => write!(f, "transport read failed: {e:?}"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for DecodeError<E> {}

/// A frame that made it to its CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub id: u16,
    pub status: Status,
    /// CRC computed over the id and payload as they arrived.
    pub computed: u16,
    /// CRC carried by the frame.
    pub found: u16,
    /// CRC over every byte of the frame, sync and trailer included.
    pub stream_crc: u16,
}

/// Resumable receive session for one channel.
///
/// Bytes can arrive in any fragmentation. The caller hands in the same
/// [`Message`] until a frame completes; the decoder writes the id, the
/// expected length, the payload and finally the status into it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decoder {
    config: DecoderConfig,
    state: State,
    /// Partial id or crc, big endian.
    field: u16,
    field_len: u8,
    cursor: usize,
    crc: RunningCrc,
    stream: RunningCrc,
    idle: u32,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Decoder {
        Decoder {
            config,
            ..Decoder::default()
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Drop any partial frame and hunt for sync again.
    pub fn reset(&mut self) {
        *self = Decoder::new(self.config);
    }

    /// Pull bytes from `rx` until a frame completes or `rx` runs dry.
    ///
    /// `WouldBlock` means nothing more is available right now; calling again
    /// with no new bytes changes nothing. Bytes after a completed frame are
    /// left in `rx` for the next call.
    pub fn poll<Rx, B, L>(
        &mut self,
        rx: &mut Rx,
        msg: &mut Message<B>,
        lengths: &L,
    ) -> nb::Result<Received, DecodeError<Rx::Error>>
    where
        Rx: Read,
        B: AsRef<[u8]> + AsMut<[u8]>,
        L: LengthResolver,
    {
        loop {
            let byte = rx
                .read()
                .map_err(|e| e.map(DecodeError::Read))?;
            match self.push(byte, msg, lengths) {
                Ok(Some(received)) => return Ok(received),
                Ok(None) => {}
                Err(e) => return Err(nb::Error::Other(e.widen())),
            }
        }
    }

    /// Run `bytes` through the decoder, stopping after the first frame that
    /// completes or aborts. Returns how many bytes were consumed with it.
    pub fn feed<B, L>(
        &mut self,
        bytes: &[u8],
        msg: &mut Message<B>,
        lengths: &L,
    ) -> (usize, Option<Result<Received, DecodeError<Infallible>>>)
    where
        B: AsRef<[u8]> + AsMut<[u8]>,
        L: LengthResolver,
    {
        for (i, b) in bytes.iter().enumerate() {
            match self.push(*b, msg, lengths) {
                Ok(None) => {}
                Ok(Some(received)) => return (i + 1, Some(Ok(received))),
                Err(e) => return (i + 1, Some(Err(e))),
            }
        }
        (bytes.len(), None)
    }

    /// Advance the state machine by one byte.
    pub fn push<B, L>(
        &mut self,
        byte: u8,
        msg: &mut Message<B>,
        lengths: &L,
    ) -> Result<Option<Received>, DecodeError<Infallible>>
    where
        B: AsRef<[u8]> + AsMut<[u8]>,
        L: LengthResolver,
    {
        self.idle = 0;
        match self.state {
            State::WaitSync1 => self.wait_sync1(byte),
            State::WaitSync2 => {
                if byte == SYNC_BYTE {
                    self.start_frame(msg);
                } else {
                    // Could be the first half of a real sync pair
                    self.state = State::WaitSync1;
                    self.wait_sync1(byte);
                }
            }
            State::ReadId => {
                self.fold(byte);
                if let Some(id) = self.take_field(byte) {
                    return self.id_read(id, msg, lengths);
                }
            }
            State::ReadPayload => {
                let capacity = msg.capacity();
                let Some(slot) = msg.payload.as_mut().get_mut(self.cursor) else {
                    // Buffer shrank under an open frame
                    let (id, expected) = (msg.id, msg.expected_length);
                    self.reset();
                    return Err(DecodeError::PayloadTooLarge {
                        id,
                        expected,
                        capacity,
                    });
                };
                *slot = byte;
                self.fold(byte);
                self.cursor += 1;
                if self.cursor == msg.expected_length {
                    self.enter(State::ReadCrc);
                }
            }
            State::ReadCrc => {
                self.stream = self.stream.update(byte);
                if let Some(found) = self.take_field(byte) {
                    return Ok(Some(self.finish(found, msg)));
                }
            }
        }
        Ok(None)
    }

    /// One unit of time passed. Drops a frame that has waited too long for
    /// its next byte.
    pub fn tick(&mut self) -> Result<(), DecodeError<Infallible>> {
        let Some(limit) = self.config.max_idle_ticks else {
            return Ok(());
        };
        if !self.state.in_frame() {
            return Ok(());
        }
        self.idle += 1;
        if self.idle < limit {
            return Ok(());
        }
        let state = self.state;
        warn!("frame stalled in {state:?} for {} ticks, resyncing", self.idle);
        self.reset();
        Err(DecodeError::Truncated { state })
    }

    fn wait_sync1(&mut self, byte: u8) {
        if byte == SYNC_BYTE {
            self.state = State::WaitSync2;
        } else {
            trace!("discarding {byte:#04x} while hunting for sync");
        }
    }

    fn start_frame<B>(&mut self, msg: &mut Message<B>) {
        msg.status = Status::NoFlags;
        self.crc = RunningCrc::new();
        self.stream = RunningCrc::new().update(SYNC_BYTE).update(SYNC_BYTE);
        self.enter(State::ReadId);
    }

    fn enter(&mut self, state: State) {
        trace!("{:?} -> {state:?}", self.state);
        self.state = state;
        self.field = 0;
        self.field_len = 0;
        self.cursor = 0;
    }

    fn fold(&mut self, byte: u8) {
        self.crc = self.crc.update(byte);
        self.stream = self.stream.update(byte);
    }

    /// Shift a byte into the two byte field, handing it back once complete.
    fn take_field(&mut self, byte: u8) -> Option<u16> {
        self.field = (self.field << 8) | byte as u16;
        self.field_len += 1;
        (self.field_len == 2).then_some(self.field)
    }

    fn id_read<B, L>(
        &mut self,
        id: u16,
        msg: &mut Message<B>,
        lengths: &L,
    ) -> Result<Option<Received>, DecodeError<Infallible>>
    where
        B: AsRef<[u8]>,
        L: LengthResolver,
    {
        msg.id = id;
        let Some(expected) = lengths.expected_length(id) else {
            warn!("no length known for id {id:#06x}, dropping frame");
            self.reset();
            return Err(DecodeError::UnknownId { id });
        };
        let capacity = msg.capacity();
        if expected > capacity {
            warn!("id {id:#06x} needs {expected} bytes, buffer holds {capacity}, dropping frame");
            self.reset();
            return Err(DecodeError::PayloadTooLarge {
                id,
                expected,
                capacity,
            });
        }
        msg.expected_length = expected;
        if expected == 0 {
            self.enter(State::ReadCrc);
        } else {
            self.enter(State::ReadPayload);
        }
        Ok(None)
    }

    fn finish<B>(&mut self, found: u16, msg: &mut Message<B>) -> Received {
        let computed = self.crc.value();
        let status = if computed == found {
            debug!("frame id={:#06x} len={} ok", msg.id, msg.expected_length);
            Status::NewData
        } else {
            warn!(
                "frame id={:#06x} crc mismatch: computed {computed:#06x}, found {found:#06x}",
                msg.id
            );
            Status::DataLost
        };
        msg.status = status;
        let received = Received {
            id: msg.id,
            status,
            computed,
            found,
            stream_crc: self.stream.value(),
        };
        self.reset();
        received
    }
}
