//! Bridges `embedded-io` devices onto the byte-at-a-time, non-blocking
//! `embedded-hal-nb` serial traits the codec runs on.

use embedded_hal_nb::serial::{self, ErrorKind};
use embedded_io::{ReadReady, WriteReady};

/// Wraps an `embedded-io` error so it can stand in as a serial error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorShim<T: embedded_io::Error>(pub T);

impl<T: embedded_io::Error> serial::Error for ErrorShim<T> {
    fn kind(&self) -> ErrorKind {
        use embedded_io::ErrorKind::*;
        match self.0.kind() {
            OutOfMemory => ErrorKind::Overrun,
            InvalidData => ErrorKind::FrameFormat,
            _ => ErrorKind::Other,
        }
    }
}

impl<T: embedded_io::Error> From<T> for ErrorShim<T> {
    fn from(value: T) -> Self {
        ErrorShim(value)
    }
}

/// Non-blocking serial view of an `embedded-io` device. Readiness is checked
/// before every byte, so neither direction ever waits on the device.
#[derive(Debug)]
pub struct IoSerial<T> {
    inner: T,
}

impl<T> IoSerial<T> {
    pub fn new(inner: T) -> IoSerial<T> {
        IoSerial { inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: embedded_io::ErrorType> serial::ErrorType for IoSerial<T> {
    type Error = ErrorShim<T::Error>;
}

impl<T: embedded_io::Read + ReadReady> serial::Read for IoSerial<T> {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        if !self.inner.read_ready().map_err(|e| nb::Error::Other(ErrorShim(e)))? {
            return Err(nb::Error::WouldBlock);
        }
        let mut b = [0; 1];
        match self.inner.read(&mut b) {
            Ok(1) => Ok(b[0]),
            // EOF on a serial line just means nothing yet
            Ok(_) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(ErrorShim(e))),
        }
    }
}

impl<T: embedded_io::Write + WriteReady> serial::Write for IoSerial<T> {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if !self.inner.write_ready().map_err(|e| nb::Error::Other(ErrorShim(e)))? {
            return Err(nb::Error::WouldBlock);
        }
        match self.inner.write(&[word]) {
            Ok(1) => Ok(()),
            Ok(_) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(ErrorShim(e))),
        }
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if !self.inner.write_ready().map_err(|e| nb::Error::Other(ErrorShim(e)))? {
            return Err(nb::Error::WouldBlock);
        }
        self.inner.flush().map_err(|e| nb::Error::Other(ErrorShim(e)))
    }
}
