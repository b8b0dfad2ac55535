// src/adapters/mod.rs

use bytes::BytesMut;

use crate::error::AppResult;

// Hardware transport (USB serial to the rig microcontroller)
#[cfg(feature = "instrument_serial")]
pub mod serial;
#[cfg(feature = "instrument_serial")]
pub use serial::{find_rig_ports, SerialTransport};

pub mod mock_adapter;
pub use mock_adapter::MockTransport;

/// Byte transport to the rig.
///
/// Implementations must never block: `bytes_available` reports what is already
/// buffered by the driver and `read_available` consumes at most that much.
pub trait Transport: Send {
    /// Number of bytes that can be read without waiting.
    fn bytes_available(&mut self) -> AppResult<usize>;

    /// Append every byte currently available to `buffer`. Returns the count read.
    fn read_available(&mut self, buffer: &mut BytesMut) -> AppResult<usize>;

    /// Write a complete frame.
    fn write_all(&mut self, frame: &[u8]) -> AppResult<()>;

    /// Drop anything the driver has buffered on the input side.
    fn reset_input_buffer(&mut self) -> AppResult<()>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bytes_available(&mut self) -> AppResult<usize> {
        (**self).bytes_available()
    }

    fn read_available(&mut self, buffer: &mut BytesMut) -> AppResult<usize> {
        (**self).read_available(buffer)
    }

    fn write_all(&mut self, frame: &[u8]) -> AppResult<()> {
        (**self).write_all(frame)
    }

    fn reset_input_buffer(&mut self) -> AppResult<()> {
        (**self).reset_input_buffer()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
