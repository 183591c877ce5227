//! Duplex byte-stream transport for the filter board link.
//!
//! The board shows up as a serial character device (USB CDC-ACM on Linux,
//! `usbmodem` on macOS). Everything above this layer only needs exact-length
//! reads and whole-buffer writes, so the transport is a thin wrapper that:
//! - opens the device node read/write,
//! - waits for the board's output buffer to settle and flushes stale input,
//! - hands out independent reader/writer handles via [`LinkStream::try_clone`].
//!
//! Device discovery is left to the caller.

pub mod device;
pub mod error;
pub mod stream;

pub use device::{DeviceConfig, SerialDevice};
pub use error::{Result, TransportError};
pub use stream::LinkStream;
