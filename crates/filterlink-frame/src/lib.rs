//! Packet framing for the filter board serial link.
//!
//! Every packet on the wire is framed with:
//! - A 4-byte magic identifier (`"MBED"`) for stream synchronization
//! - A 1-byte packet type
//! - A little-endian payload length, 1 byte wide in legacy firmware and
//!   2 bytes wide in current firmware (see [`ProtocolRevision`])
//!
//! The payload is opaque at this layer; typed decoding lives in
//! `filterlink-proto`.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::LinkCodec;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, ProtocolRevision, MAGIC};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
