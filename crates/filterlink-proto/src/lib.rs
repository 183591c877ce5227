//! Typed packets for the filter board protocol.
//!
//! A [`CodecRegistry`] turns raw frame payloads into [`Packet`] values and
//! back. Most payloads are fixed little-endian structs. Two are not:
//!
//! - the filter list, whose parameter descriptors use a small
//!   `name;key=value|...` language (see [`params`]), and
//! - the chain blob, which can only be decoded against a filter list
//!   received earlier (see [`chain`]).
//!
//! The filter list is kept in a [`FilterRegistry`] carried by the
//! [`DecodeContext`], so each connection has its own cache.

pub mod chain;
pub mod error;
pub mod filters;
pub mod format;
pub mod packet;
pub mod packet_type;
pub mod params;
pub mod registry;
mod wire;

pub use chain::{
    Branch, BranchFlags, ChainBlob, ResolvedParam, Stage, STORE_SIGNATURE, STORE_VERSION,
};
pub use error::{ProtoError, Result};
pub use filters::{FilterDescriptor, FilterRegistry};
pub use format::{ParamFormat, ParamValue};
pub use packet::{
    AnalogControl, Command, DecodeContext, FilterCreate, FilterDelete, FilterFlag, FilterList,
    FilterMix, FilterMod, Packet, Payload, Print, Probe, Reaction, Reset, StoredList,
};
pub use packet_type::{Direction, PacketType};
pub use params::{parse_params, slugify, AttrValue, ParamDescriptor};
pub use registry::{CodecRegistry, PacketCodec, PayloadCodec};
