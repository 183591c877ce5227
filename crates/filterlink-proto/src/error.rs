use crate::format::ParamFormat;
use crate::packet_type::PacketType;

/// Errors raised while decoding or encoding packet payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// The payload ended before a field could be read.
    #[error("{what}: needed {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// A fixed-shape payload had the wrong size.
    #[error("{packet} payload must be {expected} bytes, got {actual}")]
    UnexpectedLength {
        packet: PacketType,
        expected: usize,
        actual: usize,
    },

    /// A string field ran to the end of the payload without a NUL byte.
    #[error("{what}: missing NUL terminator")]
    MissingTerminator { what: &'static str },

    /// A string field was not valid UTF-8.
    #[error("{what}: invalid string")]
    InvalidString {
        what: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },

    /// A parameter attribute was not a `key=value` pair.
    #[error("parameter \"{param}\": malformed attribute \"{attribute}\"")]
    MalformedAttribute { param: String, attribute: String },

    /// A parameter descriptor lacks a required attribute.
    #[error("parameter \"{param}\": missing attribute '{key}'")]
    MissingAttribute { param: String, key: &'static str },

    /// A filter list entry failed to parse.
    #[error("filter #{index}: {source}")]
    FilterEntry {
        index: usize,
        #[source]
        source: Box<ProtoError>,
    },

    /// A format attribute was not one of the known codes.
    #[error("unknown parameter format \"{0}\"")]
    UnknownFormat(String),

    /// A value cannot be represented by the target format.
    #[error("value {value} out of range for format '{}'", .format.code())]
    ValueOutOfRange { value: f64, format: ParamFormat },

    /// The chain blob did not start with the store signature.
    #[error("bad chain store signature \"{}\"", .found.escape_ascii())]
    BadSignature { found: [u8; 4] },

    /// The chain blob version is not supported.
    #[error("unsupported chain store version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    /// A branch referenced a filter that is not in the cached list.
    #[error("filter index {index} out of range ({count} filters cached)")]
    FilterIndexOutOfRange { index: u8, count: usize },

    /// No parameter of the referenced filter lives at this offset.
    #[error("filter \"{filter}\": no parameter at offset {offset}")]
    UnresolvedOffset { filter: String, offset: u8 },

    /// More than one parameter of the referenced filter claims this offset.
    #[error("filter \"{filter}\": offset {offset} matches more than one parameter")]
    AmbiguousOffset { filter: String, offset: u8 },

    /// A stored value's size disagrees with its parameter's format.
    #[error("parameter \"{param}\": stored size {actual}, format needs {expected}")]
    ParamSizeMismatch {
        param: String,
        expected: usize,
        actual: u8,
    },

    /// A count does not fit its one-byte wire field.
    #[error("too many {what} ({count}, max 255)")]
    CountOverflow { what: &'static str, count: usize },

    /// A command line split into more tokens than the count byte allows.
    #[error("command has {0} tokens (max 255)")]
    TooManyTokens(usize),

    /// The packet type is only ever sent by the host.
    #[error("{0} packets cannot be decoded")]
    EncodeOnly(PacketType),

    /// No codec exists for a packet type.
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    /// A codec is already registered for this packet type.
    #[error("codec for packet type {0} already registered")]
    DuplicateCodec(u8),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
