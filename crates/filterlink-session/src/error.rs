use filterlink_frame::FrameError;
use filterlink_proto::ProtoError;
use filterlink_transport::TransportError;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A received payload could not be decoded. The link is still usable.
    #[error("failed to decode packet type {packet_type}: {source}")]
    Decode {
        packet_type: u8,
        #[source]
        source: ProtoError,
    },

    /// A packet could not be encoded for sending.
    #[error("failed to encode packet: {0}")]
    Encode(#[from] ProtoError),

    /// The codec registry could not be built.
    #[error("codec registry setup failed: {0}")]
    Registry(#[source] ProtoError),

    /// A background read is already running on this bridge.
    #[error("a read is already in progress")]
    ReadInProgress,

    /// The background read thread could not be started.
    #[error("failed to spawn read thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The background read ended without producing a result.
    #[error("read bridge closed without a result")]
    BridgeClosed,
}

impl SessionError {
    /// Whether the read loop must stop.
    ///
    /// Decode and encode failures only affect one packet.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Transport(_)
            | SessionError::Registry(_)
            | SessionError::Spawn(_)
            | SessionError::BridgeClosed => true,
            SessionError::Frame(err) => err.is_fatal(),
            SessionError::Decode { .. } | SessionError::Encode(_) | SessionError::ReadInProgress => {
                false
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality() {
        assert!(SessionError::Frame(FrameError::ConnectionClosed).is_fatal());
        assert!(!SessionError::Frame(FrameError::InvalidMagic { found: *b"ot: " }).is_fatal());
        assert!(!SessionError::Decode {
            packet_type: 3,
            source: ProtoError::UnknownFormat("x".into()),
        }
        .is_fatal());
        assert!(!SessionError::Encode(ProtoError::TooManyTokens(300)).is_fatal());
        assert!(SessionError::BridgeClosed.is_fatal());
        assert!(!SessionError::ReadInProgress.is_fatal());
        let gone = TransportError::Io(std::io::Error::other("gone"));
        assert!(SessionError::Transport(gone).is_fatal());
    }
}
