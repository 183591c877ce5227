/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The identifier bytes did not match the protocol magic.
    #[error("invalid frame magic \"{}\" (expected \"MBED\")", .found.escape_ascii())]
    InvalidMagic { found: [u8; 4] },

    /// The payload does not fit the revision's length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed before any byte of the next frame arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// The link was closed part-way through a frame.
    #[error("connection closed mid-frame ({read} of {expected} bytes)")]
    Truncated { expected: usize, read: usize },
}

impl FrameError {
    /// Whether the link can no longer be used after this error.
    ///
    /// A bad magic only abandons the current frame; everything else means
    /// the stream is gone.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FrameError::InvalidMagic { .. } | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
