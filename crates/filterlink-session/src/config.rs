use filterlink_frame::{FrameConfig, ProtocolRevision};

/// Session behavior, fixed when the session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wire format revision spoken by the board firmware.
    pub revision: ProtocolRevision,
    /// Send a probe as soon as the session opens. A board already waiting at
    /// boot continues startup when it sees one.
    pub send_probe_on_open: bool,
    /// Reset the board before probing.
    pub reset_on_open: bool,
    /// Answer every received probe with a probe.
    pub reply_to_probe: bool,
    /// After a bad magic, skip input until the next magic before returning.
    pub resync_on_bad_magic: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            revision: ProtocolRevision::default(),
            send_probe_on_open: true,
            reset_on_open: false,
            reply_to_probe: true,
            resync_on_bad_magic: true,
        }
    }
}

impl SessionConfig {
    /// Default behavior for a specific revision.
    pub fn for_revision(revision: ProtocolRevision) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }

    /// Frame layer configuration derived from this session config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig::new(self.revision)
    }
}
