//! Host-side link to the HAPR filter board.
//!
//! The board runs an audio filter chain and talks to the host over a USB
//! serial link using small framed packets. This crate re-exports the layers:
//!
//! - [`transport`]: opening the device node (or a Unix socket simulator)
//! - [`frame`]: `MBED`-magic framing for both wire revisions
//! - [`proto`]: typed packets, the parameter descriptor language and chain
//!   blobs
//! - [`session`]: probe handshake, packet I/O and the non-blocking read
//!   bridge (behind the `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use filterlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use filterlink_frame::*;
}

/// Re-export packet types.
pub mod proto {
    pub use filterlink_proto::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use filterlink_session::*;
}
