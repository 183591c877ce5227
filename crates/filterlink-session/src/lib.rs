//! Sessions with a filter board.
//!
//! A [`Session`] wraps one link: it runs the opening handshake, decodes
//! incoming frames into [`Packet`](filterlink_proto::Packet)s, answers probes
//! and keeps the filter cache that chain blobs are decoded against.
//!
//! ```no_run
//! use filterlink_session::{ReadPoll, Session, SessionConfig};
//! use filterlink_transport::SerialDevice;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let link = SerialDevice::open("/dev/ttyACM0")?;
//! let session = Session::open(link, SessionConfig::default())?;
//! let (bridge, sender) = session.into_bridge();
//!
//! sender.command("chain list")?;
//! let mut pending = bridge.begin_read()?;
//! loop {
//!     if let ReadPoll::Ready(result) = pending.poll() {
//!         println!("{:?}", result?);
//!         pending = bridge.begin_read()?;
//!     }
//!     // other work
//! }
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod handshake;
pub mod session;

pub use bridge::{ReadBridge, ReadHandle, ReadPoll};
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use handshake::await_probe;
pub use session::{PacketReader, PacketSender, Session};
