use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use filterlink_frame::{FrameError, FrameReader, FrameWriter};
use filterlink_proto::{
    CodecRegistry, Command, DecodeContext, FilterRegistry, Packet, Probe, Reaction, Reset,
};
use filterlink_transport::LinkStream;
use tracing::{debug, info, warn};

use crate::bridge::ReadBridge;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::handshake;

/// Write half of a session. Cheap to clone; clones share one writer.
///
/// Each packet is written under the lock in a single call, so packets sent
/// from different threads never interleave on the wire.
pub struct PacketSender<W> {
    writer: Arc<Mutex<FrameWriter<W>>>,
}

impl<W> Clone for PacketSender<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<W: Write> PacketSender<W> {
    pub fn new(writer: FrameWriter<W>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Encode and send one packet.
    pub fn send(&self, packet: &Packet) -> Result<()> {
        let (packet_type, payload) = packet.encode()?;
        self.send_raw(packet_type, &payload)?;
        debug!(packet = %packet.packet_type(), size = payload.len(), "sent packet");
        Ok(())
    }

    /// Send an already-encoded payload.
    pub fn send_raw(&self, packet_type: u8, payload: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.send(packet_type, payload)?;
        Ok(())
    }

    pub fn probe(&self) -> Result<()> {
        self.send(&Packet::Probe(Probe))
    }

    pub fn reset(&self) -> Result<()> {
        self.send(&Packet::Reset(Reset))
    }

    /// Send a whitespace-split console command.
    pub fn command(&self, line: &str) -> Result<()> {
        self.send(&Packet::Command(Command::parse(line)))
    }

    /// Run `f` with exclusive access to the underlying writer.
    pub fn with_writer<T>(&self, f: impl FnOnce(&mut FrameWriter<W>) -> T) -> T {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut writer)
    }
}

/// Read half of a session.
///
/// Owns the frame reader, the codec registry and the decode context (and
/// with it the filter cache). Probe replies go out through an attached
/// sender.
pub struct PacketReader<R, W> {
    frames: FrameReader<R>,
    codecs: CodecRegistry,
    ctx: DecodeContext,
    replies: Option<PacketSender<W>>,
    resync: bool,
}

impl<R: Read, W: Write> PacketReader<R, W> {
    pub fn new(
        frames: FrameReader<R>,
        codecs: CodecRegistry,
        ctx: DecodeContext,
        replies: Option<PacketSender<W>>,
    ) -> Self {
        Self {
            frames,
            codecs,
            ctx,
            replies,
            resync: false,
        }
    }

    /// Skip to the next magic after a bad one.
    pub fn with_resync(mut self, enabled: bool) -> Self {
        self.resync = enabled;
        self
    }

    /// Read and decode the next packet (blocking).
    ///
    /// - `Ok(Some(packet))`: a packet was decoded.
    /// - `Ok(None)`: a frame was dropped (bad magic or unknown type).
    /// - `Err(e)` with `!e.is_fatal()`: the payload failed to decode.
    /// - any other `Err`: the link is unusable.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        let frame = match self.frames.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::InvalidMagic { found }) => {
                warn!(found = %found.escape_ascii(), "bad frame magic; frame dropped");
                if self.resync {
                    let skipped = self.frames.resynchronize()?;
                    debug!(skipped, "skipped to next frame");
                }
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let packet_type = frame.packet_type;
        debug!(packet_type, size = frame.payload.len(), "received frame");

        let packet = match self
            .codecs
            .dispatch(packet_type, &frame.payload, &self.ctx)
        {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(None),
            Err(source) => {
                warn!(
                    packet_type,
                    payload = %hex::encode(&frame.payload),
                    error = %source,
                    "failed to decode packet"
                );
                return Err(SessionError::Decode {
                    packet_type,
                    source,
                });
            }
        };

        if let Reaction::Reply(reply) = packet.on_receive() {
            if let Some(sender) = &self.replies {
                sender.send(&reply)?;
            }
        }

        Ok(Some(packet))
    }

    /// Filter cache written by filter list packets.
    pub fn filters(&self) -> &FilterRegistry {
        &self.ctx.filters
    }

    pub fn context(&self) -> &DecodeContext {
        &self.ctx
    }

    /// Borrow the frame reader.
    pub fn frames(&mut self) -> &mut FrameReader<R> {
        &mut self.frames
    }
}

/// An open connection to the board.
pub struct Session<R = LinkStream, W = LinkStream> {
    reader: PacketReader<R, W>,
    sender: PacketSender<W>,
    config: SessionConfig,
}

impl Session {
    /// Open a session over a connected link.
    ///
    /// The link is cloned so reads and writes use separate handles.
    pub fn open(stream: LinkStream, config: SessionConfig) -> Result<Self> {
        let read_half = stream.try_clone()?;
        info!(kind = stream.kind(), "opening session");
        Self::from_parts(read_half, stream, config)
    }
}

impl<R: Read, W: Write> Session<R, W> {
    /// Open a session over separate read and write halves with the
    /// standard codecs.
    pub fn from_parts(read: R, write: W, config: SessionConfig) -> Result<Self> {
        let codecs = CodecRegistry::standard().map_err(SessionError::Registry)?;
        Self::with_codecs(read, write, config, codecs)
    }

    /// Open a session with an explicit codec registry.
    pub fn with_codecs(
        read: R,
        write: W,
        config: SessionConfig,
        codecs: CodecRegistry,
    ) -> Result<Self> {
        let frame_config = config.frame_config();
        let sender = PacketSender::new(FrameWriter::with_config(write, frame_config));
        let ctx = DecodeContext::new(config.revision, FilterRegistry::new());
        let replies = config.reply_to_probe.then(|| sender.clone());
        let reader = PacketReader::new(
            FrameReader::with_config(read, frame_config),
            codecs,
            ctx,
            replies,
        )
        .with_resync(config.resync_on_bad_magic);

        handshake::start(&sender, &config)?;
        info!(revision = config.revision.name(), "session open");

        Ok(Self {
            reader,
            sender,
            config,
        })
    }

    /// Read and decode the next packet. See [`PacketReader::read_packet`].
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        self.reader.read_packet()
    }

    pub fn send(&self, packet: &Packet) -> Result<()> {
        self.sender.send(packet)
    }

    /// Another handle to the write half.
    pub fn sender(&self) -> PacketSender<W> {
        self.sender.clone()
    }

    pub fn filters(&self) -> &FilterRegistry {
        self.reader.filters()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn reader_mut(&mut self) -> &mut PacketReader<R, W> {
        &mut self.reader
    }

    /// Split into independently owned halves.
    pub fn into_split(self) -> (PacketReader<R, W>, PacketSender<W>) {
        (self.reader, self.sender)
    }
}

impl<R, W> Session<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    /// Hand the read half to a [`ReadBridge`] for non-blocking reads.
    pub fn into_bridge(self) -> (ReadBridge<R, W>, PacketSender<W>) {
        (ReadBridge::new(self.reader), self.sender)
    }
}
