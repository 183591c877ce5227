use std::io::{ErrorKind, Read};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::codec::{Frame, FrameConfig, ProtocolRevision};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` stream.
///
/// Reads exactly as many bytes as the header asks for and never reads ahead,
/// so a rejected identifier leaves the rest of the stream untouched.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
    /// Identifier bytes from the last rejected frame, kept for resync.
    rejected: Option<[u8; 4]>,
    /// Set by `resynchronize` once the magic has already been consumed.
    magic_pending: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            rejected: None,
            magic_pending: false,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached between
    /// frames and `Err(FrameError::Truncated)` when it is reached inside one.
    /// On `Err(FrameError::InvalidMagic)` only the identifier was consumed.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let revision = self.config.revision;

        if self.magic_pending {
            self.magic_pending = false;
        } else {
            let mut ident = [0u8; 4];
            self.fill(&mut ident, true)?;
            if ident != revision.magic() {
                self.rejected = Some(ident);
                return Err(FrameError::InvalidMagic { found: ident });
            }
        }
        self.rejected = None;

        let mut packet_type = [0u8; 1];
        self.fill(&mut packet_type, false)?;

        let payload_len = match revision {
            ProtocolRevision::Legacy => {
                let mut len = [0u8; 1];
                self.fill(&mut len, false)?;
                len[0] as usize
            }
            ProtocolRevision::Current => {
                let mut len = [0u8; 2];
                self.fill(&mut len, false)?;
                u16::from_le_bytes(len) as usize
            }
        };

        let payload = if payload_len == 0 {
            Bytes::new()
        } else {
            let mut buf = vec![0u8; payload_len];
            self.fill(&mut buf, false)?;
            Bytes::from(buf)
        };

        trace!(
            packet_type = packet_type[0],
            size = payload_len,
            "read frame"
        );

        Ok(Frame {
            packet_type: packet_type[0],
            payload,
        })
    }

    /// Skip bytes until the protocol magic has been seen.
    ///
    /// Starts from the identifier of the last rejected frame when there is
    /// one. Returns the number of bytes discarded; the following
    /// [`read_frame`](Self::read_frame) continues after the magic.
    pub fn resynchronize(&mut self) -> Result<usize> {
        let magic = self.config.revision.magic();

        let mut window = match self.rejected.take() {
            Some(ident) => ident,
            None => {
                let mut ident = [0u8; 4];
                self.fill(&mut ident, true)?;
                ident
            }
        };

        let mut skipped = 0usize;
        while window != magic {
            let mut next = [0u8; 1];
            self.fill(&mut next, true)?;
            window.rotate_left(1);
            window[3] = next[0];
            skipped += 1;
        }

        debug!(skipped, "resynchronized on frame magic");
        self.magic_pending = true;
        Ok(skipped)
    }

    fn fill(&mut self, buf: &mut [u8], frame_start: bool) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 && frame_start => return Err(FrameError::ConnectionClosed),
                Ok(0) => {
                    return Err(FrameError::Truncated {
                        expected: buf.len(),
                        read: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;

    fn wire(revision: ProtocolRevision, frames: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (packet_type, payload) in frames {
            encode_frame(revision, *packet_type, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn reader(revision: ProtocolRevision, bytes: Vec<u8>) -> FrameReader<Cursor<Vec<u8>>> {
        FrameReader::with_config(Cursor::new(bytes), FrameConfig::new(revision))
    }

    #[test]
    fn read_single_frame() {
        let bytes = wire(ProtocolRevision::Current, &[(2, b"hello".as_slice())]);
        let mut reader = reader(ProtocolRevision::Current, bytes);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.packet_type, 2);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_legacy_frames() {
        let bytes = wire(
            ProtocolRevision::Legacy,
            &[
                (0, b"".as_slice()),
                (2, b"two".as_slice()),
                (10, [1u8, 2].as_slice()),
            ],
        );
        let mut reader = reader(ProtocolRevision::Legacy, bytes);

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.packet_type, f1.payload.as_ref()), (0, b"".as_ref()));
        assert_eq!((f2.packet_type, f2.payload.as_ref()), (2, b"two".as_ref()));
        assert_eq!((f3.packet_type, f3.payload.as_ref()), (10, [1u8, 2].as_ref()));
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 40 * 1024];
        let bytes = wire(ProtocolRevision::Current, &[(3, payload.as_slice())]);
        let mut reader = reader(ProtocolRevision::Current, bytes);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(ProtocolRevision::Current, &[(4, b"slow".as_slice())]);
        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.packet_type, 4);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = reader(ProtocolRevision::Current, Vec::new());
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut bytes = b"MBED\x02\x10\x00".to_vec();
        bytes.extend_from_slice(b"only-part");

        let mut reader = reader(ProtocolRevision::Current, bytes);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 16,
                read: 9
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn connection_closed_inside_identifier() {
        let mut reader = reader(ProtocolRevision::Current, b"MB".to_vec());
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Truncated { expected: 4, read: 2 }));
    }

    #[test]
    fn invalid_magic_consumes_only_identifier() {
        let mut bytes = b"XXXX".to_vec();
        bytes.extend(wire(ProtocolRevision::Current, &[(2, b"ok".as_slice())]));

        let mut reader = reader(ProtocolRevision::Current, bytes);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic { found } if &found == b"XXXX"));
        assert!(!err.is_fatal());
        assert_eq!(reader.get_ref().position(), 4);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[test]
    fn every_wrong_prefix_is_rejected() {
        for prefix in [*b"mbed", *b"DEBM", *b"MBEE", [0, 0, 0, 0], *b"\xffBED"] {
            let mut bytes = prefix.to_vec();
            bytes.extend_from_slice(&[1, 0, 0]);
            let mut reader = reader(ProtocolRevision::Current, bytes);
            assert!(matches!(
                reader.read_frame(),
                Err(FrameError::InvalidMagic { .. })
            ));
            assert_eq!(reader.get_ref().position(), 4);
        }
    }

    #[test]
    fn resynchronize_after_garbage() {
        // Board printed raw text before the host attached.
        let mut bytes = b"ot: 12\r\nMBED".to_vec();
        bytes.extend_from_slice(&[2, 2, 0]);
        bytes.extend_from_slice(b"hi");

        let mut reader = reader(ProtocolRevision::Current, bytes);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::InvalidMagic { .. })
        ));

        let skipped = reader.resynchronize().unwrap();
        assert_eq!(skipped, 8);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.packet_type, 2);
        assert_eq!(frame.payload.as_ref(), b"hi");
    }

    #[test]
    fn resynchronize_on_aligned_stream_skips_nothing() {
        let bytes = wire(ProtocolRevision::Legacy, &[(2, b"x".as_slice())]);
        let mut reader = reader(ProtocolRevision::Legacy, bytes);

        assert_eq!(reader.resynchronize().unwrap(), 0);
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"x");
    }

    #[test]
    fn resynchronize_hits_eof() {
        let mut reader = reader(ProtocolRevision::Current, b"garbage".to_vec());
        assert!(matches!(
            reader.resynchronize(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(ProtocolRevision::Current, &[(8, b"ok".as_slice())]);
        let mut framed = FrameReader::new(InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(bytes),
        });

        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.packet_type, 8);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn io_error_propagates() {
        let mut framed = FrameReader::new(BrokenReader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_link_pair() {
        let (host, board) = filterlink_transport::LinkStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(board);
        let mut reader = FrameReader::new(host);

        writer.send(2, b"Initialised USB console\r\n").unwrap();
        writer.send(0, &[]).unwrap();

        let print = reader.read_frame().unwrap();
        assert_eq!(print.packet_type, 2);
        let probe = reader.read_frame().unwrap();
        assert_eq!(probe, Frame::empty(0));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = reader(ProtocolRevision::Legacy, Vec::new());
        assert_eq!(reader.config().revision, ProtocolRevision::Legacy);
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }
}
