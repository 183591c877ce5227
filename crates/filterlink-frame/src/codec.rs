use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Magic bytes: "MBED", i.e. `'M' | 'B' << 8 | 'E' << 16 | 'D' << 24` packed
/// little-endian.
pub const MAGIC: [u8; 4] = *b"MBED";

const MAGIC_SIZE: usize = 4;
const TYPE_SIZE: usize = 1;

/// Wire format revision, chosen when a session is constructed.
///
/// Firmware widened the length field once payloads (the filter list in
/// particular) outgrew 255 bytes. The same firmware change started rejecting
/// parameter descriptors without offset/format attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolRevision {
    /// 8-bit payload length.
    Legacy,
    /// 16-bit little-endian payload length.
    #[default]
    Current,
}

impl ProtocolRevision {
    /// Identifier bytes that open every frame.
    pub const fn magic(self) -> [u8; 4] {
        MAGIC
    }

    /// Width of the length field in bytes.
    pub const fn length_width(self) -> usize {
        match self {
            ProtocolRevision::Legacy => 1,
            ProtocolRevision::Current => 2,
        }
    }

    /// Total header size: magic + type + length.
    pub const fn header_size(self) -> usize {
        MAGIC_SIZE + TYPE_SIZE + self.length_width()
    }

    /// Largest payload the length field can describe.
    pub const fn max_payload(self) -> usize {
        match self {
            ProtocolRevision::Legacy => u8::MAX as usize,
            ProtocolRevision::Current => u16::MAX as usize,
        }
    }

    /// Whether parameter descriptors must carry both `o` and `f` attributes.
    pub const fn enforces_param_descriptors(self) -> bool {
        matches!(self, ProtocolRevision::Current)
    }

    /// Short lowercase name for logs and CLI output.
    pub const fn name(self) -> &'static str {
        match self {
            ProtocolRevision::Legacy => "legacy",
            ProtocolRevision::Current => "current",
        }
    }
}

/// One framed packet: type tag plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Numeric packet type.
    pub packet_type: u8,
    /// Raw payload bytes; empty when the header length is zero.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(packet_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }

    /// A frame with no payload.
    pub fn empty(packet_type: u8) -> Self {
        Self::new(packet_type, Bytes::new())
    }

    /// The total wire size of this frame under `revision`.
    pub fn wire_size(&self, revision: ProtocolRevision) -> usize {
        revision.header_size() + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (current revision):
/// ```text
/// ┌──────────────┬──────────┬──────────────┬─────────────────┐
/// │ Magic (4B)   │ Type     │ Length       │ Payload         │
/// │ "MBED"       │ (1B)     │ (2B LE)      │ (Length bytes)  │
/// └──────────────┴──────────┴──────────────┴─────────────────┘
/// ```
/// Legacy firmware uses a 1-byte length.
pub fn encode_frame(
    revision: ProtocolRevision,
    packet_type: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let max = revision.max_payload();
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }

    dst.reserve(revision.header_size() + payload.len());
    dst.put_slice(&revision.magic());
    dst.put_u8(packet_type);
    match revision {
        ProtocolRevision::Legacy => dst.put_u8(payload.len() as u8),
        ProtocolRevision::Current => dst.put_u16_le(payload.len() as u16),
    }
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. On a bad magic only
/// the four identifier bytes are consumed, same as the stream reader.
pub fn decode_frame(revision: ProtocolRevision, src: &mut BytesMut) -> Result<Option<Frame>> {
    if src.len() < MAGIC_SIZE {
        return Ok(None);
    }

    if src[..MAGIC_SIZE] != revision.magic() {
        let mut found = [0u8; MAGIC_SIZE];
        src.copy_to_slice(&mut found);
        return Err(FrameError::InvalidMagic { found });
    }

    let header_size = revision.header_size();
    if src.len() < header_size {
        return Ok(None);
    }

    let packet_type = src[MAGIC_SIZE];
    let payload_len = declared_payload_len(revision, src);

    if src.len() < header_size + payload_len {
        return Ok(None);
    }

    src.advance(header_size);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        packet_type,
        payload,
    }))
}

/// Payload length field of a buffered header.
///
/// `header` must hold at least `revision.header_size()` bytes.
pub(crate) fn declared_payload_len(revision: ProtocolRevision, header: &[u8]) -> usize {
    let at = MAGIC_SIZE + TYPE_SIZE;
    match revision {
        ProtocolRevision::Legacy => header[at] as usize,
        ProtocolRevision::Current => u16::from_le_bytes([header[at], header[at + 1]]) as usize,
    }
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameConfig {
    /// Wire format revision. Default: [`ProtocolRevision::Current`].
    pub revision: ProtocolRevision,
}

impl FrameConfig {
    /// Configuration for a specific revision.
    pub fn new(revision: ProtocolRevision) -> Self {
        Self { revision }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_layout() {
        assert_eq!(ProtocolRevision::Legacy.header_size(), 6);
        assert_eq!(ProtocolRevision::Current.header_size(), 7);
        assert_eq!(ProtocolRevision::Legacy.max_payload(), 255);
        assert_eq!(ProtocolRevision::Current.max_payload(), 65535);
        assert!(!ProtocolRevision::Legacy.enforces_param_descriptors());
        assert!(ProtocolRevision::Current.enforces_param_descriptors());
        assert_eq!(ProtocolRevision::default(), ProtocolRevision::Current);
    }

    #[test]
    fn magic_is_little_endian_mbed() {
        let packed = u32::from(b'M')
            | u32::from(b'B') << 8
            | u32::from(b'E') << 16
            | u32::from(b'D') << 24;
        assert_eq!(packed.to_le_bytes(), MAGIC);
    }

    #[test]
    fn empty_payload_legacy_header() {
        let mut buf = BytesMut::new();
        encode_frame(ProtocolRevision::Legacy, 1, &[], &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"MBED\x01\x00");
    }

    #[test]
    fn empty_payload_current_header() {
        let mut buf = BytesMut::new();
        encode_frame(ProtocolRevision::Current, 1, &[], &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"MBED\x01\x00\x00");
    }

    #[test]
    fn current_length_is_little_endian() {
        let payload = vec![0x5A; 0x0102];
        let mut buf = BytesMut::new();
        encode_frame(ProtocolRevision::Current, 3, &payload, &mut buf).unwrap();
        assert_eq!(&buf[4..7], &[3, 0x02, 0x01]);
        assert_eq!(buf.len(), 7 + 0x0102);
    }

    #[test]
    fn encode_decode_both_revisions() {
        for revision in [ProtocolRevision::Legacy, ProtocolRevision::Current] {
            let mut buf = BytesMut::new();
            encode_frame(revision, 2, b"hello board", &mut buf).unwrap();
            assert_eq!(buf.len(), revision.header_size() + 11);

            let frame = decode_frame(revision, &mut buf).unwrap().unwrap();
            assert_eq!(frame.packet_type, 2);
            assert_eq!(frame.payload.as_ref(), b"hello board");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn legacy_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        let err = encode_frame(ProtocolRevision::Legacy, 3, &[0u8; 256], &mut buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooLarge { size: 256, max: 255 }
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_header() {
        let mut buf = BytesMut::from(&b"MBED\x02"[..]);
        assert!(decode_frame(ProtocolRevision::Current, &mut buf)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(ProtocolRevision::Current, 2, b"hello", &mut buf).unwrap();
        buf.truncate(9);
        assert!(decode_frame(ProtocolRevision::Current, &mut buf)
            .unwrap()
            .is_none());
    }

    #[test]
    fn decode_invalid_magic_consumes_only_identifier() {
        let mut buf = BytesMut::from(&b"MBEX\x02\x00\x00rest"[..]);
        let err = decode_frame(ProtocolRevision::Current, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic { found } if &found == b"MBEX"));
        assert_eq!(buf.as_ref(), b"\x02\x00\x00rest");
    }

    #[test]
    fn decode_multiple_frames() {
        let rev = ProtocolRevision::Legacy;
        let mut buf = BytesMut::new();
        encode_frame(rev, 0, &[], &mut buf).unwrap();
        encode_frame(rev, 2, b"second", &mut buf).unwrap();

        let f1 = decode_frame(rev, &mut buf).unwrap().unwrap();
        assert_eq!(f1, Frame::empty(0));
        let f2 = decode_frame(rev, &mut buf).unwrap().unwrap();
        assert_eq!(f2.packet_type, 2);
        assert_eq!(f2.payload.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_wire_size() {
        let frame = Frame::new(7, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(ProtocolRevision::Legacy), 10);
        assert_eq!(frame.wire_size(ProtocolRevision::Current), 11);
    }
}
