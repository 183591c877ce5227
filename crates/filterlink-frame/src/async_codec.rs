//! `tokio_util` codec over the same wire format, for hosts that drive the
//! link from an async runtime instead of the blocking reader.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{declared_payload_len, decode_frame, encode_frame, Frame, ProtocolRevision};
use crate::error::FrameError;

/// Frame codec for `FramedRead`/`FramedWrite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkCodec {
    revision: ProtocolRevision,
}

impl LinkCodec {
    /// Codec for the given wire revision.
    pub fn new(revision: ProtocolRevision) -> Self {
        Self { revision }
    }

    /// Wire revision in use.
    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }
}

impl Decoder for LinkCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        decode_frame(self.revision, src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let header_size = self.revision.header_size();
                let expected = if src.len() < header_size {
                    header_size
                } else {
                    header_size + declared_payload_len(self.revision, src)
                };
                Err(FrameError::Truncated {
                    expected,
                    read: src.len(),
                })
            }
        }
    }
}

impl Encoder<Frame> for LinkCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(self.revision, frame.packet_type, &frame.payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_read_yields_frames() {
        let mut wire = BytesMut::new();
        encode_frame(ProtocolRevision::Legacy, 2, b"hello", &mut wire).unwrap();
        encode_frame(ProtocolRevision::Legacy, 10, &[0x34, 0x12], &mut wire).unwrap();
        let bytes = wire.to_vec();

        let mut framed = FramedRead::new(
            bytes.as_slice(),
            LinkCodec::new(ProtocolRevision::Legacy),
        );

        let first = framed.next().await.unwrap().unwrap();
        assert_eq!(first.packet_type, 2);
        assert_eq!(first.payload.as_ref(), b"hello");

        let second = framed.next().await.unwrap().unwrap();
        assert_eq!(second.packet_type, 10);

        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_read_reports_truncated_tail() {
        let bytes = b"MBED\x02\x05\x00he".to_vec();
        let mut framed = FramedRead::new(bytes.as_slice(), LinkCodec::default());

        let err = framed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));
    }

    #[tokio::test]
    async fn framed_write_encodes() {
        let mut out = Vec::new();
        {
            let mut framed = FramedWrite::new(&mut out, LinkCodec::default());
            framed.send(Frame::empty(1)).await.unwrap();
        }
        assert_eq!(out, b"MBED\x01\x00\x00");
    }
}
