use std::io::{Read, Write};

use filterlink_proto::Packet;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::{PacketReader, PacketSender};

/// Opening sequence: optional reset, then optional probe.
///
/// A board that boots while no host is attached waits for a probe before
/// starting its chain; the reset forces it back to that point.
pub fn start<W: Write>(sender: &PacketSender<W>, config: &SessionConfig) -> Result<()> {
    if config.reset_on_open {
        debug!("resetting board");
        sender.reset()?;
    }
    if config.send_probe_on_open {
        debug!("probing board");
        sender.probe()?;
    }
    Ok(())
}

/// Read until the board sends a probe.
///
/// Returns every packet received before it, in order. Packets that fail to
/// decode are logged and skipped; fatal errors end the wait.
pub fn await_probe<R: Read, W: Write>(reader: &mut PacketReader<R, W>) -> Result<Vec<Packet>> {
    let mut before = Vec::new();
    loop {
        match reader.read_packet() {
            Ok(Some(Packet::Probe(_))) => {
                debug!(skipped = before.len(), "board answered probe");
                return Ok(before);
            }
            Ok(Some(packet)) => before.push(packet),
            Ok(None) => {}
            Err(err) if !err.is_fatal() => {
                warn!(error = %err, "ignoring packet while waiting for probe");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use filterlink_frame::{encode_frame, FrameError, FrameReader, FrameWriter, ProtocolRevision};
    use filterlink_proto::{CodecRegistry, DecodeContext, Print};

    use super::*;
    use crate::error::SessionError;

    fn reader(frames: &[(u8, &[u8])]) -> PacketReader<Cursor<Vec<u8>>, Vec<u8>> {
        let mut buf = BytesMut::new();
        for (ty, payload) in frames {
            encode_frame(ProtocolRevision::Current, *ty, payload, &mut buf).unwrap();
        }
        PacketReader::new(
            FrameReader::new(Cursor::new(buf.to_vec())),
            CodecRegistry::standard().unwrap(),
            DecodeContext::default(),
            None,
        )
    }

    #[test]
    fn start_respects_config() {
        let sender = PacketSender::new(FrameWriter::new(Vec::new()));
        let config = SessionConfig {
            send_probe_on_open: false,
            ..SessionConfig::default()
        };
        start(&sender, &config).unwrap();
        assert!(sender.with_writer(|w| w.get_ref().is_empty()));

        let config = SessionConfig {
            reset_on_open: true,
            ..SessionConfig::default()
        };
        start(&sender, &config).unwrap();
        assert_eq!(
            sender.with_writer(|w| w.get_ref().clone()),
            b"MBED\x01\x00\x00MBED\x00\x00\x00".to_vec()
        );
    }

    #[test]
    fn await_probe_collects_earlier_packets() {
        let mut reader = reader(&[
            (2, b"booting".as_slice()),
            (10, [9].as_slice()),
            (77, [].as_slice()),
            (0, [].as_slice()),
            (2, b"after".as_slice()),
        ]);

        let before = await_probe(&mut reader).unwrap();
        assert_eq!(
            before,
            vec![Packet::Print(Print {
                text: "booting".into()
            })]
        );
        assert!(matches!(
            reader.read_packet().unwrap(),
            Some(Packet::Print(p)) if p.text == "after"
        ));
    }

    #[test]
    fn await_probe_stops_at_eof() {
        let mut reader = reader(&[(2, b"no probe".as_slice())]);
        assert!(matches!(
            await_probe(&mut reader),
            Err(SessionError::Frame(FrameError::ConnectionClosed))
        ));
    }
}
