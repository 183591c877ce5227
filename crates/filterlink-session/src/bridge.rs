//! Non-blocking reads for single-threaded callers.
//!
//! [`ReadBridge::begin_read`] runs one blocking [`PacketReader::read_packet`]
//! on a background thread and returns a [`ReadHandle`] the caller polls from
//! its own loop. Reads run to completion; there is no cancellation.

use std::io::{Read, Write};
use std::sync::mpsc::{sync_channel, Receiver, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use filterlink_proto::{FilterRegistry, Packet};
use tracing::trace;

use crate::error::{Result, SessionError};
use crate::session::PacketReader;

const READ_THREAD_NAME: &str = "filterlink-read";

/// Shares a [`PacketReader`] with background read threads.
///
/// At most one read is outstanding per bridge (clones included), so results
/// arrive in wire order. [`begin_read`](Self::begin_read) fails with
/// [`SessionError::ReadInProgress`] until the running read has finished.
pub struct ReadBridge<R, W> {
    reader: Arc<Mutex<PacketReader<R, W>>>,
    in_flight: Arc<AtomicBool>,
}

impl<R, W> Clone for ReadBridge<R, W> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

/// Clears the in-flight flag when the read thread ends, even by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R, W> ReadBridge<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    pub fn new(reader: PacketReader<R, W>) -> Self {
        Self {
            reader: Arc::new(Mutex::new(reader)),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start reading the next packet in the background.
    pub fn begin_read(&self) -> Result<ReadHandle> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::ReadInProgress);
        }
        let guard = InFlight(Arc::clone(&self.in_flight));

        let (tx, rx) = sync_channel(1);
        let reader = Arc::clone(&self.reader);

        thread::Builder::new()
            .name(READ_THREAD_NAME.to_string())
            .spawn(move || {
                let result = reader
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .read_packet();
                // Cleared before the result is visible to the handle.
                drop(guard);
                // The handle may have been dropped; nobody wants the result.
                let _ = tx.send(result);
            })
            .map_err(SessionError::Spawn)?;

        trace!("background read started");
        Ok(ReadHandle {
            state: HandleState::Waiting(rx),
        })
    }

    /// Filter cache of the shared reader.
    ///
    /// Blocks while a background read holds the reader.
    pub fn filters(&self) -> FilterRegistry {
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .filters()
            .clone()
    }
}

/// Outcome of [`ReadHandle::poll`].
#[derive(Debug)]
pub enum ReadPoll {
    /// No result yet, or the result was already taken.
    Pending,
    /// The background read finished.
    Ready(Result<Option<Packet>>),
}

impl ReadPoll {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReadPoll::Pending)
    }
}

#[derive(Debug)]
enum HandleState {
    Waiting(Receiver<Result<Option<Packet>>>),
    Consumed,
}

/// One in-flight background read.
///
/// Yields its result exactly once; start a new read for the next packet.
#[derive(Debug)]
pub struct ReadHandle {
    state: HandleState,
}

impl ReadHandle {
    /// Check for the result without blocking.
    pub fn poll(&mut self) -> ReadPoll {
        let result = match &self.state {
            HandleState::Consumed => return ReadPoll::Pending,
            HandleState::Waiting(rx) => match rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return ReadPoll::Pending,
                Err(TryRecvError::Disconnected) => Err(SessionError::BridgeClosed),
            },
        };
        self.state = HandleState::Consumed;
        ReadPoll::Ready(result)
    }

    /// Block until the result arrives.
    ///
    /// Returns `None` if the result was already taken.
    pub fn wait(&mut self) -> Option<Result<Option<Packet>>> {
        let result = match &self.state {
            HandleState::Consumed => return None,
            HandleState::Waiting(rx) => rx.recv().unwrap_or(Err(SessionError::BridgeClosed)),
        };
        self.state = HandleState::Consumed;
        Some(result)
    }

    /// Whether the result has been taken.
    pub fn is_consumed(&self) -> bool {
        matches!(self.state, HandleState::Consumed)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    use bytes::BytesMut;
    use filterlink_frame::{encode_frame, FrameError, FrameReader, ProtocolRevision};
    use filterlink_proto::{CodecRegistry, DecodeContext, Print};

    use super::*;

    fn bridge(frames: &[(u8, &[u8])]) -> ReadBridge<Cursor<Vec<u8>>, Vec<u8>> {
        let mut buf = BytesMut::new();
        for (ty, payload) in frames {
            encode_frame(ProtocolRevision::Current, *ty, payload, &mut buf).unwrap();
        }
        ReadBridge::new(PacketReader::new(
            FrameReader::new(Cursor::new(buf.to_vec())),
            CodecRegistry::standard().unwrap(),
            DecodeContext::default(),
            None,
        ))
    }

    fn poll_until_ready(handle: &mut ReadHandle) -> Result<Option<Packet>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match handle.poll() {
                ReadPoll::Ready(result) => return result,
                ReadPoll::Pending => {
                    assert!(Instant::now() < deadline, "read never completed");
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    #[test]
    fn result_delivered_once() {
        let bridge = bridge(&[(2, b"hello".as_slice())]);
        let mut handle = bridge.begin_read().unwrap();

        let packet = poll_until_ready(&mut handle).unwrap();
        assert_eq!(
            packet,
            Some(Packet::Print(Print {
                text: "hello".into()
            }))
        );
        assert!(handle.is_consumed());
        for _ in 0..3 {
            assert!(handle.poll().is_pending());
        }
        assert!(handle.wait().is_none());
    }

    #[test]
    fn sequential_reads_keep_order() {
        let bridge = bridge(&[
            (2, b"one".as_slice()),
            (2, b"two".as_slice()),
            (2, b"three".as_slice()),
        ]);

        let mut texts = Vec::new();
        for _ in 0..3 {
            let mut handle = bridge.begin_read().unwrap();
            match poll_until_ready(&mut handle).unwrap() {
                Some(Packet::Print(p)) => texts.push(p.text),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn wait_blocks_for_result() {
        let bridge = bridge(&[(10, [0x34, 0x12].as_slice())]);
        let mut handle = bridge.begin_read().unwrap();
        match handle.wait() {
            Some(Ok(Some(Packet::AnalogControl(a)))) => assert_eq!(a.value, 0x1234),
            other => panic!("unexpected {other:?}"),
        }
        assert!(handle.poll().is_pending());
    }

    #[test]
    fn errors_pass_through() {
        let bridge = bridge(&[]);
        let mut handle = bridge.begin_read().unwrap();
        assert!(matches!(
            poll_until_ready(&mut handle),
            Err(SessionError::Frame(FrameError::ConnectionClosed))
        ));
    }

    #[test]
    fn filters_visible_through_bridge() {
        let bridge = bridge(&[(3, b"\x01Gain\0Level;o=0;f=f\0".as_slice())]);
        let mut handle = bridge.begin_read().unwrap();
        poll_until_ready(&mut handle).unwrap();

        let filters = bridge.filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters.get(0).unwrap().slug, "gain");
    }

    #[test]
    fn dropped_sender_reports_closed() {
        let (tx, rx) = sync_channel::<Result<Option<Packet>>>(1);
        drop(tx);
        let mut handle = ReadHandle {
            state: HandleState::Waiting(rx),
        };
        assert!(matches!(
            handle.poll(),
            ReadPoll::Ready(Err(SessionError::BridgeClosed))
        ));
        assert!(handle.poll().is_pending());
    }

    #[cfg(unix)]
    #[test]
    fn pending_until_board_writes() {
        use filterlink_frame::FrameWriter;
        use filterlink_transport::LinkStream;

        let (host, board) = LinkStream::pair().unwrap();
        let bridge: ReadBridge<LinkStream, LinkStream> = ReadBridge::new(PacketReader::new(
            FrameReader::new(host),
            CodecRegistry::standard().unwrap(),
            DecodeContext::default(),
            None,
        ));

        let mut handle = bridge.begin_read().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(handle.poll().is_pending());

        FrameWriter::new(board).send(2, b"late").unwrap();
        assert!(matches!(
            poll_until_ready(&mut handle),
            Ok(Some(Packet::Print(p))) if p.text == "late"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn one_read_in_flight() {
        use filterlink_frame::FrameWriter;
        use filterlink_transport::LinkStream;

        let (host, board) = LinkStream::pair().unwrap();
        let bridge: ReadBridge<LinkStream, LinkStream> = ReadBridge::new(PacketReader::new(
            FrameReader::new(host),
            CodecRegistry::standard().unwrap(),
            DecodeContext::default(),
            None,
        ));
        let other = bridge.clone();

        let mut first = bridge.begin_read().unwrap();
        assert!(matches!(
            bridge.begin_read(),
            Err(SessionError::ReadInProgress)
        ));
        assert!(matches!(
            other.begin_read(),
            Err(SessionError::ReadInProgress)
        ));

        let mut writer = FrameWriter::new(board);
        writer.send(2, b"one").unwrap();
        writer.send(2, b"two").unwrap();
        assert!(matches!(
            poll_until_ready(&mut first),
            Ok(Some(Packet::Print(p))) if p.text == "one"
        ));

        let mut second = other.begin_read().unwrap();
        assert!(matches!(
            poll_until_ready(&mut second),
            Ok(Some(Packet::Print(p))) if p.text == "two"
        ));
    }
}
