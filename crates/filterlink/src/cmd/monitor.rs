use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use filterlink_frame::FrameError;
use filterlink_session::{await_probe, ReadPoll, SessionError};
use tracing::info;

use crate::cmd::MonitorArgs;
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_packet, OutputFormat};

/// Idle time between polls of an unfinished read.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.link.open_session()?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    let reached = |printed: usize| args.count.is_some_and(|count| printed >= count);

    if args.wait_probe {
        let before = match await_probe(session.reader_mut()) {
            Ok(before) => before,
            Err(err) if is_closed(&err) => {
                info!("link closed before the board probed");
                return Ok(SUCCESS);
            }
            Err(err) => return Err(session_error("waiting for probe failed", err)),
        };
        for packet in &before {
            print_packet(packet, format);
            printed += 1;
            if reached(printed) {
                return Ok(SUCCESS);
            }
        }
        info!("board is up");
    }

    let (bridge, _sender) = session.into_bridge();
    let mut pending = bridge
        .begin_read()
        .map_err(|err| session_error("read failed", err))?;

    while running.load(Ordering::SeqCst) {
        let result = match pending.poll() {
            ReadPoll::Pending => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            ReadPoll::Ready(result) => result,
        };

        match result {
            Ok(Some(packet)) => {
                print_packet(&packet, format);
                printed += 1;
                if reached(printed) {
                    return Ok(SUCCESS);
                }
            }
            Ok(None) => {}
            Err(err) if is_closed(&err) => {
                info!("link closed");
                return Ok(SUCCESS);
            }
            // Already logged by the reader; the link is still usable.
            Err(err) if !err.is_fatal() => {}
            Err(err) => return Err(session_error("read failed", err)),
        }

        pending = bridge
            .begin_read()
            .map_err(|err| session_error("read failed", err))?;
    }

    Ok(SUCCESS)
}

fn is_closed(err: &SessionError) -> bool {
    matches!(err, SessionError::Frame(FrameError::ConnectionClosed))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
