use filterlink_frame::FrameError;
use filterlink_proto::{Packet, PacketType};
use filterlink_session::SessionError;
use tracing::debug;

use crate::cmd::FiltersArgs;
use crate::exit::{session_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS};
use crate::output::{print_filters, OutputFormat};

/// Read until the board announces its filters, then print them.
///
/// A list that fails partway is still printed up to the failing entry.
pub fn run(args: FiltersArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.link.open_session()?;

    loop {
        match session.read_packet() {
            Ok(Some(Packet::FilterList(list))) => {
                print_filters(&list.filters, format);
                return Ok(SUCCESS);
            }
            Ok(Some(packet)) => debug!(packet = %packet.packet_type(), "skipping packet"),
            Ok(None) => {}
            Err(SessionError::Decode {
                packet_type,
                source,
            }) if packet_type == PacketType::FilterList.as_u8() => {
                let parsed = session.filters().snapshot();
                print_filters(&parsed, format);
                return Err(CliError::new(
                    DATA_INVALID,
                    format!(
                        "filter list incomplete after {} filters: {source}",
                        parsed.len()
                    ),
                ));
            }
            Err(SessionError::Frame(FrameError::ConnectionClosed)) => {
                return Err(CliError::new(
                    FAILURE,
                    "link closed before the filter list arrived",
                ));
            }
            Err(err) if !err.is_fatal() => {}
            Err(err) => return Err(session_error("read failed", err)),
        }
    }
}
