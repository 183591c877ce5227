use filterlink_proto::{
    BranchFlags, Command, FilterCreate, FilterDelete, FilterFlag, FilterMix, FilterMod, Packet,
    Probe, Reset,
};

use crate::cmd::{SendArgs, SendPacket};
use crate::exit::{session_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let packet = build_packet(&args.packet);
    let (packet_type, payload) = packet
        .encode()
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid packet: {err}")))?;

    let session = args.link.open_session()?;
    session
        .sender()
        .send_raw(packet_type, &payload)
        .map_err(|err| session_error("send failed", err))?;

    print_sent(packet.packet_type(), &payload, format);
    Ok(SUCCESS)
}

fn build_packet(packet: &SendPacket) -> Packet {
    match packet {
        SendPacket::Probe => Probe.into(),
        SendPacket::Reset => Reset.into(),
        SendPacket::Command { words } => Command::parse(&words.join(" ")).into(),
        SendPacket::Create {
            stage,
            filter,
            mix,
            full_mix,
        } => {
            let mut flags = BranchFlags::empty();
            flags.set(BranchFlags::FULL_MIX, *full_mix);
            FilterCreate {
                stage: *stage,
                filter_type: *filter,
                flags,
                mix: *mix,
            }
            .into()
        }
        SendPacket::Delete { stage, branch } => FilterDelete {
            stage: *stage,
            branch: *branch,
        }
        .into(),
        SendPacket::Flag {
            stage,
            branch,
            bit,
            clear,
        } => FilterFlag {
            stage: *stage,
            branch: *branch,
            bit: *bit,
            enable: !clear,
        }
        .into(),
        SendPacket::Mod {
            stage,
            branch,
            offset,
            format,
            value,
        } => FilterMod {
            stage: *stage,
            branch: *branch,
            offset: *offset,
            format: *format,
            value: *value,
        }
        .into(),
        SendPacket::Mix { stage, branch, mix } => FilterMix {
            stage: *stage,
            branch: *branch,
            mix: *mix,
        }
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use filterlink_proto::{Direction, PacketType, ParamFormat};

    use super::*;

    #[test]
    fn builds_command_tokens() {
        let packet = build_packet(&SendPacket::Command {
            words: vec!["chain".into(), "save".into(), "live".into()],
        });
        let (ty, payload) = packet.encode().unwrap();
        assert_eq!(ty, PacketType::Command.as_u8());
        assert_eq!(payload.as_ref(), b"\x03chain\0save\0live\0");
    }

    #[test]
    fn splits_quoted_command_line() {
        let packet = build_packet(&SendPacket::Command {
            words: vec!["chain save live".into()],
        });
        let (_, payload) = packet.encode().unwrap();
        assert_eq!(payload.as_ref(), b"\x03chain\0save\0live\0");

        let mixed = build_packet(&SendPacket::Command {
            words: vec!["chain  save".into(), "live".into()],
        });
        assert_eq!(mixed, packet);
    }

    #[test]
    fn builds_create_with_full_mix() {
        let packet = build_packet(&SendPacket::Create {
            stage: 2,
            filter: 5,
            mix: 0.25,
            full_mix: true,
        });
        match packet {
            Packet::FilterCreate(create) => {
                assert_eq!(create.flags, BranchFlags::FULL_MIX);
                assert_eq!(create.filter_type, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clear_flag_disables() {
        let packet = build_packet(&SendPacket::Flag {
            stage: 0,
            branch: 1,
            bit: 0,
            clear: true,
        });
        let (_, payload) = packet.encode().unwrap();
        assert_eq!(payload.as_ref(), [0u8, 1, 0, 0]);
    }

    #[test]
    fn mod_out_of_range_fails_to_encode() {
        let packet = build_packet(&SendPacket::Mod {
            stage: 0,
            branch: 0,
            offset: 4,
            format: ParamFormat::U8,
            value: 300.0,
        });
        assert!(packet.encode().is_err());
    }

    #[test]
    fn built_packets_travel_to_board() {
        let packets = [
            SendPacket::Probe,
            SendPacket::Reset,
            SendPacket::Delete {
                stage: 0,
                branch: 0,
            },
            SendPacket::Mix {
                stage: 0,
                branch: 0,
                mix: 0.5,
            },
        ];
        for packet in &packets {
            let direction = build_packet(packet).packet_type().direction();
            assert_ne!(direction, Direction::BoardToHost);
        }
    }
}
