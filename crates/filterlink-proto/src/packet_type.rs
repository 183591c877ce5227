use std::fmt;

use crate::error::ProtoError;

/// Which side of the link originates a packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by the host, consumed by the board.
    HostToBoard,
    /// Sent by the board, consumed by the host.
    BoardToHost,
    /// Sent by either side.
    Either,
}

impl Direction {
    /// Whether the host ever receives this direction.
    pub fn host_receives(self) -> bool {
        matches!(self, Direction::BoardToHost | Direction::Either)
    }
}

/// Numeric packet type carried in every frame header.
///
/// Values are append-only; once assigned they never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketType {
    Probe = 0,
    Reset = 1,
    Print = 2,
    FilterList = 3,
    FilterCreate = 4,
    FilterDelete = 5,
    FilterFlag = 6,
    FilterMod = 7,
    FilterMix = 8,
    Command = 9,
    AnalogControl = 10,
    StoredList = 11,
    ChainBlob = 12,
}

impl PacketType {
    /// Every packet type, in numeric order.
    pub const ALL: [PacketType; 13] = [
        PacketType::Probe,
        PacketType::Reset,
        PacketType::Print,
        PacketType::FilterList,
        PacketType::FilterCreate,
        PacketType::FilterDelete,
        PacketType::FilterFlag,
        PacketType::FilterMod,
        PacketType::FilterMix,
        PacketType::Command,
        PacketType::AnalogControl,
        PacketType::StoredList,
        PacketType::ChainBlob,
    ];

    /// Wire value.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn direction(self) -> Direction {
        match self {
            PacketType::Probe => Direction::Either,
            PacketType::Reset
            | PacketType::FilterCreate
            | PacketType::FilterDelete
            | PacketType::FilterFlag
            | PacketType::FilterMod
            | PacketType::FilterMix
            | PacketType::Command => Direction::HostToBoard,
            PacketType::Print
            | PacketType::FilterList
            | PacketType::AnalogControl
            | PacketType::StoredList
            | PacketType::ChainBlob => Direction::BoardToHost,
        }
    }

    /// Kebab-case name used in logs and CLI output.
    pub const fn name(self) -> &'static str {
        match self {
            PacketType::Probe => "probe",
            PacketType::Reset => "reset",
            PacketType::Print => "print",
            PacketType::FilterList => "filter-list",
            PacketType::FilterCreate => "filter-create",
            PacketType::FilterDelete => "filter-delete",
            PacketType::FilterFlag => "filter-flag",
            PacketType::FilterMod => "filter-mod",
            PacketType::FilterMix => "filter-mix",
            PacketType::Command => "command",
            PacketType::AnalogControl => "analog-control",
            PacketType::StoredList => "stored-list",
            PacketType::ChainBlob => "chain-blob",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PacketType::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(ProtoError::UnknownPacketType(value))
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        value.as_u8()
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_is_stable() {
        for (i, ty) in PacketType::ALL.iter().enumerate() {
            assert_eq!(usize::from(ty.as_u8()), i);
            assert_eq!(PacketType::try_from(i as u8).unwrap(), *ty);
        }
        assert_eq!(PacketType::Probe.as_u8(), 0);
        assert_eq!(PacketType::Reset.as_u8(), 1);
        assert_eq!(PacketType::ChainBlob.as_u8(), 12);
    }

    #[test]
    fn unknown_value_rejected() {
        let err = PacketType::try_from(13).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownPacketType(13)));
        assert!(PacketType::try_from(0xFF).is_err());
    }

    #[test]
    fn directions() {
        assert_eq!(PacketType::Probe.direction(), Direction::Either);
        assert_eq!(PacketType::FilterMod.direction(), Direction::HostToBoard);
        assert_eq!(PacketType::ChainBlob.direction(), Direction::BoardToHost);
        assert!(PacketType::Print.direction().host_receives());
        assert!(!PacketType::Command.direction().host_receives());
    }

    #[test]
    fn display_uses_name() {
        assert_eq!(PacketType::FilterList.to_string(), "filter-list");
    }
}
