use bytes::{BufMut, Bytes, BytesMut};
use filterlink_frame::ProtocolRevision;
use tracing::debug;

use crate::chain::{BranchFlags, ChainBlob};
use crate::error::{ProtoError, Result};
use crate::filters::{decode_filter_list, encode_filter_list, FilterDescriptor, FilterRegistry};
use crate::format::ParamFormat;
use crate::packet_type::PacketType;
use crate::params::{ParamDescriptor, OFFSET_KEY};
use crate::wire::{put_cstr, PayloadReader};

/// State a payload decoder may consult.
#[derive(Debug, Clone, Default)]
pub struct DecodeContext {
    pub revision: ProtocolRevision,
    /// Written by filter list decodes, read by chain blob decodes.
    pub filters: FilterRegistry,
}

impl DecodeContext {
    pub fn new(revision: ProtocolRevision, filters: FilterRegistry) -> Self {
        Self { revision, filters }
    }
}

/// What the receiver should do after a packet arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    None,
    /// Send this packet back on the same link.
    Reply(Packet),
}

/// Codec for one packet type's payload.
pub trait Payload: Sized {
    const TYPE: PacketType;

    fn decode(payload: &[u8], ctx: &DecodeContext) -> Result<Self>;

    fn encode(&self, dst: &mut BytesMut) -> Result<()>;

    fn on_receive(&self) -> Reaction {
        Reaction::None
    }
}

fn expect_len(packet: PacketType, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() != expected {
        return Err(ProtoError::UnexpectedLength {
            packet,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn ignore_payload(packet: PacketType, payload: &[u8]) {
    if !payload.is_empty() {
        debug!(%packet, size = payload.len(), "ignoring payload on empty packet");
    }
}

/// Handshake packet. The board sends one at boot and waits for the host to
/// answer with another before it continues starting up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Probe;

impl Payload for Probe {
    const TYPE: PacketType = PacketType::Probe;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        ignore_payload(Self::TYPE, payload);
        Ok(Probe)
    }

    fn encode(&self, _dst: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn on_receive(&self) -> Reaction {
        Reaction::Reply(Packet::Probe(Probe))
    }
}

/// Asks the board to reboot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reset;

impl Payload for Reset {
    const TYPE: PacketType = PacketType::Reset;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        ignore_payload(Self::TYPE, payload);
        Ok(Reset)
    }

    fn encode(&self, _dst: &mut BytesMut) -> Result<()> {
        Ok(())
    }
}

/// Console output from the board. Not terminated; may end mid-line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Print {
    pub text: String,
}

impl Payload for Print {
    const TYPE: PacketType = PacketType::Print;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        Ok(Print {
            text: String::from_utf8_lossy(payload).into_owned(),
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(self.text.as_bytes());
        Ok(())
    }
}

/// The filter types the board offers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterList {
    pub filters: Vec<FilterDescriptor>,
}

impl Payload for FilterList {
    const TYPE: PacketType = PacketType::FilterList;

    /// Decoding replaces the context's filter cache. If an entry fails,
    /// the cache keeps the entries before it and the error is returned.
    fn decode(payload: &[u8], ctx: &DecodeContext) -> Result<Self> {
        let decoded = decode_filter_list(payload, ctx.revision.enforces_param_descriptors());
        ctx.filters.replace(decoded.filters.clone());
        match decoded.error {
            Some(err) => Err(err),
            None => Ok(FilterList {
                filters: decoded.filters,
            }),
        }
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_filter_list(&self.filters, dst)
    }
}

/// Appends a branch to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterCreate {
    pub stage: u8,
    pub filter_type: u8,
    pub flags: BranchFlags,
    pub mix: f32,
}

impl FilterCreate {
    const SIZE: usize = 7;
}

impl Payload for FilterCreate {
    const TYPE: PacketType = PacketType::FilterCreate;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        expect_len(Self::TYPE, payload, Self::SIZE)?;
        let mut r = PayloadReader::new(payload);
        Ok(FilterCreate {
            stage: r.u8("stage")?,
            filter_type: r.u8("filter type")?,
            flags: BranchFlags::from_bits_retain(r.u8("flags")?),
            mix: r.f32("mix")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.stage);
        dst.put_u8(self.filter_type);
        dst.put_u8(self.flags.bits());
        dst.put_f32_le(self.mix);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterDelete {
    pub stage: u8,
    pub branch: u8,
}

impl Payload for FilterDelete {
    const TYPE: PacketType = PacketType::FilterDelete;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        expect_len(Self::TYPE, payload, 2)?;
        Ok(FilterDelete {
            stage: payload[0],
            branch: payload[1],
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.stage);
        dst.put_u8(self.branch);
        Ok(())
    }
}

/// Sets or clears one flag bit on a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterFlag {
    pub stage: u8,
    pub branch: u8,
    pub bit: u8,
    pub enable: bool,
}

impl Payload for FilterFlag {
    const TYPE: PacketType = PacketType::FilterFlag;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        expect_len(Self::TYPE, payload, 4)?;
        Ok(FilterFlag {
            stage: payload[0],
            branch: payload[1],
            bit: payload[2],
            enable: payload[3] != 0,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&[self.stage, self.branch, self.bit, u8::from(self.enable)]);
        Ok(())
    }
}

/// Writes one parameter of a branch.
///
/// The value's width comes from `format`, which is not sent; the board
/// knows its own layout. Only the host ever builds these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterMod {
    pub stage: u8,
    pub branch: u8,
    pub offset: u8,
    pub format: ParamFormat,
    pub value: f64,
}

impl FilterMod {
    /// Target the parameter described by `param`.
    ///
    /// Fails if the descriptor has no usable `o` or `f`.
    pub fn for_param(stage: u8, branch: u8, param: &ParamDescriptor, value: f64) -> Result<Self> {
        let offset = param.offset().ok_or_else(|| ProtoError::MissingAttribute {
            param: param.name.clone(),
            key: OFFSET_KEY,
        })?;
        Ok(FilterMod {
            stage,
            branch,
            offset,
            format: param.format()?,
            value,
        })
    }
}

impl Payload for FilterMod {
    const TYPE: PacketType = PacketType::FilterMod;

    fn decode(_payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        Err(ProtoError::EncodeOnly(Self::TYPE))
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let mut value = BytesMut::with_capacity(self.format.size());
        self.format.encode(self.value, &mut value)?;
        dst.put_slice(&[self.stage, self.branch, self.offset]);
        dst.put_slice(&value);
        Ok(())
    }
}

/// Changes a branch's mix fraction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterMix {
    pub stage: u8,
    pub branch: u8,
    pub mix: f32,
}

impl Payload for FilterMix {
    const TYPE: PacketType = PacketType::FilterMix;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        expect_len(Self::TYPE, payload, 6)?;
        let mut r = PayloadReader::new(payload);
        Ok(FilterMix {
            stage: r.u8("stage")?,
            branch: r.u8("branch")?,
            mix: r.f32("mix")?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.stage);
        dst.put_u8(self.branch);
        dst.put_f32_le(self.mix);
        Ok(())
    }
}

/// A console command for the board's shell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub tokens: Vec<String>,
}

impl Command {
    /// Split `line` on whitespace. No quoting.
    pub fn parse(line: &str) -> Self {
        Command {
            tokens: line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

impl Payload for Command {
    const TYPE: PacketType = PacketType::Command;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        let count = r.u8("token count")?;
        let tokens = (0..count)
            .map(|_| r.cstr("command token").map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        Ok(Command { tokens })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let count = u8::try_from(self.tokens.len())
            .map_err(|_| ProtoError::TooManyTokens(self.tokens.len()))?;
        dst.put_u8(count);
        for token in &self.tokens {
            put_cstr(dst, token);
        }
        Ok(())
    }
}

/// Position of the board's analog control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalogControl {
    pub value: u16,
}

impl Payload for AnalogControl {
    const TYPE: PacketType = PacketType::AnalogControl;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        expect_len(Self::TYPE, payload, 2)?;
        Ok(AnalogControl {
            value: u16::from_le_bytes([payload[0], payload[1]]),
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16_le(self.value);
        Ok(())
    }
}

/// Names of chains saved on the board's SD card.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredList {
    pub names: Vec<String>,
}

impl Payload for StoredList {
    const TYPE: PacketType = PacketType::StoredList;

    fn decode(payload: &[u8], _ctx: &DecodeContext) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        let mut names = Vec::new();
        while !r.is_empty() {
            names.push(r.cstr("stored chain name")?.to_string());
        }
        Ok(StoredList { names })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        for name in &self.names {
            put_cstr(dst, name);
        }
        Ok(())
    }
}

impl Payload for ChainBlob {
    const TYPE: PacketType = PacketType::ChainBlob;

    fn decode(payload: &[u8], ctx: &DecodeContext) -> Result<Self> {
        let filters = ctx.filters.snapshot();
        ChainBlob::decode(payload, &filters)
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        ChainBlob::encode(self, dst)
    }
}

macro_rules! packets {
    ($($variant:ident($payload:ty)),+ $(,)?) => {
        /// A decoded packet of any type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($variant($payload),)+
        }

        impl Packet {
            pub fn packet_type(&self) -> PacketType {
                match self {
                    $(Packet::$variant(_) => <$payload as Payload>::TYPE,)+
                }
            }

            /// Append this packet's payload to `dst`.
            pub fn encode_payload(&self, dst: &mut BytesMut) -> Result<()> {
                match self {
                    $(Packet::$variant(p) => Payload::encode(p, dst),)+
                }
            }

            /// The receiver's reaction to this packet.
            pub fn on_receive(&self) -> Reaction {
                match self {
                    $(Packet::$variant(p) => Payload::on_receive(p),)+
                }
            }
        }

        $(
            impl From<$payload> for Packet {
                fn from(payload: $payload) -> Self {
                    Packet::$variant(payload)
                }
            }
        )+
    };
}

packets! {
    Probe(Probe),
    Reset(Reset),
    Print(Print),
    FilterList(FilterList),
    FilterCreate(FilterCreate),
    FilterDelete(FilterDelete),
    FilterFlag(FilterFlag),
    FilterMod(FilterMod),
    FilterMix(FilterMix),
    Command(Command),
    AnalogControl(AnalogControl),
    StoredList(StoredList),
    ChainBlob(ChainBlob),
}

impl Packet {
    /// Wire type and payload bytes.
    pub fn encode(&self) -> Result<(u8, Bytes)> {
        let mut buf = BytesMut::new();
        self.encode_payload(&mut buf)?;
        Ok((self.packet_type().as_u8(), buf.freeze()))
    }
}
