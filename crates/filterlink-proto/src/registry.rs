use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use tracing::warn;

use crate::chain::ChainBlob;
use crate::error::{ProtoError, Result};
use crate::packet::{
    AnalogControl, Command, DecodeContext, FilterCreate, FilterDelete, FilterFlag, FilterList,
    FilterMix, FilterMod, Packet, Payload, Print, Probe, Reset, StoredList,
};
use crate::packet_type::PacketType;

/// Type-erased decoder for one wire packet type.
pub trait PacketCodec: Send + Sync {
    /// Wire type this codec handles.
    fn packet_type(&self) -> u8;

    fn decode(&self, payload: &[u8], ctx: &DecodeContext) -> Result<Packet>;
}

/// [`PacketCodec`] backed by a [`Payload`] implementation.
pub struct PayloadCodec<P>(PhantomData<fn() -> P>);

impl<P> PayloadCodec<P> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<P> Default for PayloadCodec<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PacketCodec for PayloadCodec<P>
where
    P: Payload + Into<Packet>,
{
    fn packet_type(&self) -> u8 {
        P::TYPE.as_u8()
    }

    fn decode(&self, payload: &[u8], ctx: &DecodeContext) -> Result<Packet> {
        P::decode(payload, ctx).map(Into::into)
    }
}

/// Maps wire packet types to their decoders.
///
/// Each type has at most one codec. Types with no codec are dropped on
/// dispatch so newer firmware can add packets without breaking the host.
pub struct CodecRegistry {
    codecs: HashMap<u8, Box<dyn PacketCodec>>,
}

impl CodecRegistry {
    /// A registry with no codecs.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// A registry with a codec for every [`PacketType`].
    ///
    /// Fails with [`ProtoError::DuplicateCodec`] if two entries claim the
    /// same wire type.
    pub fn standard() -> Result<Self> {
        let codecs: [Box<dyn PacketCodec>; 13] = [
            Box::new(PayloadCodec::<Probe>::new()),
            Box::new(PayloadCodec::<Reset>::new()),
            Box::new(PayloadCodec::<Print>::new()),
            Box::new(PayloadCodec::<FilterList>::new()),
            Box::new(PayloadCodec::<FilterCreate>::new()),
            Box::new(PayloadCodec::<FilterDelete>::new()),
            Box::new(PayloadCodec::<FilterFlag>::new()),
            Box::new(PayloadCodec::<FilterMod>::new()),
            Box::new(PayloadCodec::<FilterMix>::new()),
            Box::new(PayloadCodec::<Command>::new()),
            Box::new(PayloadCodec::<AnalogControl>::new()),
            Box::new(PayloadCodec::<StoredList>::new()),
            Box::new(PayloadCodec::<ChainBlob>::new()),
        ];
        let mut registry = Self::new();
        for codec in codecs {
            registry.register_codec(codec)?;
        }
        Ok(registry)
    }

    /// Register the codec for payload type `P`.
    pub fn register<P>(&mut self) -> Result<()>
    where
        P: Payload + Into<Packet> + 'static,
    {
        self.register_codec(Box::new(PayloadCodec::<P>::new()))
    }

    /// Register a codec; fails if its type already has one.
    pub fn register_codec(&mut self, codec: Box<dyn PacketCodec>) -> Result<()> {
        let packet_type = codec.packet_type();
        if self.codecs.contains_key(&packet_type) {
            return Err(ProtoError::DuplicateCodec(packet_type));
        }
        self.codecs.insert(packet_type, codec);
        Ok(())
    }

    pub fn contains(&self, packet_type: u8) -> bool {
        self.codecs.contains_key(&packet_type)
    }

    /// Registered wire types, ascending.
    pub fn packet_types(&self) -> Vec<u8> {
        let mut types: Vec<u8> = self.codecs.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Decode a payload with the codec for `packet_type`.
    ///
    /// Returns `Ok(None)` and logs when no codec is registered.
    pub fn dispatch(
        &self,
        packet_type: u8,
        payload: &[u8],
        ctx: &DecodeContext,
    ) -> Result<Option<Packet>> {
        match self.codecs.get(&packet_type) {
            Some(codec) => codec.decode(payload, ctx).map(Some),
            None => {
                warn!(
                    packet_type,
                    size = payload.len(),
                    "dropping packet of unknown type"
                );
                Ok(None)
            }
        }
    }

    /// Wire type and payload for a packet.
    pub fn encode(&self, packet: &Packet) -> Result<(u8, Bytes)> {
        packet.encode()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self
            .packet_types()
            .into_iter()
            .map(|ty| match PacketType::try_from(ty) {
                Ok(known) => known.name().to_string(),
                Err(_) => ty.to_string(),
            })
            .collect();
        f.debug_struct("CodecRegistry")
            .field("codecs", &names)
            .finish()
    }
}
