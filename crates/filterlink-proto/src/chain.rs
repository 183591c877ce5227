//! Stored chain blobs.
//!
//! The board serialises its filter chain in the same layout it uses on the
//! SD card:
//!
//! ```text
//! header:  "CHST" | version:u8 | stages:u8
//! stage:   branches:u8
//! branch:  filter:u8 | flags:u8 | mix:f32 | params:u8
//! param:   offset:u8 | size:u8 | value[size]
//! ```
//!
//! A parameter's value format is not on the wire. It is recovered from the
//! filter list: the referenced filter's descriptor whose `o` attribute equals
//! the stored offset supplies the `f` code. Decoding therefore needs the
//! filter list the board sent earlier.

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

use crate::error::{ProtoError, Result};
use crate::filters::FilterDescriptor;
use crate::format::{ParamFormat, ParamValue};
use crate::wire::{count_u8, PayloadReader};

/// Chain store signature, `'C' | 'H' << 8 | 'S' << 16 | 'T' << 24`.
pub const STORE_SIGNATURE: [u8; 4] = *b"CHST";

/// Only supported chain store version.
pub const STORE_VERSION: u8 = 1;

bitflags! {
    /// Per-branch flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BranchFlags: u8 {
        /// Ignore the mix percentage and run fully wet. Only meaningful on
        /// single-branch stages.
        const FULL_MIX = 1 << 0;
    }
}

/// A decoded chain snapshot.
///
/// The `CHST` signature is not stored: decode rejects anything else and
/// encode always writes [`STORE_SIGNATURE`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChainBlob {
    pub version: u8,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stage {
    pub branches: Vec<Branch>,
}

/// One filter instance within a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub filter_index: u8,
    /// Copied from the filter list at decode time.
    pub filter_name: String,
    pub filter_slug: String,
    pub flags: BranchFlags,
    /// Mix fraction, 0.0 to 1.0.
    pub mix: f32,
    pub params: Vec<ResolvedParam>,
}

/// A stored parameter value matched to its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParam {
    pub name: String,
    pub slug: String,
    pub offset: u8,
    pub format: ParamFormat,
    pub value: ParamValue,
}

impl ChainBlob {
    /// An empty chain at the current store version.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            version: STORE_VERSION,
            stages,
        }
    }

    /// Decode a chain blob, resolving every branch against `filters`.
    ///
    /// Nothing is returned unless the whole blob resolves.
    pub fn decode(payload: &[u8], filters: &[FilterDescriptor]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);

        let signature = reader.bytes("store signature", STORE_SIGNATURE.len())?;
        if signature != STORE_SIGNATURE {
            let mut found = [0u8; 4];
            found.copy_from_slice(signature);
            return Err(ProtoError::BadSignature { found });
        }

        let version = reader.u8("store version")?;
        if version != STORE_VERSION {
            return Err(ProtoError::UnsupportedVersion {
                found: version,
                expected: STORE_VERSION,
            });
        }

        let stage_count = reader.u8("stage count")?;
        let mut stages = Vec::with_capacity(usize::from(stage_count));
        for _ in 0..stage_count {
            let branch_count = reader.u8("branch count")?;
            let branches = (0..branch_count)
                .map(|_| decode_branch(&mut reader, filters))
                .collect::<Result<Vec<_>>>()?;
            stages.push(Stage { branches });
        }

        Ok(Self { version, stages })
    }

    /// Encode in the chain store layout.
    ///
    /// Each parameter is written at its format's width.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&STORE_SIGNATURE);
        dst.put_u8(self.version);
        dst.put_u8(count_u8("stages", self.stages.len())?);

        for stage in &self.stages {
            dst.put_u8(count_u8("branches", stage.branches.len())?);
            for branch in &stage.branches {
                dst.put_u8(branch.filter_index);
                dst.put_u8(branch.flags.bits());
                dst.put_f32_le(branch.mix);
                dst.put_u8(count_u8("params", branch.params.len())?);
                for param in &branch.params {
                    dst.put_u8(param.offset);
                    dst.put_u8(param.format.size() as u8);
                    param.format.encode_value(param.value, dst)?;
                }
            }
        }
        Ok(())
    }

    /// Total branches over all stages.
    pub fn branch_count(&self) -> usize {
        self.stages.iter().map(|s| s.branches.len()).sum()
    }
}

fn decode_branch(reader: &mut PayloadReader<'_>, filters: &[FilterDescriptor]) -> Result<Branch> {
    let filter_index = reader.u8("branch filter")?;
    let flags = BranchFlags::from_bits_retain(reader.u8("branch flags")?);
    let mix = reader.f32("branch mix")?;
    let param_count = reader.u8("param count")?;

    let filter = filters
        .get(usize::from(filter_index))
        .ok_or(ProtoError::FilterIndexOutOfRange {
            index: filter_index,
            count: filters.len(),
        })?;

    let mut params = Vec::with_capacity(usize::from(param_count));
    for _ in 0..param_count {
        let offset = reader.u8("param offset")?;
        let size = reader.u8("param size")?;
        let raw = reader.bytes("param value", usize::from(size))?;

        let descriptor = filter.param_at_offset(offset)?;
        let format = descriptor.format()?;
        if format.size() != usize::from(size) {
            return Err(ProtoError::ParamSizeMismatch {
                param: descriptor.name.clone(),
                expected: format.size(),
                actual: size,
            });
        }

        params.push(ResolvedParam {
            name: descriptor.name.clone(),
            slug: descriptor.slug.clone(),
            offset,
            format,
            value: format.decode(raw)?,
        });
    }

    Ok(Branch {
        filter_index,
        filter_name: filter.name.clone(),
        filter_slug: filter.slug.clone(),
        flags,
        mix,
        params,
    })
}
