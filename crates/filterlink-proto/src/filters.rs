use std::sync::{Arc, PoisonError, RwLock};

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::error::{ProtoError, Result};
use crate::params::{parse_params, slugify, ParamDescriptor};
use crate::wire::{count_u8, put_cstr, PayloadReader};

/// A filter type the board can instantiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescriptor {
    /// Position in the filter list; branches refer to filters by this index.
    pub index: usize,
    pub name: String,
    pub slug: String,
    /// Parameters in on-wire block order.
    pub params: Vec<ParamDescriptor>,
}

impl FilterDescriptor {
    pub fn new(index: usize, name: impl Into<String>, params: Vec<ParamDescriptor>) -> Self {
        let name = name.into();
        Self {
            index,
            slug: slugify(&name),
            name,
            params,
        }
    }

    /// Look up a parameter by display name or slug.
    pub fn param(&self, name: &str) -> Option<&ParamDescriptor> {
        self.params
            .iter()
            .find(|p| p.name == name || p.slug == name)
    }

    /// The single parameter whose `o` attribute equals `offset`.
    pub fn param_at_offset(&self, offset: u8) -> Result<&ParamDescriptor> {
        let mut matches = self.params.iter().filter(|p| p.offset() == Some(offset));
        match (matches.next(), matches.next()) {
            (Some(param), None) => Ok(param),
            (None, _) => Err(ProtoError::UnresolvedOffset {
                filter: self.name.clone(),
                offset,
            }),
            (Some(_), Some(_)) => Err(ProtoError::AmbiguousOffset {
                filter: self.name.clone(),
                offset,
            }),
        }
    }

    /// The parameter-format string this filter would be advertised with.
    pub fn params_spec(&self) -> String {
        self.params
            .iter()
            .map(ParamDescriptor::to_spec_string)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Result of decoding a filter list payload.
///
/// `filters` holds every entry parsed before `error`, if one occurred.
#[derive(Debug)]
pub struct FilterListDecode {
    pub filters: Vec<FilterDescriptor>,
    pub error: Option<ProtoError>,
}

/// Decode `count:u8` followed by `count` (name, params) string pairs.
pub fn decode_filter_list(payload: &[u8], enforce: bool) -> FilterListDecode {
    let mut reader = PayloadReader::new(payload);
    let mut filters = Vec::new();

    let count = match reader.u8("filter count") {
        Ok(count) => count,
        Err(error) => {
            return FilterListDecode {
                filters,
                error: Some(error),
            }
        }
    };

    for index in 0..usize::from(count) {
        match decode_entry(&mut reader, index, enforce) {
            Ok(filter) => filters.push(filter),
            Err(source) => {
                return FilterListDecode {
                    filters,
                    error: Some(ProtoError::FilterEntry {
                        index,
                        source: Box::new(source),
                    }),
                }
            }
        }
    }

    if !reader.is_empty() {
        debug!(extra = reader.remaining(), "ignoring bytes after filter list");
    }

    FilterListDecode {
        filters,
        error: None,
    }
}

fn decode_entry(
    reader: &mut PayloadReader<'_>,
    index: usize,
    enforce: bool,
) -> Result<FilterDescriptor> {
    let name = reader.cstr("filter name")?;
    let spec = reader.cstr("filter params")?;
    let params = parse_params(spec, enforce)?;
    Ok(FilterDescriptor::new(index, name, params))
}

/// Encode a filter list the way the board sends it.
pub fn encode_filter_list(filters: &[FilterDescriptor], dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(count_u8("filters", filters.len())?);
    for filter in filters {
        put_cstr(dst, &filter.name);
        put_cstr(dst, &filter.params_spec());
    }
    Ok(())
}

/// Shared cache of the most recent filter list.
///
/// Cloning yields another handle to the same cache. Writers swap the whole
/// list; readers take an `Arc` snapshot that stays consistent even if a new
/// list arrives while they hold it.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    inner: Arc<RwLock<Arc<Vec<FilterDescriptor>>>>,
}

impl FilterRegistry {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached list.
    pub fn replace(&self, filters: Vec<FilterDescriptor>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(filters);
    }

    /// Drop every cached filter.
    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    /// Current list.
    pub fn snapshot(&self) -> Arc<Vec<FilterDescriptor>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Clone of the filter at `index`.
    pub fn get(&self, index: usize) -> Option<FilterDescriptor> {
        self.snapshot().get(index).cloned()
    }
}
