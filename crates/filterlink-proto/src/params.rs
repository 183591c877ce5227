//! Parameter-format mini-language carried in the filter list.
//!
//! Each filter advertises its parameters as one string:
//!
//! ```text
//! Cutoff;o=0;f=f|Resonance;o=4;f=f|Mode;o=8;f=B;v=LP;v=HP;v=BP
//! ```
//!
//! Groups are separated by `|`, attributes by `;`. The first attribute is the
//! parameter's display name; the rest are `key=value` pairs. Repeating a key
//! turns its value into a list. `o` is the byte offset inside the filter's
//! parameter block and `f` the [`ParamFormat`] code.

use crate::error::{ProtoError, Result};
use crate::format::ParamFormat;

/// Offset attribute key.
pub const OFFSET_KEY: &str = "o";
/// Format attribute key.
pub const FORMAT_KEY: &str = "f";

/// Value of one attribute key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Scalar(String),
    List(Vec<String>),
}

impl AttrValue {
    /// The value when the key appeared exactly once.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            AttrValue::Scalar(v) => Some(v),
            AttrValue::List(_) => None,
        }
    }

    /// Every value in order of appearance.
    pub fn values(&self) -> Vec<&str> {
        match self {
            AttrValue::Scalar(v) => vec![v.as_str()],
            AttrValue::List(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            AttrValue::Scalar(first) => {
                let first = std::mem::take(first);
                *self = AttrValue::List(vec![first, value]);
            }
            AttrValue::List(vs) => vs.push(value),
        }
    }
}

/// One parameter of a filter, as advertised by the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub slug: String,
    attributes: Vec<(String, AttrValue)>,
}

impl ParamDescriptor {
    /// Descriptor with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            attributes: Vec::new(),
        }
    }

    /// Add an attribute, collapsing repeats into a list.
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value.into());
        self
    }

    fn insert(&mut self, key: &str, value: String) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => existing.push(value),
            None => self
                .attributes
                .push((key.to_string(), AttrValue::Scalar(value))),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Attributes in the order their keys first appeared.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Byte offset inside the branch parameter block.
    ///
    /// `None` when `o` is absent, repeated, or not an unsigned byte.
    pub fn offset(&self) -> Option<u8> {
        self.attribute(OFFSET_KEY)?.as_scalar()?.trim().parse().ok()
    }

    /// Storage format from the `f` attribute.
    pub fn format(&self) -> Result<ParamFormat> {
        let value = self
            .attribute(FORMAT_KEY)
            .ok_or_else(|| self.missing(FORMAT_KEY))?;
        match value.as_scalar() {
            Some(code) => ParamFormat::parse(code),
            None => Err(ProtoError::UnknownFormat(value.values().join(","))),
        }
    }

    fn missing(&self, key: &'static str) -> ProtoError {
        ProtoError::MissingAttribute {
            param: self.name.clone(),
            key,
        }
    }

    /// Render back into the mini-language.
    pub fn to_spec_string(&self) -> String {
        let mut out = self.name.clone();
        for (key, value) in &self.attributes {
            for v in value.values() {
                out.push(';');
                out.push_str(key);
                out.push('=');
                out.push_str(v);
            }
        }
        out
    }
}

/// Parse a filter's full parameter-format string.
///
/// With `enforce` set, every parameter must carry both `o` and `f`.
/// Empty groups (e.g. from a trailing `|`) are skipped.
pub fn parse_params(spec: &str, enforce: bool) -> Result<Vec<ParamDescriptor>> {
    spec.split('|')
        .filter(|group| !group.trim().is_empty())
        .map(|group| parse_param(group, enforce))
        .collect()
}

/// Parse one `name;key=value;...` group.
pub fn parse_param(group: &str, enforce: bool) -> Result<ParamDescriptor> {
    let mut parts = group.split(';');
    let name = parts.next().unwrap_or_default().trim();
    let mut param = ParamDescriptor::new(name);

    for attribute in parts.filter(|a| !a.is_empty()) {
        let (key, value) =
            attribute
                .split_once('=')
                .ok_or_else(|| ProtoError::MalformedAttribute {
                    param: name.to_string(),
                    attribute: attribute.to_string(),
                })?;
        param.insert(key.trim(), value.to_string());
    }

    if enforce {
        for key in [OFFSET_KEY, FORMAT_KEY] {
            if param.attribute(key).is_none() {
                return Err(param.missing(key));
            }
        }
    }

    Ok(param)
}

/// Lowercase ASCII identifier derived from a display name.
///
/// Whitespace, `-` and `_` runs become a single `-`; any other non
/// alphanumeric character is dropped; leading and trailing hyphens are
/// trimmed.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_hyphen = true;
        }
    }

    slug
}
