//! Typed parameter keys.
//!
//! A [`ParameterKey`] is parsed once when a state is loaded. Whether a key is
//! layer-indexed, and at which segment, is then a static property of the key
//! instead of a string check repeated on every lookup.

use crate::naming::{KeyConvention, KeyNaming, LayerIndexResolver};
use std::fmt;

/// A parsed parameter key: dotted path segments with at most one layer index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterKey {
    raw: String,
    segments: Vec<String>,
    layer: Option<LayerSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LayerSlot {
    index: usize,
    position: usize,
    convention: KeyConvention,
}

impl ParameterKey {
    /// Parse `raw` with `resolver`. Never fails: keys the resolver cannot place
    /// are kept as non-layer keys.
    #[must_use]
    pub fn parse(raw: &str, resolver: &LayerIndexResolver) -> Self {
        let parts: Vec<&str> = raw.split('.').collect();
        let layer = resolver.resolve_segments(&parts).map(|m| LayerSlot {
            index: m.index,
            position: m.position,
            convention: m.convention.clone(),
        });
        Self {
            raw: raw.to_string(),
            segments: parts.iter().map(|s| (*s).to_string()).collect(),
            layer,
        }
    }

    /// Original key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Layer index, or `None` for keys outside any layer (heads, buffers
    /// keyed differently).
    #[must_use]
    pub fn layer(&self) -> Option<usize> {
        self.layer.as_ref().map(|slot| slot.index)
    }

    /// Convention the layer index was found under.
    #[must_use]
    pub fn convention(&self) -> Option<&KeyConvention> {
        self.layer.as_ref().map(|slot| &slot.convention)
    }

    /// Segments after the layer index, joined (`"cv1.conv.weight"`).
    /// `None` for non-layer keys.
    #[must_use]
    pub fn suffix(&self) -> Option<String> {
        self.layer
            .as_ref()
            .map(|slot| self.segments[slot.position + 1..].join("."))
    }

    /// Same suffix addressed at `layer` under another naming.
    #[must_use]
    pub fn relocate(&self, naming: &dyn KeyNaming, layer: usize) -> Option<String> {
        self.suffix().map(|suffix| naming.layer_key(layer, &suffix))
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for ParameterKey {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
