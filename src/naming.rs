//! Key naming conventions and the layer index resolver.
//!
//! Layer-indexed parameter keys look like `<prefix>.<layer>.<suffix>`, where
//! the prefix depends on how the network was wrapped when its state was
//! exported:
//!
//! ```text
//! model.4.conv.weight          flat:   prefix "model"
//! model.model.4.conv.weight    nested: prefix "model.model"
//! ```
//!
//! A [`KeyConvention`] describes one such prefix. The [`LayerIndexResolver`]
//! tries an ordered list of conventions and reports the first that finds a
//! digit segment where it expects one. Donor key construction goes through the
//! [`KeyNaming`] trait, and the naming for each donor is chosen once (either
//! injected or detected from the donor's keys) rather than re-detected per key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Produce the canonical key prefix for a layer index.
///
/// Implementations must be pure: the same layer always yields the same prefix.
pub trait KeyNaming: fmt::Debug + Send + Sync {
    /// Prefix (without trailing dot) addressing every parameter of `layer`.
    fn layer_prefix(&self, layer: usize) -> String;

    /// Full key for `suffix` within `layer`.
    fn layer_key(&self, layer: usize, suffix: &str) -> String {
        if suffix.is_empty() {
            self.layer_prefix(layer)
        } else {
            format!("{}.{suffix}", self.layer_prefix(layer))
        }
    }
}

/// One key-prefixing convention: the path segments that precede the layer
/// index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyConvention {
    prefix: Vec<String>,
}

impl KeyConvention {
    /// Network nested directly under `root` (`model.<i>.…`).
    #[must_use]
    pub fn flat(root: &str) -> Self {
        Self {
            prefix: vec![root.to_string()],
        }
    }

    /// Network wrapped one level deeper (`model.model.<i>.…`).
    #[must_use]
    pub fn nested(root: &str, container: &str) -> Self {
        Self {
            prefix: vec![root.to_string(), container.to_string()],
        }
    }

    /// Parse a dotted prefix such as `"model.model"` or `"backbone.body"`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty prefix, empty segments, or segments that
    /// are themselves numeric (they would be mistaken for the layer index).
    pub fn parse(prefix: &str) -> Result<Self, String> {
        let prefix = prefix.trim().trim_end_matches('.');
        if prefix.is_empty() {
            return Err("key convention prefix must not be empty".to_string());
        }
        let mut segments = Vec::new();
        for segment in prefix.split('.') {
            if segment.is_empty() {
                return Err(format!("key convention '{prefix}' has an empty segment"));
            }
            if is_index_segment(segment) {
                return Err(format!(
                    "key convention '{prefix}' contains numeric segment '{segment}'"
                ));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { prefix: segments })
    }

    /// Prefix segments preceding the layer index.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.prefix
    }

    /// Position of the layer-index segment in a key using this convention.
    #[must_use]
    pub fn index_position(&self) -> usize {
        self.prefix.len()
    }

    /// Layer index of `segments` under this convention, if it applies.
    ///
    /// The key must carry the exact prefix, a digit segment right after it,
    /// and at least one suffix segment naming the tensor within the layer.
    #[must_use]
    pub fn match_segments(&self, segments: &[&str]) -> Option<usize> {
        let pos = self.index_position();
        if segments.len() <= pos + 1 {
            return None;
        }
        let prefix_matches = self
            .prefix
            .iter()
            .zip(segments.iter())
            .all(|(expected, actual)| expected == actual);
        if !prefix_matches {
            return None;
        }
        parse_index(segments[pos])
    }
}

impl KeyNaming for KeyConvention {
    fn layer_prefix(&self, layer: usize) -> String {
        format!("{}.{layer}", self.prefix.join("."))
    }
}

impl fmt::Display for KeyConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.<i>", self.prefix.join("."))
    }
}

impl TryFrom<String> for KeyConvention {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KeyConvention> for String {
    fn from(value: KeyConvention) -> Self {
        value.prefix.join(".")
    }
}

/// Result of resolving a key: the layer index, where it sits, and which
/// convention found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMatch<'a> {
    /// Parsed layer index
    pub index: usize,
    /// Segment position of the index
    pub position: usize,
    /// Convention that matched
    pub convention: &'a KeyConvention,
}

/// Extracts layer indices from parameter keys by trying conventions in a fixed
/// priority order.
///
/// # Example
///
/// ```
/// use transplant::naming::LayerIndexResolver;
///
/// let resolver = LayerIndexResolver::default();
/// assert_eq!(resolver.layer_index("model.4.conv.weight"), Some(4));
/// assert_eq!(resolver.layer_index("model.model.4.conv.weight"), Some(4));
/// assert_eq!(resolver.layer_index("head.cls.weight"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerIndexResolver {
    conventions: Vec<KeyConvention>,
}

impl Default for LayerIndexResolver {
    /// Flat `model.<i>` first, then nested `model.model.<i>`.
    fn default() -> Self {
        Self {
            conventions: vec![
                KeyConvention::flat("model"),
                KeyConvention::nested("model", "model"),
            ],
        }
    }
}

impl LayerIndexResolver {
    /// Resolver over `conventions`, highest priority first. An empty list
    /// yields a resolver that maps every key to `None`.
    #[must_use]
    pub fn new(conventions: Vec<KeyConvention>) -> Self {
        Self { conventions }
    }

    /// Conventions in priority order.
    #[must_use]
    pub fn conventions(&self) -> &[KeyConvention] {
        &self.conventions
    }

    /// Resolve `raw` against each convention in priority order.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<LayerMatch<'_>> {
        let segments: Vec<&str> = raw.split('.').collect();
        self.resolve_segments(&segments)
    }

    pub(crate) fn resolve_segments(&self, segments: &[&str]) -> Option<LayerMatch<'_>> {
        self.conventions.iter().find_map(|convention| {
            convention
                .match_segments(segments)
                .map(|index| LayerMatch {
                    index,
                    position: convention.index_position(),
                    convention,
                })
        })
    }

    /// Layer index of `raw`, or `None` for keys that are not layer-indexed.
    #[must_use]
    pub fn layer_index(&self, raw: &str) -> Option<usize> {
        self.resolve(raw).map(|m| m.index)
    }

    /// Pick the naming convention used by a whole state: the convention that
    /// resolves the most keys, ties going to the higher-priority one. Returns
    /// `None` when no key resolves at all.
    #[must_use]
    pub fn detect<'k, I>(&self, keys: I) -> Option<KeyConvention>
    where
        I: IntoIterator<Item = &'k str>,
    {
        let mut counts = vec![0usize; self.conventions.len()];
        for key in keys {
            let segments: Vec<&str> = key.split('.').collect();
            for (count, convention) in counts.iter_mut().zip(&self.conventions) {
                if convention.match_segments(&segments).is_some() {
                    *count += 1;
                }
            }
        }
        let mut best: Option<(usize, usize)> = None;
        for (idx, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((idx, count)),
            }
        }
        best.map(|(idx, _)| self.conventions[idx].clone())
    }
}

fn is_index_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn parse_index(segment: &str) -> Option<usize> {
    if is_index_segment(segment) {
        segment.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod tests;
