//! Network state: parameter key → tensor.
//!
//! A [`TensorState`] owns its tensors and the parsed form of every key. Keys
//! are parsed exactly once, on insertion, with the state's
//! [`LayerIndexResolver`].

use crate::error::Result;
use crate::key::ParameterKey;
use crate::naming::{KeyConvention, LayerIndexResolver};
use crate::serialization::{save_safetensors, MappedSafeTensors, UserMetadata};
use crate::tensor::Tensor;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// One parameter of a state: its parsed key and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub key: ParameterKey,
    pub tensor: Tensor,
}

/// Ordered mapping from raw key to [`Parameter`].
#[derive(Debug, Clone, PartialEq)]
pub struct TensorState {
    resolver: LayerIndexResolver,
    entries: BTreeMap<String, Parameter>,
}

impl Default for TensorState {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorState {
    /// Empty state using the default `model.<i>` / `model.model.<i>` resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolver(LayerIndexResolver::default())
    }

    /// Empty state parsing keys with `resolver`.
    #[must_use]
    pub fn with_resolver(resolver: LayerIndexResolver) -> Self {
        Self {
            resolver,
            entries: BTreeMap::new(),
        }
    }

    /// Build a state from `(key, tensor)` pairs.
    #[must_use]
    pub fn from_tensors<I, K>(tensors: I) -> Self
    where
        I: IntoIterator<Item = (K, Tensor)>,
        K: Into<String>,
    {
        let mut state = Self::new();
        for (key, tensor) in tensors {
            state.insert(key, tensor);
        }
        state
    }

    /// Load every tensor of a `SafeTensors` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any tensor fails to
    /// decode. Nothing is returned partially.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_resolver(path, LayerIndexResolver::default())
    }

    /// [`TensorState::load`] with a custom resolver.
    ///
    /// # Errors
    ///
    /// See [`TensorState::load`].
    pub fn load_with_resolver<P: AsRef<Path>>(path: P, resolver: LayerIndexResolver) -> Result<Self> {
        let (state, _) = Self::load_with_metadata(path, resolver)?;
        Ok(state)
    }

    pub(crate) fn load_with_metadata<P: AsRef<Path>>(
        path: P,
        resolver: LayerIndexResolver,
    ) -> Result<(Self, UserMetadata)> {
        let path = path.as_ref();
        let mapped = MappedSafeTensors::open(path)?;
        let mut state = Self::with_resolver(resolver);
        for (name, tensor) in mapped.tensors()? {
            state.insert(name, tensor);
        }
        info!(
            path = %path.display(),
            tensors = state.len(),
            layer_indexed = state.layer_indexed().count(),
            "loaded state"
        );
        Ok((state, mapped.user_metadata().clone()))
    }

    /// Write the state to a `SafeTensors` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P, metadata: &UserMetadata) -> Result<()> {
        save_safetensors(path, self.iter_tensors(), metadata)
    }

    /// Insert or replace a parameter, parsing its key. Returns the previous
    /// tensor under that key.
    pub fn insert<K: Into<String>>(&mut self, raw: K, tensor: Tensor) -> Option<Tensor> {
        let raw = raw.into();
        let key = ParameterKey::parse(&raw, &self.resolver);
        self.entries
            .insert(raw, Parameter { key, tensor })
            .map(|old| old.tensor)
    }

    /// Replace the tensor of an existing key without re-parsing it.
    pub(crate) fn replace_tensor(&mut self, raw: &str, tensor: Tensor) -> Option<Tensor> {
        self.entries
            .get_mut(raw)
            .map(|param| std::mem::replace(&mut param.tensor, tensor))
    }

    #[must_use]
    pub fn get(&self, raw: &str) -> Option<&Tensor> {
        self.entries.get(raw).map(|p| &p.tensor)
    }

    #[must_use]
    pub fn parameter(&self, raw: &str) -> Option<&Parameter> {
        self.entries.get(raw)
    }

    #[must_use]
    pub fn contains(&self, raw: &str) -> bool {
        self.entries.contains_key(raw)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.values()
    }

    /// `(raw key, tensor)` pairs in key order.
    pub fn iter_tensors(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), &p.tensor))
    }

    /// Raw keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Parameters whose key carries a layer index.
    pub fn layer_indexed(&self) -> impl Iterator<Item = &Parameter> {
        self.iter().filter(|p| p.key.layer().is_some())
    }

    /// Distinct layer indices present, ascending.
    #[must_use]
    pub fn layers(&self) -> Vec<usize> {
        let mut layers: Vec<usize> = self.iter().filter_map(|p| p.key.layer()).collect();
        layers.sort_unstable();
        layers.dedup();
        layers
    }

    #[must_use]
    pub fn resolver(&self) -> &LayerIndexResolver {
        &self.resolver
    }

    /// Naming convention most keys of this state follow.
    #[must_use]
    pub fn detect_naming(&self) -> Option<KeyConvention> {
        self.resolver.detect(self.keys())
    }

    /// Total element count across all tensors.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.iter().map(|p| p.tensor.numel()).sum()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
