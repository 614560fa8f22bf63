//! Networks and training checkpoints.
//!
//! A [`Network`] pairs a state with the architecture it belongs to. A
//! [`Checkpoint`] wraps a network in the fields a trainer expects when it
//! resumes: an epoch counter of `-1` (no training has happened), no optimizer
//! state, and optionally an unset best-fitness slot.
//!
//! Checkpoints are SafeTensors files. Tensors hold the network state in the
//! dtypes they were loaded with; `__metadata__` holds everything else:
//!
//! ```text
//! format              transplant.checkpoint.v1
//! architecture        yolo11-dual.yaml
//! epoch               -1
//! optimizer           null
//! best_fitness        null            (only when requested)
//! transplant.donors   nir,rgb
//! transplant.*        outcome counts of the transfer run
//! ```

use crate::error::{Result, TransplantError};
use crate::naming::LayerIndexResolver;
use crate::serialization::{MappedSafeTensors, UserMetadata};
use crate::state::TensorState;
use crate::transfer::TransferSummary;
use std::fs;
use std::path::Path;
use tracing::info;

/// Value of the `format` metadata entry.
pub const CHECKPOINT_FORMAT: &str = "transplant.checkpoint.v1";

// Shared by every version of the checkpoint format.
const FORMAT_FAMILY: &str = "transplant.checkpoint";

/// Epoch recorded for a network that has not been trained yet.
pub const FRESH_EPOCH: i64 = -1;

const KEY_FORMAT: &str = "format";
const KEY_ARCHITECTURE: &str = "architecture";
const KEY_EPOCH: &str = "epoch";
const KEY_OPTIMIZER: &str = "optimizer";
const KEY_BEST_FITNESS: &str = "best_fitness";
const KEY_DONORS: &str = "transplant.donors";
const NULL: &str = "null";

fn checkpoint_err(message: impl Into<String>) -> TransplantError {
    TransplantError::Checkpoint {
        message: message.into(),
    }
}

// ============================================================================
// NETWORK
// ============================================================================

/// A network state tagged with the architecture it was instantiated from.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    architecture: String,
    state: TensorState,
}

impl Network {
    #[must_use]
    pub fn new(architecture: impl Into<String>, state: TensorState) -> Self {
        Self {
            architecture: architecture.into(),
            state,
        }
    }

    /// Load a network skeleton from a SafeTensors file.
    ///
    /// The architecture name comes from `__metadata__["architecture"]` when
    /// present, otherwise from the file stem.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_resolver(path, LayerIndexResolver::default())
    }

    /// [`Network::load`] parsing keys with `resolver`.
    ///
    /// # Errors
    ///
    /// See [`Network::load`].
    pub fn load_with_resolver<P: AsRef<Path>>(path: P, resolver: LayerIndexResolver) -> Result<Self> {
        let path = path.as_ref();
        let (state, metadata) = TensorState::load_with_metadata(path, resolver)?;
        let architecture = metadata
            .get(KEY_ARCHITECTURE)
            .cloned()
            .or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        Ok(Self::new(architecture, state))
    }

    #[must_use]
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    #[must_use]
    pub fn state(&self) -> &TensorState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> TensorState {
        self.state
    }

    /// Replace the network's state with `state`, which must have exactly the
    /// same keys and shapes.
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::Checkpoint`] naming the first key that is
    /// missing, unexpected, or shaped differently. The network is unchanged on
    /// error.
    pub fn load_state(&mut self, state: TensorState) -> Result<()> {
        check_compatible(&self.state, &state)?;
        self.state = state;
        Ok(())
    }
}

fn check_compatible(expected: &TensorState, actual: &TensorState) -> Result<()> {
    for (key, tensor) in expected.iter_tensors() {
        let Some(other) = actual.get(key) else {
            return Err(checkpoint_err(format!("missing key '{key}'")));
        };
        if other.shape() != tensor.shape() {
            return Err(checkpoint_err(format!(
                "'{key}' has shape {:?}, network expects {:?}",
                other.shape(),
                tensor.shape()
            )));
        }
    }
    if let Some(extra) = actual.keys().find(|key| !expected.contains(key)) {
        return Err(checkpoint_err(format!("unexpected key '{extra}'")));
    }
    Ok(())
}

// ============================================================================
// CHECKPOINT
// ============================================================================

/// Best-fitness slot of a checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum BestFitness {
    /// Field not written at all
    #[default]
    Omitted,
    /// Field written as `null`
    Unset,
    /// Recorded fitness value
    Value(f64),
}

/// Options for assembling a checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointOptions {
    /// Write an unset `best_fitness` entry.
    pub include_best_fitness: bool,
}

/// Where the weights of a transplanted network came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Donor ids, sorted
    pub donors: Vec<String>,
    /// Outcome counts of the transfer run
    pub summary: TransferSummary,
}

impl Provenance {
    #[must_use]
    pub fn new<I, S>(donors: I, summary: TransferSummary) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut donors: Vec<String> = donors.into_iter().map(Into::into).collect();
        donors.sort();
        donors.dedup();
        Self { donors, summary }
    }

    fn write(&self, metadata: &mut UserMetadata) {
        metadata.insert(KEY_DONORS.to_string(), self.donors.join(","));
        for (name, count) in summary_fields(&self.summary) {
            metadata.insert(format!("transplant.{name}"), count.to_string());
        }
    }

    fn read(metadata: &UserMetadata) -> Result<Option<Self>> {
        let Some(donors) = metadata.get(KEY_DONORS) else {
            return Ok(None);
        };
        let count = |name: &str| -> Result<usize> {
            let key = format!("transplant.{name}");
            metadata
                .get(&key)
                .ok_or_else(|| checkpoint_err(format!("missing '{key}'")))?
                .parse()
                .map_err(|e| checkpoint_err(format!("bad '{key}': {e}")))
        };
        let summary = TransferSummary {
            transferred: count("transferred")?,
            channel_reduced: count("channel_reduced")?,
            shape_mismatch: count("shape_mismatch")?,
            source_absent: count("source_absent")?,
            unmapped: count("unmapped")?,
            total: count("total")?,
        };
        let donors = donors
            .split(',')
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        Ok(Some(Self::new(donors, summary)))
    }
}

fn summary_fields(summary: &TransferSummary) -> [(&'static str, usize); 6] {
    [
        ("transferred", summary.transferred),
        ("channel_reduced", summary.channel_reduced),
        ("shape_mismatch", summary.shape_mismatch),
        ("source_absent", summary.source_absent),
        ("unmapped", summary.unmapped),
        ("total", summary.total),
    ]
}

/// A network packaged for a trainer to resume from.
///
/// # Example
///
/// ```
/// use transplant::checkpoint::{Checkpoint, CheckpointOptions, Network, FRESH_EPOCH};
/// use transplant::state::TensorState;
/// use transplant::tensor::Tensor;
///
/// let state = TensorState::from_tensors([("model.0.conv.weight", Tensor::zeros(vec![4, 1, 3, 3]))]);
/// let checkpoint = Checkpoint::assemble(Network::new("dual.yaml", state), CheckpointOptions::default());
/// assert_eq!(checkpoint.epoch, FRESH_EPOCH);
/// assert!(checkpoint.optimizer.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub model: Network,
    pub epoch: i64,
    /// Serialized optimizer state. Always `None` for a fresh network.
    pub optimizer: Option<serde_json::Value>,
    pub best_fitness: BestFitness,
    pub provenance: Option<Provenance>,
}

impl Checkpoint {
    /// Wrap a freshly initialised network.
    #[must_use]
    pub fn assemble(model: Network, options: CheckpointOptions) -> Self {
        Self {
            model,
            epoch: FRESH_EPOCH,
            optimizer: None,
            best_fitness: if options.include_best_fitness {
                BestFitness::Unset
            } else {
                BestFitness::Omitted
            },
            provenance: None,
        }
    }

    /// Attach transfer provenance.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    fn metadata(&self) -> Result<UserMetadata> {
        let mut metadata = UserMetadata::new();
        metadata.insert(KEY_FORMAT.to_string(), CHECKPOINT_FORMAT.to_string());
        metadata.insert(KEY_ARCHITECTURE.to_string(), self.model.architecture.clone());
        metadata.insert(KEY_EPOCH.to_string(), self.epoch.to_string());
        let optimizer = match &self.optimizer {
            Some(value) => serde_json::to_string(value)
                .map_err(|e| checkpoint_err(format!("optimizer state: {e}")))?,
            None => NULL.to_string(),
        };
        metadata.insert(KEY_OPTIMIZER.to_string(), optimizer);
        match self.best_fitness {
            BestFitness::Omitted => {}
            BestFitness::Unset => {
                metadata.insert(KEY_BEST_FITNESS.to_string(), NULL.to_string());
            }
            BestFitness::Value(v) => {
                metadata.insert(KEY_BEST_FITNESS.to_string(), v.to_string());
            }
        }
        if let Some(provenance) = &self.provenance {
            provenance.write(&mut metadata);
        }
        Ok(metadata)
    }

    /// Write the checkpoint and return the file size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let path = path.as_ref();
        self.model.state.save(path, &self.metadata()?)?;
        let size = fs::metadata(path)?.len();
        info!(
            path = %path.display(),
            architecture = %self.model.architecture,
            tensors = self.model.state.len(),
            bytes = size,
            "checkpoint written"
        );
        Ok(size)
    }

    /// Read a checkpoint written by [`Checkpoint::save`].
    ///
    /// # Errors
    ///
    /// Returns [`TransplantError::Checkpoint`] if the file is not a transplant
    /// checkpoint or a metadata entry is malformed, and I/O or format errors
    /// from reading the tensors.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (state, metadata) = TensorState::load_with_metadata(path, LayerIndexResolver::default())?;

        match metadata.get(KEY_FORMAT).map(String::as_str) {
            Some(CHECKPOINT_FORMAT) => {}
            Some(other) => {
                return Err(checkpoint_err(format!("unsupported format '{other}'")));
            }
            None => return Err(checkpoint_err("not a transplant checkpoint (no format entry)")),
        }

        let architecture = metadata
            .get(KEY_ARCHITECTURE)
            .cloned()
            .ok_or_else(|| checkpoint_err("no architecture recorded"))?;
        let epoch = metadata
            .get(KEY_EPOCH)
            .ok_or_else(|| checkpoint_err("no epoch recorded"))?
            .parse::<i64>()
            .map_err(|e| checkpoint_err(format!("bad epoch: {e}")))?;
        let optimizer = match metadata.get(KEY_OPTIMIZER).map(String::as_str) {
            None | Some(NULL) => None,
            Some(raw) => Some(
                serde_json::from_str(raw)
                    .map_err(|e| checkpoint_err(format!("bad optimizer state: {e}")))?,
            ),
        };
        let best_fitness = match metadata.get(KEY_BEST_FITNESS).map(String::as_str) {
            None => BestFitness::Omitted,
            Some(NULL) => BestFitness::Unset,
            Some(raw) => BestFitness::Value(
                raw.parse()
                    .map_err(|e| checkpoint_err(format!("bad best_fitness: {e}")))?,
            ),
        };

        Ok(Self {
            model: Network::new(architecture, state),
            epoch,
            optimizer,
            best_fitness,
            provenance: Provenance::read(&metadata)?,
        })
    }

    /// Whether `path` declares itself a transplant checkpoint of any version.
    ///
    /// Files without a `format` entry, or with a foreign one such as `pt`,
    /// are plain tensor files. A `true` answer says nothing about whether the
    /// remaining entries are well formed; [`Checkpoint::load`] checks those.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its header is invalid.
    pub fn is_checkpoint_file<P: AsRef<Path>>(path: P) -> Result<bool> {
        let mapped = MappedSafeTensors::open(path)?;
        Ok(mapped
            .user_metadata()
            .get(KEY_FORMAT)
            .is_some_and(|format| format.starts_with(FORMAT_FAMILY)))
    }

    #[must_use]
    pub fn into_network(self) -> Network {
        self.model
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
