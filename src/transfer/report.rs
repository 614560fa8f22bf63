//! Per-key transfer records and run summaries.

use crate::reduce::Reduction;
use crate::tensor::DType;
use serde::Serialize;
use std::fmt;

/// What happened to one target parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// Donor tensor copied with its shape unchanged. Values are element-wise
    /// equal to the donor's unless `cast_from` is set, in which case they
    /// were re-encoded in the target's dtype.
    Transferred {
        /// Donor dtype, when it differs from the target's
        #[serde(skip_serializing_if = "Option::is_none")]
        cast_from: Option<DType>,
    },
    /// Donor tensor collapsed along its input-channel axis
    ChannelReduced {
        /// Reduction applied
        reduction: Reduction,
        /// Donor input channels before reduction
        from_channels: usize,
    },
    /// Shapes differ and no reduction applied; the target keeps its value
    ShapeMismatchSkipped {
        /// Target tensor shape
        target_shape: Vec<usize>,
        /// Donor tensor shape
        source_shape: Vec<usize>,
        /// Why a configured reduction was rejected, if one was configured
        note: Option<String>,
    },
    /// Layer is mapped but the donor has no tensor under the candidate key
    SourceAbsent {
        /// Donor key that was looked up
        candidate: String,
    },
    /// No layer index, or no branch claims the layer
    Unmapped,
}

impl TransferOutcome {
    /// Target value was overwritten from a donor.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Transferred { .. } | Self::ChannelReduced { .. })
    }

    /// Mapped layer left untouched because of a mismatch or missing source.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatchSkipped { .. } | Self::SourceAbsent { .. }
        )
    }

    /// Short machine-friendly name.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transferred { .. } => "transferred",
            Self::ChannelReduced { .. } => "channel_reduced",
            Self::ShapeMismatchSkipped { .. } => "shape_mismatch",
            Self::SourceAbsent { .. } => "source_absent",
            Self::Unmapped => "unmapped",
        }
    }
}

/// Outcome for one target key, with where it would have come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    /// Target key
    pub key: String,
    /// Resolved target layer
    pub layer: Option<usize>,
    /// Branch that claims the layer
    pub branch: Option<String>,
    /// Donor id of that branch
    pub donor: Option<String>,
    /// Donor key the value was read from
    pub source_key: Option<String>,
    pub outcome: TransferOutcome,
}

impl TransferRecord {
    pub(crate) fn unmapped(key: &str, layer: Option<usize>) -> Self {
        Self {
            key: key.to_string(),
            layer,
            branch: None,
            donor: None,
            source_key: None,
            outcome: TransferOutcome::Unmapped,
        }
    }

    fn source(&self) -> String {
        match (&self.donor, &self.source_key) {
            (Some(donor), Some(key)) => format!("{donor}:{key}"),
            (Some(donor), None) => donor.clone(),
            _ => "?".to_string(),
        }
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.key)?;
        match &self.outcome {
            TransferOutcome::Transferred { cast_from } => {
                write!(f, "transferred from {}", self.source())?;
                if let Some(dtype) = cast_from {
                    write!(f, "; cast from {dtype}")?;
                }
                Ok(())
            }
            TransferOutcome::ChannelReduced {
                reduction,
                from_channels,
            } => write!(
                f,
                "channel-reduced ({reduction}, {from_channels} -> 1) from {}",
                self.source()
            ),
            TransferOutcome::ShapeMismatchSkipped {
                target_shape,
                source_shape,
                note,
            } => {
                write!(
                    f,
                    "shape mismatch, target {target_shape:?} vs source {source_shape:?} ({})",
                    self.source()
                )?;
                if let Some(note) = note {
                    write!(f, "; {note}")?;
                }
                Ok(())
            }
            TransferOutcome::SourceAbsent { candidate } => write!(
                f,
                "source absent, {} has no '{candidate}'",
                self.donor.as_deref().unwrap_or("donor")
            ),
            TransferOutcome::Unmapped => match self.layer {
                Some(layer) => write!(f, "unmapped (layer {layer} is not in any branch)"),
                None => write!(f, "unmapped (no layer index)"),
            },
        }
    }
}

/// Outcome counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub transferred: usize,
    pub channel_reduced: usize,
    pub shape_mismatch: usize,
    pub source_absent: usize,
    pub unmapped: usize,
    pub total: usize,
}

impl TransferSummary {
    /// Parameters whose value now comes from a donor.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.transferred + self.channel_reduced
    }

    /// Mapped parameters that kept their initial value.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.shape_mismatch + self.source_absent
    }

    fn count(&mut self, outcome: &TransferOutcome) {
        self.total += 1;
        match outcome {
            TransferOutcome::Transferred { .. } => self.transferred += 1,
            TransferOutcome::ChannelReduced { .. } => self.channel_reduced += 1,
            TransferOutcome::ShapeMismatchSkipped { .. } => self.shape_mismatch += 1,
            TransferOutcome::SourceAbsent { .. } => self.source_absent += 1,
            TransferOutcome::Unmapped => self.unmapped += 1,
        }
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied {}/{} (transferred {}, channel-reduced {}, shape mismatch {}, source absent {}, unmapped {})",
            self.applied(),
            self.total,
            self.transferred,
            self.channel_reduced,
            self.shape_mismatch,
            self.source_absent,
            self.unmapped
        )
    }
}

/// Every record of a run, in target key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    records: Vec<TransferRecord>,
    summary: TransferSummary,
}

impl TransferReport {
    pub(crate) fn new(records: Vec<TransferRecord>) -> Self {
        let mut summary = TransferSummary::default();
        for record in &records {
            summary.count(&record.outcome);
        }
        Self { records, summary }
    }

    #[must_use]
    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    #[must_use]
    pub fn summary(&self) -> TransferSummary {
        self.summary
    }

    /// Record for target `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TransferRecord> {
        self.records
            .binary_search_by(|r| r.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.records[i])
    }

    /// Records whose target value was overwritten.
    pub fn applied(&self) -> impl Iterator<Item = &TransferRecord> {
        self.records.iter().filter(|r| r.outcome.is_applied())
    }

    /// Mapped records that kept their initial value.
    pub fn skipped(&self) -> impl Iterator<Item = &TransferRecord> {
        self.records.iter().filter(|r| r.outcome.is_skipped())
    }
}
