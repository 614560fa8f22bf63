//! Inspect command implementation
//!
//! Lists the keys of a tensor file with the layer index and naming
//! convention the default resolver finds for each. Transplant checkpoints
//! also show their training fields and provenance.

use crate::error::{CliError, Result};
use crate::output;
use serde::Serialize;
use std::path::Path;
use transplant::checkpoint::{BestFitness, Checkpoint, Network, Provenance};

#[derive(Serialize)]
struct KeyJson<'a> {
    key: &'a str,
    layer: Option<usize>,
    convention: Option<String>,
    shape: &'a [usize],
    dtype: &'static str,
}

#[derive(Serialize)]
struct CheckpointJson<'a> {
    epoch: i64,
    best_fitness: Option<Option<f64>>,
    donors: Option<&'a [String]>,
}

#[derive(Serialize)]
struct InspectJson<'a> {
    file: &'a Path,
    architecture: &'a str,
    naming: Option<String>,
    parameters: usize,
    elements: usize,
    checkpoint: Option<CheckpointJson<'a>>,
    keys: Vec<KeyJson<'a>>,
}

/// Training fields of a checkpoint file
struct CheckpointInfo {
    epoch: i64,
    best_fitness: BestFitness,
    provenance: Option<Provenance>,
}

fn load(file: &Path) -> Result<(Network, Option<CheckpointInfo>)> {
    if !Checkpoint::is_checkpoint_file(file)? {
        return Ok((Network::load(file)?, None));
    }
    // A corrupt checkpoint entry is an error, not a plain file
    let checkpoint = Checkpoint::load(file)?;
    let info = CheckpointInfo {
        epoch: checkpoint.epoch,
        best_fitness: checkpoint.best_fitness,
        provenance: checkpoint.provenance.clone(),
    };
    Ok((checkpoint.into_network(), Some(info)))
}

/// Run the inspect command
pub(crate) fn run(file: &Path, filter: Option<&str>, limit: usize, json: bool) -> Result<()> {
    if !file.exists() {
        return Err(CliError::FileNotFound(file.to_path_buf()));
    }
    if !file.is_file() {
        return Err(CliError::InvalidArgument(format!(
            "not a file: {}",
            file.display()
        )));
    }

    let (network, checkpoint) = load(file)?;
    let state = network.state();
    let naming = state.detect_naming().map(|c| c.to_string());
    let selected = state
        .iter()
        .filter(|p| filter.map_or(true, |f| p.key.as_str().contains(f)))
        .take(limit);

    if json {
        let keys = selected
            .map(|p| KeyJson {
                key: p.key.as_str(),
                layer: p.key.layer(),
                convention: p.key.convention().map(ToString::to_string),
                shape: p.tensor.shape(),
                dtype: p.tensor.dtype().as_str(),
            })
            .collect();
        let checkpoint = checkpoint.as_ref().map(|c| CheckpointJson {
            epoch: c.epoch,
            best_fitness: match c.best_fitness {
                BestFitness::Omitted => None,
                BestFitness::Unset => Some(None),
                BestFitness::Value(v) => Some(Some(v)),
            },
            donors: c.provenance.as_ref().map(|p| p.donors.as_slice()),
        });
        output::json(&InspectJson {
            file,
            architecture: network.architecture(),
            naming,
            parameters: state.len(),
            elements: state.num_elements(),
            checkpoint,
            keys,
        })?;
        return Ok(());
    }

    output::section("Model");
    output::kv("File", file.display());
    output::kv("Architecture", network.architecture());
    output::kv("Naming", naming.as_deref().unwrap_or("none (no layer-indexed keys)"));
    output::kv("Parameters", state.len());
    output::kv("Elements", state.num_elements());
    output::kv("Layers", state.layers().len());

    if let Some(info) = &checkpoint {
        output::section("Checkpoint");
        output::kv("Epoch", info.epoch);
        match info.best_fitness {
            BestFitness::Omitted => {}
            BestFitness::Unset => output::kv("Best fitness", "unset"),
            BestFitness::Value(v) => output::kv("Best fitness", v),
        }
        if let Some(provenance) = &info.provenance {
            output::kv("Donors", provenance.donors.join(", "));
            output::kv("Transfer", provenance.summary);
        }
    }

    output::section("Keys");
    let mut shown = 0;
    for p in selected {
        let layer = p
            .key
            .layer()
            .map_or_else(|| "-".to_string(), |l| l.to_string());
        println!(
            "  {:<48} layer {:>4}  {:<5} {:?}",
            p.key.as_str(),
            layer,
            p.tensor.dtype().as_str(),
            p.tensor.shape()
        );
        shown += 1;
    }
    if shown < state.len() {
        output::info(&format!("showing {shown} of {} keys", state.len()));
    }
    Ok(())
}
