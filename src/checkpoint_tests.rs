use super::*;
use crate::serialization::save_safetensors;
use crate::tensor::{DType, Tensor};
use tempfile::TempDir;

fn skeleton() -> TensorState {
    TensorState::from_tensors([
        ("model.1.conv.weight", Tensor::full(vec![16, 3, 3, 3], 0.1)),
        ("model.11.conv.weight", Tensor::full(vec![16, 1, 3, 3], 0.2)),
        (
            "model.11.bn.num_batches_tracked",
            Tensor::with_dtype(vec![], vec![0.0], DType::I64).expect("i64"),
        ),
    ])
}

fn summary() -> TransferSummary {
    TransferSummary {
        transferred: 1,
        channel_reduced: 1,
        shape_mismatch: 0,
        source_absent: 0,
        unmapped: 1,
        total: 3,
    }
}

// ========================================================================
// Network
// ========================================================================

#[test]
fn test_network_architecture_from_metadata() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("skeleton.safetensors");
    let mut meta = UserMetadata::new();
    meta.insert("architecture".to_string(), "yolo11-dual.yaml".to_string());
    skeleton().save(&path, &meta).expect("save");

    let network = Network::load(&path).expect("load");
    assert_eq!(network.architecture(), "yolo11-dual.yaml");
    assert_eq!(network.state(), &skeleton());
}

#[test]
fn test_network_architecture_falls_back_to_file_stem() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("rgbt_dual.safetensors");
    skeleton().save(&path, &UserMetadata::new()).expect("save");
    assert_eq!(Network::load(&path).expect("load").architecture(), "rgbt_dual");
}

#[test]
fn test_load_state_accepts_matching_state() {
    let mut network = Network::new("dual", skeleton());
    let mut updated = skeleton();
    updated.insert("model.1.conv.weight", Tensor::full(vec![16, 3, 3, 3], 1.0));
    network.load_state(updated.clone()).expect("compatible");
    assert_eq!(network.state(), &updated);
}

#[test]
fn test_load_state_rejects_incompatible_state() {
    let mut network = Network::new("dual", skeleton());

    let mut reshaped = skeleton();
    reshaped.insert("model.11.conv.weight", Tensor::zeros(vec![16, 3, 3, 3]));
    let err = network.load_state(reshaped).unwrap_err();
    assert!(err.to_string().contains("model.11.conv.weight"));

    let mut extra = skeleton();
    extra.insert("model.99.w", Tensor::zeros(vec![1]));
    assert!(network.load_state(extra).unwrap_err().to_string().contains("unexpected"));

    let missing = TensorState::from_tensors([("model.1.conv.weight", Tensor::zeros(vec![16, 3, 3, 3]))]);
    assert!(network.load_state(missing).unwrap_err().to_string().contains("missing"));

    assert_eq!(network.state(), &skeleton());
}

// ========================================================================
// Checkpoint
// ========================================================================

#[test]
fn test_assemble_fresh_fields() {
    let checkpoint = Checkpoint::assemble(Network::new("dual", skeleton()), CheckpointOptions::default());
    assert_eq!(checkpoint.epoch, -1);
    assert!(checkpoint.optimizer.is_none());
    assert_eq!(checkpoint.best_fitness, BestFitness::Omitted);
    assert!(checkpoint.provenance.is_none());

    let with_fitness = Checkpoint::assemble(
        Network::new("dual", skeleton()),
        CheckpointOptions {
            include_best_fitness: true,
        },
    );
    assert_eq!(with_fitness.best_fitness, BestFitness::Unset);
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("ckpt.safetensors");
    let checkpoint = Checkpoint::assemble(
        Network::new("yolo11-dual.yaml", skeleton()),
        CheckpointOptions {
            include_best_fitness: true,
        },
    )
    .with_provenance(Provenance::new(["rgb", "nir"], summary()));

    let size = checkpoint.save(&path).expect("save");
    assert_eq!(size, std::fs::metadata(&path).expect("stat").len());

    let loaded = Checkpoint::load(&path).expect("load");
    assert_eq!(loaded, checkpoint);
    assert_eq!(
        loaded.provenance.as_ref().map(|p| p.donors.clone()),
        Some(vec!["nir".to_string(), "rgb".to_string()])
    );

    let network = loaded.into_network();
    assert_eq!(network.architecture(), "yolo11-dual.yaml");
    assert_eq!(
        network.state().get("model.11.bn.num_batches_tracked").map(Tensor::dtype),
        Some(DType::I64)
    );
}

#[test]
fn test_metadata_entries_on_disk() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("ckpt.safetensors");
    Checkpoint::assemble(Network::new("dual", skeleton()), CheckpointOptions::default())
        .save(&path)
        .expect("save");

    let mapped = crate::serialization::MappedSafeTensors::open(&path).expect("open");
    let meta = mapped.user_metadata();
    assert_eq!(meta.get("format").map(String::as_str), Some(CHECKPOINT_FORMAT));
    assert_eq!(meta.get("epoch").map(String::as_str), Some("-1"));
    assert_eq!(meta.get("optimizer").map(String::as_str), Some("null"));
    assert!(!meta.contains_key("best_fitness"));
}

#[test]
fn test_recorded_best_fitness_and_optimizer_read_back() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("trained.safetensors");
    let mut checkpoint = Checkpoint::assemble(Network::new("dual", skeleton()), CheckpointOptions::default());
    checkpoint.epoch = 12;
    checkpoint.best_fitness = BestFitness::Value(0.625);
    checkpoint.optimizer = Some(serde_json::json!({"lr": 0.01}));
    checkpoint.save(&path).expect("save");

    let loaded = Checkpoint::load(&path).expect("load");
    assert_eq!(loaded.epoch, 12);
    assert_eq!(loaded.best_fitness, BestFitness::Value(0.625));
    assert_eq!(loaded.optimizer, Some(serde_json::json!({"lr": 0.01})));
}

#[test]
fn test_load_rejects_plain_state_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("plain.safetensors");
    skeleton().save(&path, &UserMetadata::new()).expect("save");
    let err = Checkpoint::load(&path).unwrap_err();
    assert!(matches!(err, TransplantError::Checkpoint { .. }));
    assert!(err.to_string().contains("no format entry"));
}

#[test]
fn test_load_rejects_foreign_format_and_bad_epoch() {
    let dir = TempDir::new().expect("tempdir");
    let weight = Tensor::zeros(vec![1]);

    let foreign = dir.path().join("foreign.safetensors");
    let mut meta = UserMetadata::new();
    meta.insert("format".to_string(), "pt".to_string());
    save_safetensors(&foreign, [("w", &weight)], &meta).expect("save");
    assert!(Checkpoint::load(&foreign)
        .unwrap_err()
        .to_string()
        .contains("unsupported format 'pt'"));

    let bad_epoch = dir.path().join("bad_epoch.safetensors");
    meta.insert("format".to_string(), CHECKPOINT_FORMAT.to_string());
    meta.insert("architecture".to_string(), "dual".to_string());
    meta.insert("epoch".to_string(), "minus one".to_string());
    save_safetensors(&bad_epoch, [("w", &weight)], &meta).expect("save");
    assert!(Checkpoint::load(&bad_epoch)
        .unwrap_err()
        .to_string()
        .contains("bad epoch"));
}

#[test]
fn test_is_checkpoint_file_reads_format_entry() {
    let dir = TempDir::new().expect("tempdir");
    let weight = Tensor::zeros(vec![1]);
    let write = |name: &str, format: Option<&str>| {
        let path = dir.path().join(name);
        let mut meta = UserMetadata::new();
        if let Some(format) = format {
            meta.insert("format".to_string(), format.to_string());
        }
        save_safetensors(&path, [("w", &weight)], &meta).expect("save");
        path
    };

    assert!(!Checkpoint::is_checkpoint_file(write("plain.safetensors", None)).expect("plain"));
    assert!(!Checkpoint::is_checkpoint_file(write("pt.safetensors", Some("pt"))).expect("pt"));
    assert!(Checkpoint::is_checkpoint_file(write("v1.safetensors", Some(CHECKPOINT_FORMAT))).expect("v1"));
    assert!(Checkpoint::is_checkpoint_file(write(
        "v9.safetensors",
        Some("transplant.checkpoint.v9")
    ))
    .expect("v9"));
}
