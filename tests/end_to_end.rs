//! End-to-end transplant scenario.
//!
//! Donor A (RGB) holds layer 0 as a `[16, 3, 3, 3]` conv of ones. Donor B
//! (NIR, RGB-trained) holds layer 3 as a `[32, 3, 3, 3]` conv of 2.0. The
//! target copies A0 into layer 1 and mean-reduces B3 into its single-channel
//! layer 4 stem.

use transplant::prelude::*;
use transplant::checkpoint::{BestFitness, FRESH_EPOCH};
use transplant::serialization::UserMetadata;
use tempfile::TempDir;

fn donor_a() -> TensorState {
    TensorState::from_tensors([("model.0.conv.weight", Tensor::full(vec![16, 3, 3, 3], 1.0))])
}

fn donor_b() -> TensorState {
    TensorState::from_tensors([("model.3.conv.weight", Tensor::full(vec![32, 3, 3, 3], 2.0))])
}

fn target() -> TensorState {
    TensorState::from_tensors([
        ("model.1.conv.weight", Tensor::full(vec![16, 3, 3, 3], -1.0)),
        ("model.4.conv.weight", Tensor::full(vec![32, 1, 3, 3], -1.0)),
    ])
}

fn plan() -> SurgeryPlan {
    let table = MappingTable::new(vec![
        BranchMapping::new("rgb", "a").map(1, 0),
        BranchMapping::new("nir", "b").map(4, 3),
    ])
    .expect("table");
    let policy = ReductionPolicy::new()
        .with_stem(4, "conv.weight", Reduction::Mean)
        .expect("policy");
    SurgeryPlan::new("scenario", table, policy).expect("plan")
}

fn donors() -> DonorSet {
    DonorSet::new()
        .with(Donor::detect("a", donor_a()).expect("a"))
        .with(Donor::detect("b", donor_b()).expect("b"))
}

#[test]
fn scenario_in_memory() {
    let plan = plan();
    let (state, report) =
        transfer(&target(), &donors(), plan.table(), plan.policy()).expect("transfer");

    let layer1 = state.get("model.1.conv.weight").expect("layer 1");
    assert_eq!(layer1, donor_a().get("model.0.conv.weight").expect("a0"));

    let layer4 = state.get("model.4.conv.weight").expect("layer 4");
    assert_eq!(layer4.shape(), &[32, 1, 3, 3]);
    assert!(layer4.data().iter().all(|&v| v == 2.0));

    let summary = report.summary();
    assert_eq!(summary.applied(), 2);
    assert_eq!(summary.skipped(), 0);
    assert_eq!(summary.total, 2);
    assert_eq!(
        report.get("model.4.conv.weight").map(|r| &r.outcome),
        Some(&TransferOutcome::ChannelReduced {
            reduction: Reduction::Mean,
            from_channels: 3
        })
    );
}

#[test]
fn scenario_through_checkpoint_files() {
    let dir = TempDir::new().expect("tempdir");
    let target_path = dir.path().join("dual.safetensors");
    let a_path = dir.path().join("a.safetensors");
    let b_path = dir.path().join("b.safetensors");
    let out_path = dir.path().join("transplanted.safetensors");

    let mut meta = UserMetadata::new();
    meta.insert("architecture".to_string(), "rgbt-dual.yaml".to_string());
    target().save(&target_path, &meta).expect("target");
    donor_a().save(&a_path, &UserMetadata::new()).expect("a");
    donor_b().save(&b_path, &UserMetadata::new()).expect("b");

    let donor_paths = [("a".to_string(), a_path), ("b".to_string(), b_path)]
        .into_iter()
        .collect();
    let report = transplant::surgery::run(
        &plan(),
        target_path.as_path(),
        &donor_paths,
        out_path.as_path(),
        SurgeryOptions {
            parallel: false,
            checkpoint: CheckpointOptions {
                include_best_fitness: true,
            },
        },
    )
    .expect("run");
    assert_eq!(report.transfer.summary().applied(), 2);

    let checkpoint = Checkpoint::load(&out_path).expect("checkpoint");
    assert_eq!(checkpoint.epoch, FRESH_EPOCH);
    assert!(checkpoint.optimizer.is_none());
    assert_eq!(checkpoint.best_fitness, BestFitness::Unset);

    // The stored model deserializes straight back into the skeleton's layout.
    let mut skeleton = Network::load(&target_path).expect("skeleton");
    let network = checkpoint.into_network();
    assert_eq!(network.architecture(), skeleton.architecture());
    skeleton
        .load_state(network.into_state())
        .expect("checkpoint matches skeleton");
    assert!(skeleton
        .state()
        .get("model.4.conv.weight")
        .expect("stem")
        .data()
        .iter()
        .all(|&v| v == 2.0));
}

#[test]
fn scenario_with_sum_reduction() {
    let table = MappingTable::new(vec![
        BranchMapping::new("rgb", "a").map(1, 0),
        BranchMapping::new("nir", "b").map(4, 3),
    ])
    .expect("table");
    let policy = ReductionPolicy::new()
        .with_stem(4, "conv.weight", Reduction::Sum)
        .expect("policy");
    let (state, _) = transfer(&target(), &donors(), &table, &policy).expect("transfer");
    assert!(state
        .get("model.4.conv.weight")
        .expect("stem")
        .data()
        .iter()
        .all(|&v| v == 6.0));
}

#[test]
fn scenario_overlapping_plan_is_rejected() {
    let err = MappingTable::new(vec![
        BranchMapping::new("rgb", "a").map(1, 0).map(4, 1),
        BranchMapping::new("nir", "b").map(4, 3),
    ])
    .unwrap_err();
    assert!(matches!(err, TransplantError::OverlappingBranches { layer: 4, .. }));
}
