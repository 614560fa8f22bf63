//! Determinism of transplant runs.
//!
//! Identical inputs must give bit-identical states and identical records,
//! whichever engine runs and however often.

use transplant::prelude::*;
use transplant::test_factory::{pygmy_donor, pygmy_target, PygmyConfig};

fn setup(preset: &str) -> (SurgeryPlan, TensorState, DonorSet) {
    let plan = SurgeryPlan::preset(preset).expect("preset");
    let config = PygmyConfig {
        width: 8,
        ..PygmyConfig::default()
    };
    let target = pygmy_target(&plan, &config);
    let donors = DonorSet::new()
        .with(Donor::detect("rgb", pygmy_donor(&config, &KeyConvention::flat("model"), 1.0)).expect("rgb"))
        .with(
            Donor::detect(
                "nir",
                pygmy_donor(&config, &KeyConvention::nested("model", "model"), 3.0),
            )
            .expect("nir"),
        );
    (plan, target, donors)
}

fn assert_bit_identical(a: &TensorState, b: &TensorState) {
    assert_eq!(a.len(), b.len());
    for ((ka, ta), (kb, tb)) in a.iter_tensors().zip(b.iter_tensors()) {
        assert_eq!(ka, kb);
        assert!(ta.bit_eq(tb), "{ka} differs");
        assert_eq!(ta.dtype(), tb.dtype());
    }
}

#[test]
fn repeated_runs_are_identical() {
    for preset in ["dual-backbone", "dual-rectify-feedback"] {
        let (plan, target, donors) = setup(preset);
        let (first, first_report) =
            transfer(&target, &donors, plan.table(), plan.policy()).expect("first");
        for _ in 0..3 {
            let (again, report) =
                transfer(&target, &donors, plan.table(), plan.policy()).expect("again");
            assert_bit_identical(&first, &again);
            assert_eq!(report, first_report);
        }
    }
}

#[test]
fn parallel_engine_matches_sequential() {
    for preset in ["dual-backbone", "dual-rectify-feedback"] {
        let (plan, target, donors) = setup(preset);
        let (seq, seq_report) =
            transfer(&target, &donors, plan.table(), plan.policy()).expect("sequential");
        let (par, par_report) =
            transfer_parallel(&target, &donors, plan.table(), plan.policy()).expect("parallel");
        assert_bit_identical(&seq, &par);
        assert_eq!(seq_report, par_report);
    }
}

#[test]
fn donor_insertion_order_does_not_matter() {
    let (plan, target, _) = setup("dual-backbone");
    let config = PygmyConfig {
        width: 8,
        ..PygmyConfig::default()
    };
    let rgb = || Donor::detect("rgb", pygmy_donor(&config, &KeyConvention::flat("model"), 1.0)).expect("rgb");
    let nir = || {
        Donor::detect(
            "nir",
            pygmy_donor(&config, &KeyConvention::nested("model", "model"), 3.0),
        )
        .expect("nir")
    };
    let forward = DonorSet::new().with(rgb()).with(nir());
    let backward = DonorSet::new().with(nir()).with(rgb());
    let (a, _) = transfer(&target, &forward, plan.table(), plan.policy()).expect("forward");
    let (b, _) = transfer(&target, &backward, plan.table(), plan.policy()).expect("backward");
    assert_bit_identical(&a, &b);
}
