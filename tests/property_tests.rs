//! Property-based tests using proptest.
//!
//! These tests verify invariants of channel reduction and the transfer
//! engine over randomly shaped inputs.

use proptest::prelude::*;
use transplant::prelude::*;

// Strategy for `[out, in, k, k]` donors with in > 1
fn conv_strategy() -> impl Strategy<Value = Tensor> {
    (1usize..6, 2usize..5, 1usize..4).prop_flat_map(|(out, inp, k)| {
        proptest::collection::vec(-10.0f32..10.0, out * inp * k * k).prop_map(move |data| {
            Tensor::new(vec![out, inp, k, k], data).expect("Test data should be valid")
        })
    })
}

fn reduced_shape(donor: &Tensor) -> Vec<usize> {
    let mut shape = donor.shape().to_vec();
    shape[1] = 1;
    shape
}

/// Reference reduction for output element `(o, s)`.
fn reference(donor: &Tensor, o: usize, s: usize, reduction: Reduction) -> f64 {
    let shape = donor.shape();
    let (inp, spatial) = (shape[1], shape[2] * shape[3]);
    let sum: f64 = (0..inp)
        .map(|c| f64::from(donor.data()[(o * inp + c) * spatial + s]))
        .sum();
    match reduction {
        Reduction::Mean => sum / inp as f64,
        Reduction::Sum => sum,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn mean_reduction_matches_reference(donor in conv_strategy()) {
        let target = reduced_shape(&donor);
        let out = reduce_input_channels(&donor, &target, Reduction::Mean).expect("mean");
        prop_assert_eq!(out.shape(), target.as_slice());
        let spatial = target[2] * target[3];
        for o in 0..target[0] {
            for s in 0..spatial {
                let expected = reference(&donor, o, s, Reduction::Mean);
                prop_assert!((f64::from(out.data()[o * spatial + s]) - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn sum_is_channel_count_times_mean(donor in conv_strategy()) {
        let target = reduced_shape(&donor);
        let mean = reduce_input_channels(&donor, &target, Reduction::Mean).expect("mean");
        let sum = reduce_input_channels(&donor, &target, Reduction::Sum).expect("sum");
        let channels = donor.shape()[1] as f32;
        for (m, s) in mean.data().iter().zip(sum.data()) {
            prop_assert!((s - channels * m).abs() < 1e-3);
        }
    }

    #[test]
    fn reduction_never_accepts_more_than_one_target_channel(
        donor in conv_strategy(),
        extra in 2usize..4,
    ) {
        let mut target = reduced_shape(&donor);
        target[1] = extra;
        prop_assert!(reduce_input_channels(&donor, &target, Reduction::Mean).is_err());
    }

    #[test]
    fn unmapped_keys_are_bit_identical(
        values in proptest::collection::vec(-1e6f32..1e6, 1..16),
        head_layer in 10usize..50,
    ) {
        let n = values.len();
        let target = TensorState::from_tensors([
            ("model.1.conv.weight".to_string(), Tensor::zeros(vec![2, 3, 1, 1])),
            (format!("model.{head_layer}.head.weight"), Tensor::new(vec![n], values.clone()).expect("head")),
            ("anchors".to_string(), Tensor::new(vec![n], values).expect("anchors")),
        ]);
        let donor = TensorState::from_tensors([
            ("model.0.conv.weight", Tensor::full(vec![2, 3, 1, 1], 4.0)),
            ("model.9.head.weight", Tensor::full(vec![n], 4.0)),
        ]);
        let donors = DonorSet::new().with(Donor::detect("d", donor).expect("donor"));
        let table = MappingTable::new(vec![BranchMapping::new("b", "d").map(1, 0)]).expect("table");

        let (state, report) = transfer(&target, &donors, &table, &ReductionPolicy::new()).expect("transfer");
        prop_assert_eq!(report.summary().unmapped, 2);
        for (key, before) in target.iter_tensors() {
            if key == "model.1.conv.weight" {
                continue;
            }
            let after = state.get(key).expect("kept");
            prop_assert!(before.bit_eq(after));
        }
    }

    #[test]
    fn every_target_key_gets_exactly_one_record(
        layers in proptest::collection::btree_set(0usize..30, 1..12),
    ) {
        let target = TensorState::from_tensors(
            layers.iter().map(|l| (format!("model.{l}.conv.weight"), Tensor::zeros(vec![2, 2]))),
        );
        let donor = TensorState::from_tensors(
            (0..5).map(|l| (format!("model.{l}.conv.weight"), Tensor::full(vec![2, 2], 1.0))),
        );
        let donors = DonorSet::new().with(Donor::detect("d", donor).expect("donor"));
        let table = MappingTable::new(vec![BranchMapping::new("b", "d").map_range(10, 0, 5)]).expect("table");

        let (_, report) = transfer(&target, &donors, &table, &ReductionPolicy::new()).expect("transfer");
        let summary = report.summary();
        prop_assert_eq!(summary.total, layers.len());
        prop_assert_eq!(
            summary.transferred,
            layers.iter().filter(|l| (10..15).contains(*l)).count()
        );
        prop_assert_eq!(summary.applied() + summary.skipped() + summary.unmapped, summary.total);
    }
}
