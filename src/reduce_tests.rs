use super::*;
use crate::naming::LayerIndexResolver;
use crate::tensor::DType;

/// `[2, 3, 1, 2]` donor whose channel `c` of filter `o` holds `10*o + c` and
/// `10*o + c + 0.5`.
fn ramp() -> Tensor {
    let mut data = Vec::new();
    for o in 0..2 {
        for c in 0..3 {
            let base = (10 * o + c) as f32;
            data.extend_from_slice(&[base, base + 0.5]);
        }
    }
    Tensor::new(vec![2, 3, 1, 2], data).expect("ramp")
}

// ========================================================================
// Operator
// ========================================================================

#[test]
fn test_mean_reduction() {
    let out = reduce_input_channels(&ramp(), &[2, 1, 1, 2], Reduction::Mean).expect("mean");
    assert_eq!(out.shape(), &[2, 1, 1, 2]);
    // filter 0: mean(0,1,2)=1, mean(0.5,1.5,2.5)=1.5; filter 1: 11, 11.5
    assert_eq!(out.data(), &[1.0, 1.5, 11.0, 11.5]);
}

#[test]
fn test_sum_reduction() {
    let out = reduce_input_channels(&ramp(), &[2, 1, 1, 2], Reduction::Sum).expect("sum");
    assert_eq!(out.data(), &[3.0, 4.5, 33.0, 34.5]);
}

#[test]
fn test_mean_and_sum_differ_for_multi_channel() {
    let mean = reduce_input_channels(&ramp(), &[2, 1, 1, 2], Reduction::Mean).expect("mean");
    let sum = reduce_input_channels(&ramp(), &[2, 1, 1, 2], Reduction::Sum).expect("sum");
    assert_ne!(mean, sum);
    for (m, s) in mean.data().iter().zip(sum.data()) {
        assert!((s - 3.0 * m).abs() < 1e-5);
    }
}

#[test]
fn test_uniform_donor_mean_is_identity_value() {
    let donor = Tensor::full(vec![32, 3, 3, 3], 2.0);
    let out = reduce_input_channels(&donor, &[32, 1, 3, 3], Reduction::Mean).expect("mean");
    assert_eq!(out.numel(), 32 * 9);
    assert!(out.data().iter().all(|&v| v == 2.0));
}

#[test]
fn test_rank_two_linear_weight() {
    let donor = Tensor::new(vec![2, 4], vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 8.0]).expect("w");
    let out = reduce_input_channels(&donor, &[2, 1], Reduction::Mean).expect("mean");
    assert_eq!(out.data(), &[2.5, 2.0]);
}

#[test]
fn test_keeps_donor_dtype() {
    let donor = Tensor::full(vec![4, 3, 1, 1], 0.5).cast_to(DType::F16);
    let out = reduce_input_channels(&donor, &[4, 1, 1, 1], Reduction::Sum).expect("sum");
    assert_eq!(out.dtype(), DType::F16);
    assert!(out.data().iter().all(|&v| v == 1.5));
}

#[test]
fn test_rejections() {
    let donor = ramp();
    let cases: [(&[usize], &str); 6] = [
        (&[2], "rank 2"),
        (&[2, 1, 2], "ranks differ"),
        (&[4, 1, 1, 2], "output channels"),
        (&[2, 1, 2, 2], "spatial"),
        (&[2, 2, 1, 2], "single input channel"),
        (&[2, 3, 1, 2], "single input channel"),
    ];
    for (target, reason) in cases {
        let err = reduce_input_channels(&donor, target, Reduction::Mean).unwrap_err();
        assert!(
            matches!(err, TransplantError::InvalidReduction { .. }),
            "{target:?}: {err}"
        );
        assert!(err.to_string().contains(reason), "{target:?}: {err}");
    }
}

#[test]
fn test_reject_single_channel_donor() {
    let donor = Tensor::zeros(vec![4, 1, 3, 3]);
    let err = reduce_input_channels(&donor, &[4, 1, 3, 3], Reduction::Sum).unwrap_err();
    assert!(err.to_string().contains("no extra input channels"));
}

#[test]
fn test_reject_integer_donor() {
    let donor = Tensor::with_dtype(vec![1, 3], vec![1.0, 2.0, 3.0], DType::I64).expect("i64");
    assert!(reduce_input_channels(&donor, &[1, 1], Reduction::Sum).is_err());
}

#[test]
fn test_is_channel_compression() {
    assert!(is_channel_compression(&[16, 3, 3, 3], &[16, 1, 3, 3]));
    assert!(!is_channel_compression(&[16, 3, 3, 3], &[32, 1, 3, 3]));
    assert!(!is_channel_compression(&[16, 3, 3, 3], &[16, 3, 3, 3]));
}

#[test]
fn test_reduction_from_str() {
    assert_eq!("MEAN".parse::<Reduction>(), Ok(Reduction::Mean));
    assert_eq!("sum".parse::<Reduction>(), Ok(Reduction::Sum));
    assert!("max".parse::<Reduction>().is_err());
    assert_eq!(Reduction::Sum.to_string(), "sum");
}

// ========================================================================
// Policy
// ========================================================================

#[test]
fn test_policy_lookup_by_key() {
    let policy = ReductionPolicy::new()
        .with_stem(11, "conv.weight", Reduction::Mean)
        .expect("stem");
    let resolver = LayerIndexResolver::default();

    let stem = ParameterKey::parse("model.11.conv.weight", &resolver);
    let nested = ParameterKey::parse("model.model.11.conv.weight", &resolver);
    let other_layer = ParameterKey::parse("model.1.conv.weight", &resolver);
    let other_suffix = ParameterKey::parse("model.11.bn.weight", &resolver);
    let unindexed = ParameterKey::parse("head.conv.weight", &resolver);

    assert_eq!(policy.reduction_for(&stem), Some(Reduction::Mean));
    assert_eq!(policy.reduction_for(&nested), Some(Reduction::Mean));
    assert_eq!(policy.reduction_for(&other_layer), None);
    assert_eq!(policy.reduction_for(&other_suffix), None);
    assert_eq!(policy.reduction_for(&unindexed), None);
}

#[test]
fn test_policy_has_no_default() {
    let policy = ReductionPolicy::default();
    assert!(policy.is_empty());
    assert_eq!(policy.get(0, "conv.weight"), None);
}

#[test]
fn test_policy_conflicting_rule_rejected() {
    let policy = ReductionPolicy::new()
        .with_stem(4, "conv.weight", Reduction::Sum)
        .expect("stem");
    let same = policy.clone().with_stem(4, "conv.weight", Reduction::Sum);
    assert!(same.is_ok());
    let err = policy.with_stem(4, "conv.weight", Reduction::Mean).unwrap_err();
    assert!(err.is_mapping_error());
}

#[test]
fn test_policy_normalises_suffix() {
    let policy = ReductionPolicy::new()
        .with_stem(4, ".conv.weight ", Reduction::Sum)
        .expect("stem");
    assert_eq!(policy.get(4, "conv.weight"), Some(Reduction::Sum));
    assert!(ReductionPolicy::new().with_stem(4, " . ", Reduction::Sum).is_err());
}

#[test]
fn test_policy_rules_and_layers() {
    let policy = ReductionPolicy::new()
        .with_stem(11, "conv.weight", Reduction::Mean)
        .and_then(|p| p.with_stem(4, "conv.weight", Reduction::Sum))
        .and_then(|p| p.with_stem(4, "cv1.conv.weight", Reduction::Sum))
        .expect("stems");
    assert_eq!(policy.len(), 3);
    assert_eq!(policy.layers().collect::<Vec<_>>(), vec![4, 11]);
    let rules = policy.rules();
    assert_eq!(rules[0].layer, 4);
    assert_eq!(rules[0].suffix, "conv.weight");
    assert_eq!(rules[2].reduction, Reduction::Mean);
}
