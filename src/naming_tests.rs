use super::*;

// ========================================================================
// Convention matching
// ========================================================================

#[test]
fn test_flat_convention_matches_direct_keys() {
    let flat = KeyConvention::flat("model");
    let segments: Vec<&str> = "model.7.cv1.conv.weight".split('.').collect();
    assert_eq!(flat.match_segments(&segments), Some(7));
}

#[test]
fn test_flat_convention_rejects_nested_keys() {
    let flat = KeyConvention::flat("model");
    let segments: Vec<&str> = "model.model.7.cv1.conv.weight".split('.').collect();
    assert_eq!(flat.match_segments(&segments), None);
}

#[test]
fn test_convention_requires_suffix() {
    let flat = KeyConvention::flat("model");
    assert_eq!(flat.match_segments(&["model", "3"]), None);
}

#[test]
fn test_convention_requires_exact_prefix() {
    let flat = KeyConvention::flat("model");
    assert_eq!(flat.match_segments(&["backbone", "3", "weight"]), None);
}

#[test]
fn test_malformed_index_segments() {
    let flat = KeyConvention::flat("model");
    assert_eq!(flat.match_segments(&["model", "+3", "weight"]), None);
    assert_eq!(flat.match_segments(&["model", "3a", "weight"]), None);
    assert_eq!(flat.match_segments(&["model", "", "weight"]), None);
}

#[test]
fn test_overflowing_index_is_unresolved() {
    let flat = KeyConvention::flat("model");
    let huge = "99999999999999999999999999";
    assert_eq!(flat.match_segments(&["model", huge, "weight"]), None);
}

#[test]
fn test_layer_prefix_and_key() {
    let nested = KeyConvention::nested("model", "model");
    assert_eq!(nested.layer_prefix(9), "model.model.9");
    assert_eq!(nested.layer_key(9, "bn.running_var"), "model.model.9.bn.running_var");
    assert_eq!(nested.layer_key(9, ""), "model.model.9");
}

#[test]
fn test_parse_convention() {
    let conv = KeyConvention::parse("backbone.body.").expect("parse");
    assert_eq!(conv.segments(), ["backbone", "body"]);
    assert_eq!(conv.to_string(), "backbone.body.<i>");
    assert!(KeyConvention::parse("").is_err());
    assert!(KeyConvention::parse("model..x").is_err());
    assert!(KeyConvention::parse("model.3").is_err());
}

// ========================================================================
// Resolver priority
// ========================================================================

#[test]
fn test_default_resolver_handles_both_prefix_forms() {
    let resolver = LayerIndexResolver::default();
    let short = resolver.resolve("model.11.conv.weight").expect("flat");
    assert_eq!(short.index, 11);
    assert_eq!(short.position, 1);
    assert_eq!(short.convention, &KeyConvention::flat("model"));

    let long = resolver.resolve("model.model.11.conv.weight").expect("nested");
    assert_eq!(long.index, 11);
    assert_eq!(long.position, 2);
}

#[test]
fn test_resolver_is_total() {
    let resolver = LayerIndexResolver::default();
    for key in ["", ".", "model", "model.", "model..weight", "stride", "model.x.y.z"] {
        assert_eq!(resolver.layer_index(key), None, "key {key:?}");
    }
}

#[test]
fn test_custom_conventions_resolve() {
    let a = KeyConvention::flat("net");
    let b = KeyConvention::parse("net.blocks").expect("parse");
    let resolver = LayerIndexResolver::new(vec![b, a]);
    assert_eq!(resolver.layer_index("net.blocks.2.weight"), Some(2));
    assert_eq!(resolver.layer_index("net.5.weight"), Some(5));
}

#[test]
fn test_empty_resolver_resolves_nothing() {
    let resolver = LayerIndexResolver::new(Vec::new());
    assert_eq!(resolver.layer_index("model.1.weight"), None);
    assert_eq!(resolver.detect(["model.1.weight"]), None);
}

// ========================================================================
// Convention detection
// ========================================================================

#[test]
fn test_detect_prefers_majority() {
    let resolver = LayerIndexResolver::default();
    let keys = [
        "model.model.0.conv.weight",
        "model.model.1.conv.weight",
        "model.2.conv.weight",
    ];
    assert_eq!(
        resolver.detect(keys),
        Some(KeyConvention::nested("model", "model"))
    );
}

#[test]
fn test_detect_tie_goes_to_priority() {
    let resolver = LayerIndexResolver::default();
    let keys = ["model.model.0.conv.weight", "model.2.conv.weight"];
    assert_eq!(resolver.detect(keys), Some(KeyConvention::flat("model")));
}

#[test]
fn test_detect_without_layer_keys() {
    let resolver = LayerIndexResolver::default();
    assert_eq!(resolver.detect(["head.weight", "stride"]), None);
}

#[test]
fn test_convention_serde_as_string() {
    let conv = KeyConvention::nested("model", "model");
    let json = serde_json::to_string(&conv).expect("serialize");
    assert_eq!(json, "\"model.model\"");
    let back: KeyConvention = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, conv);
    assert!(serde_json::from_str::<KeyConvention>("\"model.1\"").is_err());
}
