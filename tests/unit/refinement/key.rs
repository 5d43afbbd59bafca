use serde_json::json;

use super::*;

#[test]
fn canonical_json_sorts_nested_keys_and_keeps_arrays() {
    let v = json!({"b": 1, "a": {"z": [3, 1, 2], "y": null}, "c": "x\"y"});
    assert_eq!(
        canonical_json(&v),
        r#"{"a":{"y":null,"z":[3,1,2]},"b":1,"c":"x\"y"}"#
    );
}

#[test]
fn insertion_order_does_not_change_the_key() {
    let a: serde_json::Value =
        serde_json::from_str(r#"{"walls":"dark","flooring":"light","extra":{"b":1,"a":2}}"#)
            .unwrap();
    let b: serde_json::Value =
        serde_json::from_str(r#"{"extra":{"a":2,"b":1},"flooring":"light","walls":"dark"}"#)
            .unwrap();
    assert_eq!(key_for_value(&a), key_for_value(&b));
}

#[test]
fn array_order_changes_the_key() {
    assert_ne!(key_for_value(&json!([1, 2])), key_for_value(&json!([2, 1])));
}

#[test]
fn inputs_key_tracks_every_field() {
    let mut inputs = RefinementInputs {
        scan_id: Some(ScanId::from("scan-1")),
        ..RefinementInputs::default()
    };
    inputs
        .selections
        .insert(FeatureId::from("walls"), OptionId::from("dark"));
    let base = inputs.key();
    assert_eq!(base, inputs.clone().key());

    let mut other = inputs.clone();
    other.variant = 1;
    assert_ne!(other.key(), base);

    let mut other = inputs.clone();
    other.user_prompt = "warmer".into();
    assert_ne!(other.key(), base);

    let mut other = inputs.clone();
    other.extras.insert("style".into(), json!("modern"));
    assert_ne!(other.key(), base);

    let mut other = inputs;
    other
        .selections
        .insert(FeatureId::from("walls"), OptionId::from("light"));
    assert_ne!(other.key(), base);
}

#[test]
fn key_displays_as_hex() {
    assert_eq!(RefinementKey::from_raw(0xab).to_string(), "000000ab");
}
