use std::collections::BTreeSet;

use serde_json::json;

use super::*;
use crate::scene::model::{
    ColorModel, Confidence, FinishOption, OptionKind, OptionPreview, PreviewMode, Subcategory,
    SurfaceType,
};

fn scene(subcategory: Subcategory) -> SceneDescription {
    SceneDescription {
        category: SceneCategory::Interior,
        subcategory,
        confidence: Confidence::High,
        elements: Vec::new(),
    }
}

fn module(id: &str, label: &str, options: &[(&str, &str, &str)]) -> FeatureModule {
    FeatureModule {
        id: FeatureId::from(id),
        label: label.into(),
        targets: BTreeSet::from([SurfaceType::Walls]),
        preview_mode: PreviewMode::Overlay,
        color_model: ColorModel::Material,
        area_tier: None,
        options: options
            .iter()
            .map(|(oid, olabel, hint)| FinishOption {
                id: OptionId::from(*oid),
                label: (*olabel).into(),
                kind: OptionKind::Material,
                preview: OptionPreview::None,
                render_hint: (*hint).into(),
            })
            .collect(),
    }
}

fn modules() -> Vec<FeatureModule> {
    vec![
        module("walls", "Walls", &[("dark", "Charcoal", "matte charcoal paint")]),
        module("flooring", "Flooring", &[("light", "Light oak", "")]),
    ]
}

#[test]
fn lists_selected_options_in_module_order() {
    let selections = BTreeMap::from([
        (FeatureId::from("flooring"), OptionId::from("light")),
        (FeatureId::from("walls"), OptionId::from("dark")),
    ]);
    let text = build_instruction(
        &scene(Subcategory::LivingRoom),
        &modules(),
        &selections,
        &serde_json::Map::new(),
        "",
        0,
    );
    assert!(text.starts_with("Edit this living room photo."));
    let walls = text.find("- Walls: Charcoal (matte charcoal paint)").unwrap();
    let floor = text.find("- Flooring: Light oak\n").unwrap();
    assert!(walls < floor);
    assert!(!text.contains("Variation"));
    assert!(!text.contains("User direction"));
}

#[test]
fn unknown_selections_are_ignored() {
    let selections = BTreeMap::from([
        (FeatureId::from("roof"), OptionId::from("slate")),
        (FeatureId::from("walls"), OptionId::from("missing")),
    ]);
    let text = build_instruction(
        &scene(Subcategory::Unknown),
        &modules(),
        &selections,
        &serde_json::Map::new(),
        "",
        0,
    );
    assert!(text.starts_with("Edit this room photo."));
    assert!(text.contains("- none;"));
}

#[test]
fn extras_prompt_and_variant_are_deterministic() {
    let selections = BTreeMap::from([(FeatureId::from("walls"), OptionId::from("dark"))]);
    let mut extras = serde_json::Map::new();
    extras.insert("style".into(), json!("modern"));
    extras.insert("budget".into(), json!({"max": 5000, "currency": "usd"}));

    let a = build_instruction(
        &scene(Subcategory::Kitchen),
        &modules(),
        &selections,
        &extras,
        "  brighter  ",
        2,
    );
    let b = build_instruction(
        &scene(Subcategory::Kitchen),
        &modules(),
        &selections,
        &extras,
        "brighter",
        2,
    );
    assert_eq!(a, b);

    let budget = a.find(r#"- budget: {"currency":"usd","max":5000}"#).unwrap();
    let style = a.find("- style: modern").unwrap();
    assert!(budget < style);
    assert!(a.contains("User direction: brighter\n"));
    assert!(a.ends_with("Variation #2.\n"));
}
