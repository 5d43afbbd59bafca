use super::*;

fn scene_json() -> &'static str {
    r##"{
        "category": "interior",
        "subcategory": "kitchen",
        "confidence": "high",
        "elements": [
            { "id": "w1", "type": "walls", "label": "back wall",
              "polygon": [[0.0, 0.0], [1.0, 0.0], [1.0, 0.6], [0.0, 0.6]] },
            { "id": "f1", "type": "floor", "label": "floor",
              "polygon": [[0.0, 0.6], [1.0, 0.6], [1.0, 1.2], [-0.1, 1.0]] },
            { "id": "bad", "type": "trim", "polygon": [[0.1, 0.1], [0.2, 0.2]] },
            { "id": "alien", "type": "hot_tub", "polygon": [[0.1, 0.1], [0.2, 0.2], [0.3, 0.1]] }
        ]
    }"##
}

#[test]
fn scene_parses_point_pairs_and_unknown_types() {
    let scene: SceneDescription = serde_json::from_str(scene_json()).unwrap();
    assert_eq!(scene.category, SceneCategory::Interior);
    assert_eq!(scene.subcategory, Subcategory::Kitchen);
    assert_eq!(scene.elements.len(), 4);
    assert_eq!(scene.elements[0].polygon.points[2], Point::new(1.0, 0.6));
    assert_eq!(scene.elements[3].surface_type, SurfaceType::Unknown);
}

#[test]
fn sanitize_skips_degenerate_polygons_and_clamps() {
    let scene: SceneDescription = serde_json::from_str(scene_json()).unwrap();
    let scene = scene.sanitize();
    let ids: Vec<&str> = scene.elements.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["w1", "f1", "alien"]);
    let floor = &scene.elements[1].polygon.points;
    assert_eq!(floor[2], Point::new(1.0, 1.0));
    assert_eq!(floor[3], Point::new(0.0, 1.0));
}

#[test]
fn polygon_serializes_back_to_pairs() {
    let p = Polygon::from_pairs(&[(0.0, 0.5), (1.0, 0.5), (0.5, 1.0)]);
    let v = serde_json::to_value(&p).unwrap();
    assert_eq!(v, serde_json::json!([[0.0, 0.5], [1.0, 0.5], [0.5, 1.0]]));
}

fn module(id: &str, targets: &[SurfaceType], options: &[&str]) -> FeatureModule {
    FeatureModule {
        id: FeatureId::from(id),
        label: id.to_owned(),
        targets: targets.iter().copied().collect(),
        preview_mode: PreviewMode::Overlay,
        color_model: ColorModel::Material,
        area_tier: None,
        options: options
            .iter()
            .map(|o| FinishOption {
                id: OptionId::from(*o),
                label: o.to_string(),
                kind: OptionKind::Color,
                preview: OptionPreview::Color {
                    hex: "#336699".to_owned(),
                },
                render_hint: String::new(),
            })
            .collect(),
    }
}

#[test]
fn module_validation_catches_duplicates() {
    let ok = module("walls", &[SurfaceType::Walls], &["a", "b"]);
    ok.validate().unwrap();
    let dup = module("walls", &[SurfaceType::Walls], &["a", "a"]);
    assert!(dup.validate().is_err());

    let mut bad_color = module("walls", &[SurfaceType::Walls], &["a", "b"]);
    bad_color.options[1].preview = OptionPreview::Color {
        hex: "#12345".to_owned(),
    };
    assert!(bad_color.validate().is_err());
    bad_color.options[1].preview = OptionPreview::Color {
        hex: "#abc".to_owned(),
    };
    bad_color.validate().unwrap();

    let no_targets = module("x", &[], &["a"]);
    assert!(no_targets.validate().is_err());
    assert!(validate_modules(&[ok.clone(), ok]).is_err());
}

#[test]
fn tier_defaults_from_target_surfaces() {
    assert_eq!(
        module("walls", &[SurfaceType::Walls], &["a"]).tier(),
        AreaTier::Large
    );
    assert_eq!(
        module("trim", &[SurfaceType::Trim, SurfaceType::Door], &["a"]).tier(),
        AreaTier::Small
    );
    let mut explicit = module("trim", &[SurfaceType::Trim], &["a"]);
    explicit.area_tier = Some(AreaTier::Large);
    assert_eq!(explicit.tier(), AreaTier::Large);
}

#[test]
fn module_defaults_fill_mode_and_color_model() {
    let m: FeatureModule = serde_json::from_str(
        r##"{ "id": "paint", "label": "Paint", "targets": ["walls"],
             "options": [{ "id": "sage", "label": "Sage", "kind": "color",
                           "preview": { "type": "color", "hex": "#9caf88" } }] }"##,
    )
    .unwrap();
    assert_eq!(m.preview_mode, PreviewMode::Overlay);
    assert_eq!(m.color_model, ColorModel::Material);
    assert!(m.option(&OptionId::from("sage")).is_some());
}

#[test]
fn hex_colors_parse_long_and_short_forms() {
    assert_eq!(parse_hex_color("#ff8000").unwrap(), [255, 128, 0]);
    assert_eq!(parse_hex_color("0af").unwrap(), [0, 170, 255]);
    assert!(parse_hex_color("#12345").is_err());
    assert!(parse_hex_color("#gggggg").is_err());
}
