use std::collections::BTreeSet;

use super::*;
use crate::scene::model::{
    ColorModel, Confidence, FeatureId, Polygon, PreviewMode, SceneCategory, Subcategory,
    SurfaceElement,
};

fn scene() -> SceneDescription {
    SceneDescription {
        category: SceneCategory::Interior,
        subcategory: Subcategory::LivingRoom,
        confidence: Confidence::High,
        elements: vec![
            SurfaceElement {
                id: "w1".into(),
                surface_type: SurfaceType::Walls,
                label: "wall".into(),
                polygon: Polygon::from_pairs(&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.5), (0.0, 0.5)]),
            },
            SurfaceElement {
                id: "f1".into(),
                surface_type: SurfaceType::Floor,
                label: "floor".into(),
                polygon: Polygon::from_pairs(&[(0.0, 0.5), (1.0, 0.5), (1.0, 1.0), (0.0, 1.0)]),
            },
        ],
    }
}

fn walls_module() -> FeatureModule {
    FeatureModule {
        id: FeatureId::from("walls"),
        label: "Walls".into(),
        targets: BTreeSet::from([SurfaceType::Walls]),
        preview_mode: PreviewMode::Overlay,
        color_model: ColorModel::HueReplace,
        area_tier: None,
        options: vec![],
    }
}

fn size() -> Size {
    Size::new(20, 20).unwrap()
}

#[test]
fn polygon_mask_covers_only_target_surfaces() {
    let b = MaskBuilder::new(size());
    let (mask, source) = b
        .build(
            &walls_module(),
            &scene(),
            &MaskOverrideStore::new(),
            &EnhancedMasks::default(),
        )
        .unwrap();
    assert_eq!(source, MaskSource::Polygons);
    assert_eq!(mask.alpha()[2 * 20 + 5], 255);
    assert_eq!(mask.alpha()[17 * 20 + 5], 0);
}

#[test]
fn override_wins_over_polygons_and_enhanced() {
    let b = MaskBuilder::new(size());
    let mut overrides = MaskOverrideStore::new();
    overrides.set(
        FeatureId::from("walls"),
        RasterMask::from_alpha(size(), vec![0; 400]).unwrap(),
        size(),
    );
    let mut enhanced = EnhancedMasks::default();
    enhanced.insert(
        SurfaceType::Walls,
        RasterMask::from_alpha(size(), vec![255; 400]).unwrap(),
    );
    let (mask, source) = b
        .build(&walls_module(), &scene(), &overrides, &enhanced)
        .unwrap();
    assert_eq!(source, MaskSource::Override);
    assert!(mask.is_empty());
}

#[test]
fn enhanced_replaces_polygons_for_its_type() {
    let b = MaskBuilder::new(size());
    let mut enhanced = EnhancedMasks::default();
    enhanced.insert(
        SurfaceType::Walls,
        RasterMask::from_alpha(size(), vec![255; 400]).unwrap(),
    );
    let (mask, source) = b
        .build(
            &walls_module(),
            &scene(),
            &MaskOverrideStore::new(),
            &enhanced,
        )
        .unwrap();
    assert_eq!(source, MaskSource::Enhanced);
    assert_eq!(mask.alpha()[17 * 20 + 5], 255);
}

#[test]
fn missing_surfaces_give_an_empty_mask() {
    let mut module = walls_module();
    module.targets = BTreeSet::from([SurfaceType::Cabinets]);
    let (mask, _) = MaskBuilder::new(size())
        .build(
            &module,
            &scene(),
            &MaskOverrideStore::new(),
            &EnhancedMasks::default(),
        )
        .unwrap();
    assert!(mask.is_empty());
}

#[test]
fn surface_masks_lists_each_present_type_once() {
    let masks = surface_masks(&scene(), size()).unwrap();
    let types: Vec<SurfaceType> = masks.iter().map(|(t, _)| *t).collect();
    assert_eq!(types, vec![SurfaceType::Floor, SurfaceType::Walls]);
    assert!(masks.iter().all(|(_, m)| !m.is_empty()));
}

#[test]
fn mask_revision_tracks_only_relevant_inputs() {
    let module = walls_module();
    let mut overrides = MaskOverrideStore::new();
    let mut enhanced = EnhancedMasks::default();
    let r0 = MaskRevision::of(&module, &overrides, &enhanced);

    enhanced.insert(SurfaceType::Floor, RasterMask::empty(size()));
    assert_eq!(MaskRevision::of(&module, &overrides, &enhanced), r0);

    enhanced.insert(SurfaceType::Walls, RasterMask::empty(size()));
    let r1 = MaskRevision::of(&module, &overrides, &enhanced);
    assert_ne!(r1, r0);

    overrides.set(FeatureId::from("walls"), RasterMask::empty(size()), size());
    assert_ne!(MaskRevision::of(&module, &overrides, &enhanced), r1);
}
