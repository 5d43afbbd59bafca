use super::*;
use crate::foundation::core::Size;

fn asset() -> OverlayAsset {
    OverlayAsset {
        raster: PremulRaster::transparent(Size::new(1, 1).unwrap()),
        blend: BlendMode::Multiply,
        revision: MaskRevision::default(),
    }
}

#[test]
fn insert_and_lookup() {
    let mut store = OverlayStore::default();
    let k = OverlayKey::new("walls", "dark");
    assert!(!store.is_settled(&k));

    store.insert(k.clone(), BakeOutcome::Baked(asset()));
    assert!(store.get(&k).is_some());
    assert!(store.is_settled(&k));
    assert_eq!(store.serial(&k), Some(1));

    store.insert(k.clone(), BakeOutcome::Baked(asset()));
    assert_eq!(store.serial(&k), Some(2));
}

#[test]
fn skipped_entries_settle_without_an_asset() {
    let mut store = OverlayStore::default();
    let k = OverlayKey::new("cabinets", "white");
    store.insert(k.clone(), BakeOutcome::Skipped(SkipReason::EmptyMask));
    assert!(store.is_settled(&k));
    assert!(store.get(&k).is_none());
    assert_eq!(store.skip_reason(&k), Some(&SkipReason::EmptyMask));
    assert!(store.baked_keys().is_empty());
}

#[test]
fn invalidate_feature_keeps_other_features() {
    let mut store = OverlayStore::default();
    store.insert(OverlayKey::new("walls", "dark"), BakeOutcome::Baked(asset()));
    store.insert(OverlayKey::new("walls", "light"), BakeOutcome::Skipped(SkipReason::NoPreview));
    store.insert(OverlayKey::new("flooring", "oak"), BakeOutcome::Baked(asset()));

    store.invalidate_feature(&FeatureId::from("walls"));
    assert_eq!(
        store.baked_keys(),
        BTreeSet::from([OverlayKey::new("flooring", "oak")])
    );
    assert!(!store.is_settled(&OverlayKey::new("walls", "light")));

    store.clear();
    assert!(store.baked_keys().is_empty());
}

#[test]
fn status_progress() {
    assert_eq!(OverlayStatus::Idle.progress(), 0.0);
    assert_eq!(OverlayStatus::Building { progress: 0.25 }.progress(), 0.25);
    assert_eq!(OverlayStatus::Ready.progress(), 1.0);
}
