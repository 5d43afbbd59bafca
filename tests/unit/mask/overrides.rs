use super::*;

fn size(w: u32, h: u32) -> Size {
    Size::new(w, h).unwrap()
}

#[test]
fn set_resamples_to_working_size_and_bumps_revision() {
    let mut store = MaskOverrideStore::new();
    let f = FeatureId::from("walls");
    assert_eq!(store.revision(&f), 0);

    let rev = store.set(
        f.clone(),
        RasterMask::from_alpha(size(2, 2), vec![255; 4]).unwrap(),
        size(8, 8),
    );
    assert_eq!(rev, 1);
    assert_eq!(store.get(&f).unwrap().size(), size(8, 8));
    assert!(store.contains(&f));
}

#[test]
fn clear_is_idempotent() {
    let mut store = MaskOverrideStore::new();
    let f = FeatureId::from("walls");
    store.set(f.clone(), RasterMask::empty(size(4, 4)), size(4, 4));
    assert_eq!(store.clear(&f), Some(2));
    assert_eq!(store.clear(&f), None);
    assert_eq!(store.revision(&f), 2);
    assert!(store.get(&f).is_none());
}

#[test]
fn revisions_are_per_feature() {
    let mut store = MaskOverrideStore::new();
    let a = FeatureId::from("walls");
    let b = FeatureId::from("floor");
    store.set(a.clone(), RasterMask::empty(size(4, 4)), size(4, 4));
    store.set(a.clone(), RasterMask::empty(size(4, 4)), size(4, 4));
    store.set(b.clone(), RasterMask::empty(size(4, 4)), size(4, 4));
    assert_eq!(store.revision(&a), 2);
    assert_eq!(store.revision(&b), 1);

    store.reset();
    assert_eq!(store.features().count(), 0);
    assert_eq!(store.revision(&a), 3);
}
