use std::collections::HashMap;

use crate::foundation::core::Size;
use crate::mask::raster::RasterMask;
use crate::scene::model::FeatureId;

/// User-authored mask corrections, one per feature.
///
/// An override supersedes every generated mask for its feature until cleared. Each set or
/// clear bumps the feature's revision so cached overlays can tell they are stale.
#[derive(Clone, Debug, Default)]
pub struct MaskOverrideStore {
    masks: HashMap<FeatureId, RasterMask>,
    revisions: HashMap<FeatureId, u64>,
}

impl MaskOverrideStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `mask` for `feature`, resampled to `working`. Returns the new revision.
    pub fn set(&mut self, feature: FeatureId, mask: RasterMask, working: Size) -> u64 {
        let mask = mask.resized_to(working);
        let rev = self.bump(&feature);
        tracing::debug!(feature = %feature, rev, "mask override set");
        self.masks.insert(feature, mask);
        rev
    }

    /// Remove the override for `feature`. Returns the new revision, or `None` if absent.
    pub fn clear(&mut self, feature: &FeatureId) -> Option<u64> {
        self.masks.remove(feature)?;
        let rev = self.bump(feature);
        tracing::debug!(feature = %feature, rev, "mask override cleared");
        Some(rev)
    }

    /// Current override for `feature`.
    pub fn get(&self, feature: &FeatureId) -> Option<&RasterMask> {
        self.masks.get(feature)
    }

    /// Revision counter for `feature`; 0 if it was never touched.
    pub fn revision(&self, feature: &FeatureId) -> u64 {
        self.revisions.get(feature).copied().unwrap_or(0)
    }

    /// `true` when an override exists for `feature`.
    pub fn contains(&self, feature: &FeatureId) -> bool {
        self.masks.contains_key(feature)
    }

    /// Features that currently carry an override.
    pub fn features(&self) -> impl Iterator<Item = &FeatureId> {
        self.masks.keys()
    }

    /// Drop every override (new scan). Revisions keep counting up.
    pub fn reset(&mut self) {
        let features: Vec<FeatureId> = self.masks.keys().cloned().collect();
        for f in features {
            self.clear(&f);
        }
    }

    fn bump(&mut self, feature: &FeatureId) -> u64 {
        let rev = self.revisions.entry(feature.clone()).or_insert(0);
        *rev += 1;
        *rev
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mask/overrides.rs"]
mod tests;
