use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::foundation::core::PremulRaster;
use crate::effects::composite::BlendMode;
use crate::mask::builder::MaskRevision;
use crate::overlay::texture::SkipReason;
use crate::scene::model::{FeatureId, OptionId};

/// Cache key of one overlay asset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayKey {
    /// Owning feature.
    pub feature: FeatureId,
    /// Selected option.
    pub option: OptionId,
}

impl OverlayKey {
    /// Build a key.
    pub fn new(feature: impl Into<FeatureId>, option: impl Into<OptionId>) -> Self {
        Self {
            feature: feature.into(),
            option: option.into(),
        }
    }
}

/// A pre-masked overlay at working resolution.
#[derive(Clone, Debug)]
pub struct OverlayAsset {
    /// Premultiplied overlay, transparent outside the mask.
    pub raster: PremulRaster,
    /// How the overlay combines with the photo.
    pub blend: BlendMode,
    /// Mask inputs the asset was baked from.
    pub revision: MaskRevision,
}

/// Result of baking one option.
#[derive(Clone, Debug)]
pub enum BakeOutcome {
    /// Asset ready to draw.
    Baked(OverlayAsset),
    /// Nothing to draw; still counts toward progress.
    Skipped(SkipReason),
}

/// Precompute state exposed to the rendering layer.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayStatus {
    /// Nothing scheduled (no scan or no overlay modules).
    Idle,
    /// Baking; `progress` in `[0, 1]`, non-decreasing within one build.
    Building {
        /// Fraction of eligible options baked or skipped.
        progress: f32,
    },
    /// Every eligible option is baked or skipped.
    Ready,
    /// The build stopped on an error; fallback compositing still works.
    Error(String),
}

impl OverlayStatus {
    /// Progress in `[0, 1]` for any state.
    pub fn progress(&self) -> f32 {
        match self {
            Self::Idle | Self::Error(_) => 0.0,
            Self::Building { progress } => *progress,
            Self::Ready => 1.0,
        }
    }
}

/// Baked and skipped overlays of the current scan.
///
/// Reset wholesale on scan or module change; a mask change drops only that feature's entries.
#[derive(Clone, Debug, Default)]
pub struct OverlayStore {
    baked: HashMap<OverlayKey, Arc<OverlayAsset>>,
    skipped: HashMap<OverlayKey, SkipReason>,
    next_serial: u64,
    serials: HashMap<OverlayKey, u64>,
}

impl OverlayStore {
    /// Record the outcome of one bake.
    pub fn insert(&mut self, key: OverlayKey, outcome: BakeOutcome) {
        match outcome {
            BakeOutcome::Baked(asset) => {
                self.skipped.remove(&key);
                self.next_serial += 1;
                self.serials.insert(key.clone(), self.next_serial);
                self.baked.insert(key, Arc::new(asset));
            }
            BakeOutcome::Skipped(reason) => {
                tracing::debug!(
                    feature = %key.feature,
                    option = %key.option,
                    ?reason,
                    "overlay skipped"
                );
                self.baked.remove(&key);
                self.serials.remove(&key);
                self.skipped.insert(key, reason);
            }
        }
    }

    /// Baked asset for `key`.
    pub fn get(&self, key: &OverlayKey) -> Option<&Arc<OverlayAsset>> {
        self.baked.get(key)
    }

    /// Unique serial of the asset currently stored under `key`.
    pub fn serial(&self, key: &OverlayKey) -> Option<u64> {
        self.serials.get(key).copied()
    }

    /// Skip reason for `key`, if it was skipped.
    pub fn skip_reason(&self, key: &OverlayKey) -> Option<&SkipReason> {
        self.skipped.get(key)
    }

    /// `true` when `key` was baked or skipped.
    pub fn is_settled(&self, key: &OverlayKey) -> bool {
        self.baked.contains_key(key) || self.skipped.contains_key(key)
    }

    /// Keys with a drawable asset.
    pub fn baked_keys(&self) -> BTreeSet<OverlayKey> {
        self.baked.keys().cloned().collect()
    }

    /// Drop every entry of `feature`.
    pub fn invalidate_feature(&mut self, feature: &FeatureId) {
        self.baked.retain(|k, _| &k.feature != feature);
        self.skipped.retain(|k, _| &k.feature != feature);
        self.serials.retain(|k, _| &k.feature != feature);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.baked.clear();
        self.skipped.clear();
        self.serials.clear();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/store.rs"]
mod tests;
