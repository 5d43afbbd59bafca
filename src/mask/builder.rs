use std::collections::{BTreeMap, BTreeSet};

use crate::foundation::core::Size;
use crate::foundation::error::PreviewResult;
use crate::mask::overrides::MaskOverrideStore;
use crate::mask::raster::{RasterMask, rasterize_polygons, resolve_overlaps};
use crate::scene::model::{FeatureModule, SceneDescription, SurfaceType};

/// Where a built mask came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskSource {
    /// User-authored override.
    Override,
    /// At least one target used an edge-snapped segmentation mask.
    Enhanced,
    /// Union of scanner polygons only.
    Polygons,
}

/// Segmented masks received so far, per surface type, at working resolution.
#[derive(Clone, Debug, Default)]
pub struct EnhancedMasks {
    masks: BTreeMap<SurfaceType, RasterMask>,
    revisions: BTreeMap<SurfaceType, u64>,
}

impl EnhancedMasks {
    /// Store a mask for `surface_type`.
    pub fn insert(&mut self, surface_type: SurfaceType, mask: RasterMask) {
        self.masks.insert(surface_type, mask);
        *self.revisions.entry(surface_type).or_insert(0) += 1;
    }

    /// Mask for `surface_type`, if one arrived.
    pub fn get(&self, surface_type: SurfaceType) -> Option<&RasterMask> {
        self.masks.get(&surface_type)
    }

    /// `true` if a mask for `surface_type` is held.
    pub fn contains(&self, surface_type: SurfaceType) -> bool {
        self.masks.contains_key(&surface_type)
    }

    /// Bumped on every insert for `surface_type`.
    pub fn revision(&self, surface_type: SurfaceType) -> u64 {
        self.revisions.get(&surface_type).copied().unwrap_or(0)
    }

    /// Forget every mask (new scan). Revisions keep counting.
    pub fn clear(&mut self) {
        for t in std::mem::take(&mut self.masks).into_keys() {
            *self.revisions.entry(t).or_insert(0) += 1;
        }
    }
}

/// Inputs a feature mask was derived from; assets baked from an older revision are stale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaskRevision {
    /// Override revision of the feature.
    pub overrides: u64,
    /// Sum of the enhanced-mask revisions of the feature's targets.
    pub enhanced: u64,
}

impl MaskRevision {
    /// Current revision of `module`'s mask inputs.
    pub fn of(
        module: &FeatureModule,
        overrides: &MaskOverrideStore,
        enhanced: &EnhancedMasks,
    ) -> Self {
        Self {
            overrides: overrides.revision(&module.id),
            enhanced: module.targets.iter().map(|&t| enhanced.revision(t)).sum(),
        }
    }
}

/// Builds per-feature masks with precedence override > enhanced > polygons.
#[derive(Clone, Copy, Debug)]
pub struct MaskBuilder {
    size: Size,
}

impl MaskBuilder {
    /// Builder producing masks at the working `size`.
    pub fn new(size: Size) -> Self {
        Self { size }
    }

    /// Working size shared by every mask.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Mask for `module` on `scene`.
    #[tracing::instrument(skip_all, fields(feature = %module.id))]
    pub fn build(
        &self,
        module: &FeatureModule,
        scene: &SceneDescription,
        overrides: &MaskOverrideStore,
        enhanced: &EnhancedMasks,
    ) -> PreviewResult<(RasterMask, MaskSource)> {
        if let Some(mask) = overrides.get(&module.id) {
            return Ok((mask.resized_to(self.size), MaskSource::Override));
        }

        let mut out = RasterMask::empty(self.size);
        let mut source = MaskSource::Polygons;
        for &t in &module.targets {
            if let Some(mask) = enhanced.get(t) {
                out.union_with(&mask.resized_to(self.size))?;
                source = MaskSource::Enhanced;
                continue;
            }
            let only = BTreeSet::from([t]);
            let polys = scene.elements_of(&only).map(|el| &el.polygon);
            out.union_with(&rasterize_polygons(polys, self.size)?)?;
        }
        Ok((out, source))
    }
}

/// One polygon mask per surface type present in `scene`, with contested pixels resolved.
pub fn surface_masks(
    scene: &SceneDescription,
    size: Size,
) -> PreviewResult<Vec<(SurfaceType, RasterMask)>> {
    let mut masks = Vec::new();
    for t in scene.surface_types() {
        let only = BTreeSet::from([t]);
        let polys = scene.elements_of(&only).map(|el| &el.polygon);
        masks.push((t, rasterize_polygons(polys, size)?));
    }
    resolve_overlaps(&mut masks)?;
    Ok(masks)
}

#[cfg(test)]
#[path = "../../tests/unit/mask/builder.rs"]
mod tests;
