use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::effects::composite::{BlendMode, clip_to_mask_in_place};
use crate::foundation::error::PreviewResult;
use crate::mask::builder::{EnhancedMasks, MaskBuilder, MaskRevision};
use crate::mask::overrides::MaskOverrideStore;
use crate::mask::raster::RasterMask;
use crate::overlay::store::{BakeOutcome, OverlayAsset, OverlayKey};
use crate::overlay::texture::{Fill, SkipReason, TextureStore};
use crate::scene::model::{AreaTier, FeatureModule, FinishOption, SceneDescription};

/// Bake one option: its preview rendered full-frame at `alpha`, kept only where `mask` covers.
pub fn bake_asset(
    option: &FinishOption,
    blend: BlendMode,
    mask: &RasterMask,
    revision: MaskRevision,
    textures: &TextureStore,
    alpha: f32,
) -> PreviewResult<BakeOutcome> {
    if mask.is_empty() {
        return Ok(BakeOutcome::Skipped(SkipReason::EmptyMask));
    }
    let fill = match Fill::resolve(&option.preview, textures)? {
        Ok(f) => f,
        Err(reason) => return Ok(BakeOutcome::Skipped(reason)),
    };
    let mut raster = fill.render(mask.size(), alpha);
    clip_to_mask_in_place(&mut raster.data, mask.alpha())?;
    Ok(BakeOutcome::Baked(OverlayAsset {
        raster,
        blend,
        revision,
    }))
}

/// Alpha per area tier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TierAlpha {
    /// Large planes.
    pub large: f32,
    /// Small regions.
    pub small: f32,
}

impl TierAlpha {
    /// Alpha for `tier`.
    pub fn for_tier(self, tier: AreaTier) -> f32 {
        match tier {
            AreaTier::Large => self.large,
            AreaTier::Small => self.small,
        }
    }
}

/// Snapshot of everything one bake generation needs.
#[derive(Clone, Debug)]
pub struct BakePlan {
    /// Generation stamped on every event.
    pub generation: u64,
    /// Modules to bake, options already settled removed.
    pub modules: Vec<FeatureModule>,
    /// Eligible options in total, including settled ones.
    pub total: usize,
    /// Options already settled before this generation started.
    pub already_done: usize,
    /// Scene the masks come from.
    pub scene: Arc<SceneDescription>,
    /// Override snapshot.
    pub overrides: MaskOverrideStore,
    /// Segmented-mask snapshot.
    pub enhanced: EnhancedMasks,
    /// Mask builder at working size.
    pub builder: MaskBuilder,
    /// Alpha tiers.
    pub alpha: TierAlpha,
    /// Yield after this many assets.
    pub yield_every: usize,
}

impl BakePlan {
    /// Number of options this generation still has to bake.
    pub fn pending(&self) -> usize {
        self.modules.iter().map(|m| m.options.len()).sum()
    }
}

/// Progress reported by [`run_bake`].
#[derive(Clone, Debug)]
pub enum BakeEvent {
    /// One option settled.
    Asset {
        /// Bake generation.
        generation: u64,
        /// Asset key.
        key: OverlayKey,
        /// Baked or skipped.
        outcome: BakeOutcome,
        /// Fraction settled after this asset.
        progress: f32,
    },
    /// Every planned option settled.
    Finished {
        /// Bake generation.
        generation: u64,
    },
    /// The generation stopped on an error.
    Failed {
        /// Bake generation.
        generation: u64,
        /// Error text.
        message: String,
    },
}

fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        return 1.0;
    }
    (done as f32 / total as f32).min(1.0)
}

/// Bake every planned option, reporting each through `emit`.
///
/// Checks `token` before every asset and yields to the scheduler every `yield_every` assets.
/// A cancelled run stops silently; its partial results were already tagged with its generation.
#[tracing::instrument(skip_all, fields(generation = plan.generation, pending = plan.pending()))]
pub async fn run_bake(
    plan: BakePlan,
    textures: Arc<TextureStore>,
    token: CancellationToken,
    mut emit: impl FnMut(BakeEvent),
) {
    let generation = plan.generation;
    let mut done = plan.already_done;
    let mut since_yield = 0usize;

    for module in &plan.modules {
        if token.is_cancelled() {
            tracing::debug!("bake cancelled");
            return;
        }
        let (mask, source) = match plan
            .builder
            .build(module, &plan.scene, &plan.overrides, &plan.enhanced)
        {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(feature = %module.id, error = %e, "mask build failed");
                emit(BakeEvent::Failed {
                    generation,
                    message: e.to_string(),
                });
                return;
            }
        };
        tracing::debug!(
            feature = %module.id,
            ?source,
            coverage = mask.coverage(),
            "feature mask built"
        );
        let revision = MaskRevision::of(module, &plan.overrides, &plan.enhanced);
        let blend = BlendMode::from(module.color_model);
        let alpha = plan.alpha.for_tier(module.tier());

        for option in &module.options {
            if token.is_cancelled() {
                tracing::debug!("bake cancelled");
                return;
            }
            let outcome = match bake_asset(option, blend, &mask, revision, &textures, alpha) {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(
                        feature = %module.id,
                        option = %option.id,
                        error = %e,
                        "bake failed"
                    );
                    emit(BakeEvent::Failed {
                        generation,
                        message: e.to_string(),
                    });
                    return;
                }
            };
            done += 1;
            emit(BakeEvent::Asset {
                generation,
                key: OverlayKey {
                    feature: module.id.clone(),
                    option: option.id.clone(),
                },
                outcome,
                progress: fraction(done, plan.total),
            });

            since_yield += 1;
            if since_yield >= plan.yield_every.max(1) {
                since_yield = 0;
                tokio::task::yield_now().await;
            }
        }
    }

    if !token.is_cancelled() {
        emit(BakeEvent::Finished { generation });
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/bake.rs"]
mod tests;
