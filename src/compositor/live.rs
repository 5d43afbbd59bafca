//! Per-frame presentation of the photo plus the current selections.
//!
//! The fast path draws baked overlay assets whose mask revision is current. Anything else
//! (bake still running, stale asset after a mask change, skipped asset) goes through the
//! fallback path: a feathered mask and the option fill rebuilt at presentation resolution.
//! Rasters built here are memoized for the lifetime of one scan.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::effects::composite::{BlendMode, blend_in_place, clip_to_mask_in_place, over};
use crate::foundation::core::{PixelRect, PremulRaster, Size};
use crate::foundation::error::{PreviewError, PreviewResult};
use crate::foundation::opts::PipelineOpts;
use crate::mask::builder::{EnhancedMasks, MaskRevision};
use crate::mask::overrides::MaskOverrideStore;
use crate::mask::raster::{RasterMask, rasterize_polygons, stroke_polygons};
use crate::overlay::bake::TierAlpha;
use crate::overlay::store::{OverlayKey, OverlayStore};
use crate::overlay::texture::{Fill, TextureStore};
use crate::refinement::key::RefinementKey;
use crate::scene::model::{FeatureId, FeatureModule, OptionId, OptionPreview, SceneDescription};

const BOUNDARY_RGBA: [u8; 4] = [255, 64, 160, 255];

/// Premultiplied RGBA8 target plus the rectangle that is currently visible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    raster: PremulRaster,
    viewport: PixelRect,
}

impl Surface {
    /// Transparent surface whose viewport covers all of it.
    pub fn new(size: Size) -> Self {
        Self {
            raster: PremulRaster::transparent(size),
            viewport: PixelRect {
                x: 0,
                y: 0,
                width: size.width,
                height: size.height,
            },
        }
    }

    /// Restrict drawing to `viewport`, which must lie inside the surface.
    pub fn set_viewport(&mut self, viewport: PixelRect) -> PreviewResult<()> {
        let right = viewport.x.checked_add(viewport.width);
        let bottom = viewport.y.checked_add(viewport.height);
        let fits = right.is_some_and(|r| r <= self.raster.width)
            && bottom.is_some_and(|b| b <= self.raster.height);
        if !fits {
            return Err(PreviewError::validation("viewport exceeds surface bounds"));
        }
        self.viewport = viewport;
        Ok(())
    }

    /// Reallocate at `size`; the viewport resets to the full surface.
    pub fn resize(&mut self, size: Size) {
        *self = Self::new(size);
    }

    /// Visible rectangle.
    pub fn viewport(&self) -> PixelRect {
        self.viewport
    }

    /// Surface contents.
    pub fn raster(&self) -> &PremulRaster {
        &self.raster
    }

    fn clear(&mut self) {
        self.raster.data.fill(0);
    }

    fn blit(&mut self, layer: &PremulRaster, at: PixelRect) {
        let sw = self.raster.width as usize;
        let lw = layer.width as usize;
        for (row, src) in layer.data.chunks_exact(lw * 4).enumerate() {
            let start = ((at.y as usize + row) * sw + at.x as usize) * 4;
            self.raster.data[start..start + lw * 4].copy_from_slice(src);
        }
    }
}

/// Read-only view of everything one frame depends on.
#[derive(Clone, Copy, Debug)]
pub struct CompositeFrame<'a> {
    /// Scan generation; memoized rasters from other generations are dropped.
    pub generation: u64,
    /// Original photo, straight alpha.
    pub photo: &'a RgbaImage,
    /// Structural description of the photo.
    pub scene: &'a SceneDescription,
    /// Modules in draw order.
    pub modules: &'a [FeatureModule],
    /// Selected option per feature.
    pub selections: &'a BTreeMap<FeatureId, OptionId>,
    /// Precomputed overlays.
    pub overlays: &'a OverlayStore,
    /// User mask overrides.
    pub overrides: &'a MaskOverrideStore,
    /// Segmented masks.
    pub enhanced: &'a EnhancedMasks,
    /// Decoded option textures.
    pub textures: &'a TextureStore,
    /// Adopted refinement for the current selection key.
    pub refinement: Option<(RefinementKey, &'a RgbaImage)>,
    /// Draw element outlines on top.
    pub show_boundaries: bool,
}

/// What the last frame drew.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Overlays drawn from baked assets.
    pub fast_path: usize,
    /// Overlays rebuilt on the fly.
    pub fallback: usize,
    /// The frame showed an adopted refinement.
    pub refinement: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MaskMemoKey {
    source: String,
    width: u32,
    height: u32,
    feather: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TileMemoKey {
    fill: String,
    width: u32,
    height: u32,
    alpha_bits: u32,
}

/// Draws frames onto a [`Surface`]; owns the per-scan raster memos.
#[derive(Debug)]
pub struct LiveCompositor {
    alpha: TierAlpha,
    feather_radius: u32,
    stroke_px: f64,
    generation: Option<u64>,
    base: HashMap<(u32, u32), Arc<PremulRaster>>,
    refinements: HashMap<(RefinementKey, u32, u32), Arc<PremulRaster>>,
    assets: HashMap<(OverlayKey, u64, u32, u32), Arc<PremulRaster>>,
    masks: HashMap<MaskMemoKey, Arc<RasterMask>>,
    tiles: HashMap<TileMemoKey, Arc<PremulRaster>>,
}

impl LiveCompositor {
    /// Compositor using the alpha tiers, feather radius and stroke width from `opts`.
    pub fn new(opts: &PipelineOpts) -> Self {
        Self {
            alpha: TierAlpha {
                large: opts.large_area_alpha,
                small: opts.small_area_alpha,
            },
            feather_radius: opts.feather_radius_px,
            stroke_px: opts.boundary_stroke_px,
            generation: None,
            base: HashMap::new(),
            refinements: HashMap::new(),
            assets: HashMap::new(),
            masks: HashMap::new(),
            tiles: HashMap::new(),
        }
    }

    /// Drop every memoized raster.
    pub fn reset(&mut self) {
        self.base.clear();
        self.refinements.clear();
        self.assets.clear();
        self.masks.clear();
        self.tiles.clear();
    }

    /// Number of memoized masks (fallback path).
    pub fn memoized_masks(&self) -> usize {
        self.masks.len()
    }

    /// Draw `frame` into `surface`. Idempotent; safe to call on every change or resize.
    #[tracing::instrument(skip_all, fields(generation = frame.generation))]
    pub fn render_now(
        &mut self,
        frame: &CompositeFrame<'_>,
        surface: &mut Surface,
    ) -> PreviewResult<RenderStats> {
        if self.generation != Some(frame.generation) {
            self.reset();
            self.generation = Some(frame.generation);
        }
        surface.clear();

        let photo = Size::new(frame.photo.width(), frame.photo.height())?;
        let Some(placement) = contain_fit(photo, surface.viewport()) else {
            return Ok(RenderStats::default());
        };
        let dims = placement.size();
        let mut stats = RenderStats::default();

        let mut layer = if let Some((key, img)) = frame.refinement {
            stats.refinement = true;
            let memo_key = (key, dims.width, dims.height);
            let scaled = match self.refinements.get(&memo_key) {
                Some(r) => Arc::clone(r),
                None => {
                    let r = Arc::new(scale_straight(img, dims));
                    self.refinements.insert(memo_key, Arc::clone(&r));
                    r
                }
            };
            (*scaled).clone()
        } else {
            let mut layer = (*self.base_layer(frame.photo, dims)).clone();
            self.draw_selections(frame, dims, &mut layer, &mut stats)?;
            layer
        };

        if frame.show_boundaries {
            let strokes = stroke_polygons(
                frame.scene.elements.iter().map(|el| &el.polygon),
                dims,
                self.stroke_px,
                BOUNDARY_RGBA,
            )?;
            for (d, s) in layer.data.chunks_exact_mut(4).zip(strokes.chunks_exact(4)) {
                if s[3] != 0 {
                    let px = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], 1.0);
                    d.copy_from_slice(&px);
                }
            }
        }

        surface.blit(&layer, placement);
        tracing::debug!(
            fast = stats.fast_path,
            fallback = stats.fallback,
            refinement = stats.refinement,
            "frame rendered"
        );
        Ok(stats)
    }

    fn base_layer(&mut self, photo: &RgbaImage, dims: Size) -> Arc<PremulRaster> {
        Arc::clone(
            self.base
                .entry((dims.width, dims.height))
                .or_insert_with(|| Arc::new(scale_straight(photo, dims))),
        )
    }

    fn draw_selections(
        &mut self,
        frame: &CompositeFrame<'_>,
        dims: Size,
        layer: &mut PremulRaster,
        stats: &mut RenderStats,
    ) -> PreviewResult<()> {
        for module in frame.modules.iter().filter(|m| m.is_overlay()) {
            let Some(option_id) = frame.selections.get(&module.id) else {
                continue;
            };
            let Some(option) = module.option(option_id) else {
                continue;
            };
            let key = OverlayKey {
                feature: module.id.clone(),
                option: option_id.clone(),
            };

            let current = MaskRevision::of(module, frame.overrides, frame.enhanced);
            if let (Some(asset), Some(serial)) =
                (frame.overlays.get(&key), frame.overlays.serial(&key))
                && asset.revision == current
            {
                let memo_key = (key, serial, dims.width, dims.height);
                let scaled = match self.assets.get(&memo_key) {
                    Some(r) => Arc::clone(r),
                    None => {
                        let r = Arc::new(scale_premul(&asset.raster, dims));
                        self.assets.insert(memo_key, Arc::clone(&r));
                        r
                    }
                };
                blend_in_place(&mut layer.data, &scaled.data, asset.blend, 1.0)?;
                stats.fast_path += 1;
                continue;
            }

            let fill = match Fill::resolve(&option.preview, frame.textures) {
                Ok(Ok(fill)) => fill,
                Ok(Err(_)) => continue,
                Err(e) => {
                    tracing::warn!(feature = %module.id, error = %e, "option preview unusable");
                    continue;
                }
            };
            let mask = self.fallback_mask(module, frame, dims)?;
            if mask.is_empty() {
                continue;
            }
            let alpha = self.alpha.for_tier(module.tier());
            let tile = self.tile(&option.preview, &fill, dims, alpha);
            let mut overlay = (*tile).clone();
            clip_to_mask_in_place(&mut overlay.data, mask.alpha())?;
            blend_in_place(
                &mut layer.data,
                &overlay.data,
                BlendMode::from(module.color_model),
                1.0,
            )?;
            stats.fallback += 1;
        }
        Ok(())
    }

    fn fallback_mask(
        &mut self,
        module: &FeatureModule,
        frame: &CompositeFrame<'_>,
        dims: Size,
    ) -> PreviewResult<RasterMask> {
        let feather = self.feather_radius;
        if let Some(ov) = frame.overrides.get(&module.id) {
            let rev = frame.overrides.revision(&module.id);
            let source = format!("override:{}:{rev}", module.id);
            let m = self.memo_mask(source, dims, || ov.resized_to(dims).feathered(feather))?;
            return Ok((*m).clone());
        }

        let mut out = RasterMask::empty(dims);
        for &t in &module.targets {
            if let Some(enh) = frame.enhanced.get(t) {
                let source = format!("enhanced:{}:{}", t.as_str(), frame.enhanced.revision(t));
                let m = self.memo_mask(source, dims, || enh.resized_to(dims).feathered(feather))?;
                out.union_with(&m)?;
                continue;
            }
            for el in frame.scene.elements.iter().filter(|el| el.surface_type == t) {
                let m = self.memo_mask(format!("element:{}", el.id), dims, || {
                    rasterize_polygons([&el.polygon], dims)?.feathered(feather)
                })?;
                out.union_with(&m)?;
            }
        }
        Ok(out)
    }

    fn memo_mask(
        &mut self,
        source: String,
        dims: Size,
        build: impl FnOnce() -> PreviewResult<RasterMask>,
    ) -> PreviewResult<Arc<RasterMask>> {
        let key = MaskMemoKey {
            source,
            width: dims.width,
            height: dims.height,
            feather: self.feather_radius,
        };
        if let Some(m) = self.masks.get(&key) {
            return Ok(Arc::clone(m));
        }
        let m = Arc::new(build()?);
        self.masks.insert(key, Arc::clone(&m));
        Ok(m)
    }

    fn tile(
        &mut self,
        preview: &OptionPreview,
        fill: &Fill,
        dims: Size,
        alpha: f32,
    ) -> Arc<PremulRaster> {
        let fill_id = match preview {
            OptionPreview::Color { hex } => format!("color:{}", hex.to_ascii_lowercase()),
            OptionPreview::Texture { path } => format!("texture:{path}"),
            OptionPreview::None => "none".to_owned(),
        };
        let key = TileMemoKey {
            fill: fill_id,
            width: dims.width,
            height: dims.height,
            alpha_bits: alpha.to_bits(),
        };
        Arc::clone(
            self.tiles
                .entry(key)
                .or_insert_with(|| Arc::new(fill.render(dims, alpha))),
        )
    }
}

/// Largest rectangle with `src`'s aspect ratio that fits centered in `viewport`.
pub fn contain_fit(src: Size, viewport: PixelRect) -> Option<PixelRect> {
    if viewport.width == 0 || viewport.height == 0 {
        return None;
    }
    let scale = (f64::from(viewport.width) / f64::from(src.width))
        .min(f64::from(viewport.height) / f64::from(src.height));
    let w = ((f64::from(src.width) * scale).round() as u32).clamp(1, viewport.width);
    let h = ((f64::from(src.height) * scale).round() as u32).clamp(1, viewport.height);
    Some(PixelRect {
        x: viewport.x + (viewport.width - w) / 2,
        y: viewport.y + (viewport.height - h) / 2,
        width: w,
        height: h,
    })
}

fn scale_straight(img: &RgbaImage, dims: Size) -> PremulRaster {
    if img.dimensions() == (dims.width, dims.height) {
        return PremulRaster::from_straight(img);
    }
    PremulRaster::from_straight(&imageops::resize(
        img,
        dims.width,
        dims.height,
        FilterType::Triangle,
    ))
}

fn scale_premul(raster: &PremulRaster, dims: Size) -> PremulRaster {
    if raster.size() == dims {
        return raster.clone();
    }
    // Premultiplied in, premultiplied out.
    let Some(img) = RgbaImage::from_raw(raster.width, raster.height, raster.data.clone()) else {
        return PremulRaster::transparent(dims);
    };
    let out = imageops::resize(&img, dims.width, dims.height, FilterType::Triangle);
    PremulRaster {
        width: dims.width,
        height: dims.height,
        data: out.into_raw(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/live.rs"]
mod tests;
