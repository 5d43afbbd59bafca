//! Optional pixel-segmentation collaborator.
//!
//! Wire types match the masker service: the request carries the downscaled photo as base64 PNG
//! plus the scanner polygons per surface type; the response carries one white-on-transparent
//! PNG mask per type. Every failure mode collapses to `None` so callers keep the polygon mask.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::foundation::core::Size;
use crate::foundation::error::{PreviewError, PreviewResult};
use crate::foundation::math::working_size;
use crate::mask::raster::RasterMask;
use crate::scene::model::{Polygon, SceneCategory, SceneDescription, Subcategory, SurfaceType};

/// Pixel-segmentation collaborator.
pub trait Segmenter {
    /// Segment the surfaces listed in `request`.
    fn segment(
        &self,
        request: SegmentRequest,
    ) -> impl Future<Output = PreviewResult<SegmentResponse>>;
}

/// Scene context forwarded to the segmenter.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneHint {
    /// Interior or exterior.
    pub category: Option<SceneCategory>,
    /// Room or facade kind.
    pub subcategory: Option<Subcategory>,
}

/// Polygons of one surface type.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SegmentItem {
    /// Surface type to segment.
    #[serde(rename = "type")]
    pub surface_type: SurfaceType,
    /// Coarse outlines in normalized coordinates.
    pub polygons_norm: Vec<Polygon>,
}

/// Request body.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SegmentRequest {
    /// Downscaled photo, base64 PNG.
    pub image_base64: String,
    /// MIME type of `image_base64`.
    pub image_mime: String,
    /// Longest side of the returned masks.
    pub max_side: u32,
    /// Optional scene context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneHint>,
    /// One entry per requested surface type.
    pub items: Vec<SegmentItem>,
}

/// One segmented mask.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SegmentedMask {
    /// White RGBA PNG with coverage in alpha, base64.
    pub png_base64: String,
    /// Self-reported confidence.
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    /// Segmentation method name.
    #[serde(default)]
    pub method: String,
}

fn full_confidence() -> f32 {
    1.0
}

/// Response body.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SegmentResponse {
    /// Mask width.
    pub width: u32,
    /// Mask height.
    pub height: u32,
    /// Echo of the requested cap.
    pub max_side: u32,
    /// Masks keyed by surface type wire name.
    pub masks: BTreeMap<String, SegmentedMask>,
    /// Per-type failures.
    #[serde(default)]
    pub errors: Option<BTreeMap<String, String>>,
}

/// Encode an image as base64 PNG.
pub fn encode_png_base64(img: &RgbaImage) -> PreviewResult<String> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreviewError::serde(format!("encode png: {e}")))?;
    Ok(STANDARD.encode(buf))
}

/// Build a request for `surface_type`, downscaling `photo` to the working size.
pub fn build_request(
    photo: &RgbaImage,
    scene: &SceneDescription,
    surface_type: SurfaceType,
    max_side: u32,
) -> PreviewResult<SegmentRequest> {
    let original = Size::new(photo.width(), photo.height())?;
    let work = working_size(original, max_side);
    let image_base64 = if work == original {
        encode_png_base64(photo)?
    } else {
        encode_png_base64(&imageops::resize(
            photo,
            work.width,
            work.height,
            FilterType::Triangle,
        ))?
    };
    let polygons_norm = scene
        .elements
        .iter()
        .filter(|el| el.surface_type == surface_type)
        .map(|el| el.polygon.clone())
        .collect();
    Ok(SegmentRequest {
        image_base64,
        image_mime: "image/png".to_owned(),
        max_side,
        scene: Some(SceneHint {
            category: Some(scene.category),
            subcategory: Some(scene.subcategory),
        }),
        items: vec![SegmentItem {
            surface_type,
            polygons_norm,
        }],
    })
}

/// Decode one response mask and bring it to `size`.
pub fn decode_mask(mask: &SegmentedMask, size: Size) -> PreviewResult<RasterMask> {
    let bytes = STANDARD
        .decode(mask.png_base64.trim())
        .map_err(|e| PreviewError::decode(format!("mask base64: {e}")))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| PreviewError::decode(format!("mask png: {e}")))?
        .to_rgba8();
    Ok(RasterMask::from_image(&img)?.cleaned().resized_to(size))
}

/// Ask `segmenter` for an edge-snapped mask of `surface_type` at `size`.
///
/// Returns `None` on error, timeout, missing entry or undecodable mask.
#[tracing::instrument(skip(segmenter, photo, scene), fields(surface = surface_type.as_str()))]
pub async fn enhanced_mask<S: Segmenter>(
    segmenter: &S,
    photo: &RgbaImage,
    scene: &SceneDescription,
    surface_type: SurfaceType,
    size: Size,
    timeout: Duration,
) -> Option<RasterMask> {
    let max_side = size.width.max(size.height);
    let request = match build_request(photo, scene, surface_type, max_side) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "segmentation request could not be built");
            return None;
        }
    };

    let response = match tokio::time::timeout(timeout, segmenter.segment(request)).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "segmentation failed, keeping polygon mask");
            return None;
        }
        Err(_) => {
            tracing::warn!(?timeout, "segmentation timed out, keeping polygon mask");
            return None;
        }
    };

    if let Some(err) = response
        .errors
        .as_ref()
        .and_then(|e| e.get(surface_type.as_str()))
    {
        tracing::debug!(error = %err, "segmenter reported a per-type error");
    }

    let entry = response.masks.get(surface_type.as_str())?;
    match decode_mask(entry, size) {
        Ok(mask) if !mask.is_empty() => Some(mask),
        Ok(_) => {
            tracing::debug!("segmenter returned an empty mask");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "undecodable segmentation mask");
            None
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mask/segment.rs"]
mod tests;
