//! Geometry-preserving fit of an arbitrary photo into a synthesis-friendly canvas.
//!
//! `prepare` letterboxes the photo into the supported size whose aspect ratio is closest,
//! padding with the photo's mean color so the synthesis step has no hard seam to "complete".
//! `reverse` undoes the fit on whatever comes back.

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::foundation::core::{PixelRect, Size};
use crate::foundation::error::{PreviewError, PreviewResult};

const RESAMPLE: FilterType = FilterType::CatmullRom;

/// Everything `reverse` needs to undo `prepare`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransformInfo {
    /// Dimensions of the input photo.
    pub original: Size,
    /// Chosen synthesis canvas.
    pub target: Size,
    /// Where the scaled photo sits on the target canvas.
    pub placement: PixelRect,
    /// Per-channel mean color used for the padding.
    pub pad_rgb: [u8; 3],
}

/// Pick the supported size whose aspect ratio is numerically closest to `input`.
///
/// Ties resolve to the earliest entry.
pub fn choose_target(input: Size, supported: &[Size]) -> PreviewResult<Size> {
    let aspect = input.aspect();
    supported
        .iter()
        .copied()
        .filter(|s| s.width > 0 && s.height > 0)
        .fold(None::<(Size, f64)>, |best, s| {
            let d = (s.aspect() - aspect).abs();
            match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((s, d)),
            }
        })
        .map(|(s, _)| s)
        .ok_or_else(|| PreviewError::validation("no supported synthesis sizes configured"))
}

/// Fit `img` into the closest supported size without cropping or distortion.
#[tracing::instrument(skip(img, supported), fields(w = img.width(), h = img.height()))]
pub fn prepare(img: &RgbaImage, supported: &[Size]) -> PreviewResult<(RgbaImage, TransformInfo)> {
    let original = Size::new(img.width(), img.height())?;
    let target = choose_target(original, supported)?;

    let scale = (f64::from(target.width) / f64::from(original.width))
        .min(f64::from(target.height) / f64::from(original.height));
    let sw = ((f64::from(original.width) * scale).round() as u32).clamp(1, target.width);
    let sh = ((f64::from(original.height) * scale).round() as u32).clamp(1, target.height);
    let placement = PixelRect {
        x: (target.width - sw) / 2,
        y: (target.height - sh) / 2,
        width: sw,
        height: sh,
    };

    let pad_rgb = mean_rgb(img);
    let mut canvas = RgbaImage::from_pixel(
        target.width,
        target.height,
        image::Rgba([pad_rgb[0], pad_rgb[1], pad_rgb[2], 255]),
    );
    if sw == original.width && sh == original.height {
        imageops::replace(&mut canvas, img, i64::from(placement.x), i64::from(placement.y));
    } else {
        let scaled = imageops::resize(img, sw, sh, RESAMPLE);
        imageops::replace(
            &mut canvas,
            &scaled,
            i64::from(placement.x),
            i64::from(placement.y),
        );
    }

    tracing::debug!(
        target_w = target.width,
        target_h = target.height,
        x = placement.x,
        y = placement.y,
        "fitted photo into synthesis canvas"
    );

    Ok((
        canvas,
        TransformInfo {
            original,
            target,
            placement,
            pad_rgb,
        },
    ))
}

/// Decode encoded photo bytes and [`prepare`] them.
pub fn prepare_bytes(
    bytes: &[u8],
    supported: &[Size],
) -> PreviewResult<(RgbaImage, TransformInfo)> {
    let img = decode_rgba(bytes)?;
    prepare(&img, supported)
}

/// Crop the placement rectangle out of `result` and resize it back to the original size.
///
/// `result` may differ in size from the requested target; the rectangle is scaled along.
#[tracing::instrument(skip(result, info), fields(w = result.width(), h = result.height()))]
pub fn reverse(result: &RgbaImage, info: &TransformInfo) -> PreviewResult<RgbaImage> {
    let got = Size::new(result.width(), result.height())?;
    let sx = f64::from(got.width) / f64::from(info.target.width);
    let sy = f64::from(got.height) / f64::from(info.target.height);

    let x0 = ((f64::from(info.placement.x) * sx).round() as u32).min(got.width - 1);
    let y0 = ((f64::from(info.placement.y) * sy).round() as u32).min(got.height - 1);
    let x1 = ((f64::from(info.placement.x + info.placement.width) * sx).round() as u32)
        .clamp(x0 + 1, got.width);
    let y1 = ((f64::from(info.placement.y + info.placement.height) * sy).round() as u32)
        .clamp(y0 + 1, got.height);

    let cropped = imageops::crop_imm(result, x0, y0, x1 - x0, y1 - y0).to_image();
    if cropped.dimensions() == (info.original.width, info.original.height) {
        return Ok(cropped);
    }
    Ok(imageops::resize(
        &cropped,
        info.original.width,
        info.original.height,
        RESAMPLE,
    ))
}

/// Decode bytes into straight RGBA8, rejecting zero-sized images.
pub fn decode_rgba(bytes: &[u8]) -> PreviewResult<RgbaImage> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| PreviewError::decode(format!("decode image from memory: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    Size::new(rgba.width(), rgba.height())?;
    Ok(rgba)
}

fn mean_rgb(img: &RgbaImage) -> [u8; 3] {
    let mut sum = [0u64; 3];
    for px in img.pixels() {
        for c in 0..3 {
            sum[c] += u64::from(px.0[c]);
        }
    }
    let n = (img.width() as u64 * img.height() as u64).max(1);
    [
        ((sum[0] + n / 2) / n) as u8,
        ((sum[1] + n / 2) / n) as u8,
        ((sum[2] + n / 2) / n) as u8,
    ]
}

#[cfg(test)]
#[path = "../../tests/unit/transform/fit.rs"]
mod tests;
