use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

use crate::effects::blur::blur_alpha;
use crate::foundation::core::Size;
use crate::foundation::error::{PreviewError, PreviewResult};
use crate::scene::model::{Polygon, SurfaceType};

/// Single-channel coverage plane; 255 where a surface is present.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterMask {
    size: Size,
    alpha: Vec<u8>,
}

impl std::fmt::Debug for RasterMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterMask")
            .field("size", &self.size)
            .field("coverage", &self.coverage())
            .finish()
    }
}

impl RasterMask {
    /// Fully transparent mask.
    pub fn empty(size: Size) -> Self {
        Self {
            size,
            alpha: vec![0u8; size.area()],
        }
    }

    /// Wrap a coverage plane, validating its length.
    pub fn from_alpha(size: Size, alpha: Vec<u8>) -> PreviewResult<Self> {
        if alpha.len() != size.area() {
            return Err(PreviewError::validation(format!(
                "mask expects {} bytes for {}x{}, got {}",
                size.area(),
                size.width,
                size.height,
                alpha.len()
            )));
        }
        Ok(Self { size, alpha })
    }

    /// Interpret a user-authored or collaborator-produced image as a mask.
    ///
    /// Images with any translucency contribute their alpha channel; fully opaque images
    /// contribute their luminance (white = surface).
    pub fn from_image(img: &RgbaImage) -> PreviewResult<Self> {
        let size = Size::new(img.width(), img.height())?;
        let has_alpha = img.pixels().any(|p| p.0[3] < 255);
        let alpha = img
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                if has_alpha {
                    a
                } else {
                    ((u32::from(r) * 77 + u32::from(g) * 150 + u32::from(b) * 29 + 128) >> 8)
                        as u8
                }
            })
            .collect();
        Ok(Self { size, alpha })
    }

    /// Dimensions.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Coverage bytes in row-major order.
    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// `true` when no pixel is covered.
    pub fn is_empty(&self) -> bool {
        self.alpha.iter().all(|&a| a == 0)
    }

    /// Fraction of pixels with non-zero coverage.
    pub fn coverage(&self) -> f64 {
        if self.alpha.is_empty() {
            return 0.0;
        }
        let covered = self.alpha.iter().filter(|&&a| a > 0).count();
        covered as f64 / self.alpha.len() as f64
    }

    /// Per-pixel maximum with another mask of the same size.
    pub fn union_with(&mut self, other: &RasterMask) -> PreviewResult<()> {
        if other.size != self.size {
            return Err(PreviewError::validation("mask union expects equal sizes"));
        }
        for (a, &b) in self.alpha.iter_mut().zip(&other.alpha) {
            *a = (*a).max(b);
        }
        Ok(())
    }

    /// Remove pixels covered by `other` (used for overlap resolution).
    pub fn subtract(&mut self, other: &RasterMask) -> PreviewResult<()> {
        if other.size != self.size {
            return Err(PreviewError::validation("mask subtract expects equal sizes"));
        }
        for (a, &b) in self.alpha.iter_mut().zip(&other.alpha) {
            if b >= 128 {
                *a = 0;
            }
        }
        Ok(())
    }

    /// Resample to `size` (bilinear). Returns a clone when already there.
    pub fn resized_to(&self, size: Size) -> RasterMask {
        if size == self.size {
            return self.clone();
        }
        let gray = GrayImage::from_raw(self.size.width, self.size.height, self.alpha.clone())
            .unwrap_or_else(|| GrayImage::new(self.size.width, self.size.height));
        let out = imageops::resize(&gray, size.width, size.height, FilterType::Triangle);
        RasterMask {
            size,
            alpha: out.into_raw(),
        }
    }

    /// Gaussian-feathered copy.
    pub fn feathered(&self, radius: u32) -> PreviewResult<RasterMask> {
        Ok(RasterMask {
            size: self.size,
            alpha: blur_alpha(&self.alpha, self.size.width, self.size.height, radius, None)?,
        })
    }

    /// 3x3 morphological close then open on the binarized mask, removing speckle and pinholes.
    pub fn cleaned(&self) -> RasterMask {
        let bin: Vec<u8> = self
            .alpha
            .iter()
            .map(|&a| if a >= 128 { 255 } else { 0 })
            .collect();
        let closed = erode(&dilate(&bin, self.size), self.size);
        let opened = dilate(&erode(&closed, self.size), self.size);
        RasterMask {
            size: self.size,
            alpha: opened,
        }
    }

    /// White image carrying the mask in its alpha channel.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut data = Vec::with_capacity(self.alpha.len() * 4);
        for &a in &self.alpha {
            data.extend_from_slice(&[255, 255, 255, a]);
        }
        RgbaImage::from_raw(self.size.width, self.size.height, data)
            .unwrap_or_else(|| RgbaImage::new(self.size.width, self.size.height))
    }
}

fn morph(src: &[u8], size: Size, pick: fn(u8, u8) -> u8) -> Vec<u8> {
    let (w, h) = (size.width as i64, size.height as i64);
    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = src[(y * w + x) as usize];
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (sx, sy) = ((x + dx).clamp(0, w - 1), (y + dy).clamp(0, h - 1));
                    acc = pick(acc, src[(sy * w + sx) as usize]);
                }
            }
            out[(y * w + x) as usize] = acc;
        }
    }
    out
}

fn dilate(src: &[u8], size: Size) -> Vec<u8> {
    morph(src, size, u8::max)
}

fn erode(src: &[u8], size: Size) -> Vec<u8> {
    morph(src, size, u8::min)
}

/// Union-rasterize `polygons` (normalized coordinates) onto a `size` canvas, nonzero fill.
///
/// Degenerate polygons are skipped. Output is deterministic for identical inputs.
pub fn rasterize_polygons<'a>(
    polygons: impl IntoIterator<Item = &'a Polygon>,
    size: Size,
) -> PreviewResult<RasterMask> {
    let width: u16 = size
        .width
        .try_into()
        .map_err(|_| PreviewError::validation("mask width exceeds u16"))?;
    let height: u16 = size
        .height
        .try_into()
        .map_err(|_| PreviewError::validation("mask height exceeds u16"))?;

    let mut ctx = vello_cpu::RenderContext::new(width, height);
    ctx.set_fill_rule(vello_cpu::peniko::Fill::NonZero);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));

    let (fw, fh) = (f64::from(size.width), f64::from(size.height));
    let mut drawn = 0usize;
    for poly in polygons {
        if poly.is_degenerate() {
            continue;
        }
        let mut path = vello_cpu::kurbo::BezPath::new();
        for (i, p) in poly.points.iter().enumerate() {
            let pt = (p.x * fw, p.y * fh);
            if i == 0 {
                path.move_to(pt);
            } else {
                path.line_to(pt);
            }
        }
        path.close_path();
        ctx.fill_path(&path);
        drawn += 1;
    }

    if drawn == 0 {
        return Ok(RasterMask::empty(size));
    }

    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(width, height);
    ctx.render_to_pixmap(&mut pixmap);
    let alpha = pixmap
        .data_as_u8_slice()
        .chunks_exact(4)
        .map(|px| px[3])
        .collect();
    RasterMask::from_alpha(size, alpha)
}

/// Stroke polygon outlines for the debug boundary overlay; returns premultiplied RGBA8.
pub fn stroke_polygons<'a>(
    polygons: impl IntoIterator<Item = &'a Polygon>,
    size: Size,
    width_px: f64,
    rgba: [u8; 4],
) -> PreviewResult<Vec<u8>> {
    let width: u16 = size
        .width
        .try_into()
        .map_err(|_| PreviewError::validation("stroke width exceeds u16"))?;
    let height: u16 = size
        .height
        .try_into()
        .map_err(|_| PreviewError::validation("stroke height exceeds u16"))?;

    let mut ctx = vello_cpu::RenderContext::new(width, height);
    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(width_px));
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
        rgba[0], rgba[1], rgba[2], rgba[3],
    ));
    let (fw, fh) = (f64::from(size.width), f64::from(size.height));
    for poly in polygons {
        if poly.is_degenerate() {
            continue;
        }
        let mut path = vello_cpu::kurbo::BezPath::new();
        for (i, p) in poly.points.iter().enumerate() {
            let pt = (p.x * fw, p.y * fh);
            if i == 0 {
                path.move_to(pt);
            } else {
                path.line_to(pt);
            }
        }
        path.close_path();
        ctx.stroke_path(&path);
    }
    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(width, height);
    ctx.render_to_pixmap(&mut pixmap);
    Ok(pixmap.data_as_u8_slice().to_vec())
}

/// Claim order for contested pixels: small foreground surfaces first, large planes last.
pub const OVERLAP_PRIORITY: &[SurfaceType] = &[
    SurfaceType::Windows,
    SurfaceType::Door,
    SurfaceType::GarageDoor,
    SurfaceType::Appliances,
    SurfaceType::Trim,
    SurfaceType::Backsplash,
    SurfaceType::Countertop,
    SurfaceType::Cabinets,
    SurfaceType::Roof,
    SurfaceType::Siding,
    SurfaceType::Fence,
    SurfaceType::Deck,
    SurfaceType::Driveway,
    SurfaceType::Walkway,
    SurfaceType::Landscaping,
    SurfaceType::Floor,
    SurfaceType::Walls,
    SurfaceType::Ceiling,
];

/// Give every contested pixel to exactly one surface type, following [`OVERLAP_PRIORITY`].
///
/// Types missing from the priority list claim last, in input order.
pub fn resolve_overlaps(masks: &mut [(SurfaceType, RasterMask)]) -> PreviewResult<()> {
    let Some(size) = masks.first().map(|(_, m)| m.size()) else {
        return Ok(());
    };
    let rank = |t: SurfaceType| {
        OVERLAP_PRIORITY
            .iter()
            .position(|&p| p == t)
            .unwrap_or(OVERLAP_PRIORITY.len())
    };
    let mut order: Vec<usize> = (0..masks.len()).collect();
    order.sort_by_key(|&i| rank(masks[i].0));

    let mut taken = RasterMask::empty(size);
    for i in order {
        let mask = &mut masks[i].1;
        mask.subtract(&taken)?;
        taken.union_with(mask)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/mask/raster.rs"]
mod tests;
