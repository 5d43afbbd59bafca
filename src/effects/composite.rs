use crate::foundation::error::{PreviewError, PreviewResult};
use crate::foundation::math::mul_div255_u8;
use crate::scene::model::ColorModel;

/// Premultiplied RGBA8 pixel.
pub type PremulRgba8 = [u8; 4];

/// Blend modes understood by the compositor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Plain source-over.
    Normal,
    /// Darken by the overlay; keeps shading and texture of the photo.
    #[default]
    Multiply,
    /// Hue and saturation from the overlay, luminosity from the photo.
    Color,
}

impl BlendMode {
    /// Parse a blend-mode name. Unknown names fall back to [`BlendMode::Multiply`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "normal" | "source-over" | "over" => Self::Normal,
            "multiply" => Self::Multiply,
            "color" => Self::Color,
            other => {
                tracing::warn!(mode = other, "unsupported blend mode, using multiply");
                Self::Multiply
            }
        }
    }
}

impl From<ColorModel> for BlendMode {
    fn from(model: ColorModel) -> Self {
        match model {
            ColorModel::HueReplace => Self::Color,
            ColorModel::Material => Self::Multiply,
        }
    }
}

/// Source-over with an extra opacity multiplier.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Composite `src` onto `dst` with the given blend mode (W3C compositing, premultiplied).
pub fn blend(dst: PremulRgba8, src: PremulRgba8, mode: BlendMode, opacity: f32) -> PremulRgba8 {
    if mode == BlendMode::Normal {
        return over(dst, src, opacity);
    }
    let opacity = opacity.clamp(0.0, 1.0);
    let sa = f32::from(src[3]) / 255.0 * opacity;
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst[3]) / 255.0;

    let unpremul = |px: PremulRgba8| -> [f32; 3] {
        let a = f32::from(px[3]);
        if a == 0.0 {
            return [0.0; 3];
        }
        [
            f32::from(px[0]) / a,
            f32::from(px[1]) / a,
            f32::from(px[2]) / a,
        ]
    };
    let cs = unpremul(src);
    let cb = unpremul(dst);
    let mixed = blend_colors(mode, cb, cs);

    let ao = sa + da - sa * da;
    let mut out = [0u8; 4];
    for i in 0..3 {
        let co = cs[i] * sa * (1.0 - da) + cb[i] * da * (1.0 - sa) + sa * da * mixed[i];
        out[i] = to_u8(co.min(ao));
    }
    out[3] = to_u8(ao);
    out
}

fn blend_colors(mode: BlendMode, cb: [f32; 3], cs: [f32; 3]) -> [f32; 3] {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => [cb[0] * cs[0], cb[1] * cs[1], cb[2] * cs[2]],
        BlendMode::Color => set_lum(cs, lum(cb)),
    }
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 {
        for v in &mut out {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 {
        for v in &mut out {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blend a whole premultiplied layer onto `dst`.
pub fn blend_in_place(
    dst: &mut [u8],
    src: &[u8],
    mode: BlendMode,
    opacity: f32,
) -> PreviewResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(PreviewError::validation(
            "blend_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        if s[3] == 0 {
            continue;
        }
        let out = blend([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], mode, opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Keep `rgba` only where `mask` is opaque (destination-in with a coverage plane).
pub fn clip_to_mask_in_place(rgba: &mut [u8], mask: &[u8]) -> PreviewResult<()> {
    if rgba.len() != mask.len() * 4 {
        return Err(PreviewError::validation(
            "clip_to_mask_in_place expects one mask byte per rgba8 pixel",
        ));
    }
    for (px, &m) in rgba.chunks_exact_mut(4).zip(mask) {
        match m {
            255 => {}
            0 => px.copy_from_slice(&[0, 0, 0, 0]),
            _ => {
                for c in px.iter_mut() {
                    *c = mul_div255_u8(u16::from(*c), u16::from(m));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/effects/composite.rs"]
mod tests;
