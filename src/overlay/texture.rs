use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;

use crate::foundation::core::{PremulRaster, Rgba8Premul, Size};
use crate::foundation::error::{PreviewError, PreviewResult};
use crate::foundation::math::mul_div255_u8;
use crate::scene::model::{FeatureModule, OptionPreview, parse_hex_color};

/// Decoded option textures keyed by normalized relative path.
///
/// Decoding is front-loaded so baking and compositing stay IO-free. Textures that fail to load
/// are remembered with their error; options referencing them are skipped, not fatal.
#[derive(Clone, Debug, Default)]
pub struct TextureStore {
    root: PathBuf,
    textures: HashMap<String, Arc<PremulRaster>>,
    missing: BTreeMap<String, String>,
}

impl TextureStore {
    /// Store with no textures.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every texture referenced by `modules` from under `root`.
    #[tracing::instrument(skip(modules, root))]
    pub fn prepare(modules: &[FeatureModule], root: impl Into<PathBuf>) -> Self {
        let mut out = Self {
            root: root.into(),
            ..Self::default()
        };
        for module in modules {
            for opt in &module.options {
                let OptionPreview::Texture { path } = &opt.preview else {
                    continue;
                };
                let key = match normalize_rel_path(path) {
                    Ok(k) => k,
                    Err(e) => {
                        out.missing.insert(path.clone(), e.to_string());
                        continue;
                    }
                };
                if out.textures.contains_key(&key) || out.missing.contains_key(&key) {
                    continue;
                }
                match out.read_bytes(&key).and_then(|b| decode_texture(&b)) {
                    Ok(tex) => {
                        out.textures.insert(key, Arc::new(tex));
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %key,
                            error = %e,
                            "texture unavailable, skipping its options"
                        );
                        out.missing.insert(key, e.to_string());
                    }
                }
            }
        }
        tracing::debug!(
            loaded = out.textures.len(),
            missing = out.missing.len(),
            "prepared textures"
        );
        out
    }

    /// Register an already-decoded texture.
    pub fn insert(&mut self, path: &str, texture: PremulRaster) -> PreviewResult<()> {
        let key = normalize_rel_path(path)?;
        self.missing.remove(&key);
        self.textures.insert(key, Arc::new(texture));
        Ok(())
    }

    /// Texture for `path`, if it loaded.
    pub fn get(&self, path: &str) -> Option<&Arc<PremulRaster>> {
        let key = normalize_rel_path(path).ok()?;
        self.textures.get(&key)
    }

    /// Textures that failed to load, with their errors.
    pub fn missing(&self) -> impl Iterator<Item = (&str, &str)> {
        self.missing.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Root directory relative paths resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_bytes(&self, norm_path: &str) -> PreviewResult<Vec<u8>> {
        let path = self.root.join(Path::new(norm_path));
        std::fs::read(&path)
            .with_context(|| format!("read texture bytes from '{}'", path.display()))
            .map_err(PreviewError::from)
    }
}

/// Normalize a texture path: forward slashes, no `.`/`..`, never absolute.
pub fn normalize_rel_path(source: &str) -> PreviewResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(PreviewError::validation("texture paths must be relative"));
    }
    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(PreviewError::validation(
                "texture paths must not contain '..'",
            ));
        }
        out.push(part);
    }
    if out.is_empty() {
        return Err(PreviewError::validation(
            "texture path must contain a file name",
        ));
    }
    Ok(out.join("/"))
}

/// Decode texture bytes into premultiplied RGBA8.
pub fn decode_texture(bytes: &[u8]) -> PreviewResult<PremulRaster> {
    let img = image::load_from_memory(bytes)
        .context("decode texture from memory")?
        .to_rgba8();
    Size::new(img.width(), img.height())?;
    Ok(PremulRaster::from_straight(&img))
}

/// Resolved content of an option preview.
#[derive(Clone, Debug, PartialEq)]
pub enum Fill {
    /// Flat color (straight RGB).
    Solid([u8; 3]),
    /// Texture tiled at native resolution.
    Tiled(Arc<PremulRaster>),
}

/// Why an option produced no overlay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The feature's mask covers nothing.
    EmptyMask,
    /// The option's texture could not be loaded.
    MissingTexture(String),
    /// The option has no instant preview.
    NoPreview,
}

impl Fill {
    /// Resolve an option preview against the loaded textures.
    ///
    /// The outer error is a malformed preview; the inner one an option that cannot be shown.
    pub fn resolve(
        preview: &OptionPreview,
        textures: &TextureStore,
    ) -> PreviewResult<Result<Self, SkipReason>> {
        Ok(match preview {
            OptionPreview::Color { hex } => Ok(Self::Solid(parse_hex_color(hex)?)),
            OptionPreview::Texture { path } => match textures.get(path) {
                Some(t) => Ok(Self::Tiled(Arc::clone(t))),
                None => Err(SkipReason::MissingTexture(path.clone())),
            },
            OptionPreview::None => Err(SkipReason::NoPreview),
        })
    }

    /// Render the fill full-frame at `size` with uniform `alpha`.
    pub fn render(&self, size: Size, alpha: f32) -> PremulRaster {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        match self {
            Self::Solid([r, g, b]) => {
                PremulRaster::filled(size, Rgba8Premul::from_straight_rgba(*r, *g, *b, a))
            }
            Self::Tiled(tex) => {
                let mut out = PremulRaster::transparent(size);
                let (tw, th) = (tex.width as usize, tex.height as usize);
                let w = size.width as usize;
                for (y, row) in out.data.chunks_exact_mut(w * 4).enumerate() {
                    let ty = y % th;
                    for (x, px) in row.chunks_exact_mut(4).enumerate() {
                        let i = (ty * tw + x % tw) * 4;
                        for (d, &s) in px.iter_mut().zip(&tex.data[i..i + 4]) {
                            *d = mul_div255_u8(u16::from(s), u16::from(a));
                        }
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/texture.rs"]
mod tests;
