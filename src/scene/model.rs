use std::collections::{BTreeSet, HashSet};

use crate::foundation::core::Point;
use crate::foundation::error::{PreviewError, PreviewResult};

/// Stable identifier of a scanned photo.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub String);

/// Identifier of a [`FeatureModule`], unique per session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub String);

/// Identifier of a [`FinishOption`], unique within its module.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub String);

macro_rules! string_id {
    ($t:ident) => {
        impl $t {
            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $t {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(ScanId);
string_id!(FeatureId);
string_id!(OptionId);

/// Whether the photo shows an interior room or a building exterior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneCategory {
    /// Room interior.
    Interior,
    /// Building exterior.
    Exterior,
}

/// Finer classification reported by the scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subcategory {
    Kitchen,
    Bathroom,
    LivingRoom,
    Bedroom,
    DiningRoom,
    Office,
    Basement,
    FrontExterior,
    BackExterior,
    SideExterior,
    Backyard,
    #[serde(other)]
    Unknown,
}

/// Scanner self-reported confidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Kind of paintable or replaceable surface.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceType {
    Floor,
    Walls,
    Ceiling,
    Cabinets,
    Countertop,
    Backsplash,
    Appliances,
    Siding,
    Roof,
    Trim,
    Door,
    Windows,
    GarageDoor,
    Driveway,
    Walkway,
    Fence,
    Deck,
    Landscaping,
    #[serde(other)]
    Unknown,
}

impl SurfaceType {
    /// Wire name used by the scanner and segmentation collaborators.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Floor => "floor",
            Self::Walls => "walls",
            Self::Ceiling => "ceiling",
            Self::Cabinets => "cabinets",
            Self::Countertop => "countertop",
            Self::Backsplash => "backsplash",
            Self::Appliances => "appliances",
            Self::Siding => "siding",
            Self::Roof => "roof",
            Self::Trim => "trim",
            Self::Door => "door",
            Self::Windows => "windows",
            Self::GarageDoor => "garage_door",
            Self::Driveway => "driveway",
            Self::Walkway => "walkway",
            Self::Fence => "fence",
            Self::Deck => "deck",
            Self::Landscaping => "landscaping",
            Self::Unknown => "unknown",
        }
    }

    /// Large planar surfaces that usually cover a big share of the frame.
    pub fn is_large_area(self) -> bool {
        matches!(
            self,
            Self::Floor
                | Self::Walls
                | Self::Ceiling
                | Self::Siding
                | Self::Roof
                | Self::Driveway
                | Self::Landscaping
        )
    }
}

/// Ordered polygon in normalized image coordinates (x, y in `[0, 1]`).
///
/// Serialized as a list of `[x, y]` pairs.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    #[serde(with = "point_pairs")]
    pub points: Vec<Point>,
}

impl Polygon {
    /// Build from `(x, y)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self {
            points: pairs.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    /// Fewer than three points cannot enclose area and are skipped at rasterization.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 3
    }
}

mod point_pairs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::foundation::core::Point;

    pub(super) fn serialize<S: Serializer>(points: &[Point], s: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<[f64; 2]> = points.iter().map(|p| [p.x, p.y]).collect();
        pairs.serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Point>, D::Error> {
        let pairs = Vec::<[f64; 2]>::deserialize(d)?;
        Ok(pairs.into_iter().map(|[x, y]| Point::new(x, y)).collect())
    }
}

/// One typed region reported by the scanner.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SurfaceElement {
    /// Scanner-assigned id, stable for the life of the scan.
    pub id: String,
    /// Surface kind.
    #[serde(rename = "type")]
    pub surface_type: SurfaceType,
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Outline in normalized coordinates.
    pub polygon: Polygon,
}

/// Structural description of one photo. Immutable once produced.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneDescription {
    /// Interior or exterior.
    pub category: SceneCategory,
    /// Finer classification.
    pub subcategory: Subcategory,
    /// Scanner confidence.
    pub confidence: Confidence,
    /// Surface regions in scanner order.
    pub elements: Vec<SurfaceElement>,
}

impl SceneDescription {
    /// Drop malformed polygons and clamp coordinates into the unit square.
    ///
    /// Never rejects a scene: a scanner answer with zero usable elements is still a scene.
    pub fn sanitize(mut self) -> Self {
        let before = self.elements.len();
        self.elements.retain_mut(|el| {
            if el.polygon.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
                return false;
            }
            for p in &mut el.polygon.points {
                p.x = p.x.clamp(0.0, 1.0);
                p.y = p.y.clamp(0.0, 1.0);
            }
            !el.polygon.is_degenerate()
        });
        let dropped = before - self.elements.len();
        if dropped > 0 {
            tracing::debug!(dropped, "skipped malformed scene polygons");
        }
        self
    }

    /// Elements whose type is in `types`, in scanner order.
    pub fn elements_of<'a>(
        &'a self,
        types: &'a BTreeSet<SurfaceType>,
    ) -> impl Iterator<Item = &'a SurfaceElement> + 'a {
        self.elements
            .iter()
            .filter(move |el| types.contains(&el.surface_type))
    }

    /// Distinct surface types present in the scene.
    pub fn surface_types(&self) -> BTreeSet<SurfaceType> {
        self.elements.iter().map(|el| el.surface_type).collect()
    }
}

/// How a module's options can be previewed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMode {
    /// Instantly compositable as a masked overlay.
    #[default]
    Overlay,
    /// Only visible after full synthesis.
    FinalOnly,
}

/// How an overlay combines with the photo underneath.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorModel {
    /// Replace hue and saturation, keep the photo's luminance (paint, stain, cabinet color).
    HueReplace,
    /// Multiply the material over the photo's shading.
    #[default]
    Material,
}

/// Size class used to pick the overlay alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaTier {
    /// Walls, floors, siding and other big planes.
    Large,
    /// Trim, doors, countertops and other small regions.
    Small,
}

/// What an option changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Color,
    Material,
    Style,
}

/// Instant preview of an option.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionPreview {
    /// Flat `#rrggbb` fill.
    Color {
        /// Hex color string.
        hex: String,
    },
    /// Tiled texture, path relative to the texture root.
    Texture {
        /// Relative texture path.
        path: String,
    },
    /// No instant preview; only the synthesis collaborator can show it.
    None,
}

/// One selectable finish.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FinishOption {
    /// Unique within the module.
    pub id: OptionId,
    /// Human-readable label.
    pub label: String,
    /// What the option changes.
    pub kind: OptionKind,
    /// Instant preview, if any.
    pub preview: OptionPreview,
    /// Text consumed only by the synthesis collaborator.
    #[serde(default)]
    pub render_hint: String,
}

/// A user-facing surface category with its options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureModule {
    /// Unique per session.
    pub id: FeatureId,
    /// Human-readable label.
    pub label: String,
    /// Surface types this module paints.
    pub targets: BTreeSet<SurfaceType>,
    /// Overlay or final-only.
    #[serde(default)]
    pub preview_mode: PreviewMode,
    /// Blend family, fixed at construction.
    #[serde(default)]
    pub color_model: ColorModel,
    /// Alpha tier; derived from targets when absent.
    #[serde(default)]
    pub area_tier: Option<AreaTier>,
    /// Options in display order.
    pub options: Vec<FinishOption>,
}

impl FeatureModule {
    /// Reject duplicate option ids, empty target sets and unparsable color previews.
    pub fn validate(&self) -> PreviewResult<()> {
        if self.targets.is_empty() {
            return Err(PreviewError::validation(format!(
                "module '{}' has no target surfaces",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for opt in &self.options {
            if !seen.insert(&opt.id) {
                return Err(PreviewError::validation(format!(
                    "module '{}' repeats option id '{}'",
                    self.id, opt.id
                )));
            }
            if let OptionPreview::Color { hex } = &opt.preview {
                parse_hex_color(hex).map_err(|e| {
                    PreviewError::validation(format!(
                        "module '{}' option '{}': {e}",
                        self.id, opt.id
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Alpha tier, falling back to the size class of the target surfaces.
    pub fn tier(&self) -> AreaTier {
        self.area_tier.unwrap_or_else(|| {
            if self.targets.iter().any(|t| t.is_large_area()) {
                AreaTier::Large
            } else {
                AreaTier::Small
            }
        })
    }

    /// Look up an option by id.
    pub fn option(&self, id: &OptionId) -> Option<&FinishOption> {
        self.options.iter().find(|o| &o.id == id)
    }

    /// `true` for modules whose options are instantly compositable.
    pub fn is_overlay(&self) -> bool {
        self.preview_mode == PreviewMode::Overlay
    }
}

/// Validate a module list: each module valid, feature ids unique.
pub fn validate_modules(modules: &[FeatureModule]) -> PreviewResult<()> {
    let mut seen = HashSet::new();
    for m in modules {
        m.validate()?;
        if !seen.insert(&m.id) {
            return Err(PreviewError::validation(format!(
                "duplicate feature id '{}'",
                m.id
            )));
        }
    }
    Ok(())
}

/// Parse `#rrggbb` or `#rgb`.
pub fn parse_hex_color(s: &str) -> PreviewResult<[u8; 3]> {
    let hex = s.trim().trim_start_matches('#');
    let bad = || PreviewError::validation(format!("invalid hex color '{s}'"));
    let nibble = |c: u8| -> PreviewResult<u8> {
        (c as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(bad)
    };
    let b = hex.as_bytes();
    match b.len() {
        6 => Ok([
            nibble(b[0])? * 16 + nibble(b[1])?,
            nibble(b[2])? * 16 + nibble(b[3])?,
            nibble(b[4])? * 16 + nibble(b[5])?,
        ]),
        3 => Ok([
            nibble(b[0])? * 17,
            nibble(b[1])? * 17,
            nibble(b[2])? * 17,
        ]),
        _ => Err(bad()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/model.rs"]
mod tests;
