use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::Size;
use crate::foundation::error::{PreviewError, PreviewResult};

/// Tuning knobs for the whole preview pipeline.
///
/// Every field has a default; JSON config files may set any subset. The alpha tiers and the
/// debounce window are empirical values, not invariants.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineOpts {
    /// Longest side of every working-resolution mask and overlay.
    pub working_max_side: u32,
    /// Sizes the synthesis collaborator accepts.
    pub supported_sizes: Vec<Size>,
    /// Overlay alpha for large-area features (walls, floors, siding).
    pub large_area_alpha: f32,
    /// Overlay alpha for small-area features (trim, doors, countertops).
    pub small_area_alpha: f32,
    /// Feather radius of on-the-fly masks, in presentation pixels.
    pub feather_radius_px: u32,
    /// Yield to the scheduler after this many baked assets.
    pub yield_every: usize,
    /// Quiescence window before a refinement request fires.
    pub debounce_ms: u64,
    /// Upper bound on a pixel-segmentation round trip.
    pub segmentation_timeout_ms: u64,
    /// Interval between final-render status polls.
    pub job_poll_interval_ms: u64,
    /// Lifetime of render job records in the store.
    pub job_ttl_secs: u64,
    /// Lifetime of persisted session records in the store.
    pub session_ttl_secs: u64,
    /// Width of the debug boundary stroke.
    pub boundary_stroke_px: f64,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            working_max_side: 1200,
            supported_sizes: vec![
                Size {
                    width: 1024,
                    height: 1024,
                },
                Size {
                    width: 1536,
                    height: 1024,
                },
                Size {
                    width: 1024,
                    height: 1536,
                },
            ],
            large_area_alpha: 0.72,
            small_area_alpha: 0.58,
            feather_radius_px: 3,
            yield_every: 4,
            debounce_ms: 850,
            segmentation_timeout_ms: 20_000,
            job_poll_interval_ms: 2_000,
            job_ttl_secs: 24 * 60 * 60,
            session_ttl_secs: 7 * 24 * 60 * 60,
            boundary_stroke_px: 2.0,
        }
    }
}

impl PipelineOpts {
    /// Load options from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> PreviewResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let opts: Self = serde_json::from_str(&text)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> PreviewResult<()> {
        if self.working_max_side == 0 {
            return Err(PreviewError::validation("working_max_side must be > 0"));
        }
        if self.supported_sizes.is_empty() {
            return Err(PreviewError::validation(
                "supported_sizes must list at least one size",
            ));
        }
        if self
            .supported_sizes
            .iter()
            .any(|s| s.width == 0 || s.height == 0)
        {
            return Err(PreviewError::validation(
                "supported_sizes entries must be non-zero",
            ));
        }
        for (name, a) in [
            ("large_area_alpha", self.large_area_alpha),
            ("small_area_alpha", self.small_area_alpha),
        ] {
            if !(0.0..=1.0).contains(&a) {
                return Err(PreviewError::validation(format!("{name} must be in [0, 1]")));
            }
        }
        if self.yield_every == 0 {
            return Err(PreviewError::validation("yield_every must be >= 1"));
        }
        Ok(())
    }

    /// Debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Segmentation time bound as a [`Duration`].
    pub fn segmentation_timeout(&self) -> Duration {
        Duration::from_millis(self.segmentation_timeout_ms)
    }

    /// Job poll interval as a [`Duration`].
    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms.max(1))
    }

    /// Job record lifetime as a [`Duration`].
    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    /// Session record lifetime as a [`Duration`].
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/opts.rs"]
mod tests;
