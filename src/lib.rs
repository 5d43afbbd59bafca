//! Finishview previews finish choices (paint, flooring, cabinets, siding) on a photo of a room
//! or building.
//!
//! The public API is session-oriented:
//!
//! - Load a photo and its [`SceneDescription`] into a [`LoadedScan`]
//! - Feed it to a [`PreviewSession`] together with the [`FeatureModule`]s on offer
//! - Change selections; call [`PreviewSession::render_now`] for an instant masked-overlay
//!   preview while refinements and the final render run in the background
//!
//! Background work runs on a tokio current-thread runtime inside a `LocalSet`.
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod compositor;
pub(crate) mod effects;
pub(crate) mod jobs;
pub(crate) mod mask;
pub(crate) mod overlay;
pub(crate) mod refinement;
/// Scene and module data model.
pub mod scene;
pub(crate) mod session;
pub(crate) mod transform;

pub use crate::foundation::core::{PixelRect, Point, PremulRaster, Rgba8Premul, Size};
pub use crate::foundation::error::{PreviewError, PreviewResult};
pub use crate::foundation::math::working_size;
pub use crate::foundation::opts::PipelineOpts;

pub use crate::compositor::live::{RenderStats, Surface, contain_fit};
pub use crate::effects::composite::BlendMode;
pub use crate::jobs::render_job::{
    JobBackend, JobId, JobInput, JobService, JobStatus, PollOutcome, RenderJob,
    poll_until_terminal,
};
pub use crate::jobs::store::{KvStore, MemoryKvStore};
pub use crate::mask::builder::{MaskBuilder, MaskSource, surface_masks};
pub use crate::mask::raster::{RasterMask, rasterize_polygons};
pub use crate::mask::segment::{
    SceneHint, SegmentItem, SegmentRequest, SegmentResponse, SegmentedMask, Segmenter,
};
pub use crate::overlay::store::{OverlayAsset, OverlayKey, OverlayStatus, OverlayStore};
pub use crate::overlay::texture::TextureStore;
pub use crate::refinement::instruction::build_instruction;
pub use crate::refinement::key::{RefinementInputs, RefinementKey, canonical_json};
pub use crate::refinement::scheduler::RefinementStatus;
pub use crate::refinement::synthesis::{SynthesisClient, SynthesisRequest};
pub use crate::scene::model::{
    FeatureId, FeatureModule, OptionId, ScanId, SceneDescription, SurfaceType,
};
pub use crate::session::persist::PersistedSession;
pub use crate::session::scan::{LoadedScan, Scanner};
pub use crate::session::state::{
    Collaborators, JobView, PreviewSession, SessionEvent, SessionSnapshot,
};
pub use crate::transform::fit::{TransformInfo, decode_rgba, prepare, prepare_bytes, reverse};
