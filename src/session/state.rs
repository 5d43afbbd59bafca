//! The coordinating container for one preview session.
//!
//! Every piece of mutable state lives here and is only mutated through `&mut self`. Background
//! tasks (overlay bake, refinement, segmentation, job polling) run on the current `LocalSet` and
//! report back over a channel; [`PreviewSession::pump`] and [`PreviewSession::next_event`] apply
//! those reports after checking that the producing generation or ticket is still current.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::compositor::live::{CompositeFrame, LiveCompositor, RenderStats, Surface};
use crate::foundation::core::Size;
use crate::foundation::error::{PreviewError, PreviewResult};
use crate::foundation::math::working_size;
use crate::foundation::opts::PipelineOpts;
use crate::jobs::render_job::{
    JobBackend, JobId, JobInput, PollOutcome, RenderJob, poll_until_terminal,
};
use crate::mask::builder::{EnhancedMasks, MaskBuilder};
use crate::mask::overrides::MaskOverrideStore;
use crate::mask::raster::RasterMask;
use crate::mask::segment::{Segmenter, enhanced_mask};
use crate::overlay::bake::{BakeEvent, BakePlan, TierAlpha, run_bake};
use crate::overlay::store::{OverlayKey, OverlayStatus, OverlayStore};
use crate::overlay::texture::TextureStore;
use crate::refinement::cache::RefinementCache;
use crate::refinement::instruction::build_instruction;
use crate::refinement::key::{RefinementInputs, RefinementKey};
use crate::refinement::scheduler::{RefinementEvent, RefinementScheduler, RefinementStatus};
use crate::refinement::synthesis::{PreparedPhoto, SynthesisClient, synthesize_fitted};
use crate::scene::model::{
    FeatureId, FeatureModule, OptionId, ScanId, SceneDescription, SurfaceType, validate_modules,
};
use crate::session::persist::PersistedSession;
use crate::session::scan::LoadedScan;
use crate::transform::fit::prepare;

/// External services a session talks to.
#[derive(Debug)]
pub struct Collaborators<Sg, Sy, J> {
    /// Pixel-segmentation service for edge-snapped masks.
    pub segmenter: Sg,
    /// Photorealistic synthesis service for refinements.
    pub synthesis: Sy,
    /// Final-render job queue.
    pub jobs: J,
}

/// Client-side state of the final render.
#[derive(Clone, Debug, PartialEq)]
pub enum JobView {
    /// Enqueued; no status read yet.
    Submitted {
        /// Job id.
        id: JobId,
    },
    /// Latest record read from the queue; may be terminal.
    Tracking {
        /// Job record.
        job: RenderJob,
    },
    /// The record is unknown or expired.
    NotFound {
        /// Job id.
        id: JobId,
    },
    /// The record could not be read.
    Unreadable {
        /// Job id.
        id: JobId,
        /// Error text.
        message: String,
    },
    /// Enqueueing failed; nothing was created.
    SubmitFailed {
        /// Error text.
        message: String,
    },
}

impl JobView {
    /// Job id, when one exists.
    pub fn id(&self) -> Option<JobId> {
        match self {
            Self::Submitted { id } | Self::NotFound { id } | Self::Unreadable { id, .. } => {
                Some(*id)
            }
            Self::Tracking { job } => Some(job.id),
            Self::SubmitFailed { .. } => None,
        }
    }
}

/// Something the rendering layer may want to react to.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Overlay precompute advanced.
    OverlayProgress(f32),
    /// Every eligible overlay is baked or skipped.
    OverlaysReady,
    /// Overlay precompute stopped on an error.
    OverlayError(String),
    /// The refinement request for `key` was sent.
    RefinementIssued(RefinementKey),
    /// The refinement for `key` is cached and shown.
    RefinementAdopted(RefinementKey),
    /// The refinement for `key` failed; the previous preview stays.
    RefinementFailed {
        /// Failed key.
        key: RefinementKey,
        /// Notice text.
        message: String,
    },
    /// A segmentation round trip ended; `applied` is false when it fell back to polygons.
    EnhancedMask {
        /// Segmented surface.
        surface_type: SurfaceType,
        /// Whether a mask replaced the polygons.
        applied: bool,
    },
    /// The final-render view changed.
    Job(JobView),
}

/// Consistent read-only copy of the session state.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub scan_id: Option<ScanId>,
    pub generation: u64,
    pub selections: BTreeMap<FeatureId, OptionId>,
    pub overlay_status: OverlayStatus,
    pub baked: BTreeSet<OverlayKey>,
    pub overridden: BTreeSet<FeatureId>,
    pub enhanced: BTreeSet<SurfaceType>,
    pub refinement_key: Option<RefinementKey>,
    pub refinement_status: RefinementStatus,
    pub refinement_shown: bool,
    pub cached_refinements: usize,
    pub job: Option<JobView>,
}

#[derive(Debug)]
enum JobUpdate {
    Record(RenderJob),
    Outcome(PollOutcome),
}

#[derive(Debug)]
enum SessionMsg {
    Bake(BakeEvent),
    Refine(RefinementEvent),
    Segment {
        generation: u64,
        surface_type: SurfaceType,
        mask: Option<RasterMask>,
    },
    Job {
        id: JobId,
        update: JobUpdate,
    },
}

#[derive(Debug)]
struct ActiveScan {
    id: ScanId,
    photo: Arc<RgbaImage>,
    scene: Arc<SceneDescription>,
    working: Size,
    prepared: PreparedPhoto,
}

/// Owns and sequences every pipeline component for one user session.
pub struct PreviewSession<Sg, Sy, J> {
    opts: PipelineOpts,
    segmenter: Rc<Sg>,
    synthesis: Rc<Sy>,
    jobs: Rc<J>,

    scan: Option<ActiveScan>,
    generation: u64,
    modules: Vec<FeatureModule>,
    textures: Arc<TextureStore>,
    selections: BTreeMap<FeatureId, OptionId>,
    extras: serde_json::Map<String, serde_json::Value>,
    user_prompt: String,
    variant: u32,

    overrides: MaskOverrideStore,
    enhanced: EnhancedMasks,
    segmenting: BTreeSet<SurfaceType>,

    overlays: OverlayStore,
    overlay_status: OverlayStatus,
    bake_generation: u64,
    bake_token: Option<CancellationToken>,

    compositor: LiveCompositor,

    refinements: RefinementCache,
    scheduler: RefinementScheduler,
    refinement_status: RefinementStatus,
    adopted: Option<(RefinementKey, Arc<RgbaImage>)>,

    job: Option<JobView>,
    job_poll: Option<(JobId, CancellationToken)>,

    tx: mpsc::UnboundedSender<SessionMsg>,
    rx: mpsc::UnboundedReceiver<SessionMsg>,
}

impl<Sg, Sy, J> std::fmt::Debug for PreviewSession<Sg, Sy, J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSession")
            .field("scan", &self.scan.as_ref().map(|s| &s.id))
            .field("generation", &self.generation)
            .field("modules", &self.modules.len())
            .field("selections", &self.selections)
            .field("overlay_status", &self.overlay_status)
            .field("refinement_status", &self.refinement_status)
            .field("job", &self.job)
            .finish_non_exhaustive()
    }
}

impl<Sg, Sy, J> PreviewSession<Sg, Sy, J>
where
    Sg: Segmenter + 'static,
    Sy: SynthesisClient + 'static,
    J: JobBackend + 'static,
{
    /// Empty session; nothing runs until a scan is opened.
    pub fn new(
        opts: PipelineOpts,
        collaborators: Collaborators<Sg, Sy, J>,
    ) -> PreviewResult<Self> {
        opts.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            compositor: LiveCompositor::new(&opts),
            scheduler: RefinementScheduler::new(opts.debounce()),
            opts,
            segmenter: Rc::new(collaborators.segmenter),
            synthesis: Rc::new(collaborators.synthesis),
            jobs: Rc::new(collaborators.jobs),
            scan: None,
            generation: 0,
            modules: Vec::new(),
            textures: Arc::new(TextureStore::empty()),
            selections: BTreeMap::new(),
            extras: serde_json::Map::new(),
            user_prompt: String::new(),
            variant: 0,
            overrides: MaskOverrideStore::new(),
            enhanced: EnhancedMasks::default(),
            segmenting: BTreeSet::new(),
            overlays: OverlayStore::default(),
            overlay_status: OverlayStatus::Idle,
            bake_generation: 0,
            bake_token: None,
            refinements: RefinementCache::default(),
            refinement_status: RefinementStatus::Idle,
            adopted: None,
            job: None,
            job_poll: None,
            tx,
            rx,
        })
    }

    /// Make `loaded` the current scan. Resets every per-scan cache and restarts precompute.
    ///
    /// Selections, extras, prompt and variant are kept. Mask overrides survive a rescan of the
    /// same scan id at the same photo size; they last until cleared.
    #[tracing::instrument(skip_all, fields(scan = %loaded.id))]
    pub fn open_scan(&mut self, loaded: LoadedScan) -> PreviewResult<()> {
        let size = Size::new(loaded.photo.width(), loaded.photo.height())?;
        let (adapted, info) = prepare(&loaded.photo, &self.opts.supported_sizes)?;
        let working = working_size(size, self.opts.working_max_side);
        let rescan = self.scan.as_ref().is_some_and(|s| {
            s.id == loaded.id && s.photo.dimensions() == loaded.photo.dimensions()
        });

        self.generation += 1;
        self.scan = Some(ActiveScan {
            id: loaded.id,
            photo: loaded.photo,
            scene: loaded.scene,
            working,
            prepared: PreparedPhoto {
                adapted: Arc::new(adapted),
                info,
            },
        });
        if !rescan {
            self.overrides.reset();
        }
        self.enhanced.clear();
        self.segmenting.clear();
        self.overlays.clear();
        self.compositor.reset();
        self.refinements.clear();
        self.adopted = None;
        self.scheduler.cancel();
        self.refinement_status = RefinementStatus::Idle;
        tracing::info!(generation = self.generation, ?working, rescan, "scan opened");

        self.restart_bake();
        self.refresh_refinement();
        Ok(())
    }

    /// Replace the module set and its decoded textures. Selections that no longer resolve are
    /// dropped and the overlay store is rebuilt from scratch.
    pub fn set_modules(
        &mut self,
        modules: Vec<FeatureModule>,
        textures: TextureStore,
    ) -> PreviewResult<()> {
        validate_modules(&modules)?;
        self.modules = modules;
        self.textures = Arc::new(textures);
        let modules = &self.modules;
        self.selections.retain(|feature, option| {
            let keep = modules
                .iter()
                .any(|m| &m.id == feature && m.option(option).is_some());
            if !keep {
                tracing::debug!(%feature, %option, "selection dropped with module change");
            }
            keep
        });
        self.overlays.clear();
        self.compositor.reset();
        self.restart_bake();
        self.refresh_refinement();
        Ok(())
    }

    /// Select `option` for `feature`, or clear the feature with `None`.
    pub fn select(&mut self, feature: &FeatureId, option: Option<&OptionId>) -> PreviewResult<()> {
        let module = self.module(feature)?;
        match option {
            Some(o) => {
                if module.option(o).is_none() {
                    return Err(PreviewError::validation(format!(
                        "feature '{feature}' has no option '{o}'"
                    )));
                }
                self.selections.insert(feature.clone(), o.clone());
            }
            None => {
                self.selections.remove(feature);
            }
        }
        self.refresh_refinement();
        Ok(())
    }

    /// Set or remove (`None`) one extra parameter.
    pub fn set_extra(&mut self, name: impl Into<String>, value: Option<serde_json::Value>) {
        let name = name.into();
        match value {
            Some(v) => {
                self.extras.insert(name, v);
            }
            None => {
                self.extras.remove(&name);
            }
        }
        self.refresh_refinement();
    }

    pub fn set_user_prompt(&mut self, prompt: impl Into<String>) {
        self.user_prompt = prompt.into();
        self.refresh_refinement();
    }

    /// Ask for a different take on the same selection.
    pub fn set_variant(&mut self, variant: u32) {
        self.variant = variant;
        self.refresh_refinement();
    }

    /// Replace `feature`'s generated mask with a user-authored one.
    ///
    /// Translucent images use their alpha channel, opaque ones their luminance. Only that
    /// feature's overlays are rebaked.
    pub fn set_mask_override(
        &mut self,
        feature: &FeatureId,
        image: &RgbaImage,
    ) -> PreviewResult<()> {
        let working = self.active()?.working;
        self.module(feature)?;
        let mask = RasterMask::from_image(image)?;
        let revision = self.overrides.set(feature.clone(), mask, working);
        tracing::info!(%feature, revision, "mask override set");
        self.overlays.invalidate_feature(feature);
        self.restart_bake();
        Ok(())
    }

    /// Drop `feature`'s override. Returns `false` when there was none.
    pub fn clear_mask_override(&mut self, feature: &FeatureId) -> PreviewResult<bool> {
        self.active()?;
        if self.overrides.clear(feature).is_none() {
            return Ok(false);
        }
        tracing::info!(%feature, "mask override cleared");
        self.overlays.invalidate_feature(feature);
        self.restart_bake();
        Ok(true)
    }

    /// Start one segmentation round trip for `surface_type`.
    ///
    /// Returns `false` when a mask is already held or requested. Failures fall back to polygons
    /// and are reported as [`SessionEvent::EnhancedMask`] with `applied == false`.
    pub fn request_enhanced_mask(&mut self, surface_type: SurfaceType) -> PreviewResult<bool> {
        let scan = self.active()?;
        if self.enhanced.contains(surface_type) || self.segmenting.contains(&surface_type) {
            return Ok(false);
        }
        let photo = Arc::clone(&scan.photo);
        let scene = Arc::clone(&scan.scene);
        let working = scan.working;
        let generation = self.generation;
        let timeout = self.opts.segmentation_timeout();
        let segmenter = Rc::clone(&self.segmenter);
        let tx = self.tx.clone();
        self.segmenting.insert(surface_type);
        tokio::task::spawn_local(async move {
            let mask =
                enhanced_mask(&*segmenter, &photo, &scene, surface_type, working, timeout).await;
            let _ = tx.send(SessionMsg::Segment {
                generation,
                surface_type,
                mask,
            });
        });
        Ok(true)
    }

    /// Re-request the current key after a failed refinement.
    pub fn retry_refinement(&mut self) {
        self.scheduler.cancel();
        self.refresh_refinement();
    }

    /// Enqueue a final render for the current selection and start polling it.
    ///
    /// Returns `Ok(None)` when the queue rejected the job; the reason is in [`Self::job_view`].
    pub async fn finalize(&mut self) -> PreviewResult<Option<JobId>> {
        let scan = self.active()?;
        let input = JobInput {
            scan_id: Some(scan.id.clone()),
            selections: self.selections.clone(),
            extras: self.extras.clone(),
            user_prompt: self.user_prompt.clone(),
            variant: self.variant,
            instruction: self.instruction(&scan.scene),
        };
        self.stop_job_polling();
        match self.jobs.enqueue(input).await {
            Ok(id) => {
                self.job = Some(JobView::Submitted { id });
                self.start_job_polling(id);
                Ok(Some(id))
            }
            Err(e) => {
                tracing::warn!(error = %e, "final render could not be queued");
                self.job = Some(JobView::SubmitFailed {
                    message: e.to_string(),
                });
                Ok(None)
            }
        }
    }

    /// Stop watching the current job. Idempotent; the last view is kept.
    pub fn stop_job_polling(&mut self) {
        if let Some((id, token)) = self.job_poll.take() {
            token.cancel();
            tracing::debug!(job = %id, "job polling stopped");
        }
    }

    fn start_job_polling(&mut self, id: JobId) {
        let token = CancellationToken::new();
        self.job_poll = Some((id, token.clone()));
        let jobs = Rc::clone(&self.jobs);
        let interval = self.opts.job_poll_interval();
        let tx = self.tx.clone();
        tokio::task::spawn_local(async move {
            let records = tx.clone();
            let outcome = poll_until_terminal(&*jobs, id, interval, &token, |job| {
                let _ = records.send(SessionMsg::Job {
                    id,
                    update: JobUpdate::Record(job.clone()),
                });
            })
            .await;
            if outcome != PollOutcome::Cancelled {
                let _ = tx.send(SessionMsg::Job {
                    id,
                    update: JobUpdate::Outcome(outcome),
                });
            }
        });
    }

    /// Apply every report that is ready now, without waiting.
    pub fn pump(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.extend(self.apply(msg));
        }
        out
    }

    /// Wait for the next report that changes visible state and apply it.
    ///
    /// Stale reports are consumed silently. Pending forever if no background work is running.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let msg = self.rx.recv().await?;
            if let Some(ev) = self.apply(msg) {
                return Some(ev);
            }
        }
    }

    fn apply(&mut self, msg: SessionMsg) -> Option<SessionEvent> {
        match msg {
            SessionMsg::Bake(ev) => self.apply_bake(ev),
            SessionMsg::Refine(ev) => self.apply_refinement(ev),
            SessionMsg::Segment {
                generation,
                surface_type,
                mask,
            } => self.apply_segment(generation, surface_type, mask),
            SessionMsg::Job { id, update } => self.apply_job(id, update),
        }
    }

    fn apply_bake(&mut self, ev: BakeEvent) -> Option<SessionEvent> {
        let generation = match &ev {
            BakeEvent::Asset { generation, .. }
            | BakeEvent::Finished { generation }
            | BakeEvent::Failed { generation, .. } => *generation,
        };
        let live = generation == self.bake_generation
            && self.bake_token.as_ref().is_some_and(|t| !t.is_cancelled());
        if !live {
            tracing::debug!(
                generation,
                current = self.bake_generation,
                "stale bake event dropped"
            );
            return None;
        }
        match ev {
            BakeEvent::Asset {
                key,
                outcome,
                progress,
                ..
            } => {
                self.overlays.insert(key, outcome);
                let progress = progress.max(self.overlay_status.progress());
                self.overlay_status = OverlayStatus::Building { progress };
                Some(SessionEvent::OverlayProgress(progress))
            }
            BakeEvent::Finished { .. } => {
                self.bake_token = None;
                self.overlay_status = OverlayStatus::Ready;
                tracing::info!(baked = self.overlays.baked_keys().len(), "overlays ready");
                Some(SessionEvent::OverlaysReady)
            }
            BakeEvent::Failed { message, .. } => {
                self.bake_token = None;
                self.overlay_status = OverlayStatus::Error(message.clone());
                Some(SessionEvent::OverlayError(message))
            }
        }
    }

    fn apply_refinement(&mut self, ev: RefinementEvent) -> Option<SessionEvent> {
        match ev {
            RefinementEvent::Fired { request, key } => {
                if !self.scheduler.is_current(request) {
                    return None;
                }
                self.refinement_status = RefinementStatus::InFlight { key };
                Some(SessionEvent::RefinementIssued(key))
            }
            RefinementEvent::Completed {
                request,
                key,
                result,
            } => {
                if !self.scheduler.is_current(request) {
                    tracing::debug!(request, %key, "superseded refinement discarded");
                    return None;
                }
                self.scheduler.finish(request);
                match result {
                    Ok(image) => {
                        self.refinements.insert(key, Arc::clone(&image));
                        self.adopted = Some((key, image));
                        self.refinement_status = RefinementStatus::Ready { key };
                        tracing::info!(%key, "refinement adopted");
                        Some(SessionEvent::RefinementAdopted(key))
                    }
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "refinement failed");
                        let message = e.to_string();
                        self.refinement_status = RefinementStatus::Failed {
                            key,
                            message: message.clone(),
                        };
                        Some(SessionEvent::RefinementFailed { key, message })
                    }
                }
            }
        }
    }

    fn apply_segment(
        &mut self,
        generation: u64,
        surface_type: SurfaceType,
        mask: Option<RasterMask>,
    ) -> Option<SessionEvent> {
        if generation != self.generation {
            tracing::debug!(
                surface = surface_type.as_str(),
                "segmentation for an old scan dropped"
            );
            return None;
        }
        self.segmenting.remove(&surface_type);
        let applied = mask.is_some();
        if let Some(mask) = mask {
            self.enhanced.insert(surface_type, mask);
            let affected: Vec<FeatureId> = self
                .modules
                .iter()
                .filter(|m| m.targets.contains(&surface_type))
                .map(|m| m.id.clone())
                .collect();
            for feature in &affected {
                self.overlays.invalidate_feature(feature);
            }
            tracing::info!(
                surface = surface_type.as_str(),
                features = affected.len(),
                "enhanced mask applied"
            );
            if !affected.is_empty() {
                self.restart_bake();
            }
        }
        Some(SessionEvent::EnhancedMask {
            surface_type,
            applied,
        })
    }

    fn apply_job(&mut self, id: JobId, update: JobUpdate) -> Option<SessionEvent> {
        let live = self
            .job_poll
            .as_ref()
            .is_some_and(|(current, token)| *current == id && !token.is_cancelled());
        if !live {
            return None;
        }
        let view = match update {
            JobUpdate::Record(job) => JobView::Tracking { job },
            JobUpdate::Outcome(PollOutcome::Terminal(_) | PollOutcome::Cancelled) => {
                self.job_poll = None;
                return None;
            }
            JobUpdate::Outcome(PollOutcome::NotFound) => {
                self.job_poll = None;
                JobView::NotFound { id }
            }
            JobUpdate::Outcome(PollOutcome::Unreadable(message)) => {
                self.job_poll = None;
                JobView::Unreadable { id, message }
            }
        };
        if self.job.as_ref() == Some(&view) {
            return None;
        }
        self.job = Some(view.clone());
        Some(SessionEvent::Job(view))
    }

    /// Draw the best available preview into `surface`. Idempotent.
    pub fn render_now(
        &mut self,
        surface: &mut Surface,
        show_boundaries: bool,
    ) -> PreviewResult<RenderStats> {
        let Some(scan) = &self.scan else {
            tracing::debug!("render skipped: no scan");
            return Ok(RenderStats::default());
        };
        let current = self.current_key();
        let refinement = self
            .adopted
            .as_ref()
            .filter(|(k, _)| Some(*k) == current)
            .map(|(k, img)| (*k, img.as_ref()));
        let frame = CompositeFrame {
            generation: self.generation,
            photo: &scan.photo,
            scene: &scan.scene,
            modules: &self.modules,
            selections: &self.selections,
            overlays: &self.overlays,
            overrides: &self.overrides,
            enhanced: &self.enhanced,
            textures: &self.textures,
            refinement,
            show_boundaries,
        };
        self.compositor.render_now(&frame, surface)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let refinement_key = self.current_key();
        SessionSnapshot {
            scan_id: self.scan.as_ref().map(|s| s.id.clone()),
            generation: self.generation,
            selections: self.selections.clone(),
            overlay_status: self.overlay_status.clone(),
            baked: self.overlays.baked_keys(),
            overridden: self.overrides.features().cloned().collect(),
            enhanced: self
                .modules
                .iter()
                .flat_map(|m| m.targets.iter().copied())
                .chain(self.scan.iter().flat_map(|s| s.scene.surface_types()))
                .filter(|&t| self.enhanced.contains(t))
                .collect(),
            refinement_key,
            refinement_status: self.refinement_status.clone(),
            refinement_shown: self
                .adopted
                .as_ref()
                .is_some_and(|(k, _)| Some(*k) == refinement_key),
            cached_refinements: self.refinements.len(),
            job: self.job.clone(),
        }
    }

    /// Durable subset of the session.
    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            scan_id: self.scan.as_ref().map(|s| s.id.clone()),
            selections: self.selections.clone(),
            extras: self.extras.clone(),
            user_prompt: self.user_prompt.clone(),
            variant: self.variant,
            job_id: self.job.as_ref().and_then(JobView::id),
        }
    }

    /// Reapply a persisted session on top of the already opened scan.
    ///
    /// Selections that no longer resolve are dropped. A persisted job id resumes polling.
    pub fn restore(&mut self, persisted: PersistedSession) -> PreviewResult<()> {
        let scan = self.active()?;
        if persisted.scan_id.as_ref().is_some_and(|id| id != &scan.id) {
            return Err(PreviewError::validation(format!(
                "persisted session belongs to scan '{}', not '{}'",
                persisted.scan_id.as_ref().map(ScanId::as_str).unwrap_or_default(),
                scan.id
            )));
        }
        self.selections = persisted
            .selections
            .into_iter()
            .filter(|(f, o)| {
                let ok = self
                    .modules
                    .iter()
                    .any(|m| &m.id == f && m.option(o).is_some());
                if !ok {
                    tracing::warn!(feature = %f, option = %o, "persisted selection is gone");
                }
                ok
            })
            .collect();
        self.extras = persisted.extras;
        self.user_prompt = persisted.user_prompt;
        self.variant = persisted.variant;
        self.stop_job_polling();
        if let Some(id) = persisted.job_id {
            self.job = Some(JobView::Submitted { id });
            self.start_job_polling(id);
        }
        self.refresh_refinement();
        Ok(())
    }

    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    pub fn modules(&self) -> &[FeatureModule] {
        &self.modules
    }

    pub fn selections(&self) -> &BTreeMap<FeatureId, OptionId> {
        &self.selections
    }

    pub fn overlay_status(&self) -> &OverlayStatus {
        &self.overlay_status
    }

    pub fn overlays(&self) -> &OverlayStore {
        &self.overlays
    }

    pub fn refinement_status(&self) -> &RefinementStatus {
        &self.refinement_status
    }

    pub fn job_view(&self) -> Option<&JobView> {
        self.job.as_ref()
    }

    /// Working mask resolution of the current scan.
    pub fn working_size(&self) -> Option<Size> {
        self.scan.as_ref().map(|s| s.working)
    }

    /// Everything the current refinement key is derived from.
    pub fn refinement_inputs(&self) -> RefinementInputs {
        RefinementInputs {
            scan_id: self.scan.as_ref().map(|s| s.id.clone()),
            selections: self.selections.clone(),
            extras: self.extras.clone(),
            user_prompt: self.user_prompt.clone(),
            variant: self.variant,
        }
    }

    /// Refinement key of the current inputs; `None` without a scan.
    pub fn current_key(&self) -> Option<RefinementKey> {
        self.scan.as_ref()?;
        Some(self.refinement_inputs().key())
    }

    fn active(&self) -> PreviewResult<&ActiveScan> {
        self.scan
            .as_ref()
            .ok_or_else(|| PreviewError::validation("no scan loaded"))
    }

    fn module(&self, feature: &FeatureId) -> PreviewResult<&FeatureModule> {
        self.modules
            .iter()
            .find(|m| &m.id == feature)
            .ok_or_else(|| PreviewError::validation(format!("unknown feature '{feature}'")))
    }

    fn instruction(&self, scene: &SceneDescription) -> String {
        build_instruction(
            scene,
            &self.modules,
            &self.selections,
            &self.extras,
            &self.user_prompt,
            self.variant,
        )
    }

    /// Cancel the running bake and start a new generation for whatever is not settled yet.
    fn restart_bake(&mut self) {
        if let Some(t) = self.bake_token.take() {
            t.cancel();
        }
        self.bake_generation += 1;

        let Some(scan) = &self.scan else {
            self.overlay_status = OverlayStatus::Idle;
            return;
        };
        let eligible: Vec<&FeatureModule> =
            self.modules.iter().filter(|m| m.is_overlay()).collect();
        let total: usize = eligible.iter().map(|m| m.options.len()).sum();
        if total == 0 {
            self.overlay_status = OverlayStatus::Idle;
            return;
        }

        let pending: Vec<FeatureModule> = eligible
            .into_iter()
            .filter_map(|m| {
                let mut m = m.clone();
                let feature = m.id.clone();
                m.options.retain(|o| {
                    !self
                        .overlays
                        .is_settled(&OverlayKey::new(feature.clone(), o.id.clone()))
                });
                (!m.options.is_empty()).then_some(m)
            })
            .collect();
        let remaining: usize = pending.iter().map(|m| m.options.len()).sum();
        if remaining == 0 {
            self.overlay_status = OverlayStatus::Ready;
            return;
        }

        let plan = BakePlan {
            generation: self.bake_generation,
            modules: pending,
            total,
            already_done: total - remaining,
            scene: Arc::clone(&scan.scene),
            overrides: self.overrides.clone(),
            enhanced: self.enhanced.clone(),
            builder: MaskBuilder::new(scan.working),
            alpha: TierAlpha {
                large: self.opts.large_area_alpha,
                small: self.opts.small_area_alpha,
            },
            yield_every: self.opts.yield_every,
        };
        let progress = plan.already_done as f32 / total as f32;
        self.overlay_status = OverlayStatus::Building { progress };
        tracing::debug!(generation = plan.generation, remaining, total, "overlay bake started");

        let token = CancellationToken::new();
        self.bake_token = Some(token.clone());
        let textures = Arc::clone(&self.textures);
        let tx = self.tx.clone();
        tokio::task::spawn_local(run_bake(plan, textures, token, move |ev| {
            let _ = tx.send(SessionMsg::Bake(ev));
        }));
    }

    /// React to a change of any refinement input.
    fn refresh_refinement(&mut self) {
        let Some(key) = self.current_key() else {
            return;
        };
        if let Some(image) = self.refinements.get(key) {
            self.scheduler.cancel();
            self.adopted = Some((key, Arc::clone(image)));
            self.refinement_status = RefinementStatus::Ready { key };
            tracing::debug!(%key, "refinement cache hit");
            return;
        }
        if self.selections.is_empty() {
            self.scheduler.cancel();
            self.refinement_status = RefinementStatus::Idle;
            return;
        }
        if self.scheduler.pending_key() == Some(key) {
            tracing::debug!(%key, "refinement already pending");
            return;
        }
        let Some(scan) = &self.scan else {
            return;
        };
        let instruction = self.instruction(&scan.scene);
        let prepared = scan.prepared.clone();
        let synthesis = Rc::clone(&self.synthesis);
        let tx = self.tx.clone();
        self.scheduler.schedule(
            key,
            move || async move { synthesize_fitted(&*synthesis, &prepared, instruction).await },
            move |ev| {
                let _ = tx.send(SessionMsg::Refine(ev));
            },
        );
        self.refinement_status = RefinementStatus::Debouncing { key };
    }
}

impl<Sg, Sy, J> Drop for PreviewSession<Sg, Sy, J> {
    fn drop(&mut self) {
        if let Some(t) = self.bake_token.take() {
            t.cancel();
        }
        if let Some((_, t)) = self.job_poll.take() {
            t.cancel();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/state.rs"]
mod tests;
