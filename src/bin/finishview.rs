use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use finishview::{
    Collaborators, FeatureId, FeatureModule, JobService, LoadedScan, MemoryKvStore, OptionId,
    OverlayStatus, PipelineOpts, PreviewError, PreviewResult, PreviewSession, ScanId,
    SceneDescription, SegmentRequest, SegmentResponse, Segmenter, SessionEvent, Size, Surface,
    SynthesisClient, SynthesisRequest, TextureStore, TransformInfo,
};
use image::RgbaImage;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "finishview", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Letterbox a photo into the closest supported synthesis size.
    Prepare(PrepareArgs),
    /// Undo `prepare` on a synthesized result.
    Reverse(ReverseArgs),
    /// Write one working-resolution mask PNG per surface type.
    Masks(MasksArgs),
    /// Bake overlays for the given selections and composite one preview frame.
    Preview(PreviewArgs),
}

#[derive(Parser, Debug)]
struct PrepareArgs {
    /// Input photo.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG for the letterboxed photo.
    #[arg(long)]
    out: PathBuf,

    /// Output JSON with the transform parameters.
    #[arg(long)]
    info: PathBuf,

    /// Pipeline options JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ReverseArgs {
    /// Synthesized image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Transform parameters written by `prepare`.
    #[arg(long)]
    info: PathBuf,

    /// Output PNG at the original photo size.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct MasksArgs {
    /// Input photo.
    #[arg(long)]
    image: PathBuf,

    /// Scene description JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Directory receiving `<surface>.png` files.
    #[arg(long)]
    out_dir: PathBuf,

    /// Pipeline options JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Input photo.
    #[arg(long)]
    image: PathBuf,

    /// Scene description JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Feature modules JSON (array).
    #[arg(long)]
    modules: PathBuf,

    /// Selection as `feature=option`; repeatable.
    #[arg(long = "select")]
    select: Vec<String>,

    /// Texture root; defaults to the directory of the modules file.
    #[arg(long)]
    textures: Option<PathBuf>,

    /// Draw surface outlines on top of the preview.
    #[arg(long)]
    boundaries: bool,

    /// Pipeline options JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Prepare(args) => cmd_prepare(args),
        Command::Reverse(args) => cmd_reverse(args),
        Command::Masks(args) => cmd_masks(args),
        Command::Preview(args) => cmd_preview(args),
    }
}

fn load_opts(path: Option<&Path>) -> anyhow::Result<PipelineOpts> {
    match path {
        Some(p) => Ok(PipelineOpts::from_json_file(p)?),
        None => Ok(PipelineOpts::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    let value = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse {what} JSON '{}'", path.display()))?;
    Ok(value)
}

fn read_photo(path: &Path) -> anyhow::Result<RgbaImage> {
    let bytes = std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
    let img = finishview::decode_rgba(&bytes)
        .with_context(|| format!("decode image '{}'", path.display()))?;
    Ok(img)
}

fn write_png(path: &Path, img: &RgbaImage) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn cmd_prepare(args: PrepareArgs) -> anyhow::Result<()> {
    let opts = load_opts(args.config.as_deref())?;
    let photo = read_photo(&args.in_path)?;
    let (adapted, info) = finishview::prepare(&photo, &opts.supported_sizes)?;
    write_png(&args.out, &adapted)?;
    let f = File::create(&args.info)
        .with_context(|| format!("create info '{}'", args.info.display()))?;
    serde_json::to_writer_pretty(f, &info).with_context(|| "write transform info JSON")?;
    eprintln!(
        "{}x{} -> {}x{}",
        info.original.width, info.original.height, info.target.width, info.target.height
    );
    Ok(())
}

fn cmd_reverse(args: ReverseArgs) -> anyhow::Result<()> {
    let result = read_photo(&args.in_path)?;
    let info: TransformInfo = read_json(&args.info, "transform info")?;
    let restored = finishview::reverse(&result, &info)?;
    write_png(&args.out, &restored)
}

fn cmd_masks(args: MasksArgs) -> anyhow::Result<()> {
    let opts = load_opts(args.config.as_deref())?;
    let photo = read_photo(&args.image)?;
    let scene: SceneDescription = read_json(&args.scene, "scene")?;
    let size = finishview::working_size(
        Size::new(photo.width(), photo.height())?,
        opts.working_max_side,
    );
    let masks = finishview::surface_masks(&scene.sanitize(), size)?;
    for (surface_type, mask) in masks {
        let path = args.out_dir.join(format!("{}.png", surface_type.as_str()));
        write_png(&path, &mask.to_rgba_image())?;
    }
    Ok(())
}

fn parse_selection(raw: &str) -> anyhow::Result<(FeatureId, OptionId)> {
    let (feature, option) = raw
        .split_once('=')
        .filter(|(f, o)| !f.is_empty() && !o.is_empty())
        .with_context(|| format!("selection '{raw}' is not feature=option"))?;
    Ok((FeatureId::from(feature), OptionId::from(option)))
}

/// Collaborator stand-in for offline runs: every call fails and the session falls back.
struct Offline;

impl Segmenter for Offline {
    async fn segment(&self, _request: SegmentRequest) -> PreviewResult<SegmentResponse> {
        Err(PreviewError::collaborator("no segmentation service configured"))
    }
}

impl SynthesisClient for Offline {
    async fn synthesize(&self, _request: SynthesisRequest) -> PreviewResult<RgbaImage> {
        Err(PreviewError::collaborator("no synthesis service configured"))
    }
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build tokio runtime")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, preview(args))
}

async fn preview(args: PreviewArgs) -> anyhow::Result<()> {
    let opts = load_opts(args.config.as_deref())?;
    let photo = read_photo(&args.image)?;
    let scene: SceneDescription = read_json(&args.scene, "scene")?;
    let modules: Vec<FeatureModule> = read_json(&args.modules, "modules")?;
    let selections = args
        .select
        .iter()
        .map(|s| parse_selection(s))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let root = args.textures.clone().unwrap_or_else(|| {
        args.modules
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let textures = TextureStore::prepare(&modules, root);
    for (path, err) in textures.missing() {
        tracing::warn!(path, error = err, "texture missing");
    }

    let jobs = JobService::new(MemoryKvStore::new(), Duration::from_secs(opts.job_ttl_secs));
    let mut session = PreviewSession::new(
        opts,
        Collaborators {
            segmenter: Offline,
            synthesis: Offline,
            jobs,
        },
    )?;
    session.set_modules(modules, textures)?;

    let scan_id = args
        .image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scan".to_owned());
    let size = Size::new(photo.width(), photo.height())?;
    session.open_scan(LoadedScan::new(ScanId::from(scan_id.as_str()), photo, scene)?)?;
    for (feature, option) in &selections {
        session.select(feature, Some(option))?;
    }

    while matches!(session.overlay_status(), OverlayStatus::Building { .. }) {
        match session.next_event().await {
            Some(SessionEvent::OverlayProgress(p)) => tracing::debug!(progress = p, "baking"),
            Some(_) => {}
            None => break,
        }
    }
    if let OverlayStatus::Error(msg) = session.overlay_status() {
        tracing::warn!(error = %msg, "overlay bake failed; using on-the-fly compositing");
    }

    let mut surface = Surface::new(size);
    let stats = session.render_now(&mut surface, args.boundaries)?;
    eprintln!(
        "overlays: {} baked, {} on the fly",
        stats.fast_path, stats.fallback
    );
    write_png(&args.out, &surface.raster().to_straight())
}
