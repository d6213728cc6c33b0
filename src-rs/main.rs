use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::env;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

use roi_report::crop::cache_file_name;
use roi_report::overlay::render_roi_overlay;
use roi_report::{EditingSession, PointF, Settings, Size, SourceRect};

#[derive(Parser, Debug)]
#[command(
    name = "roi-report",
    version,
    about = "Mark regions of interest on project photos and build slide-deck reports"
)]
struct Cli {
    /// JSON settings file (defaults apply to missing keys)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Also write logs to <dir>/vsa_<YYYYMMDD>.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a project folder and print its image records
    Scan(RootArgs),
    /// Print one image record
    Show(ImageArgs),
    /// Edit the title and/or comment of an image
    Edit(EditArgs),
    /// Replay a display-space drag over an image shown at a given size
    Select(SelectArgs),
    /// Set the crop rectangle in source pixels (clipped to the image)
    Crop(CropArgs),
    /// Remove the crop rectangle and cached crop of an image
    Clear(ImageArgs),
    /// Render the source image with its ROI outlined
    Overlay(OverlayArgs),
    /// Build the slide-deck report for every image in the project
    Report(ReportArgs),
    /// Delete cached crops and forget their paths
    Clean(RootArgs),
}

#[derive(Args, Debug)]
struct RootArgs {
    /// Project root folder
    root: PathBuf,
}

#[derive(Args, Debug)]
struct ImageArgs {
    /// Project root folder
    root: PathBuf,
    /// Image id (path relative to the root, `/`-separated)
    id: String,
}

#[derive(Args, Debug)]
struct EditArgs {
    root: PathBuf,
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    comment: Option<String>,
}

#[derive(Args, Debug)]
struct SelectArgs {
    root: PathBuf,
    id: String,
    /// Display surface size, e.g. 800x600
    #[arg(long, value_parser = parse_size)]
    display: Size,
    /// Pointer-down position in display pixels, e.g. 20,120
    #[arg(long, value_parser = parse_point)]
    from: PointF,
    /// Pointer-up position in display pixels
    #[arg(long, value_parser = parse_point)]
    to: PointF,
}

#[derive(Args, Debug)]
struct CropArgs {
    root: PathBuf,
    id: String,
    /// Rectangle as x,y,w,h in source pixels
    #[arg(long, value_parser = parse_rect)]
    rect: SourceRect,
}

#[derive(Args, Debug)]
struct OverlayArgs {
    root: PathBuf,
    id: String,
    /// Output PNG path (default: inside the scratch directory)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Label drawn above the ROI (default: the record title)
    #[arg(long)]
    label: Option<String>,
    /// Do not draw a label
    #[arg(long, action = ArgAction::SetTrue)]
    no_label: bool,
}

#[derive(Args, Debug)]
struct ReportArgs {
    root: PathBuf,
    /// Output deck path (default: <root>/<project>_Report_<timestamp>.pptx)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Outline the ROI on each page's original image
    #[arg(long, action = ArgAction::SetTrue)]
    outline_roi: bool,
    /// Also write the generation result JSON to this path
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Open the finished report with the desktop viewer
    #[arg(long, action = ArgAction::SetTrue)]
    open: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_dir.as_deref())?;

    let settings = Settings::load(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(path) => format!("failed to load settings: {}", path.display()),
            None => "failed to load settings".to_string(),
        }
    })?;

    match cli.command {
        Commands::Scan(args) => command_scan(args, settings),
        Commands::Show(args) => command_show(args, settings),
        Commands::Edit(args) => command_edit(args, settings),
        Commands::Select(args) => command_select(args, settings),
        Commands::Crop(args) => command_crop(args, settings),
        Commands::Clear(args) => command_clear(args, settings),
        Commands::Overlay(args) => command_overlay(args, settings),
        Commands::Report(args) => command_report(args, settings),
        Commands::Clean(args) => command_clean(args, settings),
    }
}

fn init_logging(log_dir: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
        let path = dir.join(format!("vsa_{}.log", Local::now().format("%Y%m%d")));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file: {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init().context("failed to install logger")?;
    Ok(())
}

fn open_session(root: &Path, settings: Settings) -> Result<EditingSession> {
    EditingSession::open(root, settings)
        .with_context(|| format!("failed to open project: {}", root.display()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn command_scan(args: RootArgs, settings: Settings) -> Result<()> {
    let session = open_session(&args.root, settings)?;
    print_json(&json!({
        "root": session.store().root(),
        "sidecar": session.store().sidecar_path(),
        "count": session.records().len(),
        "records": session.records(),
    }))
}

fn command_show(args: ImageArgs, settings: Settings) -> Result<()> {
    let session = open_session(&args.root, settings)?;
    let Some(record) = session.record(&args.id) else {
        bail!("unknown image id: {}", args.id);
    };
    print_json(&serde_json::to_value(record)?)
}

fn command_edit(args: EditArgs, settings: Settings) -> Result<()> {
    if args.title.is_none() && args.comment.is_none() {
        bail!("nothing to edit: pass --title and/or --comment");
    }
    let mut session = open_session(&args.root, settings)?;
    if let Some(title) = &args.title {
        session.set_title(&args.id, title)?;
    }
    if let Some(comment) = &args.comment {
        session.set_comment(&args.id, comment)?;
    }
    let record = session
        .record(&args.id)
        .with_context(|| format!("unknown image id: {}", args.id))?;
    print_json(&serde_json::to_value(record)?)
}

fn command_select(args: SelectArgs, settings: Settings) -> Result<()> {
    let mut session = open_session(&args.root, settings)?;
    session.select_image(&args.id, args.display)?;
    let transform = *session.tracker().transform();

    session.pointer_down(args.from);
    session.pointer_move(args.to);
    let record = session.pointer_up(args.to)?.cloned();

    print_json(&json!({
        "display": args.display,
        "scale": transform.scale,
        "offset": [transform.offset.0, transform.offset.1],
        "committed": record.is_some(),
        "record": record,
    }))
}

fn command_crop(args: CropArgs, settings: Settings) -> Result<()> {
    let mut session = open_session(&args.root, settings)?;
    let record = session.set_crop_rect(&args.id, args.rect)?.cloned();
    print_json(&json!({
        "requested": args.rect,
        "committed": record.is_some(),
        "record": record,
    }))
}

fn command_clear(args: ImageArgs, settings: Settings) -> Result<()> {
    let mut session = open_session(&args.root, settings)?;
    let record = session.clear_crop(&args.id)?;
    print_json(&serde_json::to_value(record)?)
}

fn command_overlay(args: OverlayArgs, settings: Settings) -> Result<()> {
    let session = open_session(&args.root, settings)?;
    let record = session
        .record(&args.id)
        .with_context(|| format!("unknown image id: {}", args.id))?;
    let Some(rect) = record.crop_rect else {
        bail!("{} has no crop rectangle", args.id);
    };

    let source = image::open(&record.source_path)
        .with_context(|| format!("failed to open image: {}", record.source_path.display()))?;
    let label = if args.no_label {
        None
    } else {
        Some(
            args.label
                .clone()
                .unwrap_or_else(|| record.display_title().to_string()),
        )
    };
    let rendered = render_roi_overlay(&source, rect, label.as_deref());

    let out = match &args.out {
        Some(path) => resolve_output(path)?,
        None => session
            .cache()
            .scratch_dir()
            .join(format!("overlay_{}", cache_file_name(&args.id))),
    };
    create_output_dir(&out)?;
    rendered
        .save(&out)
        .with_context(|| format!("failed to write overlay: {}", out.display()))?;

    print_json(&json!({
        "id": args.id,
        "rect": rect,
        "label": label,
        "output": out,
    }))
}

fn command_report(args: ReportArgs, mut settings: Settings) -> Result<()> {
    settings.outline_roi |= args.outline_roi;
    let mut session = open_session(&args.root, settings)?;
    let out = args.out.as_deref().map(resolve_output).transpose()?;
    let result = session
        .generate_report(out.as_deref())
        .context("report generation failed")?;

    let mut payload = serde_json::to_value(&result)?;
    if let Value::Object(map) = &mut payload {
        map.insert("summary".to_string(), json!(result.summary()));
    }
    if let Some(path) = &args.summary {
        write_summary(&resolve_output(path)?, &payload)?;
    }
    print_json(&payload)?;

    if args.open {
        open_with_viewer(&result.output_path)?;
    }
    Ok(())
}

fn command_clean(args: RootArgs, settings: Settings) -> Result<()> {
    let session = open_session(&args.root, settings)?;
    let scratch = session.cache().scratch_dir().to_path_buf();
    let root = session.store().root().to_path_buf();
    session.close()?;
    print_json(&json!({
        "root": root,
        "removed": scratch,
    }))
}

fn open_with_viewer(path: &Path) -> Result<()> {
    let viewer = Viewer::for_os(env::consts::OS, path);
    if viewer.needs_lookup() && find_program(env::var_os("PATH"), viewer.program).is_none() {
        bail!("{} not found; report is at {}", viewer.program, path.display());
    }
    Command::new(viewer.program)
        .args(&viewer.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to launch {}", viewer.program))?;
    Ok(())
}

/// Desktop handler invocation for a finished deck.
#[derive(Debug, PartialEq, Eq)]
struct Viewer {
    program: &'static str,
    args: Vec<OsString>,
}

impl Viewer {
    fn for_os(os: &str, path: &Path) -> Self {
        match os {
            // `start` takes the first quoted argument as a window title.
            "windows" => Viewer {
                program: "cmd",
                args: vec!["/C".into(), "start".into(), "".into(), path.into()],
            },
            "macos" => Viewer {
                program: "open",
                args: vec![path.into()],
            },
            _ => Viewer {
                program: "xdg-open",
                args: vec![path.into()],
            },
        }
    }

    /// `cmd` ships with Windows; the other handlers are optional packages.
    fn needs_lookup(&self) -> bool {
        self.program != "cmd"
    }
}

fn find_program(search_path: Option<OsString>, program: &str) -> Option<PathBuf> {
    let search_path = search_path?;
    env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn parse_size(raw: &str) -> Result<Size, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {raw:?}"))?;
    let width = parse_u32(w)?;
    let height = parse_u32(h)?;
    if width == 0 || height == 0 {
        return Err(format!("display size must be non-zero, got {raw:?}"));
    }
    Ok(Size::new(width, height))
}

fn parse_point(raw: &str) -> Result<PointF, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {raw:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("invalid coordinate {v:?}"))
    };
    Ok(PointF::new(parse(x)?, parse(y)?))
}

fn parse_rect(raw: &str) -> Result<SourceRect, String> {
    let parts: Vec<&str> = raw.split(',').collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected x,y,w,h, got {raw:?}"));
    };
    Ok(SourceRect::new(
        parse_u32(x)?,
        parse_u32(y)?,
        parse_u32(w)?,
        parse_u32(h)?,
    ))
}

fn parse_u32(raw: &str) -> Result<u32, String> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid number {raw:?}"))
}

/// Relative output paths are taken from the working directory, like the shell would.
fn resolve_output(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("failed to read the working directory")?;
    Ok(cwd.join(path))
}

fn output_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn create_output_dir(path: &Path) -> Result<()> {
    let dir = output_dir(path);
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory: {}", dir.display()))
}

/// Generation result JSON, replaced atomically so a reader never sees half a summary.
fn write_summary(path: &Path, payload: &Value) -> Result<()> {
    create_output_dir(path)?;
    let failed = || format!("failed to write summary: {}", path.display());
    let mut tmp = NamedTempFile::new_in(output_dir(path)).with_context(failed)?;
    serde_json::to_writer_pretty(&mut tmp, payload).with_context(failed)?;
    tmp.write_all(b"\n").with_context(failed)?;
    tmp.persist(path).with_context(failed)?;
    Ok(())
}
