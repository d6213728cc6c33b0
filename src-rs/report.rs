//! Builds one slide per stored record and saves the deck in a single write.
//!
//! Each record is handled in isolation: a broken image only costs its own page and is
//! reported in [`GenerationResult::failed`]. The document is saved after the loop, also
//! when the run was cancelled part-way.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use image::DynamicImage;
use log::{error, info, warn};
use serde::Serialize;

use crate::crop::CropCache;
use crate::deck::{DeckImage, Slide, SlideDeck};
use crate::error::{CropError, LoadError, ReportError};
use crate::overlay::render_roi_overlay;
use crate::settings::Settings;
use crate::store::{ImageRecord, RecordUpdate, SessionStore};

pub const REPORT_EXTENSION: &str = "pptx";

/// Why a record produced no page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum FailureReason {
    /// Source image missing or undecodable.
    #[serde(rename = "LoadError")]
    Load(String),
    #[serde(rename = "CropError")]
    Crop(String),
    /// The page images could not be encoded.
    #[serde(rename = "RenderError")]
    Render(String),
}

impl FailureReason {
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::Load(_) => "LoadError",
            FailureReason::Crop(_) => "CropError",
            FailureReason::Render(_) => "RenderError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FailureReason::Load(msg) | FailureReason::Crop(msg) | FailureReason::Render(msg) => msg,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl From<LoadError> for FailureReason {
    fn from(err: LoadError) -> Self {
        FailureReason::Load(err.to_string())
    }
}

impl From<CropError> for FailureReason {
    fn from(err: CropError) -> Self {
        match err {
            CropError::Load(err) => err.into(),
            other => FailureReason::Crop(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub output_path: PathBuf,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, FailureReason)>,
    pub pages: usize,
    pub cancelled: bool,
    /// Non-fatal problems, e.g. a refreshed crop path that could not be saved.
    pub warnings: Vec<String>,
}

impl GenerationResult {
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} succeeded, {} failed",
            self.succeeded.len(),
            self.failed.len()
        );
        if self.cancelled {
            out.push_str(" (cancelled)");
        }
        out
    }
}

/// Shared flag checked between images.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Called after every record, whether or not it produced a page.
pub trait ReportProgress {
    fn image_finished(&mut self, done: usize, total: usize, id: &str);
}

impl ReportProgress for () {
    fn image_finished(&mut self, _done: usize, _total: usize, _id: &str) {}
}

#[derive(Debug, Clone)]
pub struct ReportAssembler {
    max_edge: u32,
    jpeg_quality: u8,
    outline_roi: bool,
}

impl ReportAssembler {
    pub fn new(settings: &Settings) -> Self {
        Self {
            max_edge: settings.report_max_edge,
            jpeg_quality: settings.jpeg_quality,
            outline_roi: settings.outline_roi,
        }
    }

    pub fn generate(
        &self,
        store: &mut SessionStore,
        cache: &mut CropCache,
        output_path: &Path,
    ) -> Result<GenerationResult, ReportError> {
        self.generate_with(store, cache, output_path, &CancelToken::new(), &mut ())
    }

    pub fn generate_with(
        &self,
        store: &mut SessionStore,
        cache: &mut CropCache,
        output_path: &Path,
        cancel: &CancelToken,
        progress: &mut dyn ReportProgress,
    ) -> Result<GenerationResult, ReportError> {
        let total = store.len();
        let mut deck = SlideDeck::new();
        let mut result = GenerationResult {
            output_path: output_path.to_path_buf(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            pages: 0,
            cancelled: false,
            warnings: Vec::new(),
        };

        for idx in 0..total {
            if cancel.is_cancelled() {
                info!("report cancelled after {idx} of {total} image(s)");
                result.cancelled = true;
                break;
            }

            let stored = &store.records()[idx];
            let previous_cache = stored.cache_path.clone();
            let mut record = stored.clone();

            match self.build_slide(&mut record, cache) {
                Ok(slide) => {
                    if record.cache_path != previous_cache {
                        let update = RecordUpdate::default().cache_path(record.cache_path.clone());
                        if let Err(err) = store.update(&record.id, update) {
                            error!("could not record crop path for {}: {err}", record.id);
                            result
                                .warnings
                                .push(format!("{}: crop path not saved: {err}", record.id));
                        }
                    }
                    deck.push(slide);
                    result.succeeded.push(record.id.clone());
                }
                Err(reason) => {
                    warn!("skipping page for {}: {reason}", record.id);
                    result.failed.push((record.id.clone(), reason));
                }
            }
            progress.image_finished(idx + 1, total, &record.id);
        }

        result.pages = deck.len();
        deck.save(output_path)?;
        info!(
            "wrote report {} ({})",
            output_path.display(),
            result.summary()
        );
        Ok(result)
    }

    fn build_slide(&self, record: &mut ImageRecord, cache: &mut CropCache) -> Result<Slide, FailureReason> {
        let source = image::open(&record.source_path)
            .map_err(|err| LoadError::from_image(&record.source_path, err))?;

        let crop = match cache.ensure_crop_from(record, &source)? {
            Some(path) => {
                let cropped = image::open(&path)
                    .map_err(|err| FailureReason::Crop(format!("{}: {err}", path.display())))?;
                let crop = DeckImage::png(&cropped)
                    .map_err(|err| FailureReason::Render(err.to_string()))?;
                Some(crop)
            }
            None => None,
        };

        let original = match (self.outline_roi, record.crop_rect) {
            (true, Some(rect)) => {
                DynamicImage::ImageRgba8(render_roi_overlay(&source, rect, None))
            }
            _ => source,
        };
        let original = DeckImage::jpeg(&original, self.max_edge, self.jpeg_quality)
            .map_err(|err| FailureReason::Render(err.to_string()))?;

        Ok(Slide {
            title: record.display_title().to_string(),
            original: Some(original),
            crop,
            comment: record.comment.clone(),
        })
    }
}

/// `<project>_Report_<YYYYmmdd_HHMMSS>.pptx`
pub fn report_file_name(project: &str, at: NaiveDateTime) -> String {
    format!("{project}_Report_{}.{REPORT_EXTENSION}", at.format("%Y%m%d_%H%M%S"))
}

/// Timestamped report path in `dir` that does not exist yet; `-2`, `-3`, ... are
/// appended when a report was already written in the same second.
pub fn unique_report_path(dir: &Path, project: &str, at: NaiveDateTime) -> PathBuf {
    let name = report_file_name(project, at);
    let first = dir.join(&name);
    if !first.exists() {
        return first;
    }
    let stem = name.trim_end_matches(REPORT_EXTENSION).trim_end_matches('.');
    (2..)
        .map(|n| dir.join(format!("{stem}-{n}.{REPORT_EXTENSION}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Default output for a store: the configured report directory (or the project root),
/// named after the project folder and the current local time.
pub fn default_output_path(store: &SessionStore, settings: &Settings) -> PathBuf {
    let root = store.root();
    let project = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "project".to_string());
    let now = chrono::Local::now().naive_local();
    unique_report_path(&settings.report_dir_for(root), &project, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::testing::SavedDeck;
    use crate::geometry::SourceRect;
    use chrono::NaiveDate;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::tempdir;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
    }

    fn write_image(path: &Path, w: u32, h: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        gradient(w, h).save(path).unwrap();
    }

    struct CancelAfterFirst(CancelToken, Vec<String>);

    impl ReportProgress for CancelAfterFirst {
        fn image_finished(&mut self, _done: usize, _total: usize, id: &str) {
            self.1.push(id.to_string());
            self.0.cancel();
        }
    }

    #[test]
    fn broken_image_only_loses_its_own_page() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("proj");
        for name in ["1.png", "2.png", "3.png"] {
            write_image(&root.join("imgs").join(name), 40, 30);
        }
        let settings = Settings::default();
        let mut store = SessionStore::open(&root, &settings).unwrap();
        let mut cache = CropCache::new(store.root(), &settings);
        fs::remove_file(root.join("imgs/2.png")).unwrap();

        let out = dir.path().join("report.pptx");
        let result = ReportAssembler::new(&settings)
            .generate(&mut store, &mut cache, &out)
            .unwrap();

        assert_eq!(result.succeeded, vec!["imgs/1.png", "imgs/3.png"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, "imgs/2.png");
        assert_eq!(result.failed[0].1.kind(), "LoadError");
        assert_eq!(result.pages, 2);
        assert_eq!(SavedDeck::open(&out).slide_count(), 2);
    }

    #[test]
    fn station_a_page_has_title_images_and_comment() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("proj");
        write_image(&root.join("a/x.png"), 400, 300);
        let settings = Settings::default();
        let mut store = SessionStore::open(&root, &settings).unwrap();
        store
            .update(
                "a/x.png",
                RecordUpdate::default()
                    .title("Station A")
                    .comment("OK")
                    .crop_rect(Some(SourceRect::new(10, 10, 100, 50))),
            )
            .unwrap();
        let mut cache = CropCache::new(store.root(), &settings);

        let out = dir.path().join("report.pptx");
        let result = ReportAssembler::new(&settings)
            .generate(&mut store, &mut cache, &out)
            .unwrap();
        assert_eq!(result.succeeded, vec!["a/x.png"]);
        assert!(result.failed.is_empty());
        assert!(result.warnings.is_empty());

        let mut deck = SavedDeck::open(&out);
        assert_eq!(deck.slide_count(), 1);
        assert_eq!(deck.slide_text(1), vec!["Station A", "OK"]);
        assert_eq!(
            deck.media(),
            vec!["ppt/media/image1.jpeg", "ppt/media/image2.png"]
        );
        let original = image::load_from_memory(&deck.part("ppt/media/image1.jpeg")).unwrap();
        assert_eq!((original.width(), original.height()), (400, 300));

        let expected = DynamicImage::ImageRgb8(gradient(400, 300))
            .crop_imm(10, 10, 100, 50)
            .to_rgb8();
        let embedded = image::load_from_memory(&deck.part("ppt/media/image2.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(embedded, expected);

        // The refreshed crop path is stored on the record.
        let record = store.get("a/x.png").unwrap();
        assert_eq!(record.cache_path, Some(cache.cache_path_for("a/x.png")));
    }

    #[test]
    fn chinese_title_and_comment_survive_into_the_deck() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("proj");
        write_image(&root.join("工位A/x.png"), 60, 40);
        let settings = Settings::default();
        let mut store = SessionStore::open(&root, &settings).unwrap();
        store
            .update(
                "工位A/x.png",
                RecordUpdate::default().comment("评估结论：1.成像清晰，检测无风险"),
            )
            .unwrap();
        let mut cache = CropCache::new(store.root(), &settings);

        let out = dir.path().join("report.pptx");
        let result = ReportAssembler::new(&settings)
            .generate(&mut store, &mut cache, &out)
            .unwrap();
        assert_eq!(result.succeeded, vec!["工位A/x.png"]);
        assert!(result.failed.is_empty());

        let mut deck = SavedDeck::open(&out);
        assert_eq!(
            deck.slide_text(1),
            vec!["工位A", "评估结论：1.成像清晰，检测无风险"]
        );
    }

    #[test]
    fn empty_project_yields_zero_page_document() {
        let dir = tempdir().unwrap();
        let settings = Settings::default();
        let mut store = SessionStore::open(dir.path(), &settings).unwrap();
        let mut cache = CropCache::new(store.root(), &settings);

        let out = dir.path().join("empty.pptx");
        let result = ReportAssembler::new(&settings)
            .generate(&mut store, &mut cache, &out)
            .unwrap();
        assert!(result.succeeded.is_empty());
        assert!(result.failed.is_empty());
        assert_eq!(result.pages, 0);
        assert_eq!(SavedDeck::open(&out).slide_count(), 0);
    }

    #[test]
    fn cancellation_stops_between_images_and_still_saves() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("proj");
        for name in ["a.png", "b.png", "c.png"] {
            write_image(&root.join("s").join(name), 20, 20);
        }
        let settings = Settings::default();
        let mut store = SessionStore::open(&root, &settings).unwrap();
        let mut cache = CropCache::new(store.root(), &settings);

        let token = CancelToken::new();
        let mut progress = CancelAfterFirst(token.clone(), Vec::new());
        let out = dir.path().join("partial.pptx");
        let result = ReportAssembler::new(&settings)
            .generate_with(&mut store, &mut cache, &out, &token, &mut progress)
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.succeeded, vec!["s/a.png"]);
        assert_eq!(progress.1, vec!["s/a.png"]);
        assert_eq!(SavedDeck::open(&out).slide_count(), 1);
    }

    #[test]
    fn unsaved_crop_path_is_a_warning_not_a_failure() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("proj");
        write_image(&root.join("a/x.png"), 50, 50);
        let settings = Settings::default();
        let mut store = SessionStore::open(&root, &settings).unwrap();
        store
            .update(
                "a/x.png",
                RecordUpdate::default().crop_rect(Some(SourceRect::new(0, 0, 10, 10))),
            )
            .unwrap();

        // A non-empty directory where the sidecar should go makes every persist fail.
        let sidecar = store.sidecar_path().to_path_buf();
        fs::remove_file(&sidecar).unwrap();
        fs::create_dir(&sidecar).unwrap();
        fs::write(sidecar.join("blocker"), "x").unwrap();

        let mut cache = CropCache::new(store.root(), &settings);
        let out = dir.path().join("report.pptx");
        let result = ReportAssembler::new(&settings)
            .generate(&mut store, &mut cache, &out)
            .unwrap();
        assert_eq!(result.succeeded, vec!["a/x.png"]);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.pages, 1);
    }

    #[test]
    fn unwritable_output_is_a_report_error() {
        let dir = tempdir().unwrap();
        let settings = Settings::default();
        let mut store = SessionStore::open(dir.path(), &settings).unwrap();
        let mut cache = CropCache::new(store.root(), &settings);
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let err = ReportAssembler::new(&settings)
            .generate(&mut store, &mut cache, &blocker.join("out.pptx"))
            .unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }

    #[test]
    fn report_names_are_timestamped_and_never_reused() {
        let dir = tempdir().unwrap();
        let at = NaiveDate::from_ymd_opt(2026, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(report_file_name("Line3", at), "Line3_Report_20260102_030405.pptx");

        let first = unique_report_path(dir.path(), "Line3", at);
        fs::write(&first, "x").unwrap();
        let second = unique_report_path(dir.path(), "Line3", at);
        assert_eq!(second, dir.path().join("Line3_Report_20260102_030405-2.pptx"));
    }

    #[test]
    fn failure_reason_serializes_with_taxonomy_name() {
        let reason = FailureReason::Load("gone".to_string());
        assert_eq!(
            serde_json::to_value(&reason).unwrap(),
            serde_json::json!({"kind": "LoadError", "message": "gone"})
        );
    }
}
