//! Editing session over one project folder.
//!
//! Owns the store, the crop cache and the selection tracker for the image currently on
//! screen, and runs the tracker -> cache -> store loop once per completed drag. Hosts
//! (the CLI, or a UI) drive it with pointer events and field edits.

use std::path::Path;

use log::{debug, info, warn};

use crate::crop::CropCache;
use crate::error::{CropError, LoadError, Result, StoreError};
use crate::geometry::{PointF, Size, SourceRect};
use crate::report::{default_output_path, CancelToken, GenerationResult, ReportAssembler, ReportProgress};
use crate::selection::{SelectionObserver, SelectionTracker};
use crate::settings::Settings;
use crate::store::{ImageRecord, RecordUpdate, SessionStore};

#[derive(Debug)]
pub struct EditingSession {
    settings: Settings,
    store: SessionStore,
    cache: CropCache,
    tracker: SelectionTracker,
    current: Option<String>,
}

impl EditingSession {
    pub fn open(root: &Path, settings: Settings) -> Result<Self> {
        let store = SessionStore::open(root, &settings)?;
        let cache = CropCache::new(store.root(), &settings);
        Ok(Self {
            settings,
            store,
            cache,
            tracker: SelectionTracker::new(Size::new(0, 0), Size::new(0, 0)),
            current: None,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn records(&self) -> &[ImageRecord] {
        self.store.records()
    }

    pub fn record(&self, id: &str) -> Option<&ImageRecord> {
        self.store.get(id)
    }

    pub fn cache(&self) -> &CropCache {
        &self.cache
    }

    pub fn tracker(&self) -> &SelectionTracker {
        &self.tracker
    }

    pub fn current(&self) -> Option<&ImageRecord> {
        self.current.as_deref().and_then(|id| self.store.get(id))
    }

    pub fn subscribe(&mut self, observer: Box<dyn SelectionObserver>) {
        self.tracker.subscribe(observer);
    }

    /// Re-walk the project folder. The current image is dropped if it disappeared.
    pub fn rescan(&mut self) -> Result<&[ImageRecord]> {
        self.store.rescan(&self.settings)?;
        if let Some(id) = &self.current {
            if self.store.get(id).is_none() {
                self.current = None;
                self.tracker.cancel();
            }
        }
        Ok(self.store.records())
    }

    /// Show `id` on a display surface of `display` size.
    pub fn select_image(&mut self, id: &str, display: Size) -> Result<&ImageRecord> {
        let record = self.known(id)?;
        let source = source_size(&record.source_path)?;
        self.tracker.resize(display);
        self.tracker.reload(source);
        self.current = Some(id.to_string());
        debug!("showing {id} ({}x{}) in {}x{}", source.width, source.height, display.width, display.height);
        self.known(id)
    }

    pub fn resize_display(&mut self, display: Size) {
        self.tracker.resize(display);
    }

    pub fn pointer_down(&mut self, position: PointF) {
        if self.current.is_some() {
            self.tracker.pointer_down(position);
        }
    }

    pub fn pointer_move(&mut self, position: PointF) {
        self.tracker.pointer_move(position);
    }

    /// Finish a drag over the current image. A committed selection is stored, cropped and
    /// its crop path stored, in that order; `Ok(None)` means the drag was discarded.
    pub fn pointer_up(&mut self, position: PointF) -> Result<Option<&ImageRecord>> {
        let Some(rect) = self.tracker.pointer_up(position) else {
            return Ok(None);
        };
        let Some(id) = self.current.clone() else {
            return Ok(None);
        };
        self.apply_crop(&id, rect).map(Some)
    }

    pub fn cancel_selection(&mut self) {
        self.tracker.cancel();
    }

    pub fn set_title(&mut self, id: &str, title: &str) -> Result<&ImageRecord> {
        Ok(self.store.update(id, RecordUpdate::default().title(title))?)
    }

    pub fn set_comment(&mut self, id: &str, comment: &str) -> Result<&ImageRecord> {
        Ok(self.store.update(id, RecordUpdate::default().comment(comment))?)
    }

    /// Store a source-space rectangle directly. It is clipped to the image like a drag;
    /// `Ok(None)` means it missed the image entirely and nothing changed.
    pub fn set_crop_rect(&mut self, id: &str, rect: SourceRect) -> Result<Option<&ImageRecord>> {
        let source = source_size(&self.known(id)?.source_path)?;
        let Some(clamped) = SourceRect::clamp_from(rect.to_rect_f(), source) else {
            debug!("rejecting crop {rect} outside {}x{} image {id}", source.width, source.height);
            return Ok(None);
        };
        if clamped != rect {
            info!("clipped crop {rect} to {clamped} for {id}");
        }
        self.apply_crop(id, clamped).map(Some)
    }

    /// Drop the selection and the cached crop for `id`.
    pub fn clear_crop(&mut self, id: &str) -> Result<&ImageRecord> {
        self.known(id)?;
        self.cache.invalidate(id);
        let stale = self.cache.cache_path_for(id);
        if let Err(err) = std::fs::remove_file(&stale) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove cached crop {}: {err}", stale.display());
            }
        }
        if self.current.as_deref() == Some(id) {
            self.tracker.cancel();
        }
        Ok(self.store.update(
            id,
            RecordUpdate::default().crop_rect(None).cache_path(None),
        )?)
    }

    /// Make sure the crop for `id` is on disk and recorded.
    pub fn ensure_crop(&mut self, id: &str) -> Result<&ImageRecord> {
        let mut record = self.known(id)?.clone();
        let before = record.cache_path.clone();
        self.cache.ensure_crop(&mut record)?;
        if record.cache_path != before {
            self.store
                .update(id, RecordUpdate::default().cache_path(record.cache_path))?;
        }
        self.known(id)
    }

    pub fn generate_report(&mut self, output: Option<&Path>) -> Result<GenerationResult> {
        self.generate_report_with(output, &CancelToken::new(), &mut ())
    }

    pub fn generate_report_with(
        &mut self,
        output: Option<&Path>,
        cancel: &CancelToken,
        progress: &mut dyn ReportProgress,
    ) -> Result<GenerationResult> {
        let output = match output {
            Some(path) => path.to_path_buf(),
            None => default_output_path(&self.store, &self.settings),
        };
        let assembler = ReportAssembler::new(&self.settings);
        Ok(assembler.generate_with(&mut self.store, &mut self.cache, &output, cancel, progress)?)
    }

    /// End the session: delete the scratch directory and forget every crop path.
    pub fn close(mut self) -> Result<()> {
        let scratch = self.cache.scratch_dir().to_path_buf();
        let teardown = self.cache.teardown();
        self.store.clear_cache_paths()?;
        teardown.map_err(|source| CropError::Scratch {
            path: scratch,
            source,
        })?;
        info!("closed session for {}", self.store.root().display());
        Ok(())
    }

    fn known(&self, id: &str) -> Result<&ImageRecord> {
        self.store
            .get(id)
            .ok_or_else(|| StoreError::UnknownId(id.to_string()).into())
    }

    fn apply_crop(&mut self, id: &str, rect: SourceRect) -> Result<&ImageRecord> {
        let mut record = self
            .store
            .update(id, RecordUpdate::default().crop_rect(Some(rect)))?
            .clone();
        let before = record.cache_path.clone();
        self.cache.ensure_crop(&mut record)?;
        if record.cache_path != before {
            self.store
                .update(id, RecordUpdate::default().cache_path(record.cache_path))?;
        }
        self.known(id)
    }
}

fn source_size(path: &Path) -> Result<Size, LoadError> {
    let (width, height) =
        image::image_dimensions(path).map_err(|err| LoadError::from_image(path, err))?;
    Ok(Size::new(width, height))
}
