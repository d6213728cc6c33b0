//! Per-image editing state for one project folder.
//!
//! Records are keyed by their path relative to the project root and kept in scan
//! order. Every mutation rewrites the whole JSON sidecar through a temp file and an
//! atomic rename, so a crash mid-write never leaves a half-written sidecar behind.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use log::{error, info, warn};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::{DirEntry, WalkDir};

use crate::error::{PersistError, StoreError};
use crate::geometry::SourceRect;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    /// Path relative to the project root, `/`-separated.
    pub id: String,
    pub source_path: PathBuf,
    /// Name of the directory holding the image; the fallback title.
    pub folder_name: String,
    pub title: String,
    pub comment: String,
    pub crop_rect: Option<SourceRect>,
    pub cache_path: Option<PathBuf>,
}

impl ImageRecord {
    fn new(id: String, source_path: PathBuf, folder_name: String, settings: &Settings) -> Self {
        Self {
            id,
            source_path,
            title: folder_name.clone(),
            folder_name,
            comment: settings.default_comment.clone(),
            crop_rect: None,
            cache_path: None,
        }
    }

    /// Title used on the report page. A cleared title falls back to the folder name.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.folder_name
        } else {
            &self.title
        }
    }

    fn merge_sidecar(&mut self, entry: SidecarEntry) {
        if let Some(title) = entry.title {
            self.title = title;
        }
        if let Some(comment) = entry.comment {
            self.comment = comment;
        }
        self.crop_rect = match entry.crop_rect {
            Some(rect) if rect.w > 0 && rect.h > 0 => Some(rect),
            Some(rect) => {
                warn!("dropping empty stored crop {rect} for {}", self.id);
                None
            }
            None => None,
        };
        self.cache_path = entry.cache_path;
    }
}

/// Partial edit of one record. Unset fields are left alone; the nested `Option` on
/// `crop_rect`/`cache_path` allows clearing them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub comment: Option<String>,
    pub crop_rect: Option<Option<SourceRect>>,
    pub cache_path: Option<Option<PathBuf>>,
}

impl RecordUpdate {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn crop_rect(mut self, rect: Option<SourceRect>) -> Self {
        self.crop_rect = Some(rect);
        self
    }

    pub fn cache_path(mut self, path: Option<PathBuf>) -> Self {
        self.cache_path = Some(path);
        self
    }

    fn apply(self, record: &mut ImageRecord) {
        if let Some(title) = self.title {
            record.title = title;
        }
        if let Some(comment) = self.comment {
            record.comment = comment;
        }
        if let Some(rect) = self.crop_rect {
            record.crop_rect = rect;
        }
        if let Some(path) = self.cache_path {
            record.cache_path = path;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SidecarEntry {
    #[serde(default)]
    crop_rect: Option<SourceRect>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    cache_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct SidecarEntryRef<'a> {
    crop_rect: Option<SourceRect>,
    comment: &'a str,
    title: &'a str,
    cache_path: Option<&'a Path>,
}

/// Serializes records as a JSON object keyed by id, in store order.
struct SidecarView<'a>(&'a [ImageRecord]);

impl Serialize for SidecarView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|record| {
            (
                record.id.as_str(),
                SidecarEntryRef {
                    crop_rect: record.crop_rect,
                    comment: &record.comment,
                    title: &record.title,
                    cache_path: record.cache_path.as_deref(),
                },
            )
        }))
    }
}

#[derive(Debug)]
pub struct SessionStore {
    root: PathBuf,
    sidecar: PathBuf,
    records: Vec<ImageRecord>,
    index: HashMap<String, usize>,
}

impl SessionStore {
    /// Scan `root`, merge the existing sidecar, and write the merged state back.
    pub fn open(root: &Path, settings: &Settings) -> Result<Self, StoreError> {
        let root = fs::canonicalize(root).map_err(|source| StoreError::Scan {
            path: root.to_path_buf(),
            source,
        })?;
        let sidecar = settings.sidecar_path(&root);
        let records = scan(&root, settings)?;
        let store = Self::from_records(root, sidecar, records);
        store.persist()?;
        Ok(store)
    }

    /// Rebuild the store from disk. Edits for files that still exist are kept.
    pub fn rescan(&mut self, settings: &Settings) -> Result<&[ImageRecord], StoreError> {
        let records = scan(&self.root, settings)?;
        *self = Self::from_records(self.root.clone(), self.sidecar.clone(), records);
        self.persist()?;
        Ok(&self.records)
    }

    fn from_records(root: PathBuf, sidecar: PathBuf, records: Vec<ImageRecord>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.id.clone(), idx))
            .collect();
        Self {
            root,
            sidecar,
            records,
            index,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ImageRecord> {
        self.index.get(id).map(|&idx| &self.records[idx])
    }

    pub fn update(&mut self, id: &str, update: RecordUpdate) -> Result<&ImageRecord, StoreError> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| StoreError::UnknownId(id.to_string()))?;
        update.apply(&mut self.records[idx]);
        self.persist()?;
        Ok(&self.records[idx])
    }

    /// Forget every cached crop path in a single write.
    pub fn clear_cache_paths(&mut self) -> Result<(), StoreError> {
        for record in &mut self.records {
            record.cache_path = None;
        }
        self.persist()?;
        Ok(())
    }

    /// Full rewrite of the sidecar. A failed write is retried once before giving up.
    pub fn persist(&self) -> Result<(), PersistError> {
        self.persist_with(write_sidecar)
    }

    fn persist_with<F>(&self, mut write: F) -> Result<(), PersistError>
    where
        F: FnMut(&Path, &[ImageRecord]) -> Result<(), PersistError>,
    {
        match write(&self.sidecar, &self.records) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!("sidecar write failed, retrying once: {first}");
                write(&self.sidecar, &self.records).map_err(|err| {
                    error!("sidecar write failed again, edits are not saved: {err}");
                    err
                })
            }
        }
    }
}

/// Walk `root` for raster images and build one record per file, in file-name order.
///
/// Saved edits from the sidecar are merged for matching ids; a missing or unreadable
/// sidecar only costs a warning.
pub fn scan(root: &Path, settings: &Settings) -> Result<Vec<ImageRecord>, StoreError> {
    let mut saved = load_sidecar(&settings.sidecar_path(root));
    let root_name = folder_name_of(root);
    let mut records = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(StoreError::Scan {
                    path: root.to_path_buf(),
                    source: err.into(),
                });
            }
            Err(err) => {
                warn!("skipping unreadable entry during scan: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !settings.is_image_path(entry.path()) {
            continue;
        }
        let Some(id) = relative_id(root, entry.path()) else {
            continue;
        };

        let folder_name = entry
            .path()
            .parent()
            .filter(|parent| *parent != root)
            .map(folder_name_of)
            .unwrap_or_else(|| root_name.clone());

        let mut record = ImageRecord::new(id, entry.path().to_path_buf(), folder_name, settings);
        if let Some(entry) = saved.remove(&record.id) {
            record.merge_sidecar(entry);
        }
        records.push(record);
    }

    if !saved.is_empty() {
        info!("dropped {} stored record(s) for images no longer on disk", saved.len());
    }
    info!("scanned {} image(s) under {}", records.len(), root.display());
    Ok(records)
}

fn load_sidecar(path: &Path) -> HashMap<String, SidecarEntry> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("no usable sidecar at {} ({err}), starting from defaults", path.display());
            return HashMap::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("ignoring corrupt sidecar {}: {err}", path.display());
            HashMap::new()
        }
    }
}

fn write_sidecar(path: &Path, records: &[ImageRecord]) -> Result<(), PersistError> {
    let io_err = |source: std::io::Error| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    let raw = serde_json::to_string_pretty(&SidecarView(records))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(raw.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

fn relative_id(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn folder_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
