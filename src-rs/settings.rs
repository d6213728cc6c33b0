use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

pub const DEFAULT_COMMENT: &str = "Assessment: 1. Imaging is clear, no inspection risk; \
2. Acceptance can be reached by tuning the detection threshold.";

/// Pipeline settings, passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Comment text given to newly discovered images.
    pub default_comment: String,
    /// Lower-case raster extensions picked up by a scan, without the dot.
    pub extensions: Vec<String>,
    /// Hidden directory under the project root holding cached crops.
    pub scratch_dir_name: String,
    /// Sidecar state file name, stored in the project root.
    pub sidecar_name: String,
    /// Long-edge limit for the representative original placed on a page.
    pub report_max_edge: u32,
    pub jpeg_quality: u8,
    /// Outline the ROI on each page's original image.
    pub outline_roi: bool,
    /// Where reports are written. Defaults to the project root.
    pub report_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_comment: DEFAULT_COMMENT.to_string(),
            extensions: ["jpg", "jpeg", "png", "bmp", "gif"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            scratch_dir_name: ".vsa_cache".to_string(),
            sidecar_name: ".vsa_records.json".to_string(),
            report_max_edge: 1600,
            jpeg_quality: 85,
            outline_roi: false,
            report_dir: None,
        }
    }
}

impl Settings {
    /// Read settings from an optional JSON file, then apply `VSA_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(settings.sanitized())
    }

    fn apply_env(&mut self) {
        if let Some(comment) = non_empty_env("VSA_DEFAULT_COMMENT") {
            self.default_comment = comment;
        }
        if let Some(dir) = non_empty_env("VSA_REPORT_DIR") {
            self.report_dir = Some(PathBuf::from(dir));
        }
    }

    fn sanitized(mut self) -> Self {
        self.extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if self.extensions.is_empty() {
            self.extensions = Settings::default().extensions;
        }
        self.report_max_edge = self.report_max_edge.max(16);
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        self
    }

    pub fn is_image_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    pub fn scratch_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.scratch_dir_name)
    }

    pub fn sidecar_path(&self, root: &Path) -> PathBuf {
        root.join(&self.sidecar_name)
    }

    pub fn report_dir_for(&self, root: &Path) -> PathBuf {
        self.report_dir.clone().unwrap_or_else(|| root.to_path_buf())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
