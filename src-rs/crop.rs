//! Cropped-ROI bitmaps cached in the project's scratch directory.
//!
//! One file per image id, named deterministically, overwritten whenever the record's
//! crop rectangle changes. Which rectangle produced the file is remembered in memory
//! only; a fresh session regenerates each crop once.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, ImageFormat};
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::error::{CropError, LoadError};
use crate::geometry::{Size, SourceRect};
use crate::settings::Settings;
use crate::store::ImageRecord;

#[derive(Debug)]
pub struct CropCache {
    scratch_dir: PathBuf,
    last_rect: HashMap<String, SourceRect>,
    renders: usize,
}

impl CropCache {
    pub fn new(root: &Path, settings: &Settings) -> Self {
        Self::with_dir(settings.scratch_dir(root))
    }

    pub fn with_dir(scratch_dir: PathBuf) -> Self {
        Self {
            scratch_dir,
            last_rect: HashMap::new(),
            renders: 0,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Where the crop for `id` lives, whether or not it has been produced yet.
    pub fn cache_path_for(&self, id: &str) -> PathBuf {
        self.scratch_dir.join(cache_file_name(id))
    }

    /// Number of crops actually decoded and written by this cache.
    pub fn render_count(&self) -> usize {
        self.renders
    }

    /// Make sure `record.cache_path` holds a crop of the current `crop_rect`.
    ///
    /// Returns `Ok(None)` when the record has no selection. A crop already produced from
    /// the same rectangle in this session is returned without touching the disk.
    pub fn ensure_crop(&mut self, record: &mut ImageRecord) -> Result<Option<PathBuf>, CropError> {
        self.ensure_inner(record, None)
    }

    /// Same as [`CropCache::ensure_crop`] for a caller that has already decoded the source.
    pub fn ensure_crop_from(
        &mut self,
        record: &mut ImageRecord,
        source: &DynamicImage,
    ) -> Result<Option<PathBuf>, CropError> {
        self.ensure_inner(record, Some(source))
    }

    fn ensure_inner(
        &mut self,
        record: &mut ImageRecord,
        decoded: Option<&DynamicImage>,
    ) -> Result<Option<PathBuf>, CropError> {
        let Some(rect) = record.crop_rect else {
            return Ok(None);
        };

        if let Some(existing) = &record.cache_path {
            if self.last_rect.get(&record.id) == Some(&rect) && existing.is_file() {
                debug!("crop cache hit for {}", record.id);
                return Ok(Some(existing.clone()));
            }
        }

        let opened;
        let source = match decoded {
            Some(source) => source,
            None => {
                opened = image::open(&record.source_path)
                    .map_err(|err| LoadError::from_image(&record.source_path, err))?;
                &opened
            }
        };
        let cropped = crop_image(source, rect)?;
        let target = self.cache_path_for(&record.id);
        self.write_crop(&cropped, &target)?;

        self.last_rect.insert(record.id.clone(), rect);
        self.renders += 1;
        info!("cached crop {rect} of {} at {}", record.id, target.display());
        record.cache_path = Some(target.clone());
        Ok(Some(target))
    }

    /// Forget which rectangle produced the cached crop for `id`.
    pub fn invalidate(&mut self, id: &str) {
        self.last_rect.remove(id);
    }

    fn write_crop(&self, cropped: &DynamicImage, target: &Path) -> Result<(), CropError> {
        fs::create_dir_all(&self.scratch_dir).map_err(|source| CropError::Scratch {
            path: self.scratch_dir.clone(),
            source,
        })?;
        // The temp file is removed on every early return.
        let mut tmp =
            NamedTempFile::new_in(&self.scratch_dir).map_err(|source| CropError::Scratch {
                path: self.scratch_dir.clone(),
                source,
            })?;
        cropped
            .write_to(tmp.as_file_mut(), ImageFormat::Png)
            .map_err(|source| CropError::Encode {
                path: target.to_path_buf(),
                source,
            })?;
        tmp.persist(target).map_err(|err| CropError::Write {
            path: target.to_path_buf(),
            source: err.error,
        })?;
        Ok(())
    }

    /// Remove the scratch directory and everything in it.
    pub fn teardown(mut self) -> io::Result<()> {
        self.last_rect.clear();
        match fs::remove_dir_all(&self.scratch_dir) {
            Ok(()) => {
                info!("removed scratch directory {}", self.scratch_dir.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Copy `rect` out of `source`, refusing rectangles that no longer fit the image.
pub fn crop_image(source: &DynamicImage, rect: SourceRect) -> Result<DynamicImage, CropError> {
    let (width, height) = source.dimensions();
    let image = Size::new(width, height);
    if !rect.fits_within(image) {
        return Err(CropError::OutOfBounds { rect, image });
    }
    Ok(source.crop_imm(rect.x, rect.y, rect.w, rect.h))
}

/// Deterministic, collision-free file name for an image id.
///
/// Lower-case ASCII letters, digits and `-` pass through; every other byte becomes
/// `_XX` (upper-case hex). Upper-case letters are escaped too so two ids never share
/// a name on case-insensitive file systems.
pub fn cache_file_name(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 10);
    out.push_str("crop_");
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => out.push(char::from(byte)),
            _ => out.push_str(&format!("_{byte:02X}")),
        }
    }
    out.push_str(".png");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x * 7 + y * 3) % 256) as u8, 255])
        })
    }

    fn record_for(root: &Path, id: &str, rect: Option<SourceRect>) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            source_path: root.join(id),
            folder_name: "a".to_string(),
            title: "a".to_string(),
            comment: String::new(),
            crop_rect: rect,
            cache_path: None,
        }
    }

    fn setup(rect: Option<SourceRect>) -> (tempfile::TempDir, CropCache, ImageRecord, RgbaImage) {
        let dir = tempdir().unwrap();
        let source = gradient(400, 300);
        fs::create_dir_all(dir.path().join("a")).unwrap();
        source.save(dir.path().join("a/x.png")).unwrap();
        let cache = CropCache::new(dir.path(), &Settings::default());
        let record = record_for(dir.path(), "a/x.png", rect);
        (dir, cache, record, source)
    }

    #[test]
    fn no_selection_means_no_crop() {
        let (_dir, mut cache, mut record, _) = setup(None);
        assert_eq!(cache.ensure_crop(&mut record).unwrap(), None);
        assert_eq!(record.cache_path, None);
        assert!(!cache.scratch_dir().exists());
    }

    #[test]
    fn crop_matches_source_pixels() {
        let (_dir, mut cache, mut record, source) = setup(Some(SourceRect::new(10, 10, 100, 50)));
        let path = cache.ensure_crop(&mut record).unwrap().unwrap();
        assert_eq!(record.cache_path.as_deref(), Some(path.as_path()));

        let cropped = image::open(&path).unwrap().to_rgba8();
        assert_eq!(cropped.dimensions(), (100, 50));
        for (x, y, px) in cropped.enumerate_pixels() {
            assert_eq!(px, source.get_pixel(x + 10, y + 10));
        }
    }

    #[test]
    fn unchanged_rect_is_not_rewritten() {
        let (_dir, mut cache, mut record, _) = setup(Some(SourceRect::new(10, 10, 100, 50)));
        let first = cache.ensure_crop(&mut record).unwrap().unwrap();
        let modified = fs::metadata(&first).unwrap().modified().unwrap();

        let second = cache.ensure_crop(&mut record).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.render_count(), 1);
        assert_eq!(fs::metadata(&second).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn changed_rect_overwrites_the_same_file() {
        let (_dir, mut cache, mut record, source) = setup(Some(SourceRect::new(10, 10, 100, 50)));
        let first = cache.ensure_crop(&mut record).unwrap().unwrap();

        record.crop_rect = Some(SourceRect::new(200, 100, 30, 40));
        let second = cache.ensure_crop(&mut record).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.render_count(), 2);

        let cropped = image::open(&second).unwrap().to_rgba8();
        let fresh = DynamicImage::ImageRgba8(source).crop_imm(200, 100, 30, 40).to_rgba8();
        assert_eq!(cropped, fresh);

        let files: Vec<_> = fs::read_dir(cache.scratch_dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn missing_source_is_a_load_error_and_keeps_old_crop() {
        let (dir, mut cache, mut record, _) = setup(Some(SourceRect::new(0, 0, 10, 10)));
        let old = cache.ensure_crop(&mut record).unwrap().unwrap();
        fs::remove_file(dir.path().join("a/x.png")).unwrap();

        record.crop_rect = Some(SourceRect::new(5, 5, 10, 10));
        let err = cache.ensure_crop(&mut record).unwrap_err();
        assert!(matches!(err, CropError::Load(LoadError::Missing(_))));
        assert!(old.exists());
        assert_eq!(record.cache_path.as_deref(), Some(old.as_path()));
    }

    #[test]
    fn replaced_smaller_source_is_out_of_bounds() {
        let (dir, mut cache, mut record, _) = setup(Some(SourceRect::new(300, 200, 100, 100)));
        gradient(100, 100).save(dir.path().join("a/x.png")).unwrap();
        assert!(matches!(
            cache.ensure_crop(&mut record),
            Err(CropError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn cache_names_are_distinct_and_stable() {
        let ids = ["a/x.png", "a_x.png", "a_2Fx.png", "A/x.png", "a/X.png", "a/x.PNG"];
        let names: HashSet<String> = ids.iter().map(|id| cache_file_name(id)).collect();
        assert_eq!(names.len(), ids.len());
        assert_eq!(cache_file_name("a/x.png"), "crop_a_2Fx_2Epng.png");
        assert_eq!(cache_file_name("a/x.png"), cache_file_name("a/x.png"));
        for name in &names {
            assert!(!name.contains('/'));
        }
    }

    #[test]
    fn teardown_removes_scratch_dir() {
        let (dir, mut cache, mut record, _) = setup(Some(SourceRect::new(0, 0, 10, 10)));
        cache.ensure_crop(&mut record).unwrap();
        let scratch = dir.path().join(".vsa_cache");
        assert!(scratch.is_dir());
        cache.teardown().unwrap();
        assert!(!scratch.exists());

        // Tearing down twice is harmless.
        CropCache::new(dir.path(), &Settings::default()).teardown().unwrap();
    }
}
