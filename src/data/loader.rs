// ============================================================
// Layer 4 - Sample Loader
// ============================================================
// Reads a point-in-time snapshot of the Sample Store:
//
//   <root>/match_ready/*.jpg|png|...
//   <root>/not_match_ready/*.jpg|png|...
//
// The class comes from the directory name. Hidden files (the
// collector's in-flight temp files start with '.') and files
// without an image extension are ignored; files that fail to
// decode are skipped with a warning so one corrupt upload
// cannot block a training run.
//
// Pixels are kept exactly as decoded. Validation then sees the
// same single resize that inference applies to an upload, and
// augmentation does its own resize-then-crop.

use anyhow::{Context, Result};
use image::ImageFormat;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{label::Label, sample::Sample, traits::SampleSource};

/// Formats the Sample Store holds. The collector rejects anything else,
/// so every accepted submission is visible to the next snapshot.
pub const SUPPORTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Bmp,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Tiff,
];

pub fn is_supported_format(format: ImageFormat) -> bool {
    SUPPORTED_FORMATS.contains(&format)
}

/// Loads every labelled image below a Sample Store root.
/// Implements the SampleSource trait from Layer 3.
pub struct SampleLoader {
    root: PathBuf,
}

impl SampleLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Image files of one class, sorted by path for a stable order.
    pub fn list_class(&self, label: Label) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(label.dir_name());
        if !dir.exists() {
            tracing::warn!(
                "Class directory '{}' does not exist - treating class as empty",
                dir.display()
            );
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl SampleSource for SampleLoader {
    fn snapshot(&self) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();

        for label in Label::ALL {
            let paths = self.list_class(label)?;
            let mut loaded = 0usize;

            for path in paths {
                match image::open(&path) {
                    Ok(img) if img.width() > 0 && img.height() > 0 => {
                        samples.push(Sample::new(img.to_rgb8(), label, path));
                        loaded += 1;
                    }
                    Ok(_) => tracing::warn!("Skipping '{}': empty image", path.display()),
                    Err(e) => tracing::warn!("Skipping '{}': {}", path.display(), e),
                }
            }

            tracing::info!("Loaded {} '{}' samples", loaded, label);
        }

        Ok(samples)
    }
}

fn is_image_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'));
    if hidden {
        return false;
    }
    path.extension()
        .and_then(ImageFormat::from_extension)
        .map_or(false, is_supported_format)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        RgbImage::from_pixel(10, 6, Rgb([200, 10, 10]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_snapshot_labels_from_directories() {
        let root = TempDir::new().unwrap();
        write_png(&root.path().join("match_ready"), "a.png");
        write_png(&root.path().join("match_ready"), "b.png");
        write_png(&root.path().join("not_match_ready"), "c.png");

        let samples = SampleLoader::new(root.path()).snapshot().unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples.iter().filter(|s| s.label == Label::MatchReady).count(), 2);
        assert!(samples.iter().all(|s| s.image.dimensions() == (10, 6)));
    }

    #[test]
    fn test_skips_hidden_corrupt_and_foreign_files() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("match_ready");
        write_png(&dir, "good.png");
        fs::write(dir.join(".tmpAbC123"), b"partial").unwrap();
        fs::write(dir.join("notes.txt"), b"hello").unwrap();
        fs::write(dir.join("broken.jpg"), b"not a jpeg").unwrap();
        fs::write(dir.join("odd.pbm"), b"P1\n1 1\n0\n").unwrap();

        let samples = SampleLoader::new(root.path()).snapshot().unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].source_path.ends_with("good.png"));
    }

    #[test]
    fn test_missing_store_is_empty() {
        let root = TempDir::new().unwrap();
        let samples = SampleLoader::new(root.path().join("nope")).snapshot().unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_extension_allow_list_matches_formats() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("a/b.webp")));
        assert!(!is_image_file(Path::new("a/b.pbm")));
        assert!(!is_image_file(Path::new("a/.hidden.png")));
        assert!(!is_supported_format(ImageFormat::Qoi));
    }
}
