// ============================================================
// Layer 3 - Sample Domain Type
// ============================================================
// One labelled photo from the Sample Store. Identity is the
// file path: two Samples with the same path are the same
// sample, whatever their pixels.

use std::path::PathBuf;

use image::RgbImage;

use crate::domain::label::Label;

#[derive(Debug, Clone)]
pub struct Sample {
    /// Decoded RGB pixels
    pub image: RgbImage,

    /// Ground-truth class, taken from the parent directory
    pub label: Label,

    /// Where the sample lives on disk
    pub source_path: PathBuf,
}

impl Sample {
    pub fn new(image: RgbImage, label: Label, source_path: impl Into<PathBuf>) -> Self {
        Self {
            image,
            label,
            source_path: source_path.into(),
        }
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.source_path == other.source_path
    }
}

impl Eq for Sample {}
