//! Core types, error definitions, and data structures for burn_dataset.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type DatasetResult<T> = Result<T, BurnDatasetError>;

/// Number of channels in a decoded label (not-road, road).
pub const ROAD_CLASSES: usize = 2;

/// Ground-truth colour marking not-road pixels in `gt_image_2`.
pub const BACKGROUND_COLOR: [u8; 3] = [255, 0, 0];

#[derive(Debug, Error)]
pub enum BurnDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("required directory missing: {path}")]
    MissingDir { path: PathBuf },
    #[error("no ground-truth label for image {image}")]
    MissingLabel { image: PathBuf },
    #[error("{0}")]
    Other(String),
}

/// Network input size, height first as the tensors are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
}

impl ImageShape {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub fn pixels(&self) -> usize {
        self.height as usize * self.width as usize
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        Self::new(160, 576)
    }
}

/// A training image and its ground-truth file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndex {
    pub image: PathBuf,
    pub label: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SegmentationSample {
    /// RGB image in CHW layout, values in [0, 255].
    pub image_chw: Vec<f32>,
    /// One-hot label in CHW layout: channel 0 not-road, channel 1 road.
    pub label_chw: Vec<f32>,
    pub shape: ImageShape,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutSummary {
    pub training_images: usize,
    pub paired_labels: usize,
    pub unpaired_images: Vec<PathBuf>,
    pub testing_images: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Pass,
    Warn,
    Fail,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Pass => "pass",
            ValidationOutcome::Warn => "warn",
            ValidationOutcome::Fail => "fail",
        }
    }
}

/// Image counts a complete download is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutExpectations {
    pub training_images: Option<usize>,
    pub testing_images: Option<usize>,
}

impl LayoutExpectations {
    /// The KITTI road benchmark: 289 training and 290 testing images.
    pub const KITTI_ROAD: Self = Self {
        training_images: Some(289),
        testing_images: Some(290),
    };

    pub fn none() -> Self {
        Self {
            training_images: None,
            testing_images: None,
        }
    }

    /// `KITTI_EXPECT_TRAINING` / `KITTI_EXPECT_TESTING` override the benchmark counts.
    pub fn from_env() -> Self {
        fn parse(key: &str) -> Option<Option<usize>> {
            let raw = std::env::var(key).ok()?;
            if raw.trim().eq_ignore_ascii_case("off") {
                return Some(None);
            }
            raw.trim().parse().ok().map(Some)
        }
        let base = Self::KITTI_ROAD;
        Self {
            training_images: parse("KITTI_EXPECT_TRAINING").unwrap_or(base.training_images),
            testing_images: parse("KITTI_EXPECT_TESTING").unwrap_or(base.testing_images),
        }
    }
}

impl Default for LayoutExpectations {
    fn default() -> Self {
        Self::KITTI_ROAD
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub reasons: Vec<String>,
    pub summary: LayoutSummary,
}

impl ValidationReport {
    /// Write the report as pretty JSON, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| BurnDatasetError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let data =
            serde_json::to_vec_pretty(self).map_err(|e| BurnDatasetError::Other(e.to_string()))?;
        fs::write(path, data).map_err(|e| BurnDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
