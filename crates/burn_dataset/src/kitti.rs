//! Indexing and decoding the KITTI road benchmark layout.
//!
//! ```text
//! <root>/data_road/training/image_2/um_000000.png
//! <root>/data_road/training/gt_image_2/um_road_000000.png
//! <root>/data_road/testing/image_2/um_000000.png
//! ```

use crate::types::{
    BurnDatasetError, DatasetResult, ImageShape, SampleIndex, SegmentationSample,
    BACKGROUND_COLOR, ROAD_CLASSES,
};
use image::imageops::FilterType;
use image::RgbImage;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const TRAINING_DIR: &str = "data_road/training";
pub const TESTING_DIR: &str = "data_road/testing";
pub const IMAGE_SUBDIR: &str = "image_2";
pub const LABEL_SUBDIR: &str = "gt_image_2";

pub fn training_images_dir(root: &Path) -> PathBuf {
    root.join(TRAINING_DIR).join(IMAGE_SUBDIR)
}

pub fn training_labels_dir(root: &Path) -> PathBuf {
    root.join(TRAINING_DIR).join(LABEL_SUBDIR)
}

pub fn testing_images_dir(root: &Path) -> PathBuf {
    root.join(TESTING_DIR).join(IMAGE_SUBDIR)
}

/// Image file name a road ground-truth file belongs to; lane annotations yield `None`.
pub fn image_name_for_label(label_name: &str) -> Option<String> {
    if label_name.contains("_lane_") {
        return None;
    }
    label_name
        .find("_road_")
        .map(|pos| format!("{}_{}", &label_name[..pos], &label_name[pos + "_road_".len()..]))
}

/// Sorted `*.png` files directly under `dir`.
pub fn list_pngs(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(BurnDatasetError::MissingDir {
            path: dir.to_path_buf(),
        });
    }
    let entries = fs::read_dir(dir).map_err(|e| BurnDatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Pair every training image with its road label.
///
/// Returns the paired samples and the images that have no label.
pub fn pair_training(root: &Path) -> DatasetResult<(Vec<SampleIndex>, Vec<PathBuf>)> {
    let images = list_pngs(&training_images_dir(root))?;
    let labels: BTreeMap<String, PathBuf> = list_pngs(&training_labels_dir(root))?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let image_name = image_name_for_label(name)?;
            Some((image_name, path))
        })
        .collect();

    let mut paired = Vec::with_capacity(images.len());
    let mut unpaired = Vec::new();
    for image in images {
        let label = image
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| labels.get(n));
        match label {
            Some(label) => paired.push(SampleIndex {
                image,
                label: label.clone(),
            }),
            None => unpaired.push(image),
        }
    }
    Ok((paired, unpaired))
}

/// Sorted training samples; an image without a road label is an error.
pub fn index_training(root: &Path) -> DatasetResult<Vec<SampleIndex>> {
    let (paired, unpaired) = pair_training(root)?;
    if let Some(image) = unpaired.into_iter().next() {
        return Err(BurnDatasetError::MissingLabel { image });
    }
    Ok(paired)
}

pub fn index_testing(root: &Path) -> DatasetResult<Vec<PathBuf>> {
    list_pngs(&testing_images_dir(root))
}

fn open_rgb(path: &Path) -> DatasetResult<RgbImage> {
    Ok(image::open(path)
        .map_err(|e| BurnDatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })?
        .to_rgb8())
}

fn resize_to(img: RgbImage, shape: ImageShape, filter: FilterType) -> RgbImage {
    if img.dimensions() == (shape.width, shape.height) {
        img
    } else {
        image::imageops::resize(&img, shape.width, shape.height, filter)
    }
}

/// CHW floats in [0, 255].
pub fn image_to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = width as usize * height as usize;
    let mut chw = vec![0.0f32; plane * 3];
    for (i, pixel) in img.pixels().enumerate() {
        chw[i] = pixel[0] as f32;
        chw[plane + i] = pixel[1] as f32;
        chw[2 * plane + i] = pixel[2] as f32;
    }
    chw
}

/// Two-channel one-hot label: background-coloured pixels are class 0, the rest class 1.
pub fn encode_road_label(gt: &RgbImage) -> Vec<f32> {
    let (width, height) = gt.dimensions();
    let plane = width as usize * height as usize;
    let mut chw = vec![0.0f32; plane * ROAD_CLASSES];
    for (i, pixel) in gt.pixels().enumerate() {
        if pixel.0 == BACKGROUND_COLOR {
            chw[i] = 1.0;
        } else {
            chw[plane + i] = 1.0;
        }
    }
    chw
}

/// Decode an input image resized (bilinear) to `shape`; returns the CHW data and the resized image.
pub fn load_image(path: &Path, shape: ImageShape) -> DatasetResult<(Vec<f32>, RgbImage)> {
    let img = resize_to(open_rgb(path)?, shape, FilterType::Triangle);
    Ok((image_to_chw(&img), img))
}

/// Decode a ground-truth image resized (nearest) to `shape` into a one-hot label.
pub fn load_label(path: &Path, shape: ImageShape) -> DatasetResult<Vec<f32>> {
    let gt = resize_to(open_rgb(path)?, shape, FilterType::Nearest);
    Ok(encode_road_label(&gt))
}

pub fn load_sample(idx: &SampleIndex, shape: ImageShape) -> DatasetResult<SegmentationSample> {
    let (image_chw, _) = load_image(&idx.image, shape)?;
    let label_chw = load_label(&idx.label, shape)?;
    Ok(SegmentationSample {
        image_chw,
        label_chw,
        shape,
    })
}
