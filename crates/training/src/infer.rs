//! Road overlays for the KITTI test images.

use anyhow::Context;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use burn_dataset::{index_testing, load_image, ImageShape};
use image::{Rgb, RgbImage};
use models::RoadSegmenter;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Pixels whose road probability exceeds this are painted.
pub const ROAD_PROBABILITY_THRESHOLD: f32 = 0.5;

const OVERLAY_COLOR: [u8; 3] = [0, 255, 0];
const OVERLAY_ALPHA: u32 = 127;

pub fn road_mask(road_probs: &[f32]) -> Vec<bool> {
    road_probs
        .iter()
        .map(|p| *p > ROAD_PROBABILITY_THRESHOLD)
        .collect()
}

/// Blend semi-transparent green over the masked pixels; `mask` is row-major.
pub fn overlay_road(image: &RgbImage, mask: &[bool]) -> RgbImage {
    let mut out = image.clone();
    for (pixel, road) in out.pixels_mut().zip(mask) {
        if !*road {
            continue;
        }
        let blended: [u8; 3] = std::array::from_fn(|c| {
            let base = pixel[c] as u32 * (255 - OVERLAY_ALPHA);
            let paint = OVERLAY_COLOR[c] as u32 * OVERLAY_ALPHA;
            ((base + paint + 127) / 255) as u8
        });
        *pixel = Rgb(blended);
    }
    out
}

/// Create a new `<runs_dir>/<unix millis>` directory, suffixing `-N` if that name is taken.
pub fn create_sample_dir(runs_dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(runs_dir)
        .with_context(|| format!("failed to create {}", runs_dir.display()))?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut suffix = 0usize;
    loop {
        let name = match suffix {
            0 => stamp.to_string(),
            n => format!("{stamp}-{n}"),
        };
        let dir = runs_dir.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create {}", dir.display()))
            }
        }
    }
}

/// Segment every test image and write the overlays into a fresh
/// [`create_sample_dir`] directory, keeping the source file names.
pub fn save_inference_samples<B: Backend>(
    model: &RoadSegmenter<B>,
    runs_dir: &Path,
    data_dir: &Path,
    shape: ImageShape,
    device: &B::Device,
) -> anyhow::Result<(PathBuf, usize)> {
    let out_dir = create_sample_dir(runs_dir)?;
    log::info!("saving test images to {}", out_dir.display());

    let (h, w) = (shape.height as usize, shape.width as usize);
    let mut written = 0;
    for path in index_testing(data_dir)? {
        let Some(name) = path.file_name() else {
            continue;
        };
        let (chw, resized) = load_image(&path, shape)?;
        let images = Tensor::<B, 4>::from_data(TensorData::new(chw, [1, 3, h, w]), device);
        let road = model
            .probabilities(images)
            .narrow(1, 1, 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("failed to read probabilities: {e:?}"))?;
        let overlay = overlay_road(&resized, &road_mask(&road));
        let dest = out_dir.join(name);
        overlay
            .save(&dest)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        written += 1;
    }
    Ok((out_dir, written))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_dirs_never_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let first = create_sample_dir(tmp.path()).unwrap();
        let second = create_sample_dir(tmp.path()).unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
    }

    #[test]
    fn mask_threshold_is_strict() {
        assert_eq!(
            road_mask(&[0.2, 0.5, 0.51, 0.99]),
            vec![false, false, true, true]
        );
    }

    #[test]
    fn overlay_tints_only_masked_pixels() {
        let img = RgbImage::from_pixel(2, 1, Rgb([200, 100, 50]));
        let out = overlay_road(&img, &[true, false]);
        assert_eq!(out.get_pixel(1, 0), &Rgb([200, 100, 50]));
        let tinted = out.get_pixel(0, 0);
        assert!(tinted[1] > 100);
        assert!(tinted[0] < 200);
        assert_eq!(tinted, &Rgb([100, 177, 25]));
    }
}
