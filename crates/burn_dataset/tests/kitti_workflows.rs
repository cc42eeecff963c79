//! End-to-end checks over a synthetic KITTI road tree.

use burn_dataset::{
    index_testing, index_training, validate_layout, BatchIter, BurnDatasetError, DatasetConfig,
    ImageShape, LayoutExpectations, ValidationOutcome,
};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

type B = burn_ndarray::NdArray<f32>;

/// Writes `count` training pairs (left half road, right half background) and `testing` test images.
fn synthetic_kitti(root: &Path, count: usize, testing: usize) -> anyhow::Result<()> {
    let images = root.join("data_road/training/image_2");
    let labels = root.join("data_road/training/gt_image_2");
    let test = root.join("data_road/testing/image_2");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&labels)?;
    fs::create_dir_all(&test)?;

    for i in 0..count {
        let img = RgbImage::from_pixel(16, 8, Rgb([(i * 20) as u8, 100, 200]));
        img.save(images.join(format!("um_{i:06}.png")))?;
        let gt = RgbImage::from_fn(16, 8, |x, _| {
            if x < 8 {
                Rgb([255, 0, 255])
            } else {
                Rgb([255, 0, 0])
            }
        });
        gt.save(labels.join(format!("um_road_{i:06}.png")))?;
        // Lane annotations share the directory and must be ignored.
        gt.save(labels.join(format!("um_lane_{i:06}.png")))?;
    }
    for i in 0..testing {
        RgbImage::from_pixel(16, 8, Rgb([10, 10, 10])).save(test.join(format!("uu_{i:06}.png")))?;
    }
    Ok(())
}

#[test]
fn indexes_pairs_and_ignores_lane_labels() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_kitti(tmp.path(), 3, 2)?;

    let samples = index_training(tmp.path())?;
    assert_eq!(samples.len(), 3);
    for s in &samples {
        let label = s.label.file_name().unwrap().to_str().unwrap();
        assert!(label.contains("_road_"), "paired with {label}");
    }
    assert_eq!(index_testing(tmp.path())?.len(), 2);
    Ok(())
}

#[test]
fn image_without_label_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_kitti(tmp.path(), 2, 1)?;
    fs::remove_file(tmp.path().join("data_road/training/gt_image_2/um_road_000001.png"))?;

    match index_training(tmp.path()) {
        Err(BurnDatasetError::MissingLabel { image }) => {
            assert!(image.ends_with("um_000001.png"));
        }
        other => panic!("expected MissingLabel, got {other:?}"),
    }
    let report = validate_layout(tmp.path(), &LayoutExpectations::none())?;
    assert_eq!(report.outcome, ValidationOutcome::Fail);
    assert_eq!(report.summary.unpaired_images.len(), 1);
    Ok(())
}

#[test]
fn validation_grades_layouts() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;

    let missing = validate_layout(tmp.path(), &LayoutExpectations::none())?;
    assert_eq!(missing.outcome, ValidationOutcome::Fail);
    assert!(missing.reasons.iter().any(|r| r.contains("missing directory")));

    synthetic_kitti(tmp.path(), 2, 2)?;
    let exact = LayoutExpectations {
        training_images: Some(2),
        testing_images: Some(2),
    };
    assert_eq!(
        validate_layout(tmp.path(), &exact)?.outcome,
        ValidationOutcome::Pass
    );

    let benchmark = validate_layout(tmp.path(), &LayoutExpectations::KITTI_ROAD)?;
    assert_eq!(benchmark.outcome, ValidationOutcome::Warn);
    assert_eq!(benchmark.reasons.len(), 2);

    let report_path = tmp.path().join("reports/layout.json");
    benchmark.save(&report_path)?;
    let raw: serde_json::Value = serde_json::from_slice(&fs::read(&report_path)?)?;
    assert_eq!(raw["outcome"], "Warn");
    assert_eq!(raw["summary"]["training_images"], 2);
    Ok(())
}

#[test]
fn batches_cover_every_sample_with_partial_tail() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_kitti(tmp.path(), 5, 0)?;
    let cfg = DatasetConfig {
        image_shape: ImageShape::new(4, 8),
        shuffle: true,
        seed: Some(7),
    };
    let mut iter = BatchIter::from_root(tmp.path(), cfg)?;
    let device = Default::default();

    let mut sizes = Vec::new();
    while let Some(batch) = iter.next_batch::<B>(2, &device)? {
        assert_eq!(&batch.images.dims()[1..], &[3, 4, 8]);
        assert_eq!(&batch.labels.dims()[1..], &[2, 4, 8]);
        sizes.push(batch.images.dims()[0]);
    }
    assert_eq!(sizes, vec![2, 2, 1]);

    // Exhausted until the next epoch starts.
    assert!(iter.next_batch::<B>(2, &device)?.is_none());
    iter.reset_epoch();
    assert!(iter.next_batch::<B>(2, &device)?.is_some());
    Ok(())
}

#[test]
fn labels_are_one_hot_and_split_at_background() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_kitti(tmp.path(), 1, 0)?;
    let cfg = DatasetConfig {
        image_shape: ImageShape::new(8, 16),
        shuffle: false,
        seed: None,
    };
    let mut iter = BatchIter::from_root(tmp.path(), cfg)?;
    let batch = iter
        .next_batch::<B>(1, &Default::default())?
        .expect("one batch");
    let labels = batch.labels.into_data().to_vec::<f32>().unwrap();
    let plane = 8 * 16;
    // Channel sums are one everywhere.
    for i in 0..plane {
        assert_eq!(labels[i] + labels[plane + i], 1.0);
    }
    // Row 0: left half road (channel 1), right half background (channel 0).
    assert_eq!(labels[plane], 1.0);
    assert_eq!(labels[15], 1.0);
    Ok(())
}

#[test]
fn seeded_shuffles_are_reproducible() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_kitti(tmp.path(), 6, 0)?;
    let cfg = DatasetConfig {
        image_shape: ImageShape::new(4, 8),
        shuffle: true,
        seed: Some(42),
    };
    let a = BatchIter::from_root(tmp.path(), cfg.clone())?;
    let b = BatchIter::from_root(tmp.path(), cfg)?;
    assert_eq!(a.indices(), b.indices());
    Ok(())
}

#[test]
fn first_epoch_is_shuffled_once() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_kitti(tmp.path(), 6, 0)?;
    let cfg = DatasetConfig {
        image_shape: ImageShape::new(4, 8),
        shuffle: true,
        seed: Some(9),
    };
    let mut iter = BatchIter::from_root(tmp.path(), cfg)?;
    assert_eq!(iter.epoch(), 1);

    let mut expected = index_training(tmp.path())?;
    let mut rng = StdRng::seed_from_u64(9);
    expected.shuffle(&mut rng);
    assert_eq!(iter.indices(), &expected[..]);

    iter.reset_epoch();
    assert_eq!(iter.epoch(), 2);
    expected.shuffle(&mut rng);
    assert_eq!(iter.indices(), &expected[..]);
    Ok(())
}
