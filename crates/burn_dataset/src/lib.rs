//! KITTI road dataset loading, validation, and Burn-compatible batching.
//!
//! This crate provides utilities for:
//! - Indexing `data_road/training` image/label pairs and `data_road/testing` images
//! - Decoding ground-truth images into one-hot road/not-road labels
//! - Shuffled, parallel-decoded batch iteration
//! - Layout validation against the benchmark's expected image counts

pub mod batch;
pub mod kitti;
pub mod types;
pub mod validation;

pub use batch::{BatchIter, DatasetConfig, SegmentationBatch};
pub use kitti::{
    encode_road_label, image_name_for_label, image_to_chw, index_testing, index_training,
    load_image, load_label, load_sample, pair_training,
};
pub use types::*;
pub use validation::{validate_layout, validate_summary};
