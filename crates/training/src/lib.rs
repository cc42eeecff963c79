#![recursion_limit = "256"]

pub mod infer;
pub mod loss;
pub mod schedule;
pub mod util;

pub use infer::{
    create_sample_dir, overlay_road, road_mask, save_inference_samples, ROAD_PROBABILITY_THRESHOLD,
};
pub use loss::{pixel_cross_entropy, segmentation_loss};
pub use models::{DecoderVariant, RoadSegmenter, RoadSegmenterConfig};
pub use schedule::{EarlyStop, LrSchedule};
pub use util::{
    build_model, load_segmenter_from_checkpoint, run_train, train_segmenter, DecoderKind,
    TrainArgs, TrainSummary, TrainingConfig,
};
/// Backend alias for training/inference (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
