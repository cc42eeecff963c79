use anyhow::Context;
use burn::backend::Autodiff;
use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn_dataset::{
    validate_layout, BatchIter, DatasetConfig, ImageShape, LayoutExpectations, ValidationOutcome,
};
use clap::{Parser, ValueEnum};
use cli_support::{BackendKind, DataPathArgs, DataPathOpts};
use models::{load_vgg16, DecoderVariant, RoadSegmenter, RoadSegmenterConfig, FC_CHANNELS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::infer::save_inference_samples;
use crate::loss::{scalar_value, segmentation_loss};
use crate::schedule::{EarlyStop, LrSchedule, BASE_LEARNING_RATE, LOSS_THRESHOLD};
use crate::TrainBackend;

type ADBackend = Autodiff<TrainBackend>;

#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    Projected,
    Classic,
}

impl From<DecoderKind> for DecoderVariant {
    fn from(kind: DecoderKind) -> Self {
        match kind {
            DecoderKind::Projected => DecoderVariant::Projected,
            DecoderKind::Classic => DecoderVariant::Classic,
        }
    }
}

/// Resolved hyper-parameters; written as `config.json` next to the checkpoint.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 45)]
    pub epochs: usize,
    #[config(default = 20)]
    pub batch_size: usize,
    #[config(default = 0.75)]
    pub keep_prob: f64,
    #[config(default = 0.0005)]
    pub base_lr: f64,
    #[config(default = 0.025)]
    pub loss_threshold: f32,
    #[config(default = "ImageShape::new(160, 576)")]
    pub image_shape: ImageShape,
    #[config(default = "DecoderKind::Projected")]
    pub decoder: DecoderKind,
    #[config(default = 4096)]
    pub fc_channels: usize,
    #[config(default = false)]
    pub l2_penalty: bool,
    #[config(default = false)]
    pub freeze_encoder: bool,
    pub seed: Option<u64>,
}

impl TrainingConfig {
    pub fn model_config(&self) -> RoadSegmenterConfig {
        RoadSegmenterConfig {
            num_classes: burn_dataset::ROAD_CLASSES,
            keep_prob: self.keep_prob,
            variant: self.decoder.into(),
            fc_channels: self.fc_channels,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Fine-tune FCN-8s on a pretrained VGG16 for KITTI road segmentation"
)]
pub struct TrainArgs {
    #[command(flatten)]
    pub paths: DataPathArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Maximum number of epochs.
    #[arg(long, default_value_t = 45)]
    pub epochs: usize,
    /// Batch size.
    #[arg(long, default_value_t = 20)]
    pub batch_size: usize,
    /// Dropout keep probability for fc6/fc7 during training.
    #[arg(long, default_value_t = 0.75)]
    pub keep_prob: f64,
    /// Learning rate before the per-epoch ramp.
    #[arg(long, default_value_t = BASE_LEARNING_RATE)]
    pub lr: f64,
    /// Stop once an epoch's last batch loss falls below this.
    #[arg(long, default_value_t = LOSS_THRESHOLD)]
    pub loss_threshold: f32,
    /// Network input height (multiple of 32).
    #[arg(long, default_value_t = 160)]
    pub image_height: u32,
    /// Network input width (multiple of 32).
    #[arg(long, default_value_t = 576)]
    pub image_width: u32,
    /// Decoder skip architecture.
    #[arg(long, value_enum, default_value_t = DecoderKind::Projected)]
    pub decoder: DecoderKind,
    /// Add the decoder L2 weight penalty to the loss.
    #[arg(long, default_value_t = false)]
    pub l2_penalty: bool,
    /// Keep the pretrained backbone fixed and train only the decoder.
    #[arg(long, default_value_t = false)]
    pub freeze_encoder: bool,
    /// Pretrained VGG16 weights (defaults to <data_dir>/vgg/vgg16.safetensors).
    #[arg(long)]
    pub vgg_weights: Option<PathBuf>,
    /// Train from random init when the pretrained weights are missing.
    #[arg(long, default_value_t = false)]
    pub allow_random_init: bool,
    /// fc6/fc7 width; only meaningful together with --allow-random-init.
    #[arg(long, default_value_t = FC_CHANNELS, hide = true)]
    pub fc_channels: usize,
    /// Seed for backend init and batch shuffling.
    #[arg(long, env = "KITTI_SEED")]
    pub seed: Option<u64>,
    /// Checkpoint output path (defaults to <runs_dir>/model.bin).
    #[arg(long)]
    pub checkpoint_out: Option<PathBuf>,
    /// Skip writing overlay samples for the test images after training.
    #[arg(long, default_value_t = false)]
    pub skip_samples: bool,
}

impl TrainArgs {
    pub fn to_config(&self) -> TrainingConfig {
        TrainingConfig::new()
            .with_epochs(self.epochs)
            .with_batch_size(self.batch_size.max(1))
            .with_keep_prob(self.keep_prob)
            .with_base_lr(self.lr)
            .with_loss_threshold(self.loss_threshold)
            .with_image_shape(ImageShape::new(self.image_height, self.image_width))
            .with_decoder(self.decoder)
            .with_fc_channels(self.fc_channels)
            .with_l2_penalty(self.l2_penalty)
            .with_freeze_encoder(self.freeze_encoder)
            .with_seed(self.seed)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainSummary {
    pub epochs_run: usize,
    /// Loss of the final batch of the last epoch run.
    pub last_loss: f32,
    pub stopped_early: bool,
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<TrainSummary> {
    validate_backend_choice(args.backend)?;
    let paths = DataPathOpts::from(&args.paths);
    let config = TrainingConfig::from(&args);
    models::check_input_dims([
        1,
        3,
        config.image_shape.height as usize,
        config.image_shape.width as usize,
    ])?;

    let report = validate_layout(&paths.data_dir, &LayoutExpectations::from_env())?;
    report.save(&paths.runs_dir.join("dataset_report.json"))?;
    match report.outcome {
        ValidationOutcome::Fail => anyhow::bail!(
            "dataset under {} is not usable: {}",
            paths.data_dir.display(),
            report.reasons.join("; ")
        ),
        ValidationOutcome::Warn => {
            for reason in &report.reasons {
                log::warn!("dataset: {reason}");
            }
        }
        ValidationOutcome::Pass => {}
    }

    let ckpt_path = args
        .checkpoint_out
        .clone()
        .unwrap_or_else(|| paths.default_checkpoint());
    if let Some(parent) = ckpt_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let device = <ADBackend as Backend>::Device::default();
    if let Some(seed) = config.seed {
        <ADBackend as Backend>::seed(&device, seed);
    }

    let vgg_path = args
        .vgg_weights
        .clone()
        .unwrap_or_else(|| paths.default_vgg_weights());
    let model = build_model::<ADBackend>(&config, &vgg_path, args.allow_random_init, &device)?;

    let mut batches = BatchIter::from_root(
        &paths.data_dir,
        DatasetConfig {
            image_shape: config.image_shape,
            shuffle: true,
            seed: config.seed,
        },
    )?;
    log::info!(
        "training on {} images at {}x{} (batch {}, up to {} epochs)",
        batches.len(),
        config.image_shape.height,
        config.image_shape.width,
        config.batch_size,
        config.epochs
    );

    let (model, summary) = train_segmenter(model, &mut batches, &config, &device)?;

    save_checkpoint(&model, &ckpt_path)?;
    let config_path = config_path_for(&ckpt_path);
    config
        .save(&config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    log::info!("saved checkpoint to {}", ckpt_path.display());

    if !args.skip_samples {
        let (out_dir, count) = save_inference_samples(
            &model.valid(),
            &paths.runs_dir,
            &paths.data_dir,
            config.image_shape,
            &device,
        )?;
        log::info!("wrote {count} inference samples to {}", out_dir.display());
    }

    Ok(summary)
}

impl From<&TrainArgs> for TrainingConfig {
    fn from(args: &TrainArgs) -> Self {
        args.to_config()
    }
}

/// Fresh model with the pretrained backbone loaded (or random init when allowed).
pub fn build_model<B: AutodiffBackend>(
    config: &TrainingConfig,
    vgg_weights: &Path,
    allow_random_init: bool,
    device: &B::Device,
) -> anyhow::Result<RoadSegmenter<B>> {
    let mut model = RoadSegmenter::<B>::new(config.model_config(), device);
    if vgg_weights.exists() {
        let (encoder, layers) = load_vgg16(model.encoder, vgg_weights, device)?;
        log::info!(
            "backbone initialised from {} ({layers} layers)",
            vgg_weights.display()
        );
        model.encoder = encoder;
    } else if allow_random_init {
        log::warn!(
            "pretrained weights {} not found; training the backbone from random init",
            vgg_weights.display()
        );
    } else {
        anyhow::bail!(
            "pretrained VGG16 weights not found at {} (pass --vgg-weights or --allow-random-init)",
            vgg_weights.display()
        );
    }
    if config.freeze_encoder {
        model.encoder = model.encoder.no_grad();
        log::info!("backbone frozen; only decoder parameters are updated");
    }
    Ok(model)
}

/// The epoch loop: ramped learning rate, Adam steps, early stop on the last batch loss.
///
/// `batches` must be fresh: it is consumed as epoch 1 without a reset.
pub fn train_segmenter<B: AutodiffBackend>(
    mut model: RoadSegmenter<B>,
    batches: &mut BatchIter,
    config: &TrainingConfig,
    device: &B::Device,
) -> anyhow::Result<(RoadSegmenter<B>, TrainSummary)> {
    if batches.is_empty() {
        anyhow::bail!("no training samples");
    }
    let schedule = LrSchedule::new(config.base_lr);
    let early_stop = EarlyStop::new(config.loss_threshold);
    let mut optim = AdamConfig::new().init();
    let mut summary = TrainSummary::default();
    let mut total = Duration::ZERO;

    for epoch in 1..=config.epochs {
        let started = Instant::now();
        let lr = schedule.rate(epoch);
        if epoch > 1 {
            batches.reset_epoch();
        }

        let mut losses = Vec::new();
        while let Some(batch) = batches.next_batch::<B>(config.batch_size, device)? {
            let loss = segmentation_loss(&model, batch.images, batch.labels, config.l2_penalty);
            let loss_detached = loss.clone().detach();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);
            losses.push(scalar_value(loss_detached));
        }

        let last_loss = losses.last().copied().unwrap_or(f32::NAN);
        let avg_loss = losses.iter().sum::<f32>() / losses.len().max(1) as f32;
        let elapsed = started.elapsed();
        total += elapsed;
        log::info!(
            "epoch {epoch}: loss {last_loss:.4} (avg {avg_loss:.4}) lr {lr:.6} epoch {:.1}s total {:.1}s",
            elapsed.as_secs_f32(),
            total.as_secs_f32()
        );

        summary.epochs_run = epoch;
        summary.last_loss = last_loss;
        if early_stop.should_stop(last_loss) {
            log::info!(
                "ending training at epoch {epoch}: loss {last_loss:.4} < {}",
                early_stop.threshold()
            );
            summary.stopped_early = true;
            break;
        }
    }

    Ok((model, summary))
}

pub fn save_checkpoint<B: Backend>(model: &RoadSegmenter<B>, path: &Path) -> anyhow::Result<()> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))
}

pub fn load_segmenter_from_checkpoint<P: AsRef<Path>>(
    path: P,
    config: RoadSegmenterConfig,
    device: &<TrainBackend as Backend>::Device,
) -> Result<RoadSegmenter<TrainBackend>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    RoadSegmenter::<TrainBackend>::new(config, device).load_file(path.as_ref(), &recorder, device)
}

/// `config.json` beside the checkpoint file.
pub fn config_path_for(checkpoint: &Path) -> PathBuf {
    checkpoint.with_file_name("config.json")
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            log::warn!("built with backend-wgpu; the WGPU backend is used despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}
