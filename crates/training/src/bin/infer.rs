use burn::config::Config;
use burn::tensor::backend::Backend;
use clap::Parser;
use cli_support::{BackendKind, DataPathArgs, DataPathOpts};
use std::path::PathBuf;
use training::util::{config_path_for, validate_backend_choice};
use training::{load_segmenter_from_checkpoint, save_inference_samples, TrainBackend, TrainingConfig};

#[derive(Parser, Debug)]
#[command(name = "infer", about = "Write road overlays for the KITTI test images")]
struct InferArgs {
    #[command(flatten)]
    paths: DataPathArgs,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    /// Checkpoint written by `train` (defaults to <runs_dir>/model.bin).
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// Training config (defaults to config.json next to the checkpoint).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = InferArgs::parse();
    validate_backend_choice(args.backend)?;
    let paths = DataPathOpts::from(&args.paths);

    let checkpoint = args
        .checkpoint
        .unwrap_or_else(|| paths.default_checkpoint());
    let config_path = args.config.unwrap_or_else(|| config_path_for(&checkpoint));
    let config = match TrainingConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            log::warn!(
                "could not read {} ({err}); assuming default hyper-parameters",
                config_path.display()
            );
            TrainingConfig::new()
        }
    };

    let device = <TrainBackend as Backend>::Device::default();
    let model = load_segmenter_from_checkpoint(&checkpoint, config.model_config(), &device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", checkpoint.display()))?;
    let (out_dir, count) = save_inference_samples(
        &model,
        &paths.runs_dir,
        &paths.data_dir,
        config.image_shape,
        &device,
    )?;
    println!("wrote {count} overlays to {}", out_dir.display());
    Ok(())
}
