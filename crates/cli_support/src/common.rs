use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// Tensor backend requested on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

/// Dataset and output locations shared by `train` and `infer`.
#[derive(Debug, Clone, Args)]
pub struct DataPathArgs {
    /// Root containing `data_road/` and `vgg/`.
    #[arg(long, env = "KITTI_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,
    /// Where checkpoints and inference samples are written.
    #[arg(long, default_value = "./runs")]
    pub runs_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DataPathOpts {
    pub data_dir: PathBuf,
    pub runs_dir: PathBuf,
}

impl DataPathOpts {
    pub fn new(data_dir: impl Into<PathBuf>, runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            runs_dir: runs_dir.into(),
        }
    }

    /// Pretrained weights location when none is given explicitly.
    pub fn default_vgg_weights(&self) -> PathBuf {
        self.data_dir.join("vgg").join("vgg16.safetensors")
    }

    /// Checkpoint location when none is given explicitly.
    pub fn default_checkpoint(&self) -> PathBuf {
        self.runs_dir.join("model.bin")
    }
}

impl From<&DataPathArgs> for DataPathOpts {
    fn from(args: &DataPathArgs) -> Self {
        DataPathOpts::new(args.data_dir.clone(), args.runs_dir.clone())
    }
}

/// Install `env_logger` at `info` unless `RUST_LOG` says otherwise. Safe to call twice.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}
