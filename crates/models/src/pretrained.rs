//! Loading pretrained VGG16 weights into [`Vgg16Encoder`].
//!
//! Two formats are accepted:
//! - `.safetensors` exported from torchvision's `vgg16` (`features.N.*`, `classifier.{0,3}.*`).
//!   The classifier matrices are reshaped into the fc6 7x7 and fc7 1x1 conv kernels.
//! - `.bin`: a Burn `BinFileRecorder` record of the encoder.
//!
//! Any other extension is rejected.

use burn::module::{Module, Param};
use burn::nn::conv::Conv2d;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use safetensors::tensor::Dtype;
use safetensors::{SafeTensorError, SafeTensors};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::vgg::Vgg16Encoder;

/// Indices of the conv layers inside torchvision's `vgg16().features`.
const FEATURE_CONV_INDICES: [usize; 13] = [0, 2, 5, 7, 10, 12, 14, 17, 19, 21, 24, 26, 28];
/// Indices of fc6/fc7 inside torchvision's `vgg16().classifier`.
const CLASSIFIER_INDICES: [usize; 2] = [0, 3];

pub type PretrainedResult<T> = Result<T, PretrainedError>;

#[derive(Debug, Error)]
pub enum PretrainedError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid safetensors file {path}: {source}")]
    SafeTensors {
        path: PathBuf,
        #[source]
        source: SafeTensorError,
    },
    #[error("tensor {name} not found in {path}")]
    Missing { name: String, path: PathBuf },
    #[error("tensor {name} has dtype {dtype}, expected F32")]
    DType { name: String, dtype: String },
    #[error("tensor {name} has shape {actual:?}, expected {expected:?}")]
    Shape {
        name: String,
        actual: Vec<usize>,
        expected: Vec<usize>,
    },
    #[error("unsupported weights file {path}: expected a .safetensors or .bin extension")]
    Format { path: PathBuf },
    #[error("failed to load encoder record {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: RecorderError,
    },
}

/// Checkpoint names of every encoder conv, in [`Vgg16Encoder`] layer order.
pub fn torchvision_layer_names() -> Vec<String> {
    FEATURE_CONV_INDICES
        .iter()
        .map(|i| format!("features.{i}"))
        .chain(CLASSIFIER_INDICES.iter().map(|i| format!("classifier.{i}")))
        .collect()
}

/// Load pretrained weights into `encoder`; returns the encoder and the number of layers filled.
pub fn load_vgg16<B: Backend>(
    encoder: Vgg16Encoder<B>,
    path: &Path,
    device: &B::Device,
) -> PretrainedResult<(Vgg16Encoder<B>, usize)> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("safetensors") => load_safetensors(encoder, path, device),
        Some("bin") => load_record(encoder, path, device),
        _ => Err(PretrainedError::Format {
            path: path.to_path_buf(),
        }),
    }
}

fn load_record<B: Backend>(
    encoder: Vgg16Encoder<B>,
    path: &Path,
    device: &B::Device,
) -> PretrainedResult<(Vgg16Encoder<B>, usize)> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let mut encoder = encoder
        .load_file(path, &recorder, device)
        .map_err(|source| PretrainedError::Record {
            path: path.to_path_buf(),
            source,
        })?;
    let layers = encoder.conv_layers_mut().len();
    log::info!("loaded VGG16 record {} ({layers} conv layers)", path.display());
    Ok((encoder, layers))
}

fn load_safetensors<B: Backend>(
    mut encoder: Vgg16Encoder<B>,
    path: &Path,
    device: &B::Device,
) -> PretrainedResult<(Vgg16Encoder<B>, usize)> {
    let bytes = fs::read(path).map_err(|source| PretrainedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let st = SafeTensors::deserialize(&bytes).map_err(|source| PretrainedError::SafeTensors {
        path: path.to_path_buf(),
        source,
    })?;

    let names = torchvision_layer_names();
    let mut copied = 0usize;
    for (layer, name) in encoder.conv_layers_mut().into_iter().zip(names.iter()) {
        let weight_name = format!("{name}.weight");
        let bias_name = format!("{name}.bias");
        let weight_dims = layer.weight.val().dims().to_vec();
        // torchvision keeps the classifier as dense `[out, in]` matrices.
        let stored_dims = if name.starts_with("classifier") {
            vec![weight_dims[0], weight_dims[1..].iter().product()]
        } else {
            weight_dims.clone()
        };
        let weight = read_f32(&st, path, &weight_name, &stored_dims)?;
        let out_channels = weight_dims[0];
        let bias = read_f32(&st, path, &bias_name, &[out_channels])?;
        assign_conv(layer, weight, weight_dims, bias, device);
        copied += 1;
    }
    log::info!(
        "loaded {copied} pretrained VGG16 layers from {}",
        path.display()
    );
    Ok((encoder, copied))
}

fn read_f32(
    st: &SafeTensors<'_>,
    path: &Path,
    name: &str,
    dims: &[usize],
) -> PretrainedResult<Vec<f32>> {
    let view = st.tensor(name).map_err(|_| PretrainedError::Missing {
        name: name.to_string(),
        path: path.to_path_buf(),
    })?;
    if view.dtype() != Dtype::F32 {
        return Err(PretrainedError::DType {
            name: name.to_string(),
            dtype: format!("{:?}", view.dtype()),
        });
    }
    if view.shape() != dims {
        return Err(PretrainedError::Shape {
            name: name.to_string(),
            actual: view.shape().to_vec(),
            expected: dims.to_vec(),
        });
    }
    Ok(view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn assign_conv<B: Backend>(
    conv: &mut Conv2d<B>,
    weight: Vec<f32>,
    weight_dims: Vec<usize>,
    bias: Vec<f32>,
    device: &B::Device,
) {
    let bias_len = bias.len();
    conv.weight = Param::from_tensor(Tensor::<B, 4>::from_data(
        TensorData::new(weight, weight_dims),
        device,
    ));
    conv.bias = Some(Param::from_tensor(Tensor::<B, 1>::from_data(
        TensorData::new(bias, [bias_len]),
        device,
    )));
}
