//! Burn modules for road segmentation with FCN-8s on a VGG16 backbone.
//!
//! - `Vgg16Encoder`: the convolutionalised VGG16 feature extractor.
//! - `Fcn8Decoder`: 1x1 scoring and transposed-conv upsampling with pool4/pool3 skips.
//! - `RoadSegmenter`: encoder + decoder, producing per-pixel class logits.
//!
//! Pretrained backbone weights are loaded through [`pretrained::load_vgg16`].

pub mod fcn;
pub mod pretrained;
pub mod vgg;

use burn::module::Module;
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

pub use fcn::{DecoderVariant, Fcn8Decoder, Fcn8DecoderConfig};
pub use pretrained::{load_vgg16, PretrainedError};
pub use vgg::{
    Vgg16Config, Vgg16Encoder, VggFeatures, ENCODER_STRIDE, FC_CHANNELS, MIN_INPUT_SIZE,
};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("expected 3-channel input, got {0} channels")]
    Channels(usize),
    #[error(
        "input {height}x{width} must be a multiple of {stride} and at least {min} in both dimensions"
    )]
    InputShape {
        height: usize,
        width: usize,
        stride: usize,
        min: usize,
    },
}

#[derive(Debug, Clone)]
pub struct RoadSegmenterConfig {
    pub num_classes: usize,
    pub keep_prob: f64,
    pub variant: DecoderVariant,
    pub fc_channels: usize,
}

impl Default for RoadSegmenterConfig {
    fn default() -> Self {
        Self {
            num_classes: 2,
            keep_prob: 0.75,
            variant: DecoderVariant::Projected,
            fc_channels: FC_CHANNELS,
        }
    }
}

#[derive(Debug, Module)]
pub struct RoadSegmenter<B: Backend> {
    pub encoder: Vgg16Encoder<B>,
    pub decoder: Fcn8Decoder<B>,
    num_classes: usize,
}

impl<B: Backend> RoadSegmenter<B> {
    pub fn new(cfg: RoadSegmenterConfig, device: &B::Device) -> Self {
        let encoder = Vgg16Encoder::new(
            Vgg16Config {
                keep_prob: cfg.keep_prob,
                fc_channels: cfg.fc_channels,
            },
            device,
        );
        let decoder = Fcn8Decoder::new(
            Fcn8DecoderConfig {
                num_classes: cfg.num_classes,
                variant: cfg.variant,
                fc_channels: cfg.fc_channels,
            },
            device,
        );
        Self {
            encoder,
            decoder,
            num_classes: cfg.num_classes.max(1),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Per-pixel logits `[batch, num_classes, H, W]` for images `[batch, 3, H, W]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.decoder.forward(self.encoder.forward(images))
    }

    /// Like [`forward`](Self::forward) but rejects inputs the skip additions cannot align.
    pub fn forward_checked(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>, ModelError> {
        check_input_dims(images.dims())?;
        Ok(self.forward(images))
    }

    /// Softmax over the class dimension.
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        softmax(self.forward(images), 1)
    }

    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.decoder.l2_penalty()
    }
}

pub fn check_input_dims(dims: [usize; 4]) -> Result<(), ModelError> {
    let [_, channels, height, width] = dims;
    if channels != 3 {
        return Err(ModelError::Channels(channels));
    }
    let aligned = |side: usize| side >= MIN_INPUT_SIZE && side % ENCODER_STRIDE == 0;
    if !aligned(height) || !aligned(width) {
        return Err(ModelError::InputShape {
            height,
            width,
            stride: ENCODER_STRIDE,
            min: MIN_INPUT_SIZE,
        });
    }
    Ok(())
}

pub mod prelude {
    pub use super::{
        DecoderVariant, Fcn8Decoder, RoadSegmenter, RoadSegmenterConfig, Vgg16Encoder,
        VggFeatures,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unaligned_inputs() {
        assert!(check_input_dims([1, 3, 160, 576]).is_ok());
        assert!(matches!(
            check_input_dims([1, 3, 100, 576]),
            Err(ModelError::InputShape { height: 100, .. })
        ));
        assert!(matches!(
            check_input_dims([1, 1, 96, 96]),
            Err(ModelError::Channels(1))
        ));
        assert!(check_input_dims([1, 3, 0, 32]).is_err());
        assert!(check_input_dims([1, 3, 96, 96]).is_ok());
        assert!(matches!(
            check_input_dims([1, 3, 64, 64]),
            Err(ModelError::InputShape { min: 96, .. })
        ));
        assert!(check_input_dims([1, 3, 160, 32]).is_err());
    }
}
