//! VGG16 encoder with the fully-connected head expressed as convolutions.
//!
//! The encoder exposes the three feature maps FCN-8s taps for its skip
//! connections: pool3, pool4 and fc7.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Output channels of each conv layer, grouped by pooling block.
pub const VGG16_BLOCKS: [&[usize]; 5] = [
    &[64, 64],
    &[128, 128],
    &[256, 256, 256],
    &[512, 512, 512],
    &[512, 512, 512],
];

/// Channel width of the convolutionalised fc6/fc7 layers in the pretrained network.
pub const FC_CHANNELS: usize = 4096;

/// Total downsampling factor of the encoder (five 2x2 pools).
pub const ENCODER_STRIDE: usize = 32;

/// Smallest input side: fc6 needs a pool5 map of at least 3x3 cells.
pub const MIN_INPUT_SIZE: usize = 3 * ENCODER_STRIDE;

#[derive(Debug, Clone)]
pub struct Vgg16Config {
    /// Probability of keeping an activation in fc6/fc7 dropout.
    pub keep_prob: f64,
    /// fc6/fc7 width; must stay at [`FC_CHANNELS`] to load pretrained weights.
    pub fc_channels: usize,
}

impl Default for Vgg16Config {
    fn default() -> Self {
        Self {
            keep_prob: 0.75,
            fc_channels: FC_CHANNELS,
        }
    }
}

/// Feature maps handed from the encoder to the decoder.
#[derive(Debug, Clone)]
pub struct VggFeatures<B: Backend> {
    /// pool3 output: `[batch, 256, H/8, W/8]`.
    pub layer3: Tensor<B, 4>,
    /// pool4 output: `[batch, 512, H/16, W/16]`.
    pub layer4: Tensor<B, 4>,
    /// fc7 output: `[batch, fc_channels, H/32, W/32]`.
    pub layer7: Tensor<B, 4>,
}

#[derive(Debug, Module)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> VggBlock<B> {
    fn new(in_channels: usize, widths: &[usize], device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(widths.len());
        let mut channels = in_channels;
        for &width in widths {
            convs.push(
                Conv2dConfig::new([channels, width], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            channels = width;
        }
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { convs, pool }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        self.pool.forward(x)
    }
}

#[derive(Debug, Module)]
pub struct Vgg16Encoder<B: Backend> {
    blocks: Vec<VggBlock<B>>,
    fc6: Conv2d<B>,
    fc7: Conv2d<B>,
    dropout: Dropout,
}

impl<B: Backend> Vgg16Encoder<B> {
    pub fn new(cfg: Vgg16Config, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(VGG16_BLOCKS.len());
        let mut channels = 3;
        for widths in VGG16_BLOCKS {
            blocks.push(VggBlock::new(channels, widths, device));
            channels = widths[widths.len() - 1];
        }
        let fc = cfg.fc_channels.max(1);
        let fc6 = Conv2dConfig::new([channels, fc], [7, 7])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .init(device);
        let fc7 = Conv2dConfig::new([fc, fc], [1, 1]).init(device);
        let drop_prob = (1.0 - cfg.keep_prob).clamp(0.0, 1.0);
        let dropout = DropoutConfig::new(drop_prob).init();
        Self {
            blocks,
            fc6,
            fc7,
            dropout,
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> VggFeatures<B> {
        let x = self.blocks[0].forward(images);
        let x = self.blocks[1].forward(x);
        let layer3 = self.blocks[2].forward(x);
        let layer4 = self.blocks[3].forward(layer3.clone());
        let x = self.blocks[4].forward(layer4.clone());

        let x = self.dropout.forward(relu(self.fc6.forward(x)));
        let layer7 = self.dropout.forward(relu(self.fc7.forward(x)));

        VggFeatures {
            layer3,
            layer4,
            layer7,
        }
    }

    /// All conv layers in checkpoint order: the 13 feature convs, then fc6 and fc7.
    pub(crate) fn conv_layers_mut(&mut self) -> Vec<&mut Conv2d<B>> {
        let mut layers: Vec<&mut Conv2d<B>> = self
            .blocks
            .iter_mut()
            .flat_map(|block| block.convs.iter_mut())
            .collect();
        layers.push(&mut self.fc6);
        layers.push(&mut self.fc7);
        layers
    }
}
