//! FCN-8s decoder: 1x1 scoring, transposed-conv upsampling and skip additions.

use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::vgg::{VggFeatures, FC_CHANNELS, VGG16_BLOCKS};

/// Which flavour of skip architecture to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderVariant {
    /// Upsample into the encoder's channel space and add pool4/pool3 directly.
    #[default]
    Projected,
    /// Score pool4/pool3 with 1x1 convs and add in class space.
    Classic,
}

impl DecoderVariant {
    /// L2 coefficients for (coarse, fine) decoder kernels.
    fn l2_coefficients(self) -> (f64, f64) {
        match self {
            DecoderVariant::Projected => (6e-4, 1e-4),
            DecoderVariant::Classic => (1e-3, 1e-3),
        }
    }

    fn initializer(self) -> Initializer {
        match self {
            DecoderVariant::Projected => Initializer::Normal {
                mean: 0.0,
                std: 0.01,
            },
            // Glorot-style bounds from fan-in alone; transposed convs expose no fan-out.
            DecoderVariant::Classic => Initializer::KaimingUniform {
                gain: 1.0 / 3.0f64.sqrt(),
                fan_out_only: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fcn8DecoderConfig {
    pub num_classes: usize,
    pub variant: DecoderVariant,
    /// Channels of the encoder's fc7 output.
    pub fc_channels: usize,
}

impl Default for Fcn8DecoderConfig {
    fn default() -> Self {
        Self {
            num_classes: 2,
            variant: DecoderVariant::default(),
            fc_channels: FC_CHANNELS,
        }
    }
}

#[derive(Debug, Module)]
pub struct Fcn8Decoder<B: Backend> {
    score7: Conv2d<B>,
    up7: ConvTranspose2d<B>,
    score4: Option<Conv2d<B>>,
    up4: ConvTranspose2d<B>,
    score3: Option<Conv2d<B>>,
    up3: ConvTranspose2d<B>,
    l2_coarse: f64,
    l2_fine: f64,
}

fn score_conv<B: Backend>(
    in_channels: usize,
    num_classes: usize,
    init: &Initializer,
    device: &B::Device,
) -> Conv2d<B> {
    let mut conv = Conv2dConfig::new([in_channels, num_classes], [1, 1])
        .with_initializer(init.clone())
        .init(device);
    conv.bias = zero_bias(num_classes, device);
    conv
}

/// Biases start at zero; the initializer only shapes the kernels.
fn zero_bias<B: Backend>(channels: usize, device: &B::Device) -> Option<Param<Tensor<B, 1>>> {
    Some(Param::from_tensor(Tensor::zeros([channels], device)))
}

/// Transposed conv whose output is exactly `stride` times the input ("same" padding).
fn upsample<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    init: &Initializer,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    let pad = (kernel - stride) / 2;
    let mut deconv = ConvTranspose2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding([pad, pad])
        .with_initializer(init.clone())
        .init(device);
    deconv.bias = zero_bias(channels[1], device);
    deconv
}

impl<B: Backend> Fcn8Decoder<B> {
    pub fn new(cfg: Fcn8DecoderConfig, device: &B::Device) -> Self {
        let classes = cfg.num_classes.max(1);
        let init = cfg.variant.initializer();
        let (l2_coarse, l2_fine) = cfg.variant.l2_coefficients();
        let pool4_channels = VGG16_BLOCKS[3][VGG16_BLOCKS[3].len() - 1];
        let pool3_channels = VGG16_BLOCKS[2][VGG16_BLOCKS[2].len() - 1];

        let score7 = score_conv(cfg.fc_channels.max(1), classes, &init, device);
        match cfg.variant {
            DecoderVariant::Projected => Self {
                score7,
                up7: upsample([classes, pool4_channels], 4, 2, &init, device),
                score4: None,
                up4: upsample([pool4_channels, pool3_channels], 4, 2, &init, device),
                score3: None,
                up3: upsample([pool3_channels, classes], 16, 8, &init, device),
                l2_coarse,
                l2_fine,
            },
            DecoderVariant::Classic => Self {
                score7,
                up7: upsample([classes, classes], 4, 2, &init, device),
                score4: Some(score_conv(pool4_channels, classes, &init, device)),
                up4: upsample([classes, classes], 4, 2, &init, device),
                score3: Some(score_conv(pool3_channels, classes, &init, device)),
                up3: upsample([classes, classes], 16, 8, &init, device),
                l2_coarse,
                l2_fine,
            },
        }
    }

    /// Logits at input resolution: `[batch, num_classes, H, W]`.
    pub fn forward(&self, features: VggFeatures<B>) -> Tensor<B, 4> {
        let VggFeatures {
            layer3,
            layer4,
            layer7,
        } = features;

        let x = self.up7.forward(self.score7.forward(layer7));
        let skip4 = match &self.score4 {
            Some(score) => score.forward(layer4),
            None => layer4,
        };
        let x = self.up4.forward(x + skip4);
        let skip3 = match &self.score3 {
            Some(score) => score.forward(layer3),
            None => layer3,
        };
        self.up3.forward(x + skip3)
    }

    /// `sum(coef * ||w||^2 / 2)` over every decoder kernel.
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        let half_sq = |w: Tensor<B, 4>, coef: f64| w.powf_scalar(2.0).sum().mul_scalar(coef / 2.0);

        let mut penalty = half_sq(self.score7.weight.val(), self.l2_coarse)
            + half_sq(self.up7.weight.val(), self.l2_coarse)
            + half_sq(self.up4.weight.val(), self.l2_fine)
            + half_sq(self.up3.weight.val(), self.l2_fine);
        if let Some(score) = &self.score4 {
            penalty = penalty + half_sq(score.weight.val(), self.l2_fine);
        }
        if let Some(score) = &self.score3 {
            penalty = penalty + half_sq(score.weight.val(), self.l2_fine);
        }
        penalty
    }
}
