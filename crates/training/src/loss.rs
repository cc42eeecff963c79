use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use models::RoadSegmenter;

/// Softmax cross entropy against one-hot labels, averaged over every pixel.
///
/// `logits` and `labels` are both `[batch, classes, H, W]`.
pub fn pixel_cross_entropy<B: Backend>(logits: Tensor<B, 4>, labels: Tensor<B, 4>) -> Tensor<B, 1> {
    debug_assert_eq!(logits.dims(), labels.dims());
    let log_probs = log_softmax(logits, 1);
    (labels * log_probs).sum_dim(1).mean().neg()
}

/// Forward pass plus objective; the decoder L2 penalty is added when `with_l2` is set.
pub fn segmentation_loss<B: Backend>(
    model: &RoadSegmenter<B>,
    images: Tensor<B, 4>,
    labels: Tensor<B, 4>,
    with_l2: bool,
) -> Tensor<B, 1> {
    let ce = pixel_cross_entropy(model.forward(images), labels);
    if with_l2 {
        ce + model.l2_penalty()
    } else {
        ce
    }
}

/// First element of a (detached) loss tensor as `f32`.
pub fn scalar_value<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(f32::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn uniform_logits_cost_ln2() {
        let device = Default::default();
        let logits = Tensor::<B, 4>::zeros([1, 2, 2, 2], &device);
        let labels = Tensor::<B, 4>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0], [1, 2, 2, 2]),
            &device,
        );
        let loss = scalar_value(pixel_cross_entropy(logits, labels));
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn confident_correct_logits_cost_little() {
        let device = Default::default();
        // Pixel 0 is class 0, pixel 1 is class 1; logits agree strongly.
        let logits = Tensor::<B, 4>::from_data(
            TensorData::new(vec![10.0f32, -10.0, -10.0, 10.0], [1, 2, 1, 2]),
            &device,
        );
        let labels = Tensor::<B, 4>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 0.0, 1.0], [1, 2, 1, 2]),
            &device,
        );
        let loss = scalar_value(pixel_cross_entropy(logits, labels));
        assert!(loss < 1e-6);
    }
}
