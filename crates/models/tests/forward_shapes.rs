use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use models::{
    load_vgg16, DecoderVariant, ModelError, PretrainedError, RoadSegmenter, RoadSegmenterConfig,
    Vgg16Config, Vgg16Encoder,
};
use safetensors::tensor::{Dtype, TensorView};

type B = NdArray<f32>;

fn small_config(variant: DecoderVariant) -> RoadSegmenterConfig {
    RoadSegmenterConfig {
        num_classes: 2,
        keep_prob: 0.75,
        variant,
        fc_channels: 16,
    }
}

#[test]
fn projected_decoder_restores_input_resolution() {
    let device = Default::default();
    let model = RoadSegmenter::<B>::new(small_config(DecoderVariant::Projected), &device);
    let images = Tensor::<B, 4>::zeros([2, 3, 96, 128], &device);
    let logits = model.forward_checked(images).expect("aligned input");
    assert_eq!(logits.dims(), [2, 2, 96, 128]);
}

#[test]
fn classic_decoder_restores_input_resolution() {
    let device = Default::default();
    let model = RoadSegmenter::<B>::new(small_config(DecoderVariant::Classic), &device);
    let images = Tensor::<B, 4>::ones([1, 3, 128, 96], &device);
    let logits = model.forward(images);
    assert_eq!(logits.dims(), [1, 2, 128, 96]);
    let values = logits.into_data().to_vec::<f32>().expect("f32 data");
    assert_eq!(values.len(), 2 * 128 * 96);
    assert!(values.iter().all(|v| v.is_finite()));
}

#[test]
fn inputs_below_three_pool5_cells_are_rejected() {
    let device = Default::default();
    let model = RoadSegmenter::<B>::new(small_config(DecoderVariant::Projected), &device);
    let images = Tensor::<B, 4>::zeros([1, 3, 64, 64], &device);
    match model.forward_checked(images) {
        Err(ModelError::InputShape { height, width, .. }) => assert_eq!((height, width), (64, 64)),
        other => panic!("expected a shape error, got {:?}", other.map(|t| t.dims())),
    }
}

#[test]
fn probabilities_sum_to_one_per_pixel() {
    let device = Default::default();
    let model = RoadSegmenter::<B>::new(small_config(DecoderVariant::Projected), &device);
    let images = Tensor::<B, 4>::ones([1, 3, 96, 96], &device).mul_scalar(128.0);
    let probs = model.probabilities(images);
    let sums = probs
        .sum_dim(1)
        .into_data()
        .to_vec::<f32>()
        .expect("f32 data");
    assert_eq!(sums.len(), 96 * 96);
    assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
}

#[test]
fn l2_penalty_is_positive_and_finite() {
    let device = Default::default();
    for variant in [DecoderVariant::Projected, DecoderVariant::Classic] {
        let model = RoadSegmenter::<B>::new(small_config(variant), &device);
        let penalty = model
            .l2_penalty()
            .into_data()
            .to_vec::<f32>()
            .expect("f32 data")[0];
        assert!(penalty.is_finite());
        assert!(penalty > 0.0, "{variant:?} penalty was {penalty}");
    }
}

#[test]
fn encoder_record_loads_through_pretrained_path() {
    let device = Default::default();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Vgg16Config {
        keep_prob: 1.0,
        fc_channels: 8,
    };
    let encoder = Vgg16Encoder::<B>::new(cfg.clone(), &device);
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let path = tmp.path().join("vgg16");
    encoder
        .clone()
        .save_file(&path, &recorder)
        .expect("save encoder record");

    let fresh = Vgg16Encoder::<B>::new(cfg, &device);
    let (_loaded, layers) =
        load_vgg16(fresh, &path.with_extension("bin"), &device).expect("load record");
    assert_eq!(layers, 15);
}

#[test]
fn safetensors_missing_layer_is_reported() {
    let device = Default::default();
    let tmp = tempfile::tempdir().unwrap();

    let weight: Vec<u8> = vec![0.0f32; 64 * 3 * 3 * 3]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let bias: Vec<u8> = vec![0.0f32; 64].iter().flat_map(|v| v.to_le_bytes()).collect();
    let tensors = vec![
        (
            "features.0.weight",
            TensorView::new(Dtype::F32, vec![64, 3, 3, 3], &weight).unwrap(),
        ),
        (
            "features.0.bias",
            TensorView::new(Dtype::F32, vec![64], &bias).unwrap(),
        ),
    ];
    let bytes = safetensors::tensor::serialize(tensors, &None).unwrap();
    let path = tmp.path().join("vgg16.safetensors");
    std::fs::write(&path, bytes).unwrap();

    let encoder = Vgg16Encoder::<B>::new(
        Vgg16Config {
            keep_prob: 1.0,
            fc_channels: 8,
        },
        &device,
    );
    match load_vgg16(encoder, &path, &device) {
        Err(PretrainedError::Missing { name, .. }) => assert_eq!(name, "features.2.weight"),
        other => panic!("expected missing layer error, got {:?}", other.map(|(_, n)| n)),
    }
}

fn f32_view_bytes(len: usize) -> Vec<u8> {
    vec![0.0f32; len].iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[test]
fn transposed_kernel_with_matching_count_is_rejected() {
    let device = Default::default();
    let tmp = tempfile::tempdir().unwrap();
    let weight = f32_view_bytes(64 * 3 * 3 * 3);
    let bias = f32_view_bytes(64);
    let tensors = vec![
        (
            "features.0.weight",
            TensorView::new(Dtype::F32, vec![3, 64, 3, 3], &weight).unwrap(),
        ),
        (
            "features.0.bias",
            TensorView::new(Dtype::F32, vec![64], &bias).unwrap(),
        ),
    ];
    let bytes = safetensors::tensor::serialize(tensors, &None).unwrap();
    let path = tmp.path().join("vgg16.safetensors");
    std::fs::write(&path, bytes).unwrap();

    let encoder = Vgg16Encoder::<B>::new(
        Vgg16Config {
            keep_prob: 1.0,
            fc_channels: 8,
        },
        &device,
    );
    match load_vgg16(encoder, &path, &device) {
        Err(PretrainedError::Shape {
            name,
            actual,
            expected,
        }) => {
            assert_eq!(name, "features.0.weight");
            assert_eq!(actual, vec![3, 64, 3, 3]);
            assert_eq!(expected, vec![64, 3, 3, 3]);
        }
        other => panic!("expected shape error, got {:?}", other.map(|(_, n)| n)),
    }
}

#[test]
fn unknown_weight_extension_is_rejected() {
    let device = Default::default();
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("vgg16.mpk");
    std::fs::write(&path, b"not a record").unwrap();
    let encoder = Vgg16Encoder::<B>::new(
        Vgg16Config {
            keep_prob: 1.0,
            fc_channels: 8,
        },
        &device,
    );
    assert!(matches!(
        load_vgg16(encoder, &path, &device),
        Err(PretrainedError::Format { .. })
    ));
}

fn layer7_values<Bk: burn::tensor::backend::Backend>(
    encoder: &Vgg16Encoder<Bk>,
    device: &Bk::Device,
) -> Vec<f32> {
    let images = Tensor::<Bk, 4>::ones([1, 3, 96, 96], device).mul_scalar(100.0);
    encoder
        .forward(images)
        .layer7
        .into_data()
        .to_vec::<f32>()
        .expect("f32 data")
}

#[test]
fn dropout_is_inert_without_autodiff() {
    let device = Default::default();
    let cfg = Vgg16Config {
        keep_prob: 0.5,
        fc_channels: 16,
    };
    let encoder = Vgg16Encoder::<B>::new(cfg, &device);
    let first = layer7_values(&encoder, &device);
    let second = layer7_values(&encoder, &device);
    assert!(first.iter().any(|v| *v != 0.0));
    assert_eq!(first, second);
}

#[test]
fn dropout_is_active_while_training() {
    let device = Default::default();
    let cfg = Vgg16Config {
        keep_prob: 0.5,
        fc_channels: 16,
    };
    let encoder = Vgg16Encoder::<Autodiff<B>>::new(cfg, &device);
    let first = layer7_values(&encoder, &device);
    let second = layer7_values(&encoder, &device);
    assert_eq!(first.len(), second.len());
    assert_ne!(first, second);

    // The inference view of the same weights is deterministic again.
    let inner = encoder.valid();
    assert_eq!(layer7_values(&inner, &device), layer7_values(&inner, &device));
}
