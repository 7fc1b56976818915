use burn::{
    backend::{Autodiff, NdArray},
    optim::GradientsParams,
    tensor::{Distribution, Tensor},
};

use vit_cifar::ml::{
    executor::{clip_global_norm, global_grad_norm},
    loss::LabelSmoothingCrossEntropy,
    model::{VisionTransformer, VisionTransformerConfig},
};

type B = Autodiff<NdArray<f32>>;

fn gradients() -> (VisionTransformer<B>, GradientsParams) {
    let device = Default::default();
    let model  = VisionTransformerConfig::new(4, 8, 4, 3, 8, 1, 2).init::<B>(&device);
    let images = Tensor::<B, 4>::random([3, 3, 8, 8], Distribution::Normal(0.0, 1.0), &device);
    let loss   = LabelSmoothingCrossEntropy::new(4, 0.1);
    let targets = Tensor::<B, 1>::from_floats(loss.targets(&[0, 1, 3]).as_slice(), &device)
        .reshape([3, 4]);

    let value = loss.forward(model.forward(images), targets);
    let grads = GradientsParams::from_grads(value.backward(), &model);
    (model, grads)
}

#[test]
fn clipped_norm_does_not_exceed_threshold() {
    let (model, mut grads) = gradients();
    let before = global_grad_norm::<B, _>(&model, &grads);
    assert!(before > 0.0);

    let threshold = before / 10.0;
    let reported  = clip_global_norm::<B, _>(&model, &mut grads, threshold);
    assert_eq!(reported, before);

    let after = global_grad_norm::<B, _>(&model, &grads);
    assert!(after <= threshold * (1.0 + 1e-4));
    assert!(after > threshold * 0.99);
}

#[test]
fn zero_threshold_leaves_gradients_alone() {
    let (model, mut grads) = gradients();
    let before = global_grad_norm::<B, _>(&model, &grads);
    clip_global_norm::<B, _>(&model, &mut grads, 0.0);
    assert_eq!(global_grad_norm::<B, _>(&model, &grads), before);
}

#[test]
fn threshold_above_norm_leaves_gradients_alone() {
    let (model, mut grads) = gradients();
    let before = global_grad_norm::<B, _>(&model, &grads);
    clip_global_norm::<B, _>(&model, &mut grads, before * 2.0);
    assert_eq!(global_grad_norm::<B, _>(&model, &grads), before);
}
