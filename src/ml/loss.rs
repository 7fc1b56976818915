// ============================================================
// Layer 5 — Label-Smoothed Cross-Entropy
// ============================================================
// Instead of a one-hot target, every example gets a soft
// distribution:
//
//   p(true class)  = 1 - s
//   p(other class) = s / (C - 1)
//
// and the loss is the cross-entropy against it:
//
//   loss = mean_b( - sum_c p_bc * log_softmax(logits)_bc )
//
// s = 0 gives ordinary cross-entropy. The soft targets are
// built on the host by the batcher (`target_row`) so the
// device only sees a dense [batch, classes] tensor.
//
// Reference: Szegedy et al. (2016) Rethinking the Inception
//            Architecture, §7

use burn::{prelude::*, tensor::activation::log_softmax};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelSmoothingCrossEntropy {
    num_classes: usize,
    smoothing:   f64,
}

impl LabelSmoothingCrossEntropy {
    pub fn new(num_classes: usize, smoothing: f64) -> Self {
        Self { num_classes, smoothing }
    }

    pub fn num_classes(&self) -> usize { self.num_classes }

    pub fn smoothing(&self) -> f64 { self.smoothing }

    /// Soft target distribution for one label.
    pub fn target_row(&self, label: usize) -> Vec<f32> {
        let (on, off) = if self.num_classes > 1 {
            (1.0 - self.smoothing, self.smoothing / (self.num_classes - 1) as f64)
        } else {
            (1.0, 0.0)
        };
        (0..self.num_classes)
            .map(|c| if c == label { on as f32 } else { off as f32 })
            .collect()
    }

    /// Row-major [labels.len(), num_classes] soft targets.
    pub fn targets(&self, labels: &[usize]) -> Vec<f32> {
        labels.iter().flat_map(|&l| self.target_row(l)).collect()
    }

    /// logits: [batch, classes], targets: [batch, classes] → scalar loss [1]
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let log_probs = log_softmax(logits, 1);
        (log_probs * targets).sum_dim(1).mean().neg()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    type B = NdArray<f32>;

    #[test]
    fn test_target_row_spreads_mass_over_other_classes() {
        let loss = LabelSmoothingCrossEntropy::new(5, 0.1);
        let row  = loss.target_row(2);
        assert_abs_diff_eq!(row[2], 0.9, epsilon = 1e-6);
        for (c, p) in row.iter().enumerate() {
            if c != 2 {
                assert_abs_diff_eq!(*p, 0.025, epsilon = 1e-6);
            }
        }
        assert_abs_diff_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_smoothing_is_one_hot() {
        let loss = LabelSmoothingCrossEntropy::new(3, 0.0);
        assert_eq!(loss.targets(&[0, 2]), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_uniform_logits_give_log_num_classes() {
        let device = Default::default();
        let loss   = LabelSmoothingCrossEntropy::new(4, 0.3);
        let logits = Tensor::<B, 2>::zeros([2, 4], &device);
        let targets = Tensor::<B, 1>::from_floats(loss.targets(&[1, 3]).as_slice(), &device)
            .reshape([2, 4]);

        let value: f32 = loss.forward(logits, targets).into_scalar().elem();
        assert_abs_diff_eq!(value, (4.0f32).ln(), epsilon = 1e-5);
    }

    #[test]
    fn test_unsmoothed_loss_matches_cross_entropy() {
        let device = Default::default();
        let loss   = LabelSmoothingCrossEntropy::new(2, 0.0);
        let logits = Tensor::<B, 1>::from_floats([2.0, 0.0], &device).reshape([1, 2]);
        let targets = Tensor::<B, 1>::from_floats(loss.targets(&[0]).as_slice(), &device)
            .reshape([1, 2]);

        let value: f32 = loss.forward(logits, targets).into_scalar().elem();
        let expected = -(2.0f32.exp() / (2.0f32.exp() + 1.0)).ln();
        assert_abs_diff_eq!(value, expected, epsilon = 1e-5);
    }
}
