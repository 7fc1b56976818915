// ============================================================
// Layer 5 — Warmup + Cosine Learning-Rate Schedule
// ============================================================
// A closed-form function of the epoch index e:
//
//   e < W :  warmup_lr + (peak - warmup_lr) * e / W
//   e >= W:  t  = min((e - W) / max(E - 1 - W, 1), 1)
//            lr = min_lr + (peak - min_lr) * (0.5 * (1 + cos(pi * t)))^gamma
//
// W = warmup epochs, E = total epochs. gamma = 1 is the plain
// cosine curve; gamma > 1 decays faster, gamma < 1 slower. The
// end points do not depend on gamma: lr(W) = peak and
// lr(E - 1) = min_lr.
//
// The schedule advances once per epoch, never per batch.
//
// Reference: Loshchilov & Hutter (2017) SGDR
//            Goyal et al. (2017) Accurate, Large Minibatch SGD (warmup)

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::domain::metrics::ScheduleState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupCosineSchedule {
    warmup_lr:     f64,
    peak_lr:       f64,
    min_lr:        f64,
    warmup_epochs: usize,
    total_epochs:  usize,
    gamma:         f64,
    epoch:         usize,
}

impl WarmupCosineSchedule {
    pub fn new(
        warmup_lr:     f64,
        peak_lr:       f64,
        min_lr:        f64,
        warmup_epochs: usize,
        total_epochs:  usize,
        gamma:         f64,
    ) -> Self {
        Self { warmup_lr, peak_lr, min_lr, warmup_epochs, total_epochs, gamma, epoch: 0 }
    }

    /// Learning rate at 0-based epoch `epoch`.
    pub fn lr_at(&self, epoch: usize) -> f64 {
        if epoch < self.warmup_epochs {
            let progress = epoch as f64 / self.warmup_epochs as f64;
            return self.warmup_lr + (self.peak_lr - self.warmup_lr) * progress;
        }

        let span = self
            .total_epochs
            .saturating_sub(1)
            .saturating_sub(self.warmup_epochs)
            .max(1);
        let t = ((epoch - self.warmup_epochs) as f64 / span as f64).min(1.0);
        let cosine = 0.5 * (1.0 + (PI * t).cos());
        self.min_lr + (self.peak_lr - self.min_lr) * cosine.powf(self.gamma)
    }

    pub fn current_lr(&self) -> f64 {
        self.lr_at(self.epoch)
    }

    /// Advance by one epoch.
    pub fn step(&mut self) {
        self.epoch += 1;
    }

    pub fn state(&self) -> ScheduleState {
        ScheduleState { step: self.epoch, lr: self.current_lr() }
    }

    /// Continue from a saved position.
    pub fn restore(&mut self, state: &ScheduleState) {
        self.epoch = state.step;
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn schedule() -> WarmupCosineSchedule {
        WarmupCosineSchedule::new(1e-6, 1e-3, 1e-5, 10, 100, 1.0)
    }

    #[test]
    fn test_first_epoch_uses_warmup_start() {
        assert_abs_diff_eq!(schedule().lr_at(0), 1e-6, epsilon = 1e-15);
    }

    #[test]
    fn test_end_of_warmup_reaches_peak() {
        assert_abs_diff_eq!(schedule().lr_at(10), 1e-3, epsilon = 1e-15);
    }

    #[test]
    fn test_final_epoch_reaches_min_lr() {
        assert_abs_diff_eq!(schedule().lr_at(99), 1e-5, epsilon = 1e-15);
        // and stays there if training runs longer
        assert_abs_diff_eq!(schedule().lr_at(150), 1e-5, epsilon = 1e-15);
    }

    #[test]
    fn test_warmup_is_linear_and_decay_is_monotone() {
        let s = schedule();
        let mid = s.lr_at(5);
        assert_abs_diff_eq!(mid, (1e-6 + 1e-3) / 2.0, epsilon = 1e-12);
        for e in 10..99 {
            assert!(s.lr_at(e + 1) <= s.lr_at(e));
        }
    }

    #[test]
    fn test_gamma_keeps_end_points() {
        let s = WarmupCosineSchedule::new(0.0, 0.1, 0.001, 2, 12, 2.0);
        assert_abs_diff_eq!(s.lr_at(2), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(s.lr_at(11), 0.001, epsilon = 1e-12);
        // gamma > 1 sits below the plain cosine in between
        let plain = WarmupCosineSchedule::new(0.0, 0.1, 0.001, 2, 12, 1.0);
        assert!(s.lr_at(6) < plain.lr_at(6));
    }

    #[test]
    fn test_no_warmup_starts_at_peak() {
        let s = WarmupCosineSchedule::new(0.0, 0.5, 0.0, 0, 3, 1.0);
        assert_abs_diff_eq!(s.lr_at(0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.lr_at(1), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(s.lr_at(2), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_step_and_restore() {
        let mut s = schedule();
        s.step();
        s.step();
        let state = s.state();
        assert_eq!(state.step, 2);

        let mut resumed = schedule();
        resumed.restore(&state);
        assert_eq!(resumed.current_lr(), s.current_lr());
    }
}
