//! Dynamic loss scaling for reduced-precision training.
//!
//! The loss is multiplied by `scale` before the backward pass so small
//! gradients survive half precision; gradients are divided by the same
//! factor before clipping or the optimizer sees them. A step with any
//! non-finite gradient is skipped and the scale backs off; a long run of
//! clean steps lets it grow again.

/// Default number of clean steps before the scale grows
const DEFAULT_GROWTH_INTERVAL: usize = 2000;

/// Initial scale for dynamic scaling (2^16)
const DEFAULT_INITIAL_SCALE: f64 = 65536.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LossScaler {
    scale:              f64,
    growth_factor:      f64,
    backoff_factor:     f64,
    growth_interval:    usize,
    steps_since_growth: usize,
    dynamic:            bool,
    overflow_count:     usize,
}

impl LossScaler {
    /// Dynamic scaler starting at `initial_scale`.
    pub fn new(initial_scale: f64) -> Self {
        Self {
            scale:              initial_scale,
            growth_factor:      2.0,
            backoff_factor:     0.5,
            growth_interval:    DEFAULT_GROWTH_INTERVAL,
            steps_since_growth: 0,
            dynamic:            true,
            overflow_count:     0,
        }
    }

    /// Fixed scale of 1: full-precision training.
    pub fn disabled() -> Self {
        Self { dynamic: false, ..Self::new(1.0) }
    }

    pub fn with_growth_interval(mut self, interval: usize) -> Self {
        self.growth_interval = interval.max(1);
        self
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    /// Record the outcome of a step. `grads_finite` is false when the
    /// step was skipped.
    pub fn update(&mut self, grads_finite: bool) {
        if !grads_finite {
            self.overflow_count += 1;
        }
        if !self.dynamic {
            return;
        }

        if grads_finite {
            self.steps_since_growth += 1;
            if self.steps_since_growth >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.steps_since_growth = 0;
            }
        } else {
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.steps_since_growth = 0;
        }
    }
}

impl Default for LossScaler {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_SCALE)
    }
}
