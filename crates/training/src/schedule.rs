//! Per-epoch learning-rate ramp and the loss-threshold stop rule.

/// Starting learning rate before the per-epoch ramp is applied.
pub const BASE_LEARNING_RATE: f64 = 0.0005;
/// From this (1-based) epoch on the ramp steepens tenfold.
pub const RAMP_SWITCH_EPOCH: usize = 10;
/// Training ends once an epoch's final batch loss drops below this.
pub const LOSS_THRESHOLD: f32 = 0.025;

/// Learning rate that grows with the epoch number.
///
/// For 1-based epoch `n`: `base * (n/100 + 1)` before [`RAMP_SWITCH_EPOCH`],
/// `base * (n/10 + 1)` from it on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrSchedule {
    base: f64,
}

impl LrSchedule {
    pub fn new(base: f64) -> Self {
        Self { base }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn rate(&self, epoch: usize) -> f64 {
        let n = epoch as f64;
        if epoch < RAMP_SWITCH_EPOCH {
            self.base * (n / 100.0 + 1.0)
        } else {
            self.base * (n / 10.0 + 1.0)
        }
    }
}

impl Default for LrSchedule {
    fn default() -> Self {
        Self::new(BASE_LEARNING_RATE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyStop {
    threshold: f32,
}

impl EarlyStop {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// True when `last_loss` is strictly below the threshold.
    pub fn should_stop(&self, last_loss: f32) -> bool {
        last_loss < self.threshold
    }
}

impl Default for EarlyStop {
    fn default() -> Self {
        Self::new(LOSS_THRESHOLD)
    }
}
