//! Lock-free parameter slots shared between the control thread and the
//! audio callback, and the smoothing applied when the callback reads them.

use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` stored as raw bits so both threads can touch it without a lock.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// One-pole coefficient for a time constant, `exp(-1 / (sr * tau))`.
#[inline]
pub fn one_pole_coef(sample_rate: f32, time_constant_seconds: f32) -> f32 {
    if time_constant_seconds <= 0.0 || sample_rate <= 0.0 {
        return 0.0;
    }
    (-1.0 / (sample_rate * time_constant_seconds)).exp()
}

/// Exponential approach toward a target, one step per frame.
/// Same curve as a WebAudio `setTargetAtTime` ramp.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coef: f32,
}

const SETTLE_EPSILON: f32 = 1e-6;

impl SmoothedParam {
    pub fn new(initial: f32, sample_rate: f32, time_constant_seconds: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coef: one_pole_coef(sample_rate, time_constant_seconds),
        }
    }

    #[inline]
    pub fn set_target(&mut self, target: f32) {
        if target.is_finite() {
            self.target = target;
        }
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.current != self.target {
            self.current = self.target + self.coef * (self.current - self.target);
            if (self.current - self.target).abs() < SETTLE_EPSILON {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Jump straight to the target. Only for voices that are not audible yet.
    pub fn snap(&mut self) {
        self.current = self.target;
    }
}
