//! Lookahead-free transient shaper.
//!
//! Two envelope followers run on the mono sum of the input: a fast one that
//! jumps onto attacks and a slow one that lags behind them. Their difference,
//! relative to the fast envelope, is the transient strength of the frame, and
//! `punch` scales how much of it is added to (or taken from) the gain.

use crate::nodes::AudioNode;
use crate::params::one_pole_coef;

pub const FAST_ATTACK_SECONDS: f32 = 0.001;
pub const FAST_RELEASE_SECONDS: f32 = 0.050;
pub const SLOW_ATTACK_SECONDS: f32 = 0.010;
pub const SLOW_RELEASE_SECONDS: f32 = 0.200;

const RATIO_EPSILON: f32 = 1e-6;

/// Parameter id of `punch` when driven through `AudioNode::set_param`.
pub const PARAM_PUNCH: u32 = 0;

/// Punch automation for one block.
#[derive(Debug, Clone, Copy)]
pub enum Punch<'a> {
    /// One value for every frame of the block.
    Constant(f32),
    /// One value per frame; a short slice holds its last value.
    PerFrame(&'a [f32]),
}

impl Punch<'_> {
    #[inline]
    fn at(&self, frame: usize) -> f32 {
        let raw = match *self {
            Punch::Constant(v) => v,
            Punch::PerFrame(values) => match values.get(frame) {
                Some(&v) => v,
                None => values.last().copied().unwrap_or(0.0),
            },
        };
        if raw.is_nan() { 0.0 } else { raw.clamp(-1.0, 1.0) }
    }
}

/// One-pole follower with separate attack and release coefficients.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFollower {
    value: f32,
    attack_coef: f32,
    release_coef: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32, attack_seconds: f32, release_seconds: f32) -> Self {
        Self {
            value: 0.0,
            attack_coef: one_pole_coef(sample_rate, attack_seconds),
            release_coef: one_pole_coef(sample_rate, release_seconds),
        }
    }

    #[inline]
    pub fn process(&mut self, rect: f32) -> f32 {
        let coef = if rect > self.value { self.attack_coef } else { self.release_coef };
        self.value = coef * self.value + (1.0 - coef) * rect;
        self.value
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }
}

pub struct TransientShaper {
    fast: EnvelopeFollower,
    slow: EnvelopeFollower,
    /// Block-constant punch used by the `AudioNode` path.
    punch: f32,
}

impl TransientShaper {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            fast: EnvelopeFollower::new(sample_rate, FAST_ATTACK_SECONDS, FAST_RELEASE_SECONDS),
            slow: EnvelopeFollower::new(sample_rate, SLOW_ATTACK_SECONDS, SLOW_RELEASE_SECONDS),
            punch: 0.0,
        }
    }

    pub fn fast_envelope(&self) -> f32 {
        self.fast.value()
    }

    pub fn slow_envelope(&self) -> f32 {
        self.slow.value()
    }

    pub fn punch(&self) -> f32 {
        self.punch
    }

    /// Shape one interleaved block. `None` input means nothing is connected:
    /// the output is left untouched and the envelopes do not move.
    pub fn process_block(&mut self, input: Option<&[f32]>, output: &mut [f32], channels: usize, punch: Punch<'_>) {
        let Some(input) = input else { return };
        if channels == 0 {
            return;
        }
        let frames = input.len().min(output.len()) / channels;
        let inv_channels = 1.0 / channels as f32;

        for frame in 0..frames {
            let base = frame * channels;
            let samples = &input[base..base + channels];
            let gain = self.frame_gain(samples, inv_channels, punch.at(frame));
            for (out, &sample) in output[base..base + channels].iter_mut().zip(samples) {
                *out = sample * gain;
            }
        }
    }

    /// In-place variant used inside the mix renderer.
    pub fn process_in_place(&mut self, buffer: &mut [f32], channels: usize, punch: Punch<'_>) {
        if channels == 0 {
            return;
        }
        let frames = buffer.len() / channels;
        let inv_channels = 1.0 / channels as f32;

        for frame in 0..frames {
            let samples = &mut buffer[frame * channels..(frame + 1) * channels];
            let gain = self.frame_gain(samples, inv_channels, punch.at(frame));
            for sample in samples.iter_mut() {
                *sample *= gain;
            }
        }
    }

    #[inline]
    fn frame_gain(&mut self, samples: &[f32], inv_channels: f32, punch: f32) -> f32 {
        let mono = samples.iter().sum::<f32>() * inv_channels;
        let rect = mono.abs();
        let fast = self.fast.process(rect);
        let slow = self.slow.process(rect);
        let transient = (fast - slow).max(0.0);
        let ratio = transient / (fast + RATIO_EPSILON);
        1.0 + punch * ratio
    }
}

impl AudioNode for TransientShaper {
    fn process(&mut self, buffer: &mut [f32], channels: usize) {
        let punch = self.punch;
        self.process_in_place(buffer, channels, Punch::Constant(punch));
    }

    fn set_param(&mut self, id: u32, value: f32) {
        if id == PARAM_PUNCH && value.is_finite() {
            self.punch = value.clamp(-1.0, 1.0);
        }
    }
}
