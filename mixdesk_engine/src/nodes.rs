use std::f32::consts::FRAC_PI_2;

use crate::params::SmoothedParam;

pub trait AudioNode: Send {
    /// Process one interleaved block in place.
    fn process(&mut self, buffer: &mut [f32], channels: usize);

    /// Handle parameters (id 0 is the node's main parameter)
    fn set_param(&mut self, _id: u32, _value: f32) {}
}

/// Gain stage whose target is approached exponentially, never jumped to.
pub struct GainNode {
    gain: SmoothedParam,
}

impl GainNode {
    pub fn new(gain: f32, sample_rate: f32, smoothing_seconds: f32) -> Self {
        Self { gain: SmoothedParam::new(gain, sample_rate, smoothing_seconds) }
    }

    pub fn set_target(&mut self, gain: f32) {
        self.gain.set_target(gain);
    }
}

impl AudioNode for GainNode {
    fn process(&mut self, buffer: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        if self.gain.is_settled() {
            let gain = self.gain.current();
            if gain != 1.0 {
                for sample in buffer.iter_mut() {
                    *sample *= gain;
                }
            }
            return;
        }
        for frame in buffer.chunks_exact_mut(channels) {
            let gain = self.gain.next();
            for sample in frame {
                *sample *= gain;
            }
        }
    }

    fn set_param(&mut self, _id: u32, value: f32) {
        self.gain.set_target(value);
    }
}

/// Equal-power stereo panner with the same law as a browser `StereoPannerNode`
/// fed a stereo signal: the far channel is folded into the near one.
pub struct StereoPanner {
    pan: SmoothedParam,
}

impl StereoPanner {
    pub fn new(pan: f32, sample_rate: f32, smoothing_seconds: f32) -> Self {
        Self { pan: SmoothedParam::new(pan.clamp(-1.0, 1.0), sample_rate, smoothing_seconds) }
    }

    pub fn set_target(&mut self, pan: f32) {
        self.pan.set_target(pan.clamp(-1.0, 1.0));
    }

    pub fn current(&self) -> f32 {
        self.pan.current()
    }

    #[inline]
    pub fn pan_frame(pan: f32, left: f32, right: f32) -> (f32, f32) {
        if pan <= 0.0 {
            let x = (pan + 1.0) * FRAC_PI_2;
            (left + right * x.cos(), right * x.sin())
        } else {
            let x = pan * FRAC_PI_2;
            (left * x.cos(), right + left * x.sin())
        }
    }
}

impl AudioNode for StereoPanner {
    fn process(&mut self, buffer: &mut [f32], channels: usize) {
        // Mono buses have nothing to pan.
        if channels != 2 {
            return;
        }
        if self.pan.is_settled() && self.pan.current() == 0.0 {
            return;
        }
        for frame in buffer.chunks_exact_mut(2) {
            let pan = self.pan.next();
            let (l, r) = Self::pan_frame(pan, frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
    }

    fn set_param(&mut self, _id: u32, value: f32) {
        self.set_target(value);
    }
}
