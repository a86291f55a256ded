//! Transport state shared between the control thread and the mix renderer,
//! plus the control-side bookkeeping behind `play`/`pause`/`seek`.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use mixdesk_shared::EngineState;

use crate::params::AtomicF32;

/// Lock-free slots read by the renderer once per block.
#[derive(Debug)]
pub struct TransportShared {
    /// One flag for every voice, so all stems start and stop on the same block.
    playing: AtomicBool,
    /// Frames rendered since the renderer was created. Monotonic.
    clock_frames: AtomicU64,
    /// Last play/seek epoch the renderer applied, and the clock at that point.
    applied_epoch: AtomicU64,
    epoch_clock: AtomicU64,
    master_gain: AtomicF32,
    master_punch: AtomicF32,
    master_shaper: AtomicBool,
}

impl TransportShared {
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            clock_frames: AtomicU64::new(0),
            applied_epoch: AtomicU64::new(0),
            epoch_clock: AtomicU64::new(0),
            master_gain: AtomicF32::new(1.0),
            master_punch: AtomicF32::new(0.0),
            master_shaper: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Written by the renderer only, when it applies a start or halt.
    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    #[inline]
    pub fn clock_frames(&self) -> u64 {
        self.clock_frames.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn advance_clock(&self, frames: u64) {
        self.clock_frames.fetch_add(frames, Ordering::AcqRel);
    }

    #[inline]
    pub fn applied_epoch(&self) -> u64 {
        self.applied_epoch.load(Ordering::Acquire)
    }

    #[inline]
    pub fn epoch_clock(&self) -> u64 {
        self.epoch_clock.load(Ordering::Acquire)
    }

    /// Publishes `epoch` after the renderer moved its voices for it.
    pub(crate) fn mark_epoch(&self, epoch: u64) {
        self.epoch_clock.store(self.clock_frames(), Ordering::Release);
        self.applied_epoch.store(epoch, Ordering::Release);
    }

    /// Renderer clock frames since the applied epoch started.
    pub fn frames_since_epoch(&self) -> u64 {
        self.clock_frames().saturating_sub(self.epoch_clock())
    }

    #[inline]
    pub fn master_gain(&self) -> f32 {
        self.master_gain.load()
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.master_gain.store(gain.max(0.0));
    }

    /// `None` while the master shaper is bypassed.
    #[inline]
    pub fn master_punch(&self) -> Option<f32> {
        self.master_shaper.load(Ordering::Acquire).then(|| self.master_punch.load())
    }

    pub fn set_master_punch(&self, punch: Option<f32>) {
        match punch {
            Some(p) => {
                self.master_punch.store(if p.is_nan() { 0.0 } else { p.clamp(-1.0, 1.0) });
                self.master_shaper.store(true, Ordering::Release);
            }
            None => self.master_shaper.store(false, Ordering::Release),
        }
    }
}

impl Default for TransportShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-side transport: engine state, pause offset, duration and the
/// epoch bumped on every `play` or seek sent to the renderer.
#[derive(Debug, Clone)]
pub struct Transport {
    state: EngineState,
    pause_offset: f64,
    duration: f64,
    epoch: u64,
    /// Transport offset the latest epoch starts from.
    epoch_offset: f64,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            pause_offset: 0.0,
            duration: 0.0,
            epoch: 0,
            epoch_offset: 0.0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            log::debug!("[Transport] {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub fn pause_offset(&self) -> f64 {
        self.pause_offset
    }

    pub fn set_pause_offset(&mut self, seconds: f64) {
        self.pause_offset = self.clamp_time(seconds);
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Duration only ever grows within a job.
    pub fn extend_duration(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > self.duration {
            self.duration = seconds;
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn clamp_time(&self, seconds: f64) -> f64 {
        if !seconds.is_finite() {
            return 0.0;
        }
        seconds.clamp(0.0, self.duration.max(0.0))
    }

    /// Where `play` should start: the pause offset, or 0 once the end was reached.
    pub fn start_offset(&self) -> f64 {
        if self.duration > 0.0 && self.pause_offset >= self.duration {
            0.0
        } else {
            self.pause_offset
        }
    }

    pub fn epoch_offset(&self) -> f64 {
        self.epoch_offset
    }

    /// Starts a new epoch at `offset` and returns its number.
    pub fn begin_epoch(&mut self, offset: f64) -> u64 {
        self.epoch += 1;
        self.epoch_offset = offset;
        self.epoch
    }

    /// Transport time implied by `elapsed_frames` of renderer clock since the
    /// epoch started.
    pub fn clock_time(&self, elapsed_frames: u64, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return self.epoch_offset;
        }
        self.epoch_offset + elapsed_frames as f64 / sample_rate as f64
    }

    /// Renderer-clock time (seconds) that corresponds to transport offset 0,
    /// given the clock frame at which the epoch was applied.
    pub fn epoch_origin(&self, epoch_clock: u64, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        epoch_clock as f64 / sample_rate as f64 - self.epoch_offset
    }

    /// Back to the state of a freshly created engine, keeping the epoch counter.
    pub fn reset(&mut self) {
        let epoch = self.epoch;
        *self = Self::new();
        self.epoch = epoch;
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
