use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use mixdesk_shared::CHANNEL_COUNT;

use crate::assets::DecodedAudio;
use crate::nodes::{AudioNode, GainNode, StereoPanner};
use crate::params::{AtomicF32, SmoothedParam};
use crate::shaper::{Punch, TransientShaper};

/// Mix bus layout: every voice is rendered as interleaved stereo.
pub const MIX_CHANNELS: usize = CHANNEL_COUNT;

/// Parameter slots for one stem. Gain, pan and punch are written by the
/// control thread; position, length and `ended` belong to the renderer once
/// the voice is attached.
#[derive(Debug)]
pub struct VoiceShared {
    /// Playback position in engine frames.
    position: AtomicU64,
    length: AtomicU64,
    gain: AtomicF32,
    pan: AtomicF32,
    punch: AtomicF32,
    shaper_enabled: AtomicBool,
    ended: AtomicBool,
}

impl VoiceShared {
    pub fn new(length_frames: u64, gain: f32, pan: f32) -> Self {
        Self {
            position: AtomicU64::new(0),
            length: AtomicU64::new(length_frames),
            gain: AtomicF32::new(gain),
            pan: AtomicF32::new(pan),
            punch: AtomicF32::new(0.0),
            shaper_enabled: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn position_frames(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Moves the playhead. Positions past the end are held at the end.
    pub(crate) fn seek_frames(&self, frame: u64) {
        let length = self.length_frames();
        let frame = frame.min(length);
        self.position.store(frame, Ordering::Release);
        self.ended.store(length > 0 && frame >= length, Ordering::Release);
    }

    #[inline]
    pub fn length_frames(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    pub(crate) fn set_length_frames(&self, frames: u64) {
        self.length.store(frames, Ordering::Release);
    }

    #[inline]
    pub fn gain_target(&self) -> f32 {
        self.gain.load()
    }

    pub fn set_gain_target(&self, gain: f32) {
        self.gain.store(gain.max(0.0));
    }

    #[inline]
    pub fn pan_target(&self) -> f32 {
        self.pan.load()
    }

    pub fn set_pan_target(&self, pan: f32) {
        self.pan.store(pan.clamp(-1.0, 1.0));
    }

    /// `None` while the insert is bypassed.
    #[inline]
    pub fn punch(&self) -> Option<f32> {
        self.shaper_enabled.load(Ordering::Acquire).then(|| self.punch.load())
    }

    pub fn set_punch(&self, punch: Option<f32>) {
        match punch {
            Some(p) => {
                self.punch.store(if p.is_nan() { 0.0 } else { p.clamp(-1.0, 1.0) });
                self.shaper_enabled.store(true, Ordering::Release);
            }
            None => self.shaper_enabled.store(false, Ordering::Release),
        }
    }

    #[inline]
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}

/// Audio-thread half of a stem: source -> transient insert -> gain -> pan.
pub struct StemVoice {
    slot: usize,
    shared: Arc<VoiceShared>,
    audio: DecodedAudio,
    gain: GainNode,
    panner: StereoPanner,
    shaper: TransientShaper,
    punch: SmoothedParam,
}

impl StemVoice {
    /// Built on the control thread; the gain starts at its target so a
    /// freshly attached stem does not fade in from unity.
    pub fn new(
        slot: usize,
        shared: Arc<VoiceShared>,
        audio: DecodedAudio,
        sample_rate: f32,
        smoothing_seconds: f32,
    ) -> Self {
        let gain = GainNode::new(shared.gain_target(), sample_rate, smoothing_seconds);
        let panner = StereoPanner::new(shared.pan_target(), sample_rate, smoothing_seconds);
        Self {
            slot,
            shared,
            audio,
            gain,
            panner,
            shaper: TransientShaper::new(sample_rate),
            punch: SmoothedParam::new(0.0, sample_rate, smoothing_seconds),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn shared(&self) -> &Arc<VoiceShared> {
        &self.shared
    }

    /// Swaps the source while keeping the chain; returns the old buffer so
    /// the caller can retire it off the audio thread.
    pub fn replace_audio(&mut self, audio: DecodedAudio) -> DecodedAudio {
        self.shared.set_length_frames(audio.frames() as u64);
        let old = std::mem::replace(&mut self.audio, audio);
        let position = self.shared.position_frames();
        self.shared.seek_frames(position);
        old
    }

    /// Adds this voice into the stereo `mix`. `scratch` must hold at least
    /// `mix.len()` samples and `punch_buf` one value per frame.
    pub fn render(&mut self, mix: &mut [f32], scratch: &mut [f32], punch_buf: &mut [f32], playing: bool) {
        self.gain.set_target(self.shared.gain_target());
        self.panner.set_target(self.shared.pan_target());
        if !playing {
            return;
        }

        let frames = mix.len() / MIX_CHANNELS;
        let scratch = &mut scratch[..frames * MIX_CHANNELS];
        let length = self.audio.frames() as u64;
        let start = self.shared.position.load(Ordering::Acquire);
        if start >= length {
            self.shared.ended.store(true, Ordering::Release);
            return;
        }

        for (i, frame) in scratch.chunks_exact_mut(MIX_CHANNELS).enumerate() {
            let (l, r) = self.audio.stereo_frame(start as usize + i);
            frame[0] = l;
            frame[1] = r;
        }
        let advanced = (frames as u64).min(length - start);
        self.shared.position.store(start + advanced, Ordering::Release);
        if start + advanced >= length {
            self.shared.ended.store(true, Ordering::Release);
        }

        match self.shared.punch() {
            Some(target) => {
                self.punch.set_target(target);
                if self.punch.is_settled() {
                    let punch = Punch::Constant(self.punch.current());
                    self.shaper.process_in_place(scratch, MIX_CHANNELS, punch);
                } else {
                    let punch_buf = &mut punch_buf[..frames];
                    for p in punch_buf.iter_mut() {
                        *p = self.punch.next();
                    }
                    self.shaper.process_in_place(scratch, MIX_CHANNELS, Punch::PerFrame(punch_buf));
                }
            }
            None => {
                // Re-enabling ramps in from neutral.
                self.punch.set_target(0.0);
                self.punch.snap();
            }
        }

        self.gain.process(scratch, MIX_CHANNELS);
        self.panner.process(scratch, MIX_CHANNELS);
        for (out, &s) in mix.iter_mut().zip(scratch.iter()) {
            *out += s;
        }
    }
}

/// Writes the stereo mix into a device buffer with `channels` channels.
/// Mono devices get the average; extra channels stay silent.
pub fn write_device_frames(mix: &[f32], out: &mut [f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            for (dst, frame) in out.iter_mut().zip(mix.chunks_exact(MIX_CHANNELS)) {
                *dst = (frame[0] + frame[1]) * 0.5;
            }
        }
        2 => {
            let n = mix.len().min(out.len());
            out[..n].copy_from_slice(&mix[..n]);
        }
        _ => {
            for (dst, frame) in out.chunks_exact_mut(channels).zip(mix.chunks_exact(MIX_CHANNELS)) {
                dst[0] = frame[0];
                dst[1] = frame[1];
                dst[2..].fill(0.0);
            }
        }
    }
}
