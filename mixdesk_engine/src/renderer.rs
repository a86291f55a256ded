//! The audio-thread side of the engine. `MixRenderer::process` is what the
//! cpal callback calls; tests and offline hosts call it directly.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use ringbuf::HeapProd;
use ringbuf::traits::Producer;

use crate::commands::{RenderCommand, Retired};
use crate::mixer::{MIX_CHANNELS, StemVoice, write_device_frames};
use crate::nodes::{AudioNode, GainNode};
use crate::params::SmoothedParam;
use crate::shaper::{Punch, TransientShaper};
use crate::transport::TransportShared;

pub struct MixRenderer {
    quantum: usize,
    commands: Receiver<RenderCommand>,
    retired: Sender<Retired>,
    transport: Arc<TransportShared>,
    /// Transport position in frames; new voices join here.
    position: u64,
    voices: Vec<Box<StemVoice>>,
    mix: Vec<f32>,
    scratch: Vec<f32>,
    punch_buf: Vec<f32>,
    master_gain: GainNode,
    master_shaper: TransientShaper,
    master_punch: SmoothedParam,
    analyser: Option<HeapProd<f32>>,
}

impl MixRenderer {
    /// Everything the callback touches is allocated here, up front.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sample_rate: u32,
        quantum: usize,
        max_voices: usize,
        smoothing_seconds: f32,
        commands: Receiver<RenderCommand>,
        retired: Sender<Retired>,
        transport: Arc<TransportShared>,
        analyser: Option<HeapProd<f32>>,
    ) -> Self {
        let quantum = quantum.max(1);
        let sr = sample_rate as f32;
        Self {
            quantum,
            commands,
            retired,
            master_gain: GainNode::new(transport.master_gain(), sr, smoothing_seconds),
            transport,
            position: 0,
            voices: Vec::with_capacity(max_voices),
            mix: vec![0.0; quantum * MIX_CHANNELS],
            scratch: vec![0.0; quantum * MIX_CHANNELS],
            punch_buf: vec![0.0; quantum],
            master_shaper: TransientShaper::new(sr),
            master_punch: SmoothedParam::new(0.0, sr, smoothing_seconds),
            analyser,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn position_frames(&self) -> u64 {
        self.position
    }

    /// Fills one device buffer of interleaved `channels`-channel frames.
    pub fn process(&mut self, out: &mut [f32], channels: usize) {
        self.drain_commands();
        if channels == 0 {
            return;
        }

        let frames = out.len() / channels;
        let playing = self.transport.is_playing();
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(self.quantum);
            self.render_quantum(n, playing);
            write_device_frames(
                &self.mix[..n * MIX_CHANNELS],
                &mut out[done * channels..(done + n) * channels],
                channels,
            );
            done += n;
        }
        if playing {
            self.position += frames as u64;
        }
        self.transport.advance_clock(frames as u64);
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                RenderCommand::AttachVoice(voice) => {
                    if self.voices.len() < self.voices.capacity() {
                        voice.shared().seek_frames(self.position);
                        self.voices.push(voice);
                    } else {
                        // No free slot; growing would allocate here.
                        let _ = self.retired.send(Retired::Voice(voice));
                    }
                }
                RenderCommand::ReplaceSource { slot, audio } => {
                    match self.voices.iter_mut().find(|v| v.slot() == slot) {
                        Some(voice) => {
                            let old = voice.replace_audio(audio);
                            let _ = self.retired.send(Retired::Audio(old));
                        }
                        None => {
                            let _ = self.retired.send(Retired::Audio(audio));
                        }
                    }
                }
                RenderCommand::Start { frame, epoch } => {
                    self.locate(frame, epoch);
                    self.transport.set_playing(true);
                }
                RenderCommand::Locate { frame, epoch } => self.locate(frame, epoch),
                RenderCommand::Halt => self.transport.set_playing(false),
                RenderCommand::DetachAll => {
                    for voice in self.voices.drain(..) {
                        let _ = self.retired.send(Retired::Voice(voice));
                    }
                    self.position = 0;
                }
            }
        }
    }

    /// Every voice moves within the same block boundary.
    fn locate(&mut self, frame: u64, epoch: u64) {
        self.position = frame;
        for voice in &self.voices {
            voice.shared().seek_frames(frame);
        }
        self.transport.mark_epoch(epoch);
    }

    fn render_quantum(&mut self, frames: usize, playing: bool) {
        let samples = frames * MIX_CHANNELS;
        let Self {
            voices,
            mix,
            scratch,
            punch_buf,
            master_gain,
            master_shaper,
            master_punch,
            transport,
            analyser,
            ..
        } = self;

        let mix = &mut mix[..samples];
        mix.fill(0.0);
        for voice in voices.iter_mut() {
            voice.render(mix, scratch, punch_buf, playing);
        }

        match transport.master_punch() {
            Some(target) => {
                master_punch.set_target(target);
                if master_punch.is_settled() {
                    master_shaper.process_in_place(mix, MIX_CHANNELS, Punch::Constant(master_punch.current()));
                } else {
                    let punch_buf = &mut punch_buf[..frames];
                    for p in punch_buf.iter_mut() {
                        *p = master_punch.next();
                    }
                    master_shaper.process_in_place(mix, MIX_CHANNELS, Punch::PerFrame(punch_buf));
                }
            }
            None => {
                master_punch.set_target(0.0);
                master_punch.snap();
            }
        }

        master_gain.set_target(transport.master_gain());
        master_gain.process(mix, MIX_CHANNELS);

        if let Some(producer) = analyser.as_mut() {
            // A full ring just drops the newest samples; metering is best-effort.
            for frame in mix.chunks_exact(MIX_CHANNELS) {
                if producer.try_push((frame[0] + frame[1]) * 0.5).is_err() {
                    break;
                }
            }
        }
    }
}
