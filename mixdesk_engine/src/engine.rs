use std::sync::Arc;
use std::thread;
use std::time::Instant;

use arc_swap::ArcSwap;
use crossbeam_channel::Sender;
use mixdesk_shared::{
    CorrectionPayload, EngineState, ReadinessState, StemControlUpdate, StemControls, StemDescriptor,
    TransportSnapshot, db_to_gain, resolve_audibility,
};
use serde::Serialize;

use crate::analyser::{MasterAnalyser, MeterLevels, analyser_channel};
use crate::assets::{AudioPool, DecodedAudio, SourceKey};
use crate::commands::{RenderCommand, Retired};
use crate::config::EngineConfig;
use crate::error::{EngineError, StemError};
use crate::loader::{LoadResult, StemLoader};
use crate::mixer::{StemVoice, VoiceShared};
use crate::output::{AudioOutput, OutputControl};
use crate::peaks::{PeakCache, PeakService, PeakSource, PeakState};
use crate::renderer::MixRenderer;
use crate::source::{MediaLoader, ResolutionState, UrlResolver};
use crate::transport::{Transport, TransportShared};
use crate::waveform::{WaveformFrame, WaveformTheme, layout_waveform, rasterize, seek_time_for_click};

/// What `attach_stem` did with an already-known identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// A new signal chain was built.
    Created,
    /// The chain was kept and its source swapped for a new URL.
    Refreshed,
    /// Same URL as before; nothing to do.
    Unchanged,
}

/// Per-stem outcome of `play`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayReport {
    pub started: Vec<String>,
    /// Still loading; they join at the transport position once ready.
    pub pending: Vec<String>,
    pub failed: Vec<(String, StemError)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StemStatus {
    pub name: String,
    pub file_name: String,
    pub readiness: ReadinessState,
    pub url: Option<String>,
    pub stage: Option<String>,
    pub duration: f64,
    pub error: Option<String>,
    pub controls: StemControls,
}

struct StemRecord {
    name: String,
    descriptor: StemDescriptor,
    controls: StemControls,
    readiness: ReadinessState,
    resolution: ResolutionState,
    url: Option<String>,
    stage: Option<String>,
    duration: f64,
    voice: Option<Arc<VoiceShared>>,
    punch: Option<f32>,
    error: Option<StemError>,
}

impl StemRecord {
    fn new(descriptor: StemDescriptor) -> Self {
        Self {
            name: descriptor.name().to_string(),
            descriptor,
            controls: StemControls::default(),
            readiness: ReadinessState::Idle,
            resolution: ResolutionState::Resolving(0),
            url: None,
            stage: None,
            duration: 0.0,
            voice: None,
            punch: None,
            error: None,
        }
    }
}

/// Control-thread API of the mixing engine. Owns the stem registry and the
/// transport; the matching `MixRenderer` does the actual audio work.
pub struct PlaybackEngine {
    config: EngineConfig,
    sample_rate: u32,
    job_id: String,
    stems: Vec<StemRecord>,
    transport: Transport,
    shared: Arc<TransportShared>,
    commands: Sender<RenderCommand>,
    pool: Arc<ArcSwap<AudioPool>>,
    peaks: PeakService,
    selected: Option<String>,
    loader: StemLoader,
    analyser: MasterAnalyser,
    output: Option<Box<dyn OutputControl>>,
    max_drift: f64,
}

impl PlaybackEngine {
    /// Builds the engine and the renderer that goes with it. The caller
    /// decides who drives the renderer: `AudioOutput`, or manual `process`
    /// calls for offline use and tests.
    pub fn new(
        config: EngineConfig,
        resolver: Arc<dyn UrlResolver>,
        media: Arc<dyn MediaLoader>,
    ) -> Result<(Self, MixRenderer), EngineError> {
        config.validate()?;
        let sample_rate = config.sample_rate;

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (retired_tx, retired_rx) = crossbeam_channel::unbounded::<Retired>();
        thread::Builder::new().name("mixdesk-gc".into()).spawn(move || {
            for retired in retired_rx {
                drop(retired);
            }
        })?;

        let shared = Arc::new(TransportShared::new());
        let (analyser_tx, analyser) = analyser_channel(config.analyser_window);
        let renderer = MixRenderer::new(
            sample_rate,
            config.render_quantum,
            config.max_stems,
            config.smoothing_seconds,
            command_rx,
            retired_tx,
            shared.clone(),
            Some(analyser_tx),
        );

        let loader = StemLoader::new(resolver, media, sample_rate, config.fallback_stages.clone());
        let peaks = PeakService::new(PeakCache::new(), config.peak_buckets);

        log::info!(
            "[Engine] Created: {} Hz, quantum {}, {} stem slots",
            sample_rate,
            config.render_quantum,
            config.max_stems
        );

        let engine = Self {
            config,
            sample_rate,
            job_id: String::new(),
            stems: Vec::new(),
            transport: Transport::new(),
            shared,
            commands: command_tx,
            pool: Arc::new(ArcSwap::from_pointee(AudioPool::new())),
            peaks,
            selected: None,
            loader,
            analyser,
            output: None,
            max_drift: 0.0,
        };
        Ok((engine, renderer))
    }

    /// Engine running on the default output device at the device's rate.
    pub fn with_default_output(
        mut config: EngineConfig,
        resolver: Arc<dyn UrlResolver>,
        media: Arc<dyn MediaLoader>,
    ) -> Result<Self, EngineError> {
        config.sample_rate = AudioOutput::default_sample_rate()?;
        let (mut engine, renderer) = Self::new(config, resolver, media)?;
        let output = AudioOutput::open(renderer, None)?;
        engine.set_output(Box::new(output));
        Ok(engine)
    }

    pub fn set_output(&mut self, output: Box<dyn OutputControl>) {
        self.output = Some(output);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> EngineState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.state().is_playing()
    }

    /// Whether the renderer is currently advancing the stems. Trails
    /// `is_playing` until the renderer takes the last play or pause.
    pub fn is_clock_running(&self) -> bool {
        self.shared.is_playing()
    }

    /// True once the renderer applied the latest play or seek. Until then,
    /// positions report where the stems are headed.
    pub fn renderer_caught_up(&self) -> bool {
        self.shared.applied_epoch() == self.transport.epoch()
    }

    pub fn duration(&self) -> f64 {
        self.transport.duration()
    }

    pub fn audio_pool(&self) -> Arc<AudioPool> {
        self.pool.load_full()
    }

    pub fn peak_cache(&self) -> &PeakCache {
        self.peaks.cache()
    }

    // ---- Loading ----

    /// Replaces the current job with `stems` and waits up to the load timeout
    /// for them to become playable. Stems still loading after that join later
    /// through `poll_loads`.
    pub fn load_job(&mut self, job_id: &str, stems: Vec<StemDescriptor>) -> Result<(), EngineError> {
        let mut unique: Vec<StemDescriptor> = Vec::with_capacity(stems.len());
        for descriptor in stems {
            if unique.iter().any(|d| d.name() == descriptor.name()) {
                log::warn!("[Engine] Duplicate stem '{}' ignored", descriptor.name());
                continue;
            }
            unique.push(descriptor);
        }
        if unique.len() > self.config.max_stems {
            return Err(EngineError::TooManyStems(self.config.max_stems));
        }

        self.release_job();
        self.job_id = job_id.to_string();
        self.transport.set_state(EngineState::Loading);
        let generation = self.loader.begin_job();
        log::info!("[Engine] Loading job {} ({} stems)", job_id, unique.len());

        for (slot, descriptor) in unique.into_iter().enumerate() {
            let mut record = StemRecord::new(descriptor.clone());
            record.readiness = ReadinessState::Loading;
            self.stems.push(record);
            self.loader.spawn(generation, slot, descriptor);
        }

        let deadline = Instant::now() + self.config.load_timeout();
        while self.stems.iter().any(|s| s.readiness == ReadinessState::Loading) {
            match self.loader.recv_deadline(deadline) {
                Some(result) => self.apply_load(result),
                None => break,
            }
        }

        let pending: Vec<&str> = self
            .stems
            .iter()
            .filter(|s| s.readiness == ReadinessState::Loading)
            .map(|s| s.name.as_str())
            .collect();
        if !pending.is_empty() {
            log::info!("[Engine] Still loading after timeout: {:?}", pending);
        }
        if !self.stems.is_empty() && self.stems.iter().all(|s| s.readiness == ReadinessState::Error) {
            log::warn!("[Engine] No stem of job {} could be loaded", job_id);
        }
        Ok(())
    }

    /// Applies loads that finished since the last call. Returns how many
    /// results were taken.
    pub fn poll_loads(&mut self) -> usize {
        let mut taken = 0;
        while let Some(result) = self.loader.try_recv() {
            self.apply_load(result);
            taken += 1;
        }
        taken
    }

    fn apply_load(&mut self, result: LoadResult) {
        if result.generation != self.loader.generation() {
            log::debug!("[Engine] Dropping stale load of {}", result.name);
            return;
        }
        let Some(record) = self.stems.get_mut(result.slot) else { return };

        match result.outcome {
            Ok(resolved) => {
                record.resolution = ResolutionState::Attaching;
                let stage = (!resolved.stage.is_empty()).then_some(resolved.stage);
                let outcome = self.attach_resolved(result.slot, &resolved.url, stage, resolved.audio);
                log::debug!("[Engine] {} attached: {:?}", result.name, outcome);
                if self.selected.as_deref() == Some(result.name.as_str())
                    && matches!(self.peaks.state(), PeakState::Idle)
                {
                    self.select_stem(&result.name);
                }
            }
            Err(err) => {
                log::warn!("[Engine] {}: {}", result.name, err);
                record.readiness = ReadinessState::Error;
                record.resolution = ResolutionState::Error;
                record.error = Some(err);
            }
        }
    }

    /// Lazily attaches a signal chain for `descriptor`, once per identity.
    /// Calling it again with a new URL swaps the source but keeps the chain.
    pub fn attach_stem(
        &mut self,
        descriptor: &StemDescriptor,
        url: &str,
        audio: DecodedAudio,
    ) -> Result<AttachOutcome, EngineError> {
        let slot = match self.slot_of(descriptor.name()) {
            Some(slot) => slot,
            None => {
                if self.stems.len() >= self.config.max_stems {
                    return Err(EngineError::TooManyStems(self.config.max_stems));
                }
                self.stems.push(StemRecord::new(descriptor.clone()));
                self.stems.len() - 1
            }
        };

        if self.stems[slot].voice.is_some() && self.stems[slot].url.as_deref() == Some(url) {
            return Ok(AttachOutcome::Unchanged);
        }

        let audio = match audio.to_sample_rate(self.sample_rate, url) {
            Ok(audio) => audio,
            Err(err) => {
                let record = &mut self.stems[slot];
                record.readiness = ReadinessState::Error;
                record.resolution = ResolutionState::Error;
                record.error = Some(err.clone());
                return Err(err.into());
            }
        };
        Ok(self.attach_resolved(slot, url, None, audio))
    }

    fn attach_resolved(&mut self, slot: usize, url: &str, stage: Option<String>, audio: DecodedAudio) -> AttachOutcome {
        let targets = self.mix_targets();
        let now = self.current_time();
        let sample_rate = self.sample_rate;
        let smoothing = self.config.smoothing_seconds;

        let record = &mut self.stems[slot];
        let key = SourceKey::new(self.job_id.clone(), record.descriptor.file_name.clone());
        let frames = audio.frames() as u64;

        let existing = record.voice.clone();
        let outcome = match existing {
            Some(_) if record.url.as_deref() == Some(url) => AttachOutcome::Unchanged,
            Some(_) => {
                if self.commands.send(RenderCommand::ReplaceSource { slot, audio: audio.clone() }).is_err() {
                    log::warn!("[Engine] Renderer gone; {} not refreshed", record.name);
                }
                log::info!("[Engine] {} source refreshed: {}", record.name, url);
                AttachOutcome::Refreshed
            }
            None => {
                let (gain, pan) = targets.get(slot).copied().unwrap_or((1.0, 0.0));
                let voice = Arc::new(VoiceShared::new(frames, gain, pan));
                voice.set_punch(record.punch);
                // Estimate only; the renderer places it at its transport position.
                voice.seek_frames(seconds_to_frames(now, sample_rate));
                let stem_voice = StemVoice::new(slot, voice.clone(), audio.clone(), sample_rate as f32, smoothing);
                if self.commands.send(RenderCommand::AttachVoice(Box::new(stem_voice))).is_err() {
                    log::warn!("[Engine] Renderer gone; {} not attached", record.name);
                }
                record.voice = Some(voice);
                log::info!("[Engine] {} attached from {} ({:.2}s)", record.name, url, audio.duration_seconds());
                AttachOutcome::Created
            }
        };

        record.url = Some(url.to_string());
        if stage.is_some() {
            record.stage = stage;
        }
        record.duration = audio.duration_seconds();
        record.readiness = ReadinessState::Ready;
        record.resolution = ResolutionState::Ready;
        record.error = None;

        let mut pool = (**self.pool.load()).clone();
        pool.insert(key, audio);
        self.pool.store(Arc::new(pool));

        self.transport.extend_duration(self.stems[slot].duration);
        if matches!(self.transport.state(), EngineState::Uninitialized | EngineState::Loading) {
            self.transport.set_state(EngineState::Ready);
        }
        outcome
    }

    fn slot_of(&self, name: &str) -> Option<usize> {
        self.stems.iter().position(|s| s.name == name)
    }

    // ---- Transport ----

    /// Starts every ready stem at the pause offset (or 0 once the end was
    /// reached). With no ready stem this does nothing.
    pub fn play(&mut self) -> Result<PlayReport, EngineError> {
        if !self.stems.iter().any(|s| s.readiness == ReadinessState::Ready) {
            log::debug!("[Engine] play() ignored: no stem is ready");
            return Ok(PlayReport::default());
        }
        if self.is_playing() {
            return Ok(self.play_report());
        }

        if let Some(output) = self.output.as_mut() {
            if let Err(err) = output.resume() {
                log::warn!("[Engine] Playback did not start: {}", err);
                return Err(err);
            }
        }

        let offset = self.transport.start_offset();
        self.transport.set_pause_offset(offset);
        let epoch = self.transport.begin_epoch(offset);
        self.send(RenderCommand::Start { frame: seconds_to_frames(offset, self.sample_rate), epoch });
        self.transport.set_state(EngineState::Playing);
        self.max_drift = 0.0;

        let report = self.play_report();
        log::info!(
            "[Engine] Playing from {:.3}s (epoch {}): {} started, {} pending, {} failed",
            offset,
            self.transport.epoch(),
            report.started.len(),
            report.pending.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn play_report(&self) -> PlayReport {
        let mut report = PlayReport::default();
        for stem in &self.stems {
            match (stem.readiness, &stem.voice) {
                (ReadinessState::Ready, Some(_)) => report.started.push(stem.name.clone()),
                (ReadinessState::Ready, None) => report.failed.push((
                    stem.name.clone(),
                    StemError::PlaybackStart { stem: stem.name.clone(), reason: "no signal chain".into() },
                )),
                (ReadinessState::Error, _) => {
                    let err = stem.error.clone().unwrap_or_else(|| StemError::SourceResolution {
                        file_name: stem.descriptor.file_name.clone(),
                        attempts: 0,
                    });
                    report.failed.push((stem.name.clone(), err));
                }
                _ => report.pending.push(stem.name.clone()),
            }
        }
        report
    }

    /// Freezes the transport at the reference stem's position.
    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        let offset = self.live_time();
        self.send(RenderCommand::Halt);
        self.transport.set_pause_offset(offset);
        self.transport.set_state(EngineState::Paused);
        log::info!("[Engine] Paused at {:.3}s", self.transport.pause_offset());
    }

    pub fn stop(&mut self) {
        self.pause();
        self.transport.set_pause_offset(0.0);
        self.locate(0.0);
        if self.transport.state().is_playable() {
            self.transport.set_state(EngineState::Stopped);
        }
    }

    /// Moves every stem to `seconds` (clamped to the duration). Playback
    /// continues from there if it was running. Returns the applied time.
    pub fn seek(&mut self, seconds: f64) -> f64 {
        let target = self.transport.clamp_time(seconds);
        self.transport.set_pause_offset(target);
        self.locate(target);
        if self.transport.state() == EngineState::Stopped && target > 0.0 {
            self.transport.set_state(EngineState::Paused);
        }
        log::debug!("[Engine] Seek to {:.3}s", target);
        target
    }

    /// Sends every voice to `seconds` on one renderer block.
    fn locate(&mut self, seconds: f64) {
        let epoch = self.transport.begin_epoch(seconds);
        self.send(RenderCommand::Locate { frame: seconds_to_frames(seconds, self.sample_rate), epoch });
    }

    fn send(&self, command: RenderCommand) {
        if self.commands.send(command).is_err() {
            log::debug!("[Engine] Renderer already gone");
        }
    }

    /// Seek driven by a click on a waveform `width` pixels wide.
    pub fn seek_to_click(&mut self, x: f32, width: f32) -> f64 {
        let target = seek_time_for_click(x, width, self.duration());
        self.seek(target)
    }

    /// Live position of the reference stem while playing, the stored pause
    /// offset otherwise.
    pub fn current_time(&self) -> f64 {
        if self.is_playing() { self.live_time() } else { self.transport.pause_offset() }
    }

    fn live_time(&self) -> f64 {
        if !self.renderer_caught_up() {
            return self.transport.clamp_time(self.transport.epoch_offset());
        }
        match self.reference_voice() {
            Some(voice) => self.transport.clamp_time(frames_to_seconds(voice.position_frames(), self.sample_rate)),
            None => self
                .transport
                .clamp_time(self.transport.clock_time(self.shared.frames_since_epoch(), self.sample_rate)),
        }
    }

    /// The longest ready stem drives the transport clock.
    fn reference_voice(&self) -> Option<&Arc<VoiceShared>> {
        let mut best: Option<(f64, &Arc<VoiceShared>)> = None;
        for stem in &self.stems {
            if stem.readiness != ReadinessState::Ready {
                continue;
            }
            let Some(voice) = stem.voice.as_ref() else { continue };
            if best.is_none_or(|(duration, _)| stem.duration > duration) {
                best = Some((stem.duration, voice));
            }
        }
        best.map(|(_, voice)| voice)
    }

    /// Pull-style transport update for a UI frame: applies finished loads,
    /// notices the end of media and measures drift between stems.
    pub fn sample_transport(&mut self) -> TransportSnapshot {
        self.poll_loads();

        // Voice state is stale until the renderer took the last move.
        if self.is_playing() && self.renderer_caught_up() {
            let running: Vec<&Arc<VoiceShared>> = self.stems.iter().filter_map(|s| s.voice.as_ref()).collect();
            if !running.is_empty() && running.iter().all(|v| v.has_ended()) {
                self.send(RenderCommand::Halt);
                self.transport.set_pause_offset(self.transport.duration());
                self.transport.set_state(EngineState::Paused);
                log::info!("[Engine] Reached the end at {:.3}s", self.transport.duration());
            } else {
                self.observe_drift();
            }
        }

        TransportSnapshot {
            state: self.transport.state(),
            is_playing: self.is_playing(),
            current_time: self.current_time(),
            duration: self.transport.duration(),
            transport_epoch: self.transport.epoch_origin(self.shared.epoch_clock(), self.sample_rate),
            max_drift: self.max_drift,
        }
    }

    fn observe_drift(&mut self) {
        let Some(reference) = self.reference_voice() else { return };
        let reference_frames = reference.position_frames();
        let mut drift = 0.0f64;
        for stem in &self.stems {
            let Some(voice) = stem.voice.as_ref() else { continue };
            if voice.has_ended() {
                continue;
            }
            let delta = voice.position_frames().abs_diff(reference_frames);
            drift = drift.max(frames_to_seconds(delta, self.sample_rate));
        }

        let clock = self.transport.clock_time(self.shared.frames_since_epoch(), self.sample_rate);
        let clock_delta = (clock - frames_to_seconds(reference_frames, self.sample_rate)).abs();
        log::trace!("[Engine] Reference is {:.4}s off the renderer clock", clock_delta);

        if drift > self.config.drift_warning_seconds {
            log::warn!("[Engine] TimingDriftWarning: stems are {:.4}s apart", drift);
        }
        self.max_drift = self.max_drift.max(drift);
    }

    // ---- Mix controls ----

    /// Merges `update` into the named stem, then recomputes every stem's gain
    /// and pan. Returns false for an unknown stem.
    pub fn set_stem_control(&mut self, name: &str, update: &StemControlUpdate) -> bool {
        let Some(slot) = self.slot_of(name) else {
            log::debug!("[Engine] set_stem_control: unknown stem {}", name);
            return false;
        };
        if update.apply_to(&mut self.stems[slot].controls) {
            self.recompute_mix();
        }
        true
    }

    pub fn stem_controls(&self, name: &str) -> Option<StemControls> {
        self.slot_of(name).map(|slot| self.stems[slot].controls)
    }

    /// Gain and pan target of every stem, in registry order. Audibility is
    /// resolved over the full stem set.
    fn mix_targets(&self) -> Vec<(f32, f32)> {
        let controls: Vec<StemControls> = self.stems.iter().map(|s| s.controls).collect();
        resolve_audibility(&controls)
            .into_iter()
            .zip(&self.stems)
            .map(|(audible, stem)| {
                let gain = if audible { db_to_gain(stem.controls.volume_db) } else { 0.0 };
                (gain, stem.controls.effective_pan())
            })
            .collect()
    }

    fn recompute_mix(&mut self) {
        let targets = self.mix_targets();
        for (stem, (gain, pan)) in self.stems.iter().zip(targets) {
            if let Some(voice) = &stem.voice {
                voice.set_gain_target(gain);
                voice.set_pan_target(pan);
            }
        }
    }

    /// Current gain target of a stem's chain (after mute/solo resolution).
    pub fn stem_gain_target(&self, name: &str) -> Option<f32> {
        self.slot_of(name).and_then(|slot| self.stems[slot].voice.as_ref()).map(|v| v.gain_target())
    }

    pub fn stem_pan_target(&self, name: &str) -> Option<f32> {
        self.slot_of(name).and_then(|slot| self.stems[slot].voice.as_ref()).map(|v| v.pan_target())
    }

    /// Playback position of one stem in seconds.
    pub fn stem_position(&self, name: &str) -> Option<f64> {
        let voice = self.slot_of(name).and_then(|slot| self.stems[slot].voice.as_ref())?;
        let frames = if self.renderer_caught_up() {
            voice.position_frames()
        } else {
            seconds_to_frames(self.transport.epoch_offset(), self.sample_rate).min(voice.length_frames())
        };
        Some(frames_to_seconds(frames, self.sample_rate))
    }

    /// Linear master gain, smoothed on the audio thread.
    pub fn set_master_volume(&mut self, gain: f32) {
        if gain.is_finite() {
            self.shared.set_master_gain(gain);
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.master_gain()
    }

    /// Routes one stem through its transient insert; `None` bypasses it.
    pub fn set_stem_punch(&mut self, name: &str, punch: Option<f32>) -> bool {
        let Some(slot) = self.slot_of(name) else { return false };
        let record = &mut self.stems[slot];
        record.punch = punch;
        if let Some(voice) = &record.voice {
            voice.set_punch(punch);
        }
        true
    }

    pub fn set_master_punch(&mut self, punch: Option<f32>) {
        self.shared.set_master_punch(punch);
    }

    pub fn master_levels(&mut self) -> MeterLevels {
        self.analyser.update();
        self.analyser.levels()
    }

    pub fn master_time_domain(&mut self) -> Vec<f32> {
        self.analyser.update();
        self.analyser.time_domain()
    }

    // ---- Waveform ----

    /// Makes `name` the displayed stem and starts producing its peaks.
    /// Returns `None` for an unknown stem.
    pub fn select_stem(&mut self, name: &str) -> Option<&PeakState> {
        let slot = self.slot_of(name)?;
        self.selected = Some(name.to_string());
        let record = &self.stems[slot];
        let key = SourceKey::new(self.job_id.clone(), record.descriptor.file_name.clone());

        if let Some(peaks) = &record.descriptor.precomputed_peaks {
            return Some(self.peaks.request(key, PeakSource::Precomputed(peaks.clone())));
        }
        if let Some(audio) = self.pool.load().get(&key).cloned() {
            return Some(self.peaks.request(key, PeakSource::Decoded(audio)));
        }
        if record.readiness == ReadinessState::Error {
            let err = record.error.clone();
            return Some(self.peaks.mark_unavailable(key, err));
        }
        if let Some(url) = record.url.clone() {
            let loader = self.loader.media().clone();
            return Some(self.peaks.request(key, PeakSource::Fetch { location: url, loader }));
        }
        // Not loaded yet; requested again once it attaches.
        self.peaks.cancel();
        Some(self.peaks.state())
    }

    pub fn selected_stem(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn peak_state(&mut self) -> &PeakState {
        self.peaks.poll();
        self.peaks.state()
    }

    /// Blocks up to `timeout` for the selected stem's peaks.
    pub fn wait_for_peaks(&mut self, timeout: std::time::Duration) -> bool {
        self.peaks.wait(timeout)
    }

    /// Bar layout of the selected stem at the current transport position.
    pub fn waveform_frame(&mut self, width: f32, height: f32) -> WaveformFrame {
        self.peaks.poll();
        let current = self.current_time();
        let duration = self.duration();
        layout_waveform(self.peaks.active_peaks().map(|p| p.as_slice()), current, duration, width, height)
    }

    pub fn waveform_pixels(&mut self, width: u32, height: u32, theme: &WaveformTheme) -> Vec<u8> {
        let frame = self.waveform_frame(width as f32, height as f32);
        rasterize(&frame, theme)
    }

    // ---- Reporting ----

    pub fn stem_statuses(&self) -> Vec<StemStatus> {
        self.stems
            .iter()
            .map(|s| StemStatus {
                name: s.name.clone(),
                file_name: s.descriptor.file_name.clone(),
                readiness: s.readiness,
                url: s.url.clone(),
                stage: s.stage.clone(),
                duration: s.duration,
                error: s.error.as_ref().map(|e| e.to_string()),
                controls: s.controls,
            })
            .collect()
    }

    pub fn resolution_state(&self, name: &str) -> Option<ResolutionState> {
        self.slot_of(name).map(|slot| self.stems[slot].resolution)
    }

    /// The adjustments to submit for re-rendering.
    pub fn correction_payload(&self) -> CorrectionPayload {
        CorrectionPayload::from_stems(self.stems.iter().map(|s| (s.name.as_str(), &s.controls)))
    }

    // ---- Lifecycle ----

    fn release_job(&mut self) {
        if !self.stems.is_empty() {
            self.send(RenderCommand::Halt);
            self.send(RenderCommand::DetachAll);
        }
        self.stems.clear();
        self.peaks.cancel();
        self.selected = None;
        self.loader.begin_job();
        self.pool.store(Arc::new(AudioPool::new()));
        self.transport.reset();
        self.max_drift = 0.0;
    }

    /// Drops every stem and suspends the output. The engine can load a new
    /// job afterwards.
    pub fn teardown(&mut self) {
        log::info!("[Engine] Teardown");
        self.release_job();
        if let Some(output) = self.output.as_mut() {
            if let Err(err) = output.suspend() {
                log::warn!("[Engine] Output did not suspend: {}", err);
            }
        }
        self.job_id.clear();
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.commands.send(RenderCommand::Halt);
        self.loader.begin_job();
    }
}

#[inline]
fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as u64
}

#[inline]
fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}
