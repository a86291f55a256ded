//! End-to-end engine tests. Most pump the renderer by hand, so no audio
//! device is needed and time advances exactly as far as the test says. The
//! `threaded_*` tests run it on its own thread the way an output callback does.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use mixdesk_shared::{EngineState, ReadinessState, StemControlUpdate, StemDescriptor, db_to_gain};

use crate::assets::{DecodedAudio, SourceKey};
use crate::config::EngineConfig;
use crate::engine::{AttachOutcome, PlayReport, PlaybackEngine};
use crate::error::{EngineError, StemError};
use crate::output::{ManualOutput, OutputControl};
use crate::peaks::PeakState;
use crate::renderer::MixRenderer;
use crate::source::{LoadFailure, MediaLoader, ResolutionState, UrlResolver};
use crate::waveform::{WaveformShape, WaveformTheme};

const SR: u32 = 8_000;

/// Resolver and loader over an in-memory file tree (`stage/file` or `file`).
#[derive(Default)]
struct MemoryMedia {
    files: HashMap<String, DecodedAudio>,
    corrupt: Vec<String>,
    slow: Option<(String, Duration)>,
    loads: AtomicUsize,
}

impl MemoryMedia {
    fn with_stem(mut self, path: &str, seconds: f64, level: f32) -> Self {
        let frames = (seconds * SR as f64) as usize;
        self.files.insert(path.to_string(), DecodedAudio::new(vec![level; frames * 2], 2, SR));
        self
    }

    fn with_corrupt(mut self, path: &str) -> Self {
        self.corrupt.push(path.to_string());
        self
    }

    fn with_slow(mut self, path: &str, delay_ms: u64) -> Self {
        self.slow = Some((path.to_string(), Duration::from_millis(delay_ms)));
        self
    }
}

impl UrlResolver for MemoryMedia {
    fn resolve(&self, stage: &str, file_name: &str) -> Option<String> {
        let key = if stage.is_empty() { file_name.to_string() } else { format!("{}/{}", stage, file_name) };
        (self.files.contains_key(&key) || self.corrupt.contains(&key)).then(|| format!("mem://{}", key))
    }
}

impl MediaLoader for MemoryMedia {
    fn load(&self, location: &str) -> Result<DecodedAudio, LoadFailure> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let key = location.strip_prefix("mem://").unwrap_or(location);
        if let Some((path, delay)) = &self.slow {
            if path == key {
                thread::sleep(*delay);
            }
        }
        if self.corrupt.iter().any(|c| c == key) {
            return Err(LoadFailure::Corrupt("truncated header".into()));
        }
        self.files.get(key).cloned().ok_or_else(|| LoadFailure::Unreachable(format!("{} not found", key)))
    }
}

struct RefusingOutput;

impl OutputControl for RefusingOutput {
    fn resume(&mut self) -> Result<(), EngineError> {
        Err(EngineError::PlaybackStart("device busy".into()))
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        sample_rate: SR,
        fallback_stages: vec!["mastered".into(), "separated".into(), String::new()],
        ..EngineConfig::default()
    }
}

fn build(media: MemoryMedia, config: EngineConfig) -> (PlaybackEngine, MixRenderer, Arc<MemoryMedia>) {
    let media = Arc::new(media);
    let (engine, renderer) = PlaybackEngine::new(config, media.clone(), media.clone()).unwrap();
    (engine, renderer, media)
}

/// Two stems, 10 s and 12 s, loaded as job-1.
fn two_stems() -> (PlaybackEngine, MixRenderer) {
    let media = MemoryMedia::default()
        .with_stem("mastered/drums.wav", 10.0, 0.25)
        .with_stem("mastered/bass.wav", 12.0, 0.25);
    let (mut engine, renderer, _) = build(media, config());
    engine
        .load_job("job-1", vec![StemDescriptor::new("drums.wav"), StemDescriptor::new("bass.wav")])
        .unwrap();
    (engine, renderer)
}

fn pump(renderer: &mut MixRenderer, seconds: f64) {
    let mut remaining = (seconds * SR as f64).round() as usize;
    let mut buffer = vec![0.0f32; 256 * 2];
    while remaining > 0 {
        let n = remaining.min(256);
        renderer.process(&mut buffer[..n * 2], 2);
        remaining -= n;
    }
}

/// Drives a renderer from its own thread with 1024-frame buffers until dropped.
struct RenderThread {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RenderThread {
    fn spawn(mut renderer: MixRenderer) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("mixdesk-test-render".into())
            .spawn(move || {
                let mut buffer = vec![0.0f32; 1024 * 2];
                while !flag.load(Ordering::Acquire) {
                    renderer.process(&mut buffer, 2);
                    thread::sleep(Duration::from_millis(2));
                }
            })
            .unwrap();
        Self { stop, handle: Some(handle) }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Blocks until the renderer took every queued move and stopped the clock.
fn wait_until_halted(engine: &PlaybackEngine) {
    for _ in 0..8_000 {
        if engine.renderer_caught_up() && !engine.is_clock_running() {
            return;
        }
        thread::sleep(Duration::from_micros(250));
    }
    panic!("renderer never halted");
}

#[test]
fn test_duration_is_longest_stem_and_pause_holds_position() {
    let (mut engine, mut renderer) = two_stems();
    assert_eq!(engine.state(), EngineState::Ready);
    assert_abs_diff_eq!(engine.duration(), 12.0, epsilon = 1e-9);

    let report = engine.play().unwrap();
    assert_eq!(report.started, vec!["drums".to_string(), "bass".to_string()]);
    assert!(engine.is_playing());

    pump(&mut renderer, 3.0);
    engine.pause();
    assert_eq!(engine.state(), EngineState::Paused);
    assert_abs_diff_eq!(engine.current_time(), 3.0, epsilon = 1e-6);

    // Stems moved in lockstep.
    assert_eq!(engine.stem_position("drums"), engine.stem_position("bass"));

    // Nothing moves while paused.
    pump(&mut renderer, 1.0);
    assert_abs_diff_eq!(engine.current_time(), 3.0, epsilon = 1e-6);

    engine.play().unwrap();
    pump(&mut renderer, 1.0);
    assert_abs_diff_eq!(engine.current_time(), 4.0, epsilon = 1e-6);
}

#[test]
fn test_seek_while_playing_keeps_playing() {
    let (mut engine, mut renderer) = two_stems();
    engine.play().unwrap();
    pump(&mut renderer, 1.0);

    assert_abs_diff_eq!(engine.seek(5.0), 5.0, epsilon = 1e-9);
    assert!(engine.is_playing());
    assert_abs_diff_eq!(engine.current_time(), 5.0, epsilon = 1e-6);

    pump(&mut renderer, 1.0);
    assert_abs_diff_eq!(engine.current_time(), 6.0, epsilon = 1e-6);
    let snapshot = engine.sample_transport();
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.state, EngineState::Playing);
    assert!(snapshot.max_drift < 1e-9);
}

#[test]
fn test_seek_clamps_and_play_at_end_restarts() {
    let (mut engine, _renderer) = two_stems();
    assert_eq!(engine.seek(-3.0), 0.0);
    assert_abs_diff_eq!(engine.seek(100.0), 12.0, epsilon = 1e-9);
    assert_abs_diff_eq!(engine.current_time(), 12.0, epsilon = 1e-9);

    engine.play().unwrap();
    assert_eq!(engine.current_time(), 0.0);
}

#[test]
fn test_reaching_the_end_pauses_at_duration() {
    let (mut engine, mut renderer) = two_stems();
    engine.seek(11.5);
    engine.play().unwrap();
    pump(&mut renderer, 1.0);

    let snapshot = engine.sample_transport();
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.state, EngineState::Paused);
    assert_abs_diff_eq!(snapshot.current_time, 12.0, epsilon = 1e-9);
    assert_abs_diff_eq!(snapshot.progress(), 1.0, epsilon = 1e-9);

    engine.play().unwrap();
    assert_eq!(engine.current_time(), 0.0);
}

#[test]
fn test_stop_rewinds() {
    let (mut engine, mut renderer) = two_stems();
    engine.play().unwrap();
    pump(&mut renderer, 2.0);
    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(engine.current_time(), 0.0);
    assert_eq!(engine.stem_position("bass"), Some(0.0));
}

#[test]
fn test_mute_and_solo_drive_gain_targets() {
    let (mut engine, _renderer) = two_stems();
    assert!(engine.set_stem_control("drums", &StemControlUpdate::volume_db(-6.0)));
    assert_abs_diff_eq!(engine.stem_gain_target("drums").unwrap(), db_to_gain(-6.0), epsilon = 1e-6);

    engine.set_stem_control("bass", &StemControlUpdate::solo(true));
    assert_eq!(engine.stem_gain_target("drums"), Some(0.0));
    assert_eq!(engine.stem_gain_target("bass"), Some(1.0));

    engine.set_stem_control("bass", &StemControlUpdate::solo(false));
    assert_abs_diff_eq!(engine.stem_gain_target("drums").unwrap(), db_to_gain(-6.0), epsilon = 1e-6);

    engine.set_stem_control("drums", &StemControlUpdate::mute(true));
    assert_eq!(engine.stem_gain_target("drums"), Some(0.0));
    // Volume is kept while muted.
    assert_eq!(engine.stem_controls("drums").unwrap().volume_db, -6.0);

    assert!(!engine.set_stem_control("cowbell", &StemControlUpdate::mute(true)));
}

#[test]
fn test_pan_follows_enabled_flag() {
    let (mut engine, _renderer) = two_stems();
    engine.set_stem_control("bass", &StemControlUpdate::pan(-0.5));
    assert_eq!(engine.stem_pan_target("bass"), Some(-0.5));
    engine.set_stem_control("bass", &StemControlUpdate { pan_enabled: Some(false), ..Default::default() });
    assert_eq!(engine.stem_pan_target("bass"), Some(0.0));
}

#[test]
fn test_play_with_nothing_ready_is_a_no_op() {
    let config = EngineConfig { load_timeout_ms: 2_000, ..config() };
    let (mut engine, _renderer, _) = build(MemoryMedia::default(), config);
    engine.load_job("job-1", vec![StemDescriptor::new("ghost.wav")]).unwrap();
    assert_eq!(engine.state(), EngineState::Loading);

    assert_eq!(engine.play().unwrap(), PlayReport::default());
    assert!(!engine.is_playing());

    let statuses = engine.stem_statuses();
    assert_eq!(statuses[0].readiness, ReadinessState::Error);
    assert!(statuses[0].error.is_some());
}

#[test]
fn test_stem_failures_are_isolated() {
    let media = MemoryMedia::default().with_stem("good.wav", 2.0, 0.5).with_corrupt("mastered/bad.wav");
    let (mut engine, _renderer, _) = build(media, config());
    engine
        .load_job(
            "job-1",
            vec![StemDescriptor::new("good.wav"), StemDescriptor::new("bad.wav"), StemDescriptor::new("missing.wav")],
        )
        .unwrap();
    assert_eq!(engine.state(), EngineState::Ready);

    let report = engine.play().unwrap();
    assert_eq!(report.started, vec!["good".to_string()]);
    assert_eq!(report.failed.len(), 2);
    assert!(matches!(report.failed[0], (ref name, StemError::Decode { .. }) if name == "bad"));
    assert_eq!(
        report.failed[1].1,
        StemError::SourceResolution { file_name: "missing.wav".into(), attempts: 3 }
    );
    assert_eq!(engine.resolution_state("missing"), Some(ResolutionState::Error));
    assert_eq!(engine.resolution_state("good"), Some(ResolutionState::Ready));
}

#[test]
fn test_candidates_fall_back_to_bare_file_name() {
    let media = MemoryMedia::default()
        .with_stem("vox.wav", 1.0, 0.1)
        .with_stem("separated/keys.wav", 1.0, 0.1);
    let (mut engine, _renderer, _) = build(media, config());
    engine
        .load_job(
            "job-1",
            vec![StemDescriptor::new("vox.wav").with_stage_hint("mixed"), StemDescriptor::new("keys.wav")],
        )
        .unwrap();

    let statuses = engine.stem_statuses();
    assert_eq!(statuses[0].url.as_deref(), Some("mem://vox.wav"));
    assert_eq!(statuses[0].stage, None);
    assert_eq!(statuses[1].url.as_deref(), Some("mem://separated/keys.wav"));
    assert_eq!(statuses[1].stage.as_deref(), Some("separated"));
}

#[test]
fn test_late_stem_joins_at_transport_position() {
    let media = MemoryMedia::default()
        .with_stem("mastered/drums.wav", 10.0, 0.25)
        .with_stem("slow.wav", 10.0, 0.25)
        .with_slow("slow.wav", 500);
    let config = EngineConfig { load_timeout_ms: 100, ..config() };
    let (mut engine, mut renderer, _) = build(media, config);
    engine
        .load_job("job-1", vec![StemDescriptor::new("drums.wav"), StemDescriptor::new("slow.wav")])
        .unwrap();
    assert_eq!(engine.state(), EngineState::Ready);

    let report = engine.play().unwrap();
    assert_eq!(report.pending, vec!["slow".to_string()]);
    pump(&mut renderer, 2.0);

    for _ in 0..200 {
        engine.sample_transport();
        if engine.stem_position("slow").is_some() {
            break;
        }
        thread::sleep(Duration::from_millis(25));
    }
    assert_abs_diff_eq!(engine.stem_position("slow").unwrap(), 2.0, epsilon = 1e-6);

    pump(&mut renderer, 1.0);
    assert_eq!(engine.stem_position("slow"), engine.stem_position("drums"));
    assert!(engine.sample_transport().max_drift < 0.02);
}

#[test]
fn test_output_refusal_leaves_engine_not_playing() {
    let (mut engine, _renderer) = two_stems();
    engine.set_output(Box::new(RefusingOutput));
    assert!(matches!(engine.play(), Err(EngineError::PlaybackStart(_))));
    assert!(!engine.is_playing());
    assert_eq!(engine.state(), EngineState::Ready);

    // Retried on the next play.
    engine.set_output(Box::new(ManualOutput::default()));
    assert!(engine.play().is_ok());
    assert!(engine.is_playing());
}

#[test]
fn test_selected_stem_peaks_and_waveform() {
    let (mut engine, _renderer) = two_stems();
    engine.select_stem("bass").unwrap();
    assert!(engine.wait_for_peaks(Duration::from_secs(10)));

    match engine.peak_state() {
        PeakState::Ready(peaks) => {
            assert_eq!(peaks.len(), 1000);
            assert_abs_diff_eq!(peaks[500], 0.25, epsilon = 1e-4);
        }
        other => panic!("unexpected peak state {:?}", other),
    }
    let frame = engine.waveform_frame(500.0, 100.0);
    match frame.shape {
        WaveformShape::Bars(bars) => assert_eq!(bars.len(), 1000),
        WaveformShape::FlatLine => panic!("expected bars"),
    }

    // Cached per job and file: switching back is immediate.
    engine.select_stem("drums");
    engine.select_stem("bass");
    assert!(matches!(engine.peak_state(), PeakState::Ready(_)));
    assert!(engine.peak_cache().get(&SourceKey::new("job-1", "bass.wav")).is_some());
}

#[test]
fn test_precomputed_and_failed_peaks() {
    let media = MemoryMedia::default().with_stem("pad.wav", 1.0, 0.5);
    let (mut engine, _renderer, media) = build(media, config());
    engine
        .load_job(
            "job-1",
            vec![StemDescriptor::new("pad.wav").with_peaks(vec![0.1, 0.5, 1.0]), StemDescriptor::new("lost.wav")],
        )
        .unwrap();
    let loads_before = media.loads.load(Ordering::SeqCst);

    assert!(matches!(engine.select_stem("pad"), Some(PeakState::Ready(p)) if p.len() == 3));
    assert_eq!(media.loads.load(Ordering::SeqCst), loads_before);

    assert!(matches!(engine.select_stem("lost"), Some(PeakState::Unavailable(Some(_)))));
    assert_eq!(engine.waveform_frame(100.0, 40.0).shape, WaveformShape::FlatLine);
    assert!(engine.select_stem("nobody").is_none());
}

#[test]
fn test_attach_stem_is_idempotent_per_identity() {
    let (mut engine, mut renderer, _) = build(MemoryMedia::default(), config());
    let descriptor = StemDescriptor::new("pad.wav");
    // 16 kHz source gets resampled to the engine rate.
    let audio = DecodedAudio::new(vec![0.2; 2 * 32_000], 2, 16_000);

    assert_eq!(engine.attach_stem(&descriptor, "mem://a/pad.wav", audio.clone()).unwrap(), AttachOutcome::Created);
    assert_eq!(engine.state(), EngineState::Ready);
    assert_abs_diff_eq!(engine.duration(), 2.0, epsilon = 1e-9);
    assert_eq!(
        engine.attach_stem(&descriptor, "mem://a/pad.wav", audio.clone()).unwrap(),
        AttachOutcome::Unchanged
    );
    assert_eq!(engine.attach_stem(&descriptor, "mem://b/pad.wav", audio).unwrap(), AttachOutcome::Refreshed);
    assert_eq!(engine.stem_statuses().len(), 1);

    pump(&mut renderer, 0.1);
    assert_eq!(renderer.voice_count(), 1);
}

#[test]
fn test_master_bus_is_metered() {
    let (mut engine, mut renderer) = two_stems();
    engine.play().unwrap();
    pump(&mut renderer, 0.5);
    let levels = engine.master_levels();
    assert_abs_diff_eq!(levels.peak, 0.5, epsilon = 1e-4);
    assert_abs_diff_eq!(levels.rms, 0.5, epsilon = 1e-4);

    engine.set_master_volume(0.0);
    pump(&mut renderer, 1.0);
    engine.master_time_domain();
    engine.set_master_punch(Some(0.5));
    assert!(engine.set_stem_punch("drums", Some(-0.5)));
    assert!(!engine.set_stem_punch("cowbell", Some(0.5)));
    assert_eq!(engine.master_volume(), 0.0);
}

#[test]
fn test_correction_payload_reflects_controls() {
    let (mut engine, _renderer) = two_stems();
    engine.set_stem_control("drums", &StemControlUpdate::volume_db(-3.0));
    engine.set_stem_control("bass", &StemControlUpdate::mute(true));

    let payload = engine.correction_payload();
    assert_eq!(payload.stems.len(), 2);
    assert_eq!(payload.stems[0].stem, "drums");
    assert_eq!(payload.stems[0].volume_db, -3.0);
    assert!(payload.stems[1].mute);

    let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
    assert_eq!(json["stems"][0]["volume_db"], -3.0);
}

#[test]
fn test_new_job_replaces_previous_stems() {
    let media = MemoryMedia::default()
        .with_stem("mastered/drums.wav", 1.0, 0.1)
        .with_stem("mastered/bass.wav", 1.0, 0.1)
        .with_stem("mastered/keys.wav", 3.0, 0.1);
    let (mut engine, mut renderer, _) = build(media, config());
    engine
        .load_job("job-1", vec![StemDescriptor::new("drums.wav"), StemDescriptor::new("bass.wav")])
        .unwrap();
    pump(&mut renderer, 0.1);
    assert_eq!(renderer.voice_count(), 2);

    engine.load_job("job-2", vec![StemDescriptor::new("keys.wav"), StemDescriptor::new("keys.wav")]).unwrap();
    pump(&mut renderer, 0.1);
    assert_eq!(renderer.voice_count(), 1);
    assert_eq!(engine.stem_statuses().len(), 1);
    assert_abs_diff_eq!(engine.duration(), 3.0, epsilon = 1e-9);
    assert!(engine.audio_pool().get(&SourceKey::new("job-1", "drums.wav")).is_none());
    assert!(engine.audio_pool().get(&SourceKey::new("job-2", "keys.wav")).is_some());
}

#[test]
fn test_too_many_stems_is_rejected() {
    let config = EngineConfig { max_stems: 1, ..config() };
    let (mut engine, _renderer, _) = build(MemoryMedia::default(), config);
    let err = engine
        .load_job("job-1", vec![StemDescriptor::new("a.wav"), StemDescriptor::new("b.wav")])
        .unwrap_err();
    assert!(matches!(err, EngineError::TooManyStems(1)));
}

#[test]
fn test_teardown_releases_everything() {
    let (mut engine, mut renderer) = two_stems();
    engine.play().unwrap();
    pump(&mut renderer, 0.5);
    engine.teardown();
    pump(&mut renderer, 0.1);

    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert!(engine.stem_statuses().is_empty());
    assert_eq!(renderer.voice_count(), 0);
    assert_eq!(engine.duration(), 0.0);
}

#[test]
fn test_click_on_waveform_seeks_transport() {
    let (mut engine, mut renderer) = two_stems();
    assert_abs_diff_eq!(engine.seek_to_click(250.0, 1000.0), 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(engine.current_time(), 3.0, epsilon = 1e-9);
    pump(&mut renderer, 0.1);
    assert_abs_diff_eq!(engine.stem_position("bass").unwrap(), 3.0, epsilon = 1e-9);

    // No peaks selected: flat line, played up to a quarter of the width.
    let theme = WaveformTheme::default();
    let pixels = engine.waveform_pixels(64, 16, &theme);
    assert_eq!(pixels.len(), 64 * 16 * 4);
    let at = |x: usize| &pixels[(8 * 64 + x) * 4..(8 * 64 + x) * 4 + 4];
    assert_eq!(at(0), theme.played);
    assert_eq!(at(63), theme.unplayed);

    assert_abs_diff_eq!(engine.seek_to_click(2000.0, 1000.0), 12.0, epsilon = 1e-9);
}

#[test]
fn test_threaded_seeks_keep_stems_in_step() {
    let mut media = MemoryMedia::default();
    let names: Vec<String> = (0..8).map(|i| format!("stem{}", i)).collect();
    for name in &names {
        media = media.with_stem(&format!("mastered/{}.wav", name), 60.0, 0.05);
    }
    let (mut engine, renderer, _) = build(media, config());
    engine
        .load_job("job-1", names.iter().map(|n| StemDescriptor::new(format!("{}.wav", n))).collect())
        .unwrap();
    assert_eq!(engine.play().unwrap().started.len(), names.len());
    let _render = RenderThread::spawn(renderer);

    for _ in 0..150 {
        let target = engine.seek(fastrand::f64() * 30.0);
        thread::sleep(Duration::from_micros(200));
        engine.pause();
        wait_until_halted(&engine);

        let positions: Vec<f64> = names.iter().map(|n| engine.stem_position(n).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] == w[1]), "stems apart after seek: {:?}", positions);
        assert!(positions[0] >= target - 1e-3);
        assert_eq!(engine.sample_transport().state, EngineState::Paused);

        engine.play().unwrap();
    }
}

#[test]
fn test_threaded_late_join_lands_on_transport() {
    let media = MemoryMedia::default().with_stem("mastered/lead.wav", 60.0, 0.05);
    let (mut engine, renderer, _) = build(media, config());
    engine.load_job("job-1", vec![StemDescriptor::new("lead.wav")]).unwrap();
    let _render = RenderThread::spawn(renderer);
    let audio = DecodedAudio::new(vec![0.05; 2 * 40 * SR as usize], 2, SR);

    for round in 0..10 {
        engine.play().unwrap();
        thread::sleep(Duration::from_millis(3));
        let name = format!("late{}", round);
        let descriptor = StemDescriptor::new(format!("{}.wav", name));
        let url = format!("mem://{}.wav", name);
        assert_eq!(engine.attach_stem(&descriptor, &url, audio.clone()).unwrap(), AttachOutcome::Created);
        thread::sleep(Duration::from_millis(1));
        engine.pause();
        wait_until_halted(&engine);

        assert_eq!(engine.stem_position(&name), engine.stem_position("lead"), "round {}", round);
    }
}
