//! Peak extraction for waveform display.
//!
//! `compute_peaks` reduces a channel to per-bucket RMS. `PeakCache` keeps the
//! result per (job, file) so revisiting a stem skips fetch, decode and
//! recompute. `PeakService` runs the expensive path on a worker thread and
//! drops results that arrive after the selection has moved on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;

use crate::assets::{DecodedAudio, SourceKey};
use crate::error::StemError;
use crate::source::{LoadFailure, MediaLoader};

pub type Peaks = Arc<Vec<f32>>;

/// Per-bucket RMS of `samples`. Buckets are `len / bucket_count` samples wide
/// and the last one absorbs the remainder. Returns an empty vector when there
/// are fewer samples than buckets.
pub fn compute_peaks(samples: &[f32], bucket_count: usize) -> Vec<f32> {
    if bucket_count == 0 || samples.len() / bucket_count < 1 {
        return Vec::new();
    }
    let bucket_size = samples.len() / bucket_count;

    (0..bucket_count)
        .into_par_iter()
        .map(|bucket| {
            let start = bucket * bucket_size;
            let end = if bucket + 1 == bucket_count { samples.len() } else { start + bucket_size };
            let window = &samples[start..end];
            let sum_sq: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum_sq / window.len() as f64).sqrt() as f32
        })
        .collect()
}

/// Peaks of the first channel of a decoded source.
pub fn peaks_for_audio(audio: &DecodedAudio, bucket_count: usize) -> Vec<f32> {
    compute_peaks(&audio.channel(0), bucket_count)
}

/// Peak buffers keyed by (job, file). Entries are immutable and never evicted
/// automatically; the owner decides when to call `remove_job` or `clear`.
#[derive(Clone, Default)]
pub struct PeakCache {
    entries: Arc<Mutex<HashMap<SourceKey, Peaks>>>,
}

impl PeakCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SourceKey, Peaks>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &SourceKey) -> Option<Peaks> {
        self.lock().get(key).cloned()
    }

    /// Inserts unless an entry already exists; the stored buffer is returned either way.
    pub fn insert(&self, key: SourceKey, peaks: Vec<f32>) -> Peaks {
        self.lock().entry(key).or_insert_with(|| Arc::new(peaks)).clone()
    }

    pub fn remove_job(&self, job_id: &str) {
        self.lock().retain(|key, _| key.job_id != job_id);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Where the peaks for a selection come from.
pub enum PeakSource {
    /// Supplied with the stem list; used as-is.
    Precomputed(Vec<f32>),
    /// Already decoded by the engine.
    Decoded(DecodedAudio),
    /// Has to be fetched and decoded first.
    Fetch { location: String, loader: Arc<dyn MediaLoader> },
}

#[derive(Debug, Clone)]
pub enum PeakState {
    Idle,
    Pending,
    Ready(Peaks),
    /// Nothing to draw; the waveform falls back to a flat line.
    Unavailable(Option<StemError>),
}

struct PeakResult {
    generation: u64,
    key: SourceKey,
    outcome: Result<Peaks, Option<StemError>>,
}

pub struct PeakService {
    cache: PeakCache,
    bucket_count: usize,
    generation: Arc<AtomicU64>,
    result_tx: Sender<PeakResult>,
    result_rx: Receiver<PeakResult>,
    active: Option<SourceKey>,
    state: PeakState,
}

impl PeakService {
    pub fn new(cache: PeakCache, bucket_count: usize) -> Self {
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        Self {
            cache,
            bucket_count,
            generation: Arc::new(AtomicU64::new(0)),
            result_tx,
            result_rx,
            active: None,
            state: PeakState::Idle,
        }
    }

    pub fn cache(&self) -> &PeakCache {
        &self.cache
    }

    pub fn state(&self) -> &PeakState {
        &self.state
    }

    pub fn active_key(&self) -> Option<&SourceKey> {
        self.active.as_ref()
    }

    pub fn active_peaks(&self) -> Option<&Peaks> {
        match &self.state {
            PeakState::Ready(peaks) => Some(peaks),
            _ => None,
        }
    }

    /// Selects `key` as the displayed stem. Cached and precomputed peaks are
    /// available immediately; anything else is computed in the background and
    /// shows up through `poll`.
    pub fn request(&mut self, key: SourceKey, source: PeakSource) -> &PeakState {
        if self.active.as_ref() == Some(&key) && matches!(self.state, PeakState::Pending | PeakState::Ready(_)) {
            return &self.state;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.active = Some(key.clone());

        if let PeakSource::Precomputed(peaks) = source {
            self.state = if peaks.is_empty() {
                PeakState::Unavailable(None)
            } else {
                PeakState::Ready(Arc::new(peaks))
            };
            return &self.state;
        }

        if let Some(peaks) = self.cache.get(&key) {
            log::debug!("[Peaks] cache hit for {}/{}", key.job_id, key.file_name);
            self.state = PeakState::Ready(peaks);
            return &self.state;
        }

        self.state = PeakState::Pending;
        let cache = self.cache.clone();
        let current = self.generation.clone();
        let tx = self.result_tx.clone();
        let bucket_count = self.bucket_count;

        let spawned = thread::Builder::new().name("mixdesk-peaks".into()).spawn(move || {
            let is_current = || current.load(Ordering::SeqCst) == generation;

            let audio = match source {
                PeakSource::Decoded(audio) => audio,
                PeakSource::Fetch { location, loader } => {
                    if !is_current() {
                        return;
                    }
                    match loader.load(&location) {
                        Ok(audio) => audio,
                        Err(LoadFailure::Corrupt(reason)) => {
                            let _ = tx.send(PeakResult {
                                generation,
                                key,
                                outcome: Err(Some(StemError::decode(location, reason))),
                            });
                            return;
                        }
                        Err(LoadFailure::Unreachable(_)) => {
                            let _ = tx.send(PeakResult { generation, key, outcome: Err(None) });
                            return;
                        }
                    }
                }
                PeakSource::Precomputed(_) => return,
            };

            if !is_current() {
                return;
            }
            let peaks = peaks_for_audio(&audio, bucket_count);
            let outcome = if peaks.is_empty() { Err(None) } else { Ok(cache.insert(key.clone(), peaks)) };
            let _ = tx.send(PeakResult { generation, key, outcome });
        });

        if let Err(e) = spawned {
            log::warn!("[Peaks] could not spawn worker: {}", e);
            self.state = PeakState::Unavailable(None);
        }
        &self.state
    }

    /// Selects `key` knowing there is nothing to draw for it (the stem failed
    /// to load). Any work in flight for a previous selection is discarded.
    pub fn mark_unavailable(&mut self, key: SourceKey, error: Option<StemError>) -> &PeakState {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.active = Some(key);
        self.state = PeakState::Unavailable(error);
        &self.state
    }

    /// Forgets the current selection; results still in flight are discarded.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.active = None;
        self.state = PeakState::Idle;
    }

    /// Commits finished work for the current selection. Returns true when the
    /// state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(result) = self.result_rx.try_recv() {
            changed |= self.commit(result);
        }
        changed
    }

    /// Like `poll`, but waits up to `timeout` for the pending selection.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if !matches!(self.state, PeakState::Pending) {
            return self.poll();
        }
        let deadline = std::time::Instant::now() + timeout;
        while matches!(self.state, PeakState::Pending) {
            match self.result_rx.recv_deadline(deadline) {
                Ok(result) => {
                    self.commit(result);
                }
                Err(_) => break,
            }
        }
        !matches!(self.state, PeakState::Pending)
    }

    fn commit(&mut self, result: PeakResult) -> bool {
        let current = self.generation.load(Ordering::SeqCst);
        if result.generation != current || self.active.as_ref() != Some(&result.key) {
            log::debug!("[Peaks] dropping stale result for {}", result.key.file_name);
            return false;
        }
        self.state = match result.outcome {
            Ok(peaks) => PeakState::Ready(peaks),
            Err(err) => {
                if let Some(err) = &err {
                    log::warn!("[Peaks] {}", err);
                }
                PeakState::Unavailable(err)
            }
        };
        true
    }
}
