//! Background stem loading. Each stem gets its own worker that walks the
//! source resolution machine, decodes and resamples to the engine rate, and
//! posts the outcome back to the control thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use mixdesk_shared::StemDescriptor;

use crate::error::StemError;
use crate::source::{MediaLoader, ResolvedSource, SourceResolution, UrlResolver};

pub struct LoadResult {
    /// Job generation the work was started for.
    pub generation: u64,
    pub slot: usize,
    pub name: String,
    pub outcome: Result<ResolvedSource, StemError>,
}

pub struct StemLoader {
    resolver: Arc<dyn UrlResolver>,
    media: Arc<dyn MediaLoader>,
    sample_rate: u32,
    fallback_stages: Vec<String>,
    generation: Arc<AtomicU64>,
    result_tx: Sender<LoadResult>,
    result_rx: Receiver<LoadResult>,
}

impl StemLoader {
    pub fn new(
        resolver: Arc<dyn UrlResolver>,
        media: Arc<dyn MediaLoader>,
        sample_rate: u32,
        fallback_stages: Vec<String>,
    ) -> Self {
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        Self {
            resolver,
            media,
            sample_rate,
            fallback_stages,
            generation: Arc::new(AtomicU64::new(0)),
            result_tx,
            result_rx,
        }
    }

    pub fn media(&self) -> &Arc<dyn MediaLoader> {
        &self.media
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Starts a new job; work still running for the old one becomes stale.
    pub fn begin_job(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn spawn(&self, generation: u64, slot: usize, descriptor: StemDescriptor) {
        let resolver = self.resolver.clone();
        let media = self.media.clone();
        let fallback = self.fallback_stages.clone();
        let current = self.generation.clone();
        let tx = self.result_tx.clone();
        let sample_rate = self.sample_rate;
        let name = descriptor.name().to_string();
        let worker_name = name.clone();

        let spawned = thread::Builder::new().name(format!("mixdesk-load-{}", slot)).spawn(move || {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            let mut resolution = SourceResolution::new(&descriptor, &fallback);
            let outcome = resolution.run(resolver.as_ref(), media.as_ref()).and_then(|mut resolved| {
                resolved.audio = resolved.audio.to_sample_rate(sample_rate, &resolved.url)?;
                Ok(resolved)
            });
            if current.load(Ordering::SeqCst) != generation {
                log::debug!("[Loader] {}: job changed, dropping result", worker_name);
                return;
            }
            let _ = tx.send(LoadResult { generation, slot, name: worker_name, outcome });
        });

        if let Err(e) = spawned {
            log::error!("[Loader] {}: could not spawn worker: {}", name, e);
            let _ = self.result_tx.send(LoadResult {
                generation,
                slot,
                name: name.clone(),
                outcome: Err(StemError::SourceResolution { file_name: name, attempts: 0 }),
            });
        }
    }

    pub fn try_recv(&self) -> Option<LoadResult> {
        self.result_rx.try_recv().ok()
    }

    pub fn recv_deadline(&self, deadline: Instant) -> Option<LoadResult> {
        self.result_rx.recv_deadline(deadline).ok()
    }
}
