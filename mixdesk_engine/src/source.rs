//! Locating and fetching a stem's media.
//!
//! Each stem walks an explicit state machine over its candidate locations:
//! `Resolving(0) -> Resolving(1) -> ... -> Attaching -> Ready`, or `Error`
//! once every candidate has been tried.

use std::path::PathBuf;

use mixdesk_shared::StemDescriptor;

use crate::assets::{decode_wav_file, DecodedAudio};
use crate::error::StemError;

/// Turns a stage name and file name into a fetchable location (for example a
/// signed URL). An empty stage means the bare file name.
pub trait UrlResolver: Send + Sync {
    fn resolve(&self, stage: &str, file_name: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadFailure {
    /// Nothing there, or the transport failed. Try the next candidate.
    Unreachable(String),
    /// Bytes arrived but are not audio we can decode.
    Corrupt(String),
}

/// Fetches and decodes one location.
pub trait MediaLoader: Send + Sync {
    fn load(&self, location: &str) -> Result<DecodedAudio, LoadFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Resolving(usize),
    Attaching,
    Ready,
    Error,
}

#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub url: String,
    pub stage: String,
    pub audio: DecodedAudio,
}

/// Candidate stages for a stem: its own hint first, then the configured
/// fallbacks, without duplicates. The bare file name stays last.
pub fn candidate_stages(descriptor: &StemDescriptor, fallback_stages: &[String]) -> Vec<String> {
    let mut stages: Vec<String> = Vec::with_capacity(fallback_stages.len() + 1);
    if let Some(hint) = descriptor.stage_hint.as_deref().filter(|h| !h.is_empty()) {
        stages.push(hint.to_string());
    }
    for stage in fallback_stages.iter().filter(|s| !s.is_empty()) {
        if !stages.contains(stage) {
            stages.push(stage.clone());
        }
    }
    stages.push(String::new());
    stages
}

pub struct SourceResolution {
    file_name: String,
    candidates: Vec<String>,
    state: ResolutionState,
    resolved: Option<ResolvedSource>,
    decode_failure: Option<StemError>,
}

impl SourceResolution {
    pub fn new(descriptor: &StemDescriptor, fallback_stages: &[String]) -> Self {
        Self {
            file_name: descriptor.file_name.clone(),
            candidates: candidate_stages(descriptor, fallback_stages),
            state: ResolutionState::Resolving(0),
            resolved: None,
            decode_failure: None,
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    /// Performs one transition. Terminal and `Attaching` states are left alone.
    pub fn step(&mut self, resolver: &dyn UrlResolver, loader: &dyn MediaLoader) -> ResolutionState {
        let ResolutionState::Resolving(index) = self.state else {
            return self.state;
        };
        let Some(stage) = self.candidates.get(index).cloned() else {
            self.state = ResolutionState::Error;
            return self.state;
        };

        match resolver.resolve(&stage, &self.file_name) {
            None => {
                log::debug!("[Source] {}: nothing under stage '{}'", self.file_name, stage);
                self.advance(index);
            }
            Some(url) => match loader.load(&url) {
                Ok(audio) => {
                    log::debug!("[Source] {}: loaded from {}", self.file_name, url);
                    self.resolved = Some(ResolvedSource { url, stage, audio });
                    self.state = ResolutionState::Attaching;
                }
                Err(LoadFailure::Unreachable(reason)) => {
                    log::debug!("[Source] {}: {} unreachable ({})", self.file_name, url, reason);
                    self.advance(index);
                }
                Err(LoadFailure::Corrupt(reason)) => {
                    log::warn!("[Source] {}: {} failed to decode ({})", self.file_name, url, reason);
                    self.decode_failure = Some(StemError::decode(url, reason));
                    self.advance(index);
                }
            },
        }
        self.state
    }

    fn advance(&mut self, index: usize) {
        self.state = if index + 1 < self.candidates.len() {
            ResolutionState::Resolving(index + 1)
        } else {
            ResolutionState::Error
        };
    }

    pub fn take_resolved(&mut self) -> Option<ResolvedSource> {
        self.resolved.take()
    }

    /// Why the machine ended in `Error`. A decode failure wins over plain
    /// unreachability since it is the more useful thing to show.
    pub fn failure(&self) -> Option<StemError> {
        if self.state != ResolutionState::Error {
            return None;
        }
        Some(self.decode_failure.clone().unwrap_or_else(|| StemError::SourceResolution {
            file_name: self.file_name.clone(),
            attempts: self.candidates.len(),
        }))
    }

    /// Drives the machine until it needs the engine (`Attaching`) or gives up.
    pub fn run(&mut self, resolver: &dyn UrlResolver, loader: &dyn MediaLoader) -> Result<ResolvedSource, StemError> {
        while let ResolutionState::Resolving(_) = self.step(resolver, loader) {}
        match self.take_resolved() {
            Some(resolved) => Ok(resolved),
            None => Err(self.failure().unwrap_or_else(|| StemError::SourceResolution {
                file_name: self.file_name.clone(),
                attempts: self.candidates.len(),
            })),
        }
    }
}

/// Resolves `<root>/<stage>/<file>` (or `<root>/<file>` for the bare stage)
/// when the file exists on disk.
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl UrlResolver for DirectoryResolver {
    fn resolve(&self, stage: &str, file_name: &str) -> Option<String> {
        let path = if stage.is_empty() {
            self.root.join(file_name)
        } else {
            self.root.join(stage).join(file_name)
        };
        path.is_file().then(|| format!("file://{}", path.display()))
    }
}

/// Loads WAV files from local paths or `file://` URLs.
#[derive(Default)]
pub struct WavFileLoader;

impl MediaLoader for WavFileLoader {
    fn load(&self, location: &str) -> Result<DecodedAudio, LoadFailure> {
        let path = PathBuf::from(location.strip_prefix("file://").unwrap_or(location));
        if !path.is_file() {
            return Err(LoadFailure::Unreachable(format!("{} does not exist", path.display())));
        }
        decode_wav_file(&path).map_err(|e| LoadFailure::Corrupt(e.to_string()))
    }
}
