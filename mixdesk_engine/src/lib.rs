pub mod analyser;
pub mod assets;
pub mod commands;
pub mod config;
pub mod engine; // PlaybackEngine lives here
pub mod error;
pub mod loader;
pub mod mixer;
pub mod nodes;
pub mod output;
pub mod params;
pub mod peaks;
pub mod renderer;
pub mod resampler;
pub mod shaper;
pub mod source;
pub mod transport;
pub mod waveform;

#[cfg(test)]
mod tests_playback;

// Re-exports
pub use analyser::{MasterAnalyser, MeterLevels};
pub use assets::{DecodedAudio, SourceKey};
pub use config::EngineConfig;
pub use engine::{AttachOutcome, PlayReport, PlaybackEngine, StemStatus};
pub use error::{EngineError, StemError};
pub use output::{AudioOutput, ManualOutput, OutputControl};
pub use peaks::{PeakCache, PeakState, compute_peaks};
pub use renderer::MixRenderer;
pub use shaper::{Punch, TransientShaper};
pub use source::{DirectoryResolver, LoadFailure, MediaLoader, UrlResolver, WavFileLoader};
pub use waveform::{WaveformFrame, WaveformTheme};
