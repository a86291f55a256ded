use thiserror::Error;

/// Failures isolated to a single stem. The engine keeps running and the
/// remaining stems are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StemError {
    #[error("no reachable source for '{file_name}' after {attempts} candidate(s)")]
    SourceResolution { file_name: String, attempts: usize },
    #[error("could not decode '{location}': {reason}")]
    Decode { location: String, reason: String },
    #[error("stem '{stem}' did not start: {reason}")]
    PlaybackStart { stem: String, reason: String },
}

impl StemError {
    pub fn decode(location: impl Into<String>, reason: impl ToString) -> Self {
        StemError::Decode { location: location.into(), reason: reason.to_string() }
    }
}

/// Engine-level failures; these are fatal for the operation that hit them.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no output device available")]
    NoOutputDevice,
    #[error("unsupported output sample format {0}")]
    UnsupportedSampleFormat(String),
    #[error("failed to query output config: {0}")]
    OutputConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("audio clock could not be resumed: {0}")]
    PlaybackStart(String),
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("all {0} stem slots are in use")]
    TooManyStems(usize),
    #[error(transparent)]
    Stem(#[from] StemError),
}
