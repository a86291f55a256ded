use std::path::Path;

use mixdesk_shared::{DEFAULT_PEAK_BUCKETS, PARAM_SMOOTHING_SECONDS, RENDER_QUANTUM};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Engine tuning. Every field has a default, so a config file only needs
/// the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rate used when the renderer is pumped manually; a device overrides it.
    pub sample_rate: u32,
    pub render_quantum: usize,
    /// Pre-allocated voice slots on the audio thread.
    pub max_stems: usize,
    pub smoothing_seconds: f32,
    /// How long `load_job` waits for each stem to become playable.
    pub load_timeout_ms: u64,
    pub peak_buckets: usize,
    /// Stage directories tried in order; an empty entry means the bare file name.
    pub fallback_stages: Vec<String>,
    pub drift_warning_seconds: f64,
    /// Mono frames kept by the master analyser.
    pub analyser_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            render_quantum: RENDER_QUANTUM,
            max_stems: 16,
            smoothing_seconds: PARAM_SMOOTHING_SECONDS,
            load_timeout_ms: 4_000,
            peak_buckets: DEFAULT_PEAK_BUCKETS,
            fallback_stages: vec![
                "mastered".to_string(),
                "mixed".to_string(),
                "separated".to_string(),
                String::new(),
            ],
            drift_warning_seconds: 0.02,
            analyser_window: 2048,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sample_rate == 0 {
            return Err(EngineError::Config("sample_rate must be positive".into()));
        }
        if self.render_quantum == 0 {
            return Err(EngineError::Config("render_quantum must be positive".into()));
        }
        if self.max_stems == 0 {
            return Err(EngineError::Config("max_stems must be positive".into()));
        }
        if self.smoothing_seconds.is_nan() || self.smoothing_seconds <= 0.0 {
            return Err(EngineError::Config("smoothing_seconds must be positive".into()));
        }
        if self.peak_buckets == 0 {
            return Err(EngineError::Config("peak_buckets must be positive".into()));
        }
        if self.fallback_stages.is_empty() {
            return Err(EngineError::Config("fallback_stages needs at least one entry".into()));
        }
        Ok(())
    }

    pub fn load_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.load_timeout_ms)
    }
}
