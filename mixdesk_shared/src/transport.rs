use serde::{Deserialize, Serialize};

/// Lifecycle of a playback engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Playing,
    Paused,
    Stopped,
}

impl EngineState {
    pub fn is_playing(self) -> bool {
        self == EngineState::Playing
    }

    /// True once at least one stem has been attached and the transport can run.
    pub fn is_playable(self) -> bool {
        matches!(
            self,
            EngineState::Ready | EngineState::Playing | EngineState::Paused | EngineState::Stopped
        )
    }
}

/// What a transport bar needs to draw itself; produced by the engine's
/// `sample_transport` pull at whatever cadence the caller likes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSnapshot {
    pub state: EngineState,
    pub is_playing: bool,
    /// Seconds, derived from the reference stem while playing.
    pub current_time: f64,
    pub duration: f64,
    /// Engine-clock time (seconds) that corresponds to transport offset 0.
    pub transport_epoch: f64,
    /// Largest observed distance between a running stem and the reference stem.
    pub max_drift: f64,
}

impl TransportSnapshot {
    /// Playback progress in [0, 1]; 0 when nothing is loaded.
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
