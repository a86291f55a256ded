//! Correction payload submitted to the backend for server-side re-rendering.
//!
//! The engine only builds and serializes the payload; sending it is the host's job.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stem::StemControls;

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("failed to serialize correction payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanCorrection {
    pub value: f32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqCorrection {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionCorrection {
    pub threshold_db: f32,
    pub ratio: f32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbCorrection {
    pub amount: f32,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemCorrection {
    pub stem: String,
    pub volume_db: f32,
    pub pan: PanCorrection,
    pub eq: EqCorrection,
    pub compression: CompressionCorrection,
    pub reverb: ReverbCorrection,
    pub mute: bool,
    pub solo: bool,
}

impl StemCorrection {
    pub fn new(stem: impl Into<String>, controls: &StemControls) -> Self {
        Self {
            stem: stem.into(),
            volume_db: controls.volume_db,
            pan: PanCorrection { value: controls.pan.value, enabled: controls.pan.enabled },
            eq: EqCorrection {
                low: controls.eq.low,
                mid: controls.eq.mid,
                high: controls.eq.high,
                enabled: controls.eq.enabled,
            },
            compression: CompressionCorrection {
                threshold_db: controls.compression.threshold_db,
                ratio: controls.compression.ratio,
                enabled: controls.compression.enabled,
            },
            reverb: ReverbCorrection {
                amount: controls.reverb.amount,
                enabled: controls.reverb.enabled,
            },
            mute: controls.mute,
            solo: controls.solo,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionPayload {
    pub stems: Vec<StemCorrection>,
}

impl CorrectionPayload {
    pub fn from_stems<'a, I>(stems: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a StemControls)>,
    {
        Self {
            stems: stems
                .into_iter()
                .map(|(name, controls)| StemCorrection::new(name, controls))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, CorrectionError> {
        Ok(serde_json::to_string(self)?)
    }
}
