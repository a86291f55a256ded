use serde::{Deserialize, Serialize};

use crate::{MAX_VOLUME_DB, MIN_VOLUME_DB};

/// One entry of the stem list resolved for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StemDescriptor {
    pub file_name: String,
    /// Pipeline stage the file is expected under, tried before the generic fallbacks.
    #[serde(default)]
    pub stage_hint: Option<String>,
    /// Peak data computed server-side, values in [0, 1].
    #[serde(default)]
    pub precomputed_peaks: Option<Vec<f32>>,
}

impl StemDescriptor {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            stage_hint: None,
            precomputed_peaks: None,
        }
    }

    pub fn with_stage_hint(mut self, stage: impl Into<String>) -> Self {
        self.stage_hint = Some(stage.into());
        self
    }

    pub fn with_peaks(mut self, peaks: Vec<f32>) -> Self {
        self.precomputed_peaks = Some(peaks);
        self
    }

    /// Display name: the file name without directory or extension.
    pub fn name(&self) -> &str {
        let base = self.file_name.rsplit('/').next().unwrap_or(&self.file_name);
        match base.rfind('.') {
            Some(idx) if idx > 0 => &base[..idx],
            _ => base,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanControl {
    pub value: f32,
    pub enabled: bool,
}

impl Default for PanControl {
    fn default() -> Self {
        Self { value: 0.0, enabled: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqControl {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
    pub enabled: bool,
}

impl Default for EqControl {
    fn default() -> Self {
        Self { low: 0.0, mid: 0.0, high: 0.0, enabled: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionControl {
    pub threshold_db: f32,
    pub ratio: f32,
    pub enabled: bool,
}

impl Default for CompressionControl {
    fn default() -> Self {
        Self { threshold_db: -24.0, ratio: 4.0, enabled: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbControl {
    pub amount: f32,
    pub enabled: bool,
}

impl Default for ReverbControl {
    fn default() -> Self {
        Self { amount: 0.0, enabled: false }
    }
}

/// User-facing mix controls of a single stem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StemControls {
    pub volume_db: f32,
    pub pan: PanControl,
    pub mute: bool,
    pub solo: bool,
    pub eq: EqControl,
    pub compression: CompressionControl,
    pub reverb: ReverbControl,
}

impl Default for StemControls {
    fn default() -> Self {
        Self {
            volume_db: 0.0,
            pan: PanControl::default(),
            mute: false,
            solo: false,
            eq: EqControl::default(),
            compression: CompressionControl::default(),
            reverb: ReverbControl::default(),
        }
    }
}

impl StemControls {
    /// Pan position actually applied to the signal chain.
    pub fn effective_pan(&self) -> f32 {
        if self.pan.enabled { self.pan.value } else { 0.0 }
    }

    fn clamp_ranges(&mut self) {
        self.volume_db = clamp_finite(self.volume_db, MIN_VOLUME_DB, MAX_VOLUME_DB, 0.0);
        self.pan.value = clamp_finite(self.pan.value, -1.0, 1.0, 0.0);
        self.eq.low = clamp_finite(self.eq.low, -12.0, 12.0, 0.0);
        self.eq.mid = clamp_finite(self.eq.mid, -12.0, 12.0, 0.0);
        self.eq.high = clamp_finite(self.eq.high, -12.0, 12.0, 0.0);
        self.compression.threshold_db = clamp_finite(self.compression.threshold_db, -60.0, 0.0, -24.0);
        self.compression.ratio = clamp_finite(self.compression.ratio, 1.0, 20.0, 4.0);
        self.reverb.amount = clamp_finite(self.reverb.amount, 0.0, 100.0, 0.0);
    }
}

fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(min, max) } else { fallback }
}

/// Partial update merged into `StemControls`; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StemControlUpdate {
    pub volume_db: Option<f32>,
    pub pan_value: Option<f32>,
    pub pan_enabled: Option<bool>,
    pub mute: Option<bool>,
    pub solo: Option<bool>,
    pub eq_low: Option<f32>,
    pub eq_mid: Option<f32>,
    pub eq_high: Option<f32>,
    pub eq_enabled: Option<bool>,
    pub compression_threshold_db: Option<f32>,
    pub compression_ratio: Option<f32>,
    pub compression_enabled: Option<bool>,
    pub reverb_amount: Option<f32>,
    pub reverb_enabled: Option<bool>,
}

impl StemControlUpdate {
    pub fn volume_db(db: f32) -> Self {
        Self { volume_db: Some(db), ..Self::default() }
    }

    pub fn pan(value: f32) -> Self {
        Self { pan_value: Some(value), pan_enabled: Some(true), ..Self::default() }
    }

    pub fn mute(mute: bool) -> Self {
        Self { mute: Some(mute), ..Self::default() }
    }

    pub fn solo(solo: bool) -> Self {
        Self { solo: Some(solo), ..Self::default() }
    }

    /// Merge into `controls`, clamping every field to its legal range.
    /// Returns true if anything changed.
    pub fn apply_to(&self, controls: &mut StemControls) -> bool {
        let before = *controls;

        if let Some(v) = self.volume_db {
            controls.volume_db = v;
        }
        if let Some(v) = self.pan_value {
            controls.pan.value = v;
        }
        if let Some(v) = self.pan_enabled {
            controls.pan.enabled = v;
        }
        if let Some(v) = self.mute {
            controls.mute = v;
        }
        if let Some(v) = self.solo {
            controls.solo = v;
        }
        if let Some(v) = self.eq_low {
            controls.eq.low = v;
        }
        if let Some(v) = self.eq_mid {
            controls.eq.mid = v;
        }
        if let Some(v) = self.eq_high {
            controls.eq.high = v;
        }
        if let Some(v) = self.eq_enabled {
            controls.eq.enabled = v;
        }
        if let Some(v) = self.compression_threshold_db {
            controls.compression.threshold_db = v;
        }
        if let Some(v) = self.compression_ratio {
            controls.compression.ratio = v;
        }
        if let Some(v) = self.compression_enabled {
            controls.compression.enabled = v;
        }
        if let Some(v) = self.reverb_amount {
            controls.reverb.amount = v;
        }
        if let Some(v) = self.reverb_enabled {
            controls.reverb.enabled = v;
        }

        controls.clamp_ranges();
        *controls != before
    }
}

/// Effective audibility of every stem: `any_soloed ? solo : !mute`.
///
/// Solo is a mix-wide gate, so this always takes the full stem set.
pub fn resolve_audibility(controls: &[StemControls]) -> Vec<bool> {
    let any_soloed = controls.iter().any(|c| c.solo);
    controls
        .iter()
        .map(|c| if any_soloed { c.solo } else { !c.mute })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solo_gates_the_whole_mix() {
        let a = StemControls::default();
        let b = StemControls { solo: true, ..StemControls::default() };
        assert_eq!(resolve_audibility(&[a, b]), vec![false, true]);
    }

    #[test]
    fn test_without_solo_audibility_is_not_mute() {
        let a = StemControls { mute: true, ..StemControls::default() };
        let b = StemControls::default();
        assert_eq!(resolve_audibility(&[a, b]), vec![false, true]);
    }

    #[test]
    fn test_soloed_stem_plays_even_when_muted() {
        let a = StemControls { mute: true, solo: true, ..StemControls::default() };
        let b = StemControls { mute: false, ..StemControls::default() };
        assert_eq!(resolve_audibility(&[a, b]), vec![true, false]);
    }

    #[test]
    fn test_update_clamps_and_reports_change() {
        let mut controls = StemControls::default();
        let update = StemControlUpdate {
            volume_db: Some(40.0),
            pan_value: Some(-3.0),
            compression_ratio: Some(0.5),
            reverb_amount: Some(f32::NAN),
            ..StemControlUpdate::default()
        };
        assert!(update.apply_to(&mut controls));
        assert_eq!(controls.volume_db, 12.0);
        assert_eq!(controls.pan.value, -1.0);
        assert_eq!(controls.compression.ratio, 1.0);
        assert_eq!(controls.reverb.amount, 0.0);

        // Same update again is a no-op.
        assert!(!update.apply_to(&mut controls));
    }

    #[test]
    fn test_last_write_wins_per_field() {
        let mut controls = StemControls::default();
        StemControlUpdate::volume_db(-6.0).apply_to(&mut controls);
        StemControlUpdate::mute(true).apply_to(&mut controls);
        StemControlUpdate::volume_db(-3.0).apply_to(&mut controls);
        assert_eq!(controls.volume_db, -3.0);
        assert!(controls.mute);
    }

    #[test]
    fn test_pan_only_applies_when_enabled() {
        let mut controls = StemControls::default();
        controls.pan.value = 0.5;
        assert_eq!(controls.effective_pan(), 0.0);
        StemControlUpdate::pan(0.5).apply_to(&mut controls);
        assert_eq!(controls.effective_pan(), 0.5);
    }

    #[test]
    fn test_descriptor_name_strips_path_and_extension() {
        assert_eq!(StemDescriptor::new("stems/vocals.wav").name(), "vocals");
        assert_eq!(StemDescriptor::new("drums").name(), "drums");
        assert_eq!(StemDescriptor::new(".hidden").name(), ".hidden");
    }

    #[test]
    fn test_descriptor_deserializes_camel_case() {
        let json = r#"{"fileName":"bass.wav","stageHint":"separated","precomputedPeaks":[0.1,0.5]}"#;
        let descriptor: StemDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.file_name, "bass.wav");
        assert_eq!(descriptor.stage_hint.as_deref(), Some("separated"));
        assert_eq!(descriptor.precomputed_peaks, Some(vec![0.1, 0.5]));
    }
}
