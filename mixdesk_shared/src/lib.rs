pub mod correction;
pub mod stem;
pub mod transport;

pub use correction::{CorrectionError, CorrectionPayload, StemCorrection};
pub use stem::{
    CompressionControl, EqControl, PanControl, ReadinessState, ReverbControl, StemControlUpdate,
    StemControls, StemDescriptor, resolve_audibility,
};
pub use transport::{EngineState, TransportSnapshot};

/// Frames per render block handed to DSP nodes.
pub const RENDER_QUANTUM: usize = 128;
/// The master bus is always interleaved stereo.
pub const CHANNEL_COUNT: usize = 2;
/// Default resolution of a peak buffer.
pub const DEFAULT_PEAK_BUCKETS: usize = 1000;
/// Time constant used for every smoothed gain/pan/volume transition.
pub const PARAM_SMOOTHING_SECONDS: f32 = 0.05;

/// Lowest volume the UI can reach; treated as the floor, not as silence.
pub const MIN_VOLUME_DB: f32 = -60.0;
pub const MAX_VOLUME_DB: f32 = 12.0;

#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 1e-10 {
        -200.0
    } else {
        20.0 * gain.log10()
    }
}
