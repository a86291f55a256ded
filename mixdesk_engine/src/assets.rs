use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::StemError;
use crate::resampler::StemResampler;

/// Identity of a decoded source: which job it belongs to and which file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub job_id: String,
    pub file_name: String,
}

impl SourceKey {
    pub fn new(job_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self { job_id: job_id.into(), file_name: file_name.into() }
    }
}

/// Interleaved decoded audio. The sample data is shared read-only between
/// voices, the pool and the peak cache.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Arc<Vec<f32>>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self { samples: Arc::new(samples), channels: channels.max(1), sample_rate }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// De-interleaved copy of one channel.
    pub fn channel(&self, index: usize) -> Vec<f32> {
        let channels = self.channels as usize;
        if index >= channels {
            return Vec::new();
        }
        self.samples.iter().skip(index).step_by(channels).copied().collect()
    }

    /// Stereo view of frame `frame`; mono sources feed both sides,
    /// anything past the end is silence.
    #[inline]
    pub fn stereo_frame(&self, frame: usize) -> (f32, f32) {
        let channels = self.channels as usize;
        let base = frame * channels;
        match channels {
            1 => match self.samples.get(base) {
                Some(&s) => (s, s),
                None => (0.0, 0.0),
            },
            _ => match (self.samples.get(base), self.samples.get(base + 1)) {
                (Some(&l), Some(&r)) => (l, r),
                _ => (0.0, 0.0),
            },
        }
    }

    /// Resampled copy at `target_rate`; returns a cheap clone when the rate already matches.
    pub fn to_sample_rate(&self, target_rate: u32, location: &str) -> Result<DecodedAudio, StemError> {
        if self.sample_rate == target_rate {
            return Ok(self.clone());
        }
        let resampled = StemResampler::resample_interleaved(
            &self.samples,
            self.channels as usize,
            self.sample_rate,
            target_rate,
        )
        .map_err(|e| StemError::decode(location, e))?;
        Ok(DecodedAudio::new(resampled, self.channels, target_rate))
    }
}

pub fn decode_wav_file(path: &Path) -> Result<DecodedAudio, StemError> {
    let location = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| StemError::decode(&location, e))?;
    decode_wav_reader(std::io::BufReader::new(file), &location)
}

pub fn decode_wav_reader<R: Read>(reader: R, location: &str) -> Result<DecodedAudio, StemError> {
    let reader = hound::WavReader::new(reader).map_err(|e| StemError::decode(location, e))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StemError::decode(location, e))?,
        hound::SampleFormat::Int => {
            let max_val = 2.0_f32.powi(spec.bits_per_sample as i32 - 1);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StemError::decode(location, e))?
        }
    };

    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(StemError::decode(location, "empty channel layout or sample rate"));
    }

    Ok(DecodedAudio::new(samples, spec.channels, spec.sample_rate))
}

/// Decoded stems of the current job. Replaced wholesale (RCU) by the control
/// thread, read lock-free by peak workers.
#[derive(Clone, Default)]
pub struct AudioPool {
    assets: HashMap<SourceKey, DecodedAudio>,
}

impl AudioPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SourceKey) -> Option<&DecodedAudio> {
        self.assets.get(key)
    }

    pub fn insert(&mut self, key: SourceKey, audio: DecodedAudio) {
        log::debug!(
            "[AudioPool] {}/{}: {} frames @ {} Hz",
            key.job_id,
            key.file_name,
            audio.frames(),
            audio.sample_rate
        );
        self.assets.insert(key, audio);
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
