use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

pub struct StemResampler;

impl StemResampler {
    /// Converts interleaved audio from `from_rate` to `to_rate` with sinc
    /// interpolation. The result keeps the channel layout and is trimmed to
    /// the expected frame count.
    pub fn resample_interleaved(
        input: &[f32],
        channels: usize,
        from_rate: u32,
        to_rate: u32,
    ) -> Result<Vec<f32>, anyhow::Error> {
        if channels == 0 {
            return Err(anyhow::anyhow!("Channel count must be positive"));
        }
        if from_rate == 0 || to_rate == 0 {
            return Err(anyhow::anyhow!("Sample rates must be positive"));
        }
        if input.is_empty() || from_rate == to_rate {
            return Ok(input.to_vec());
        }

        let ratio = to_rate as f64 / from_rate as f64;
        let chunk_size = 1024;

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_size, channels)?;

        let frames = input.len() / channels;
        let expected_frames = (frames as f64 * ratio).ceil() as usize;

        // Deinterleave once up front
        let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
        for frame in input.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }

        let mut out_planar: Vec<Vec<f32>> = vec![Vec::with_capacity(expected_frames + chunk_size); channels];
        let mut pos = 0;
        // Keep feeding zeros past the end so the filter tail is flushed.
        while out_planar[0].len() < expected_frames {
            let end = (pos + chunk_size).min(frames);
            let waves: Vec<Vec<f32>> = planar
                .iter()
                .map(|ch| {
                    let mut chunk = if pos < end { ch[pos..end].to_vec() } else { Vec::new() };
                    chunk.resize(chunk_size, 0.0);
                    chunk
                })
                .collect();

            let out_waves = resampler.process(&waves, None)?;
            for (dst, src) in out_planar.iter_mut().zip(out_waves) {
                dst.extend_from_slice(&src);
            }
            pos += chunk_size;
        }

        let mut output = Vec::with_capacity(expected_frames * channels);
        for i in 0..expected_frames {
            for ch in out_planar.iter() {
                output.push(ch[i]);
            }
        }
        Ok(output)
    }
}
