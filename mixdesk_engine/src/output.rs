use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::EngineError;
use crate::renderer::MixRenderer;

/// The engine's handle on whatever drives the renderer. `resume` is the
/// equivalent of resuming a suspended audio context before playback.
pub trait OutputControl {
    fn resume(&mut self) -> Result<(), EngineError>;
    fn suspend(&mut self) -> Result<(), EngineError>;
}

/// Output used when the renderer is pumped by hand (tests, offline bounce).
#[derive(Debug, Default)]
pub struct ManualOutput {
    running: bool,
}

impl ManualOutput {
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl OutputControl for ManualOutput {
    fn resume(&mut self) -> Result<(), EngineError> {
        self.running = true;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        self.running = false;
        Ok(())
    }
}

/// Default output device driving a `MixRenderer` from the cpal callback.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: usize,
    running: bool,
}

impl AudioOutput {
    /// Sample rate of the default device, so the engine can be built to match it.
    pub fn default_sample_rate() -> Result<u32, EngineError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(EngineError::NoOutputDevice)?;
        let config = device.default_output_config()?;
        Ok(config.sample_rate())
    }

    /// Builds the stream around `renderer`. The stream starts suspended;
    /// the engine resumes it on the first `play`.
    pub fn open(mut renderer: MixRenderer, buffer_frames: Option<u32>) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(EngineError::NoOutputDevice)?;
        let config = device.default_output_config()?;

        let sample_rate = config.sample_rate();
        let channels = config.channels() as usize;
        let sample_format = config.sample_format();

        if let cpal::SupportedBufferSize::Range { min, max } = config.buffer_size() {
            log::debug!("[Output] Device buffer range: {}-{}", min, max);
        }

        let mut stream_config: cpal::StreamConfig = config.into();
        if let Some(frames) = buffer_frames {
            stream_config.buffer_size = cpal::BufferSize::Fixed(frames);
        }
        log::info!("[Output] Using config: {:?}", stream_config);

        let err_fn = |err: cpal::StreamError| {
            let s = err.to_string();
            // Under/overruns are routine; everything else is worth a line.
            if !s.contains("underrun") && !s.contains("overrun") {
                log::error!("[Output] Stream error: {}", s);
            }
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.process(data, channels);
                },
                err_fn,
                None,
            )?,
            other => return Err(EngineError::UnsupportedSampleFormat(format!("{:?}", other))),
        };

        Ok(Self { stream, sample_rate, channels, running: false })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl OutputControl for AudioOutput {
    fn resume(&mut self) -> Result<(), EngineError> {
        if !self.running {
            self.stream.play().map_err(|e| EngineError::PlaybackStart(e.to_string()))?;
            self.running = true;
            log::debug!("[Output] Stream resumed");
        }
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        if self.running {
            self.stream.pause().map_err(|e| EngineError::PlaybackStart(e.to_string()))?;
            self.running = false;
            log::debug!("[Output] Stream suspended");
        }
        Ok(())
    }
}
