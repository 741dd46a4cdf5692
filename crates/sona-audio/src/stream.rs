//! Audio stream management

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig,
    SupportedStreamConfig,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sona_core::{BufferSize, Sample};

use crate::{AudioConfig, AudioError, AudioResult};

/// Output-direction callback: receives the (always-silent, duplex-input-less)
/// input slot and the output slot to fill.
pub type AudioCallback = Box<dyn FnMut(&[Sample], &mut [Sample]) + Send + 'static>;

/// Input-direction callback: invoked inline on the capture thread with the
/// freshly captured block ("audio-processed" fan-out contract).
pub type CaptureCallback = Box<dyn FnMut(&[Sample]) + Send + 'static>;

struct OutputState {
    callback: Mutex<AudioCallback>,
}

struct InputState {
    callback: Mutex<CaptureCallback>,
}

/// Audio stream wrapper: zero, one, or two native cpal streams depending on
/// which of `output_device`/`input_device` were supplied (playback-only,
/// capture-only, or full-duplex).
pub struct AudioStream {
    output_stream: Option<Stream>,
    input_stream: Option<Stream>,
    running: Arc<AtomicBool>,
    config: AudioConfig,
}

impl AudioStream {
    /// Create a stream from whichever devices/callbacks are supplied.
    /// Exactly one of `(output_device, output_callback)` and
    /// `(input_device, capture_callback)` must be fully present for that
    /// direction to be built; passing neither pair is a programmer error.
    pub fn new(
        output_device: Option<&Device>,
        input_device: Option<&Device>,
        config: AudioConfig,
        output_callback: Option<AudioCallback>,
        capture_callback: Option<CaptureCallback>,
    ) -> AudioResult<Self> {
        let running = Arc::new(AtomicBool::new(false));

        let output_stream = match (output_device, output_callback) {
            (Some(device), Some(callback)) => {
                let output_config = get_stream_config(device, &config, false)?;
                let state = Arc::new(OutputState {
                        callback: Mutex::new(callback),
                });
                Some(build_output_stream(device, &output_config, config.buffer_size, state)?)
            }
            _ => None,
        };

        let input_stream = match (input_device, capture_callback) {
            (Some(device), Some(callback)) => {
                let input_config = get_stream_config(device, &config, true)?;
                let state = Arc::new(InputState {
                        callback: Mutex::new(callback),
                });
                Some(build_input_stream(device, &input_config, state)?)
            }
            _ => None,
        };

        Ok(Self {
                output_stream,
                input_stream,
                running,
                config,
        })
    }

    /// Start the audio stream
    pub fn start(&self) -> AudioResult<()> {
        if let Some(ref stream) = self.output_stream {
            stream.play().map_err(|e| AudioError::StreamError(e.to_string()))?;
        }
        if let Some(ref stream) = self.input_stream {
            stream.play().map_err(|e| AudioError::StreamError(e.to_string()))?;
        }
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the audio stream
    pub fn stop(&self) -> AudioResult<()> {
        if let Some(ref stream) = self.output_stream {
            stream.pause().map_err(|e| AudioError::StreamError(e.to_string()))?;
        }
        if let Some(ref stream) = self.input_stream {
            stream.pause().map_err(|e| AudioError::StreamError(e.to_string()))?;
        }
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    /// Check if stream is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get the stream configuration
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

fn get_output_stream_config(
    device: &Device,
    config: &AudioConfig,
) -> AudioResult<SupportedStreamConfig> {
    let sample_rate = cpal::SampleRate(config.sample_rate.as_u32());
    let channels = config.output_channels;

    let configs = device
    .supported_output_configs()
    .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    for supported in configs {
        if supported.channels() >= channels
        && supported.min_sample_rate() <= sample_rate
        && supported.max_sample_rate() >= sample_rate
        && supported.sample_format() == SampleFormat::F32
        {
            return Ok(supported.with_sample_rate(sample_rate));
        }
    }

    Err(AudioError::ConfigError(format!(
                "No matching output config for {} channels @ {}Hz",
                channels,
                config.sample_rate.as_u32()
    )))
}

fn get_input_stream_config(
    device: &Device,
    config: &AudioConfig,
) -> AudioResult<SupportedStreamConfig> {
    let sample_rate = cpal::SampleRate(config.sample_rate.as_u32());
    let channels = config.input_channels;

    let configs = device
    .supported_input_configs()
    .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    for supported in configs {
        if supported.channels() >= channels
        && supported.min_sample_rate() <= sample_rate
        && supported.max_sample_rate() >= sample_rate
        && supported.sample_format() == SampleFormat::F32
        {
            return Ok(supported.with_sample_rate(sample_rate));
        }
    }

    Err(AudioError::ConfigError(format!(
                "No matching input config for {} channels @ {}Hz",
                channels,
                config.sample_rate.as_u32()
    )))
}

fn get_stream_config(
    device: &Device,
    config: &AudioConfig,
    is_input: bool,
) -> AudioResult<SupportedStreamConfig> {
    if is_input {
        get_input_stream_config(device, config)
    } else {
        get_output_stream_config(device, config)
    }
}

fn build_output_stream(
    device: &Device,
    supported_config: &SupportedStreamConfig,
    buffer_size: BufferSize,
    state: Arc<OutputState>,
) -> AudioResult<Stream> {
    let channels = supported_config.channels() as usize;
    let sample_rate = supported_config.sample_rate();

    let config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate,
        buffer_size: CpalBufferSize::Fixed(buffer_size.as_usize() as u32),
    };

    // Pre-allocate the callback's input/output buffers at the device's
    // native channel count (2, 6, or 8 for stereo/5.1/7.1 surround) rather
    // than hardcoding stereo, since the engine's working format carries
    // through whatever channel count the device reports.
    let buffer_frames = buffer_size.as_usize();
    let input_buffer = vec![0.0 as Sample; buffer_frames * channels];
    let mut output_buffer = vec![0.0 as Sample; buffer_frames * channels];

    let stream = device
    .build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            let sample_count = frames * channels;

            output_buffer[..sample_count].fill(0.0);
            {
                let mut callback = state.callback.lock();
                callback(&input_buffer[..sample_count], &mut output_buffer[..sample_count]);
            }
            data[..sample_count].copy_from_slice(&output_buffer[..sample_count]);
        },
        move |err| {
            log::error!("Audio output stream error: {}", err);
        },
        None,
    )
    .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

fn build_input_stream(
    device: &Device,
    supported_config: &SupportedStreamConfig,
    state: Arc<InputState>,
) -> AudioResult<Stream> {
    let sample_rate = supported_config.sample_rate();

    let config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate,
        buffer_size: CpalBufferSize::Default,
    };

    let stream = device
    .build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            (state.callback.lock())(data);
        },
        move |err| {
            log::error!("Audio input stream error: {}", err);
        },
        None,
    )
    .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

/// Simple audio output for testing
pub fn test_output<F>(callback: F) -> AudioResult<AudioStream>
where
F: FnMut(&[Sample], &mut [Sample]) + Send + 'static,
{
    let device = crate::get_default_output_device()?;
    let config = AudioConfig::default();

    AudioStream::new(Some(&device), None, config, Some(Box::new(callback)), None)
}
