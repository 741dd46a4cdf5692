//! Audio device I/O using cpal.
//!
//! Low-latency playback/capture with support for ASIO, CoreAudio, JACK, etc.,
//! plus the device-driven engine that dispatches callbacks into the
//! component graph and runs the `audio-processed` broadcast.

mod device;
mod engine;
mod error;
mod stream;

pub use device::*;
pub use engine::{deadline_from_now, Capability, DeviceState, Engine};
pub use error::*;
pub use stream::*;

use sona_core::{BufferSize, SampleRate};

/// Audio engine configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    pub buffer_size: BufferSize,
    pub input_channels: u16,
    pub output_channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            buffer_size: BufferSize::Samples256,
            input_channels: 2,
            output_channels: 2,
        }
    }
}
