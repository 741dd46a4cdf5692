//! sona-dsp: the shared DSP kernel.
//!
//! ## Modules
//! - `simd` - runtime SIMD dispatch (AVX2/SSE/NEON) with scalar fallback,
//! plus denormal flush-to-zero control
//! - `biquad` - TDF-II biquad filters, per-channel state, seven filter types
//! - `window` - Hann/Hamming/Blackman analysis windows
//! - `fft` - in-place Cooley-Tukey FFT/IFFT
//! - `resampler` - streaming linear resampler at an arbitrary real ratio
//! - `phase_vocoder` - pitch-preserving time-stretch
//! - `format` - PCM sample format conversion and channel downmixing

#![allow(dead_code)]

pub mod biquad;
pub mod fft;
pub mod format;
pub mod phase_vocoder;
pub mod resampler;
pub mod simd;
pub mod window;

pub use biquad::{Biquad, BiquadCoeffs, FilterType};
pub use fft::{is_power_of_two, plan_for, FftPlan};
pub use format::{decode_to_f32, downmix_matrix, encode_from_f32, mix_channels};
pub use phase_vocoder::{principal_angle, stretch, PhaseVocoder};
pub use resampler::{estimate_output_len, Resampler};
pub use simd::{apply_gain, apply_stereo_gain, detect_simd_level, mix_add, simd_level, DspDispatch, SimdLevel};
pub use window::{build as build_window, WindowKind};

use sona_core::Sample;

/// Trait for all DSP processors.
pub trait Processor: Send + Sync {
    fn reset(&mut self);

    /// Latency introduced by this processor, in samples.
    fn latency(&self) -> usize {
        0
    }
}

/// A processor that operates on a single channel of samples.
pub trait MonoProcessor: Processor {
    fn process_sample(&mut self, input: Sample) -> Sample;

    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// A processor that operates on a left/right sample pair jointly.
pub trait StereoProcessor: Processor {
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample);

    fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process_sample(*l, *r);
        }
    }
}

/// Processors whose internal coefficients depend on the device sample rate.
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
