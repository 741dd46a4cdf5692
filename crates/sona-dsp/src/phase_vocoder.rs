//! Phase-vocoder time-stretch: 75%-overlap Hann-windowed STFT,
//! phase-unwrapping against an expected per-bin phase increment,
//! conjugate-symmetric spectrum reconstruction, and
//! squared-window-normalized overlap-add, built on the kernel's own
//! [`crate::fft::FftPlan`].

use std::f64::consts::PI;

use num_complex::Complex64;
use sona_core::Sample;

use crate::fft::{plan_for, FftPlan};
use crate::window::hann;

/// Map `angle` into `(-pi, pi]`.
#[inline]
pub fn principal_angle(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped > PI {
        wrapped -= 2.0 * PI;
    } else if wrapped <= -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}

/// Time-domain pitch-preserving stretch of a single-channel signal by
/// `stretch_factor` (output length = input length * `stretch_factor`).
pub struct PhaseVocoder {
    frame_size: usize,
    hop_analysis: usize,
    window: Vec<Sample>,
    plan: std::sync::Arc<FftPlan>,
    /// Expected phase increment per bin between consecutive analysis hops.
    omega: Vec<f64>,
    /// Accumulated synthesis phase per bin, carried across frames.
    synthesis_phase: Vec<f64>,
    /// Last frame's analysis phase per bin, for unwrapping.
    last_phase: Vec<f64>,
    primed: bool,
}

impl PhaseVocoder {
    pub fn new(frame_size: usize) -> Self {
        assert!(
            crate::fft::is_power_of_two(frame_size),
            "phase vocoder frame size must be a power of two"
        );
        let hop_analysis = frame_size / 4; // 75% overlap
        let bins = frame_size / 2 + 1;
        let omega = (0..bins)
        .map(|k| 2.0 * PI * k as f64 * hop_analysis as f64 / frame_size as f64)
        .collect();
        Self {
            frame_size,
            hop_analysis,
            window: hann(frame_size),
            plan: plan_for(frame_size),
            omega,
            synthesis_phase: vec![0.0; bins],
            last_phase: vec![0.0; bins],
            primed: false,
        }
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    #[inline]
    pub fn analysis_hop(&self) -> usize {
        self.hop_analysis
    }

    pub fn synthesis_hop(&self, stretch_factor: f64) -> usize {
        (self.hop_analysis as f64 * stretch_factor).round().max(1.0) as usize
    }

    /// Reset accumulated phase state, e.g. across a pitch-shift/pitch-preserve
    /// mode switch where continuing the old phase trajectory would click.
    pub fn reset(&mut self) {
        self.synthesis_phase.iter_mut().for_each(|p| *p = 0.0);
        self.last_phase.iter_mut().for_each(|p| *p = 0.0);
        self.primed = false;
    }

    /// Process one analysis frame (`frame.len() == frame_size`) and produce
    /// one windowed synthesis frame of the same length, phase-adjusted for
    /// `stretch_factor`.
    pub fn process_frame(&mut self, frame: &[Sample], stretch_factor: f64, out: &mut [Sample]) {
        debug_assert_eq!(frame.len(), self.frame_size);
        debug_assert_eq!(out.len(), self.frame_size);

        let mut spectrum: Vec<Complex64> = frame
        .iter()
        .zip(self.window.iter())
        .map(|(s, w)| Complex64::new((*s * *w) as f64, 0.0))
        .collect();
        self.plan.forward(&mut spectrum);

        let bins = self.frame_size / 2 + 1;
        let synthesis_hop = self.synthesis_hop(stretch_factor);

        let mut mag = vec![0.0; bins];
        let mut phase = vec![0.0; bins];
        for k in 0..bins {
            mag[k] = spectrum[k].norm();
            phase[k] = spectrum[k].arg();
        }

        if !self.primed {
            self.last_phase.copy_from_slice(&phase);
            self.synthesis_phase.copy_from_slice(&phase);
            self.primed = true;
        }

        for k in 0..bins {
            let delta = phase[k] - self.last_phase[k] - self.omega[k];
            let true_freq_deviation = principal_angle(delta);
            self.last_phase[k] = phase[k];
            self.synthesis_phase[k] +=
            self.omega[k] + true_freq_deviation * synthesis_hop as f64 / self.hop_analysis as f64;
        }

        let mut reconstructed = vec![Complex64::new(0.0, 0.0); self.frame_size];
        for k in 0..bins {
            let (sin, cos) = self.synthesis_phase[k].sin_cos();
            reconstructed[k] = Complex64::new(mag[k] * cos, mag[k] * sin);
            if k != 0 && k != bins - 1 {
                reconstructed[self.frame_size - k] = reconstructed[k].conj();
            }
        }

        self.plan.inverse(&mut reconstructed);
        for (o, (r, w)) in out
        .iter_mut()
        .zip(reconstructed.iter().zip(self.window.iter()))
        {
            *o = (r.re as Sample) * *w;
        }
    }
}

/// Stretch an entire mono buffer by `stretch_factor` in one call, handling
/// frame segmentation and overlap-add with squared-window normalization
/// internally.
pub fn stretch(input: &[Sample], frame_size: usize, stretch_factor: f64) -> Vec<Sample> {
    let mut vocoder = PhaseVocoder::new(frame_size);
    let hop_analysis = vocoder.analysis_hop();
    let synthesis_hop = vocoder.synthesis_hop(stretch_factor);

    let output_len = (input.len() as f64 * stretch_factor).round() as usize + frame_size;
    let mut output = vec![0.0 as Sample; output_len];
    let mut norm = vec![0.0 as Sample; output_len];
    let window = hann(frame_size);

    let mut frame = vec![0.0 as Sample; frame_size];
    let mut synthesis_frame = vec![0.0 as Sample; frame_size];

    let mut read = 0usize;
    let mut write = 0usize;
    while read + frame_size <= input.len() {
        frame.copy_from_slice(&input[read..read + frame_size]);
        vocoder.process_frame(&frame, stretch_factor, &mut synthesis_frame);

        for i in 0..frame_size {
            output[write + i] += synthesis_frame[i];
            norm[write + i] += window[i] * window[i];
        }

        read += hop_analysis;
        write += synthesis_hop;
    }

    for (sample, weight) in output.iter_mut().zip(norm.iter()) {
        if *weight > 1e-8 {
            *sample /= *weight;
        }
    }
    output.truncate(write.min(output.len()));
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_angle_stays_in_range() {
        assert!((principal_angle(0.0)).abs() < 1e-9);
        assert!(principal_angle(3.0 * PI) <= PI);
        assert!(principal_angle(-3.0 * PI) > -PI);
    }

    #[test]
    fn stretch_factor_one_preserves_length_roughly() {
        let input: Vec<Sample> = (0..4096).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let output = stretch(&input, 1024, 1.0);
        let ratio = output.len() as f64 / input.len() as f64;
        assert!((ratio - 1.0).abs() < 0.2);
    }

    #[test]
    fn stretching_longer_produces_more_samples() {
        let input: Vec<Sample> = (0..4096).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let short = stretch(&input, 1024, 1.0);
        let long = stretch(&input, 1024, 2.0);
        assert!(long.len() > short.len());
    }

    #[test]
    fn reset_clears_phase_accumulators() {
        let mut vocoder = PhaseVocoder::new(256);
        let frame = vec![0.3 as Sample; 256];
        let mut out = vec![0.0 as Sample; 256];
        vocoder.process_frame(&frame, 1.0, &mut out);
        vocoder.reset();
        assert!(vocoder.synthesis_phase.iter().all(|p| *p == 0.0));
        assert!(!vocoder.primed);
    }
}
