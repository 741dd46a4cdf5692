//! Linear resampler: arbitrary real sample-rate ratios, driven
//! by an accumulated fractional read position rather than a running
//! floating-point multiply, so long renders don't drift off pitch.

use sona_core::Sample;

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Streaming linear resampler for one channel. Feed input in chunks via
/// [`Resampler::process`]; output length varies with `ratio` and is never
/// known exactly in advance, so callers push into a growable buffer.
#[derive(Debug, Clone)]
pub struct Resampler {
    ratio: f64,
    /// Fractional position into the *input* stream of the next output
    /// sample, relative to `history[0]`. Always in `[0, 1)` between calls.
    position: f64,
    history: [Sample; 2],
    primed: bool,
}

impl Resampler {
    /// `ratio = input_rate / output_rate`. A ratio `> 1` downsamples
    /// (fewer output samples than input), `< 1` upsamples.
    pub fn new(ratio: f64) -> Self {
        assert!(ratio > 0.0, "resample ratio must be positive");
        Self {
            ratio,
            position: 0.0,
            history: [0.0, 0.0],
            primed: false,
        }
    }

    #[inline]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        assert!(ratio > 0.0, "resample ratio must be positive");
        self.ratio = ratio;
    }

    /// Resample `input` and append results to `output`. Call repeatedly
    /// across a stream; internal state carries the fractional position and
    /// the last input sample across calls so no discontinuity appears at
    /// chunk boundaries.
    pub fn process(&mut self, input: &[Sample], output: &mut Vec<Sample>) {
        if input.is_empty() {
            return;
        }
        if !self.primed {
            self.history[1] = input[0];
            self.primed = true;
        }

        let mut index = 0usize;
        loop {
            while self.position >= 1.0 {
                self.history[0] = self.history[1];
                if index >= input.len() {
                    return;
                }
                self.history[1] = input[index];
                index += 1;
                self.position -= 1.0;
            }
            let interpolated =
            self.history[0] + (self.history[1] - self.history[0]) * self.position as Sample;
            output.push(interpolated);
            self.position += self.ratio;
        }
    }

    /// Reset the fractional position and interpolation history, e.g. after
    /// a seek or a pitch-shift-mode switch.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.history = [0.0, 0.0];
        self.primed = false;
    }
}

impl Processor for Resampler {
    fn reset(&mut self) {
        Resampler::reset(self);
    }
}

impl ProcessorConfig for Resampler {
    fn set_sample_rate(&mut self, _sample_rate: f64) {}
}

/// Expected number of output samples `process` will eventually emit for
/// `input_len` input samples, for pre-sizing output buffers.
pub fn estimate_output_len(input_len: usize, ratio: f64) -> usize {
    (input_len as f64 / ratio).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ratio_passes_samples_through() {
        let mut resampler = Resampler::new(1.0);
        let input = [0.0, 1.0, 2.0, 3.0, 4.0];
        let mut output = Vec::new();
        resampler.process(&input, &mut output);
        assert_eq!(output.len(), input.len());
        for (a, b) in input.iter().zip(output.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn upsampling_doubles_sample_count() {
        let mut resampler = Resampler::new(0.5);
        let input = vec![1.0; 100];
        let mut output = Vec::new();
        resampler.process(&input, &mut output);
        assert!((output.len() as i64 - 200).abs() <= 2);
    }

    #[test]
    fn downsampling_halves_sample_count() {
        let mut resampler = Resampler::new(2.0);
        let input = vec![1.0; 100];
        let mut output = Vec::new();
        resampler.process(&input, &mut output);
        assert!((output.len() as i64 - 50).abs() <= 2);
    }

    #[test]
    fn chunked_processing_matches_single_call() {
        let input: Vec<Sample> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();

        let mut whole = Resampler::new(1.3);
        let mut whole_out = Vec::new();
        whole.process(&input, &mut whole_out);

        let mut chunked = Resampler::new(1.3);
        let mut chunked_out = Vec::new();
        for chunk in input.chunks(37) {
            chunked.process(chunk, &mut chunked_out);
        }

        assert!((whole_out.len() as i64 - chunked_out.len() as i64).abs() <= 1);
    }

    #[test]
    fn reset_clears_interpolation_history() {
        let mut resampler = Resampler::new(1.0);
        let mut output = Vec::new();
        resampler.process(&[1.0, 1.0], &mut output);
        resampler.reset();
        assert_eq!(resampler.position, 0.0);
        assert!(!resampler.primed);
    }
}
