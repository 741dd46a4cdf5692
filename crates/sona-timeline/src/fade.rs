//! Fade gain envelopes: `gain(t)` for `t` the ramp's own
//! progress in `[0, 1]`, 0 = silent, 1 = full volume. Segment rendering
//! evaluates this with `t = elapsed / fade_in` for a fade-in and
//! `t = remaining / fade_out` for a fade-out.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeCurve {
    Linear,
    Logarithmic,
    SCurve,
    EqualPower,
}

impl FadeCurve {
    /// `t` is clamped to `[0, 1]` before evaluation.
    pub fn gain(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            // Exponential-shaped amplitude ramp: since perceived loudness
            // is roughly log(amplitude), this produces an approximately
            // linear loudness ramp. Conventionally called "logarithmic" by
            // DAWs despite the curve itself being exponential in amplitude.
            FadeCurve::Logarithmic => (10f32.powf(t) - 1.0) / 9.0,
            FadeCurve::SCurve => t * t * (3.0 - 2.0 * t),
            FadeCurve::EqualPower => (t * std::f32::consts::FRAC_PI_2).sin(),
        }
    }
}

/// Duration-in-seconds plus curve for one edge of a segment.
#[derive(Debug, Clone, Copy)]
pub struct Fade {
    pub duration_seconds: f64,
    pub curve: FadeCurve,
}

impl Fade {
    pub const NONE: Fade = Fade {
        duration_seconds: 0.0,
        curve: FadeCurve::Linear,
    };

    pub fn new(duration_seconds: f64, curve: FadeCurve) -> Self {
        Self { duration_seconds, curve }
    }
}

impl Default for Fade {
    fn default() -> Self {
        Self::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_curve_starts_at_zero_and_ends_at_one() {
        for curve in [FadeCurve::Linear, FadeCurve::Logarithmic, FadeCurve::SCurve, FadeCurve::EqualPower] {
            assert!(curve.gain(0.0).abs() < 1e-6, "{curve:?} should start silent");
            assert!((curve.gain(1.0) - 1.0).abs() < 1e-5, "{curve:?} should end at full gain");
        }
    }

    #[test]
    fn s_curve_is_symmetric_around_midpoint() {
        let a = FadeCurve::SCurve.gain(0.25);
        let b = 1.0 - FadeCurve::SCurve.gain(0.75);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        assert_eq!(FadeCurve::Linear.gain(-1.0), 0.0);
        assert_eq!(FadeCurve::Linear.gain(2.0), 1.0);
    }
}
