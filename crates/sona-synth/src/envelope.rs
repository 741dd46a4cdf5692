//! ADSR envelope: four linear segments. Release always starts
//! from whatever level the envelope is actually at, not from the sustain
//! level — a note released mid-attack or mid-decay fades from there.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeSpec {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl EnvelopeSpec {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self { attack, decay, sustain, release }
    }
}

impl Default for EnvelopeSpec {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.7, 0.3)
    }
}

pub struct AdsrEnvelope {
    spec: EnvelopeSpec,
    stage: Stage,
    level: f32,
    release_start_level: f32,
    sample_rate: f32,
}

impl AdsrEnvelope {
    pub fn new(spec: EnvelopeSpec, sample_rate: f32) -> Self {
        Self {
            spec,
            stage: Stage::Idle,
            level: 0.0,
            release_start_level: 0.0,
            sample_rate,
        }
    }

    pub fn trigger(&mut self) {
        self.stage = Stage::Attack;
    }

    /// Begin release from whatever level the envelope currently holds
    /// ("release starts from the current level, not from the
    /// sustain level").
    pub fn release(&mut self) {
        if self.stage != Stage::Idle && self.stage != Stage::Release {
            self.release_start_level = self.level;
            self.stage = Stage::Release;
        }
    }

    pub fn finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => 0.0,
            Stage::Attack => {
                let rate = 1.0 / (self.spec.attack * self.sample_rate).max(1.0);
                self.level += rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
                self.level
            }
            Stage::Decay => {
                let rate = (1.0 - self.spec.sustain) / (self.spec.decay * self.sample_rate).max(1.0);
                self.level -= rate;
                if self.level <= self.spec.sustain {
                    self.level = self.spec.sustain;
                    self.stage = Stage::Sustain;
                }
                self.level
            }
            Stage::Sustain => self.spec.sustain,
            Stage::Release => {
                let rate = self.release_start_level / (self.spec.release * self.sample_rate).max(1.0);
                self.level -= rate;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
                self.level
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_mid_attack_fades_from_current_level_not_sustain() {
        let mut env = AdsrEnvelope::new(EnvelopeSpec::new(1.0, 0.1, 0.5, 1.0), 1000.0);
        env.trigger();
        for _ in 0..100 {
            env.next_sample();
        }
        let level_at_release = env.level();
        assert!(level_at_release > 0.0 && level_at_release < 1.0);
        env.release();
        let first_release_sample = env.next_sample();
        assert!(first_release_sample < level_at_release);
        assert!((level_at_release - env.level() - (level_at_release / 1000.0)).abs() < 1e-3);
    }

    #[test]
    fn finished_after_attack_decay_release() {
        let spec = EnvelopeSpec::new(0.01, 0.01, 0.5, 0.01);
        let mut env = AdsrEnvelope::new(spec, 1000.0);
        env.trigger();
        for _ in 0..20 {
            env.next_sample();
        }
        env.release();
        for _ in 0..20 {
            env.next_sample();
        }
        assert!(env.finished());
    }

    #[test]
    fn sustain_holds_steady() {
        let mut env = AdsrEnvelope::new(EnvelopeSpec::new(0.001, 0.001, 0.6, 1.0), 1000.0);
        env.trigger();
        for _ in 0..10 {
            env.next_sample();
        }
        let a = env.next_sample();
        let b = env.next_sample();
        assert!((a - 0.6).abs() < 1e-6);
        assert!((b - 0.6).abs() < 1e-6);
    }
}
