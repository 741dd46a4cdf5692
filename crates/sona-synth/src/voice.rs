//! A synthesizer's note-in-flight.

use sona_core::Sample;
use sona_dsp::biquad::{Biquad, FilterType};

use crate::envelope::AdsrEnvelope;
use crate::instrument::VoiceDefinition;
use crate::oscillator::Oscillator;

#[inline]
fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(0.0, 1.0);
    let angle = pan * std::f32::consts::FRAC_PI_2;
    (angle.cos(), angle.sin())
}

struct UnisonOscillator {
    oscillator: Oscillator,
    detune_ratio: f32,
    pan: f32,
}

/// A note-in-flight: unison layers, amplitude envelope, optional filter +
/// filter envelope, per-note MPE dimensions, release/sustain flags.
pub struct Voice {
    note: u8,
    velocity: f32,
    unison: Vec<UnisonOscillator>,
    amp_envelope: AdsrEnvelope,
    filter: Option<Biquad>,
    filter_envelope: Option<AdsrEnvelope>,
    sample_rate: f32,

    /// Per-note pitch-bend in semitones (MPE); added to the channel-wide bend.
    pub note_bend_semitones: f32,
    /// Per-note pressure, 0..1 (MPE channel pressure on this note's channel).
    pub pressure: f32,
    /// Per-note timbre (CC#74), 0..1 (MPE).
    pub timbre: f32,

    release: bool,
    sustained: bool,
    age: u64,
}

impl Voice {
    pub fn new(note: u8, velocity: u8, definition: &VoiceDefinition, sample_rate: f32, age: u64) -> Self {
        let unison = definition
        .unison
        .iter()
        .map(|layer| UnisonOscillator {
                oscillator: Oscillator::new(definition.waveform),
                detune_ratio: 2.0f32.powf(layer.detune_cents / 1200.0),
                pan: layer.pan,
        })
        .collect();

        let filter = definition.filter.as_ref().map(|_| Biquad::new(2, sample_rate as f64));
        let filter_envelope = definition
        .filter
        .as_ref()
        .map(|spec| AdsrEnvelope::new(spec.envelope, sample_rate));

        let mut amp_envelope = AdsrEnvelope::new(definition.amp_envelope, sample_rate);
        amp_envelope.trigger();
        let mut filter_envelope = filter_envelope;
        if let Some(env) = filter_envelope.as_mut() {
            env.trigger();
        }

        Self {
            note,
            velocity: velocity as f32 / 127.0,
            unison,
            amp_envelope,
            filter,
            filter_envelope,
            sample_rate,
            note_bend_semitones: 0.0,
            pressure: 0.0,
            timbre: 0.0,
            release: false,
            sustained: false,
            age,
        }
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn is_releasing(&self) -> bool {
        self.release
    }

    pub fn is_sustained(&self) -> bool {
        self.sustained
    }

    pub fn set_sustained(&mut self, sustained: bool) {
        self.sustained = sustained;
    }

    /// NoteOff. Held by the sustain pedal: latch instead of releasing
    /// ( sustain-pedal latching).
    pub fn note_off(&mut self, sustain_active: bool) {
        if sustain_active {
            self.sustained = true;
        } else {
            self.start_release();
        }
    }

    /// Release a voice that was held by the sustain pedal.
    pub fn release_from_sustain(&mut self) {
        if self.sustained {
            self.sustained = false;
            self.start_release();
        }
    }

    fn start_release(&mut self) {
        self.release = true;
        self.sustained = false;
        self.amp_envelope.release();
        if let Some(env) = self.filter_envelope.as_mut() {
            env.release();
        }
    }

    pub fn finished(&self) -> bool {
        self.amp_envelope.finished()
    }

    fn base_frequency(&self) -> f32 {
        440.0 * 2.0f32.powf((self.note as f32 - 69.0) / 12.0)
    }

    /// Render one block, accumulating into an interleaved stereo buffer
    /// ("Voice rendering... mono -> stereo").
    pub fn render(&mut self, buffer: &mut [Sample], channel_bend_semitones: f32) {
        let frames = buffer.len() / 2;
        let unison_count = self.unison.len().max(1);
        let normalize = 1.0 / (unison_count as f32).sqrt();
        let bend = self.note_bend_semitones + channel_bend_semitones;
        let base = self.base_frequency();

        for frame in 0..frames {
            let amp = self.amp_envelope.next_sample();
            let filter_env_level = self
            .filter_envelope
            .as_mut()
            .map(|env| env.next_sample())
            .unwrap_or(0.0);

            let mut left = 0.0;
            let mut right = 0.0;
            for layer in &mut self.unison {
                let frequency = base * layer.detune_ratio * 2.0f32.powf(bend / 12.0);
                let sample = layer.oscillator.next_sample(frequency, self.sample_rate);
                let (gl, gr) = pan_gains(layer.pan);
                left += sample * gl;
                right += sample * gr;
            }
            left *= normalize;
            right *= normalize;

            if let Some(filter) = self.filter.as_mut() {
                let cutoff = 200.0
                + self.velocity * 4000.0
                + self.pressure * 2000.0
                + self.timbre * 3000.0
                + filter_env_level * 8000.0;
                filter.set_type(FilterType::Lowpass, cutoff.max(20.0) as f64, 0.707, 0.0);
                left = filter.process_sample(left, 0);
                right = filter.process_sample(right, 1);
            }

            buffer[frame * 2] += left * amp;
            buffer[frame * 2 + 1] += right * amp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeSpec;
    use crate::instrument::VoiceDefinition;
    use crate::oscillator::Waveform;

    #[test]
    fn fresh_voice_produces_nonsilent_output() {
        let def = VoiceDefinition::simple(Waveform::Sine, EnvelopeSpec::new(0.001, 0.01, 0.8, 0.1));
        let mut voice = Voice::new(69, 100, &def, 48_000.0, 0);
        let mut buffer = vec![0.0; 48 * 2];
        voice.render(&mut buffer, 0.0);
        assert!(buffer.iter().any(|s| s.abs() > 1e-6));
    }

    #[test]
    fn note_off_then_render_reaches_finished() {
        let def = VoiceDefinition::simple(Waveform::Sine, EnvelopeSpec::new(0.001, 0.001, 0.5, 0.001));
        let mut voice = Voice::new(69, 100, &def, 1000.0, 0);
        let mut buffer = vec![0.0; 100 * 2];
        voice.render(&mut buffer, 0.0);
        voice.note_off(false);
        let mut buffer = vec![0.0; 1000 * 2];
        voice.render(&mut buffer, 0.0);
        assert!(voice.finished());
    }

    #[test]
    fn sustain_pedal_holds_note_past_note_off() {
        let def = VoiceDefinition::simple(Waveform::Sine, EnvelopeSpec::new(0.001, 0.001, 0.5, 0.1));
        let mut voice = Voice::new(69, 100, &def, 1000.0, 0);
        voice.note_off(true);
        assert!(voice.is_sustained());
        assert!(!voice.is_releasing());
        voice.release_from_sustain();
        assert!(voice.is_releasing());
        assert!(!voice.is_sustained());
    }
}
