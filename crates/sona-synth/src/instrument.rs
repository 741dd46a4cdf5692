//! An instrument's note/velocity → voice-definition mapping table: resolve
//! (note, velocity) to a voice definition through the instrument's mapping
//! table (note-range × velocity-range → definition).

use crate::envelope::EnvelopeSpec;
use crate::oscillator::Waveform;

#[derive(Debug, Clone, Copy)]
pub struct UnisonLayer {
    pub detune_cents: f32,
    pub pan: f32,
}

impl UnisonLayer {
    pub const fn new(detune_cents: f32, pan: f32) -> Self {
        Self { detune_cents, pan }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FilterSpec {
    pub q: f32,
    pub envelope: EnvelopeSpec,
}

#[derive(Clone)]
pub struct VoiceDefinition {
    pub waveform: Waveform,
    pub unison: Vec<UnisonLayer>,
    pub amp_envelope: EnvelopeSpec,
    pub filter: Option<FilterSpec>,
}

impl VoiceDefinition {
    pub fn simple(waveform: Waveform, amp_envelope: EnvelopeSpec) -> Self {
        Self {
            waveform,
            unison: vec![UnisonLayer::new(0.0, 0.5)],
            amp_envelope,
            filter: None,
        }
    }
}

/// `(note_range, velocity_range) -> definition`, searched in insertion
/// order; the first matching range wins.
pub struct InstrumentMapping {
    entries: Vec<(std::ops::RangeInclusive<u8>, std::ops::RangeInclusive<u8>, VoiceDefinition)>,
    default: VoiceDefinition,
}

impl InstrumentMapping {
    pub fn new(default: VoiceDefinition) -> Self {
        Self { entries: Vec::new(), default }
    }

    pub fn add_range(
        &mut self,
        notes: std::ops::RangeInclusive<u8>,
        velocities: std::ops::RangeInclusive<u8>,
        definition: VoiceDefinition,
    ) {
        self.entries.push((notes, velocities, definition));
    }

    pub fn resolve(&self, note: u8, velocity: u8) -> &VoiceDefinition {
        self.entries
            .iter()
            .find(|(notes, velocities, _)| notes.contains(&note) && velocities.contains(&velocity))
            .map(|(_, _, def)| def)
            .unwrap_or(&self.default)
    }
}

/// A single sine voice across the whole keyboard, full velocity range,
/// no unison, no filter — the synth's built-in default instrument.
pub fn default_instrument() -> InstrumentMapping {
    InstrumentMapping::new(VoiceDefinition::simple(Waveform::Sine, EnvelopeSpec::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_outside_any_range() {
        let mapping = default_instrument();
        let def = mapping.resolve(69, 100);
        assert_eq!(def.waveform, Waveform::Sine);
    }

    #[test]
    fn first_matching_range_wins() {
        let mut mapping = default_instrument();
        mapping.add_range(0..=60, 0..=127, VoiceDefinition::simple(Waveform::Saw, EnvelopeSpec::default()));
        mapping.add_range(61..=127, 0..=127, VoiceDefinition::simple(Waveform::Square, EnvelopeSpec::default()));
        assert_eq!(mapping.resolve(30, 64).waveform, Waveform::Saw);
        assert_eq!(mapping.resolve(100, 64).waveform, Waveform::Square);
    }
}
