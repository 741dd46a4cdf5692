//! One of the synth's 16 MIDI channels: a voice pool, an instrument
//! reference, channel-wide pitch-bend, and the sustain-pedal latch.

use std::sync::Arc;

use sona_core::Sample;

use crate::instrument::InstrumentMapping;
use crate::voice::Voice;

pub struct SynthChannel {
    pub(crate) voices: Vec<Voice>,
    max_voices: usize,
    instrument: Arc<InstrumentMapping>,
    pitch_bend_semitones: f32,
    sustain_pedal_down: bool,
    next_age: u64,
    sample_rate: f32,
}

impl SynthChannel {
    pub fn new(max_voices: usize, instrument: Arc<InstrumentMapping>, sample_rate: f32) -> Self {
        Self {
            voices: Vec::with_capacity(max_voices),
            max_voices,
            instrument,
            pitch_bend_semitones: 0.0,
            sustain_pedal_down: false,
            next_age: 0,
            sample_rate,
        }
    }

    pub fn set_instrument(&mut self, instrument: Arc<InstrumentMapping>) {
        self.instrument = instrument;
    }

    pub fn pitch_bend_semitones(&self) -> f32 {
        self.pitch_bend_semitones
    }

    pub fn set_pitch_bend(&mut self, semitones: f32) {
        self.pitch_bend_semitones = semitones;
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Resolve `(note, velocity)` to a definition, steal the oldest
    /// releasing voice when the pool is full, and construct
    /// the new voice.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        let definition = self.instrument.resolve(note, velocity).clone();
        let age = self.next_age;
        self.next_age += 1;
        let voice = Voice::new(note, velocity, &definition, self.sample_rate, age);

        if self.voices.len() < self.max_voices {
            self.voices.push(voice);
            return;
        }

        let steal_index = self
        .voices
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_releasing())
        .min_by_key(|(_, v)| v.age())
        .map(|(i, _)| i)
        .unwrap_or_else(|| {
                self.voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.age())
                .map(|(i, _)| i)
                .unwrap_or(0)
        });
        self.voices[steal_index] = voice;
    }

    pub fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.note() == note && !v.is_releasing()) {
            voice.note_off(self.sustain_pedal_down);
        }
    }

    pub fn set_sustain_pedal(&mut self, down: bool) {
        self.sustain_pedal_down = down;
        if !down {
            for voice in self.voices.iter_mut().filter(|v| v.is_sustained()) {
                voice.release_from_sustain();
            }
        }
    }

    pub fn all_notes_off(&mut self) {
        self.voices.clear();
    }

    /// MPE: route a per-note expression dimension to every voice currently
    /// sounding on this channel. MPE assigns one note per member channel
    /// at a time, so this is effectively the active voice.
    pub fn set_active_note_bend(&mut self, semitones: f32) {
        for voice in &mut self.voices {
            voice.note_bend_semitones = semitones;
        }
    }

    pub fn set_active_note_pressure(&mut self, pressure: f32) {
        for voice in &mut self.voices {
            voice.pressure = pressure;
        }
    }

    pub fn set_active_note_timbre(&mut self, timbre: f32) {
        for voice in &mut self.voices {
            voice.timbre = timbre;
        }
    }

    pub fn render(&mut self, buffer: &mut [Sample]) {
        for voice in &mut self.voices {
            voice.render(buffer, self.pitch_bend_semitones);
        }
        self.voices.retain(|v| !v.finished());
    }
}
