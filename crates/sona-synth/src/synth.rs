//! The 16-channel synthesizer: `process-midi-message(m)`,
//! `set-mpe-enabled(b)`, and the audio-thread `render`.

use std::sync::Arc;

use parking_lot::Mutex;

use sona_core::{cc, MidiCommand, MidiMessage, Sample, SonaResult};
use sona_midi::MidiDestination;

use crate::channel::SynthChannel;
use crate::instrument::{default_instrument, InstrumentMapping};

const CHANNEL_COUNT: usize = 16;
const MAX_VOICES_PER_CHANNEL: usize = 16;

/// Owns 16 channels' worth of voices. MIDI handling and `render` both take
/// the same lock — MIDI traffic is low-rate control-thread input, so a
/// short, uncontended lock is an acceptable trade against a full lock-free
/// queue (c.f. the mixer's readers-writer child list for the render path
/// proper).
pub struct Synth {
    channels: Mutex<Vec<SynthChannel>>,
    mpe_enabled: Mutex<bool>,
}

impl Synth {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_instrument(sample_rate, Arc::new(default_instrument()))
    }

    pub fn with_instrument(sample_rate: f32, instrument: Arc<InstrumentMapping>) -> Self {
        let channels = (0..CHANNEL_COUNT)
        .map(|_| SynthChannel::new(MAX_VOICES_PER_CHANNEL, instrument.clone(), sample_rate))
        .collect();
        Self {
            channels: Mutex::new(channels),
            mpe_enabled: Mutex::new(false),
        }
    }

    pub fn mpe_enabled(&self) -> bool {
        *self.mpe_enabled.lock()
    }

    /// Switching modes sends an implicit All-Notes-Off.
    pub fn set_mpe_enabled(&self, enabled: bool) {
        let mut flag = self.mpe_enabled.lock();
        if *flag != enabled {
            *flag = enabled;
            for channel in self.channels.lock().iter_mut() {
                channel.all_notes_off();
            }
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.channels.lock().iter().map(|c| c.active_voice_count()).sum()
    }

    pub fn process_midi_message(&self, message: MidiMessage) {
        let channel_index = match message.channel() {
            1..=16 => (message.channel() - 1) as usize,
            _ => return,
        };
        let mpe = self.mpe_enabled();
        let mut channels = self.channels.lock();
        let channel = &mut channels[channel_index];

        match message.command() {
            MidiCommand::NoteOn => {
                // `command()` already demotes velocity-0 Note On to NoteOff.
                if let (Some(note), Some(velocity)) = (message.note(), message.velocity()) {
                    channel.note_on(note, velocity);
                }
            }
            MidiCommand::NoteOff => {
                if let Some(note) = message.note() {
                    channel.note_off(note);
                }
            }
            MidiCommand::PitchBend => {
                if let Some(value) = message.pitch_bend_value() {
                    let semitones = value as f32 / 8192.0 * 2.0; // +-2 semitone default bend range
                    if mpe {
                        channel.set_active_note_bend(semitones);
                    } else {
                        channel.set_pitch_bend(semitones);
                    }
                }
            }
            MidiCommand::ChannelPressure if mpe => {
                channel.set_active_note_pressure(message.data1() as f32 / 127.0);
            }
            MidiCommand::ControlChange => {
                if let Some((controller, value)) = message.control_change_value() {
                    match controller {
                        cc::SUSTAIN => channel.set_sustain_pedal(value >= 64),
                        cc::TIMBRE if mpe => channel.set_active_note_timbre(value as f32 / 127.0),
                        cc::ALL_NOTES_OFF | cc::ALL_SOUND_OFF => channel.all_notes_off(),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    pub fn render(&self, buffer: &mut [Sample]) {
        buffer.fill(0.0);
        for channel in self.channels.lock().iter_mut() {
            channel.render(buffer);
        }
    }
}

impl MidiDestination for Synth {
    fn name(&self) -> &str {
        "synth"
    }

    fn send(&self, message: MidiMessage) -> SonaResult<()> {
        self.process_midi_message(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_then_render_produces_nonsilent_output() {
        let synth = Synth::new(48_000.0);
        synth.process_midi_message(MidiMessage::note_on(1, 69, 100, 0));
        let mut buffer = vec![0.0; (48_000 / 10) * 2];
        synth.render(&mut buffer);
        assert!(buffer.iter().any(|s| s.abs() > 1e-6));
    }

    #[test]
    fn note_off_eventually_drops_active_voice_count_to_zero() {
        let synth = Synth::new(48_000.0);
        synth.process_midi_message(MidiMessage::note_on(1, 69, 100, 0));
        synth.process_midi_message(MidiMessage::note_off(1, 69, 0, 0));
        let mut buffer = vec![0.0; 48_000 * 2];
        synth.render(&mut buffer);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn mpe_mode_switch_clears_all_voices() {
        let synth = Synth::new(48_000.0);
        synth.process_midi_message(MidiMessage::note_on(1, 69, 100, 0));
        assert_eq!(synth.active_voice_count(), 1);
        synth.set_mpe_enabled(true);
        assert_eq!(synth.active_voice_count(), 0);
    }
}
