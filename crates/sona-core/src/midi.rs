//! The MIDI message model: a 4-tuple of raw bytes plus
//! derived, immutable accessors. Routing, processor chains, and SysEx
//! delivery live in `sona-midi`; this module only defines the wire-level
//! unit those layers pass around.

use serde::{Deserialize, Serialize};

/// MIDI 1.0 status nibbles (channel voice messages).
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
    pub const SYSTEM: u8 = 0xF0;
}

/// Common MIDI CC numbers.
pub mod cc {
    pub const BANK_SELECT_MSB: u8 = 0;
    pub const MOD_WHEEL: u8 = 1;
    pub const BREATH: u8 = 2;
    pub const FOOT_CONTROLLER: u8 = 4;
    pub const PORTAMENTO_TIME: u8 = 5;
    pub const DATA_ENTRY_MSB: u8 = 6;
    pub const VOLUME: u8 = 7;
    pub const BALANCE: u8 = 8;
    pub const PAN: u8 = 10;
    pub const EXPRESSION: u8 = 11;
    pub const BANK_SELECT_LSB: u8 = 32;
    pub const DATA_ENTRY_LSB: u8 = 38;
    pub const SUSTAIN: u8 = 64;
    pub const SOSTENUTO: u8 = 66;
    pub const SOFT_PEDAL: u8 = 67;
    /// MPE timbre dimension (per-note "brightness"), CC#74 by convention.
    pub const TIMBRE: u8 = 74;
    pub const ALL_SOUND_OFF: u8 = 120;
    pub const RESET_ALL_CONTROLLERS: u8 = 121;
    pub const ALL_NOTES_OFF: u8 = 123;
}

/// MIDI channel, 1-16 (the wire-level nibble is 0-15; this is the derived,
/// musician-facing numbering asks for).
pub type MidiChannel = u8;

/// Note name helper, C..B with sharps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteName {
    C, Cs, D, Ds, E, F, Fs, G, Gs, A, As, B,
}

impl NoteName {
    pub fn from_note(note: u8) -> (Self, i8) {
        let octave = (note as i8 / 12) - 1;
        let name = match note % 12 {
            0 => NoteName::C,
            1 => NoteName::Cs,
            2 => NoteName::D,
            3 => NoteName::Ds,
            4 => NoteName::E,
            5 => NoteName::F,
            6 => NoteName::Fs,
            7 => NoteName::G,
            8 => NoteName::Gs,
            9 => NoteName::A,
            10 => NoteName::As,
            11 => NoteName::B,
            _ => unreachable!(),
        };
        (name, octave)
    }

    pub fn to_note(self, octave: i8) -> u8 {
        let base = match self {
            NoteName::C => 0,
            NoteName::Cs => 1,
            NoteName::D => 2,
            NoteName::Ds => 3,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::Fs => 6,
            NoteName::G => 7,
            NoteName::Gs => 8,
            NoteName::A => 9,
            NoteName::As => 10,
            NoteName::B => 11,
        };
        ((octave + 1) * 12 + base) as u8
    }
}

/// A channel voice command, derived from a message's status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiCommand {
    NoteOff,
    NoteOn,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    /// Status >= 0xF0: system common/real-time, including SysEx start (0xF0).
    System,
}

/// Immutable MIDI message: `(status, data1, data2, timestamp)`.
///
/// `timestamp` is a sample-accurate offset (frames since some reference
/// point chosen by the caller — a buffer start for router processing, a
/// tick-derived sample offset for timeline scheduling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiMessage {
    status: u8,
    data1: u8,
    data2: u8,
    timestamp: u64,
}

impl MidiMessage {
    pub fn new(status: u8, data1: u8, data2: u8, timestamp: u64) -> Self {
        Self {
            status,
            data1: data1 & 0x7F,
            data2: data2 & 0x7F,
            timestamp,
        }
    }

    pub fn note_on(channel: MidiChannel, note: u8, velocity: u8, timestamp: u64) -> Self {
        Self::new(status::NOTE_ON | channel_nibble(channel), note, velocity, timestamp)
    }

    pub fn note_off(channel: MidiChannel, note: u8, velocity: u8, timestamp: u64) -> Self {
        Self::new(status::NOTE_OFF | channel_nibble(channel), note, velocity, timestamp)
    }

    pub fn control_change(channel: MidiChannel, controller: u8, value: u8, timestamp: u64) -> Self {
        Self::new(status::CONTROL_CHANGE | channel_nibble(channel), controller, value, timestamp)
    }

    pub fn pitch_bend(channel: MidiChannel, value: i16, timestamp: u64) -> Self {
        let bent = (value + 8192).clamp(0, 16383) as u16;
        Self::new(
            status::PITCH_BEND | channel_nibble(channel),
            (bent & 0x7F) as u8,
            ((bent >> 7) & 0x7F) as u8,
            timestamp,
        )
    }

    pub fn program_change(channel: MidiChannel, program: u8, timestamp: u64) -> Self {
        Self::new(status::PROGRAM_CHANGE | channel_nibble(channel), program, 0, timestamp)
    }

    pub fn channel_pressure(channel: MidiChannel, pressure: u8, timestamp: u64) -> Self {
        Self::new(status::CHANNEL_PRESSURE | channel_nibble(channel), pressure, 0, timestamp)
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.status
    }

    #[inline]
    pub fn data1(&self) -> u8 {
        self.data1
    }

    #[inline]
    pub fn data2(&self) -> u8 {
        self.data2
    }

    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The command this message carries, derived from the status nibble.
    pub fn command(&self) -> MidiCommand {
        match self.status & 0xF0 {
            status::NOTE_OFF => MidiCommand::NoteOff,
            status::NOTE_ON if self.data2 == 0 => MidiCommand::NoteOff,
            status::NOTE_ON => MidiCommand::NoteOn,
            status::POLY_PRESSURE => MidiCommand::PolyPressure,
            status::CONTROL_CHANGE => MidiCommand::ControlChange,
            status::PROGRAM_CHANGE => MidiCommand::ProgramChange,
            status::CHANNEL_PRESSURE => MidiCommand::ChannelPressure,
            status::PITCH_BEND => MidiCommand::PitchBend,
            _ => MidiCommand::System,
        }
    }

    /// 1-16 for channel voice messages; 0 for system messages (no channel).
    pub fn channel(&self) -> MidiChannel {
        if self.status & 0xF0 == status::SYSTEM {
            0
        } else {
            (self.status & 0x0F) + 1
        }
    }

    /// Note number, for Note On/Off/Poly Pressure.
    pub fn note(&self) -> Option<u8> {
        matches!(
            self.command(),
            MidiCommand::NoteOn | MidiCommand::NoteOff | MidiCommand::PolyPressure
        )
        .then_some(self.data1)
    }

    /// Velocity (Note On/Off) or pressure value (Poly Pressure).
    pub fn velocity(&self) -> Option<u8> {
        matches!(
            self.command(),
            MidiCommand::NoteOn | MidiCommand::NoteOff | MidiCommand::PolyPressure
        )
        .then_some(self.data2)
    }

    /// Signed pitch-bend value, -8192..=8191, center = 0.
    pub fn pitch_bend_value(&self) -> Option<i16> {
        (self.command() == MidiCommand::PitchBend).then(|| {
                let raw = ((self.data2 as i16) << 7) | self.data1 as i16;
                raw - 8192
        })
    }

    /// `(controller, value)` for Control Change messages.
    pub fn control_change_value(&self) -> Option<(u8, u8)> {
        (self.command() == MidiCommand::ControlChange).then_some((self.data1, self.data2))
    }

    pub fn is_note_on(&self) -> bool {
        self.command() == MidiCommand::NoteOn
    }

    pub fn is_note_off(&self) -> bool {
        self.command() == MidiCommand::NoteOff
    }

    /// Parse from raw MIDI 1.0 bytes (2 or 3 bytes, no running status).
    pub fn from_bytes(bytes: &[u8], timestamp: u64) -> Option<Self> {
        let status = *bytes.first()?;
        if status & 0xF0 == status::SYSTEM {
            return None; // SysEx and system-common messages aren't 3-byte voice messages.
        }
        let data1 = *bytes.get(1)?;
        let data2 = match status & 0xF0 {
            status::PROGRAM_CHANGE | status::CHANNEL_PRESSURE => 0,
            _ => *bytes.get(2)?,
        };
        Some(Self::new(status, data1, data2, timestamp))
    }

    /// Serialize to raw MIDI 1.0 bytes, returning the byte count written.
    pub fn to_bytes(&self, buffer: &mut [u8]) -> usize {
        let len = match self.status & 0xF0 {
            status::PROGRAM_CHANGE | status::CHANNEL_PRESSURE => 2,
            _ => 3,
        };
        if buffer.len() < len {
            return 0;
        }
        buffer[0] = self.status;
        buffer[1] = self.data1;
        if len == 3 {
            buffer[2] = self.data2;
        }
        len
    }
}

#[inline]
fn channel_nibble(channel: MidiChannel) -> u8 {
    channel.saturating_sub(1).min(15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_round_trips_through_bytes() {
        let msg = MidiMessage::note_on(1, 69, 100, 0);
        let mut buf = [0u8; 3];
        assert_eq!(msg.to_bytes(&mut buf), 3);
        let back = MidiMessage::from_bytes(&buf, 0).unwrap();
        assert_eq!(back.note(), Some(69));
        assert_eq!(back.velocity(), Some(100));
        assert_eq!(back.channel(), 1);
        assert!(back.is_note_on());
    }

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        let msg = MidiMessage::note_on(1, 60, 0, 0);
        assert!(msg.is_note_off());
        assert_eq!(msg.command(), MidiCommand::NoteOff);
    }

    #[test]
    fn pitch_bend_center_round_trips_to_zero() {
        let msg = MidiMessage::pitch_bend(1, 0, 0);
        assert_eq!(msg.pitch_bend_value(), Some(0));
    }

    #[test]
    fn channel_is_one_based() {
        let msg = MidiMessage::control_change(16, cc::SUSTAIN, 127, 0);
        assert_eq!(msg.channel(), 16);
        assert_eq!(msg.control_change_value(), Some((cc::SUSTAIN, 127)));
    }

    #[test]
    fn note_name_round_trip() {
        let (name, octave) = NoteName::from_note(69);
        assert_eq!(name, NoteName::A);
        assert_eq!(octave, 4);
        assert_eq!(name.to_note(4), 69);
    }
}
