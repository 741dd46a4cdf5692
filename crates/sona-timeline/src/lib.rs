//! Composition/track/segment timeline rendering: audio and
//! MIDI placements over a tempo map, with fades, looping, time-stretch,
//! and mute/solo.

mod composition;
mod fade;
mod segment;
mod track;

pub use composition::Composition;
pub use fade::{Fade, FadeCurve};
pub use segment::{AudioSegment, InMemoryMidiProvider, MidiDataProvider, MidiSegment, SegmentSettings};
pub use track::{AudioTrack, MidiTrack};
