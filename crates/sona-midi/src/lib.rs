//! The MIDI routing fabric: message model lives in
//! `sona_core::midi`; this crate adds sources, destinations, routes with
//! an ordered copy-on-write processor chain, and the built-in processors
//! (transpose, channel filter, velocity scale, arpeggiator, harmonizer,
//! randomizer).

mod destination;
mod processor;
mod route;
mod router;
mod source;

pub use destination::{MidiDestination, RecordingDestination};
pub use processor::{
    ArpPattern, Arpeggiator, ChannelFilter, Harmonizer, MidiProcessor, ProcessorChain, Randomizer,
    Transpose, VelocityScale,
};
pub use route::Route;
pub use router::Router;
pub use source::{InternalSource, MidiSource};
