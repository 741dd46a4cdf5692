//! A 16-channel polyphonic synthesizer driven by MIDI: unison
//! oscillators, ADSR-enveloped amplitude and filter, voice stealing,
//! sustain-pedal latching, and per-note MPE expression.

mod channel;
mod envelope;
mod instrument;
mod oscillator;
mod synth;
mod voice;

pub use channel::SynthChannel;
pub use envelope::{AdsrEnvelope, EnvelopeSpec};
pub use instrument::{default_instrument, FilterSpec, InstrumentMapping, UnisonLayer, VoiceDefinition};
pub use oscillator::{Oscillator, Waveform};
pub use synth::Synth;
pub use voice::Voice;
