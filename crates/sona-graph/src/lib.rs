//! Component graph: the pull-model tree of mixers, players, and their
//! modifier/analyzer chains.

// Audio engine uses explicit indexing for SIMD-friendly loops.
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(dead_code)]

pub mod component;
pub mod mixer;
pub mod modifier;
pub mod player;
pub mod provider;
pub mod scratch;

pub use component::{pan_gains, render_and_accumulate, Component, ComponentId, ComponentState};
pub use mixer::Mixer;
pub use modifier::{Analyzer, AnalyzerChain, GainModifier, Modifier, ModifierChain, PeakAnalyzer};
pub use player::{
    vbap_gains, LoopPoints, PanningMethod, PlaybackMode, PlaybackState, SoundPlayer, SpeakerPosition,
    SurroundPlayer,
};
pub use provider::{
    ChunkedDecoderProvider, MicrophoneProvider, NetworkProvider, SoundDataProvider,
    StreamDecodedProvider, SyntheticProvider, Waveform,
};
pub use scratch::{rent, ScratchBuffer};
