//! Cross-cutting error taxonomy for the audio engine core.
//!
//! Device-layer specifics (`DeviceError`, `NotSupported`, `Timeout` on a
//! device operation) live in `sona-audio::AudioError` instead — this is the
//! half of the taxonomy that isn't tied to a native backend.

use thiserror::Error;

/// Core error type shared by the graph, MIDI, synth, and timeline crates.
#[derive(Error, Debug)]
pub enum SonaError {
    #[error("provider does not support seeking")]
    NotSeekable,

    #[error("operation exceeded its deadline")]
    Timeout,

    #[error("operation on a disposed resource")]
    Disposed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("route is faulted and drops all further messages")]
    RouteFaulted,

    #[error("decoder error: {0}")]
    DecoderError(String),

    #[error("encoder error: {0}")]
    EncoderError(String),

    #[error("sample format unsupported: {0}")]
    FormatUnsupported(String),
}

/// Result type alias.
pub type SonaResult<T> = Result<T, SonaError>;
