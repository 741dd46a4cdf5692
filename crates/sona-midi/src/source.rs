//! MIDI sources: a physical input device or an internal
//! emitter. Hardware I/O itself is out of scope and lives with whoever
//! owns the hardware polling thread — this crate only models the
//! identity a route connects to and a push point for that thread to
//! feed messages through.

/// A node that emits MIDI messages and, optionally, SysEx. Routes are
/// identified by source/destination identity (`Arc::ptr_eq`), not name,
/// so two sources may share a display name.
pub trait MidiSource: Send + Sync {
    fn name(&self) -> &str;
}

/// An in-process source driven by whatever owns it calling
/// [`Router::dispatch_message`](crate::Router::dispatch_message) directly
/// — a sequencer, a test harness, or an internal generator.
pub struct InternalSource {
    name: String,
}

impl InternalSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl MidiSource for InternalSource {
    fn name(&self) -> &str {
        &self.name
    }
}
