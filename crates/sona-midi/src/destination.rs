//! MIDI destinations: a physical output device or an
//! in-process MIDI-controllable component (synth, another router stage).

use sona_core::{MidiMessage, SonaError, SonaResult};

/// A node a route delivers messages to. `send` returning `Err` faults the
/// route ( faulting policy). SysEx is only ever offered to
/// physical destinations (`is_physical`); in-process components never see
/// it.
pub trait MidiDestination: Send + Sync {
    fn name(&self) -> &str;

    fn send(&self, message: MidiMessage) -> SonaResult<()>;

    fn is_physical(&self) -> bool {
        false
    }

    fn send_sysex(&self, _bytes: &[u8]) -> SonaResult<()> {
        Err(SonaError::InvalidArgument(
                "destination does not accept SysEx".to_string(),
        ))
    }
}

/// A destination that records every message it receives, or fails every
/// message when `always_fail` — used to exercise the faulting policy.
pub struct RecordingDestination {
    name: String,
    received: parking_lot::Mutex<Vec<MidiMessage>>,
    always_fail: bool,
}

impl RecordingDestination {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: parking_lot::Mutex::new(Vec::new()),
            always_fail: false,
        }
    }

    pub fn always_failing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: parking_lot::Mutex::new(Vec::new()),
            always_fail: true,
        }
    }

    pub fn received(&self) -> Vec<MidiMessage> {
        self.received.lock().clone()
    }
}

impl MidiDestination for RecordingDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: MidiMessage) -> SonaResult<()> {
        if self.always_fail {
            return Err(SonaError::InvalidArgument("destination always fails".to_string()));
        }
        self.received.lock().push(message);
        Ok(())
    }
}
