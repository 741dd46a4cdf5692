//! The MIDI router: `connect`/`disconnect` plus message
//! dispatch from whatever owns a source's input thread.

use std::sync::Arc;

use parking_lot::Mutex;

use sona_core::MidiMessage;

use crate::destination::MidiDestination;
use crate::route::Route;
use crate::source::MidiSource;

/// Owns every live route. Route mutation (connect/disconnect) is rare and
/// takes a short lock; dispatch clones the route list under that same
/// lock and then releases it before touching any destination, so a slow
/// destination never blocks a structural edit.
#[derive(Default)]
pub struct Router {
    routes: Mutex<Vec<Arc<Route>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
        }
    }

    pub fn connect(&self, source: Arc<dyn MidiSource>, destination: Arc<dyn MidiDestination>) -> Arc<Route> {
        let route = Route::new(source, destination);
        self.routes.lock().push(route.clone());
        route
    }

    pub fn disconnect(&self, route: &Arc<Route>) {
        self.routes.lock().retain(|r| !Arc::ptr_eq(r, route));
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.lock().clone()
    }

    /// Dispatch a message from `source` to every route connected to it.
    pub fn dispatch_message(&self, source: &Arc<dyn MidiSource>, message: MidiMessage) {
        for route in self.routes.lock().clone() {
            if Arc::ptr_eq(route.source(), source) {
                route.process_message(message);
            }
        }
    }

    /// Dispatch SysEx from `source` to every route connected to it.
    pub fn dispatch_sysex(&self, source: &Arc<dyn MidiSource>, bytes: &[u8]) {
        for route in self.routes.lock().clone() {
            if Arc::ptr_eq(route.source(), source) {
                route.process_sysex(bytes);
            }
        }
    }

    /// Pump every route's time-driven processor stages.
    pub fn pump_all(&self, now_us: u64) {
        for route in self.routes.lock().clone() {
            route.pump(now_us);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::RecordingDestination;
    use crate::source::InternalSource;

    #[test]
    fn connect_then_dispatch_reaches_destination() {
        let router = Router::new();
        let source: Arc<dyn MidiSource> = Arc::new(InternalSource::new("kbd"));
        let destination = Arc::new(RecordingDestination::new("synth"));
        router.connect(source.clone(), destination.clone());

        router.dispatch_message(&source, MidiMessage::note_on(1, 69, 100, 0));

        assert_eq!(destination.received().len(), 1);
    }

    #[test]
    fn disconnect_stops_further_dispatch() {
        let router = Router::new();
        let source: Arc<dyn MidiSource> = Arc::new(InternalSource::new("kbd"));
        let destination = Arc::new(RecordingDestination::new("synth"));
        let route = router.connect(source.clone(), destination.clone());
        router.disconnect(&route);

        router.dispatch_message(&source, MidiMessage::note_on(1, 69, 100, 0));

        assert_eq!(destination.received().len(), 0);
    }

    #[test]
    fn unrelated_source_does_not_trigger_route() {
        let router = Router::new();
        let source_a: Arc<dyn MidiSource> = Arc::new(InternalSource::new("a"));
        let source_b: Arc<dyn MidiSource> = Arc::new(InternalSource::new("b"));
        let destination = Arc::new(RecordingDestination::new("synth"));
        router.connect(source_a, destination.clone());

        router.dispatch_message(&source_b, MidiMessage::note_on(1, 69, 100, 0));

        assert_eq!(destination.received().len(), 0);
    }
}
