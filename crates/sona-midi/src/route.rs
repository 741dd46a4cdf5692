//! A route: one source, one destination, an ordered processor chain, and
//! a sticky faulted flag (`RouteFaulted`) once a destination rejects a
//! message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex as PLMutex;

use sona_core::{MidiMessage, SonaError};

use crate::destination::MidiDestination;
use crate::processor::{MidiProcessor, ProcessorChain};
use crate::source::MidiSource;

type ErrorSubscriber = Arc<dyn Fn(&Route, &SonaError) + Send + Sync>;

pub struct Route {
    source: Arc<dyn MidiSource>,
    destination: Arc<dyn MidiDestination>,
    processors: ProcessorChain,
    faulted: AtomicBool,
    error_subscribers: ArcSwap<Vec<ErrorSubscriber>>,
}

impl Route {
    pub(crate) fn new(source: Arc<dyn MidiSource>, destination: Arc<dyn MidiDestination>) -> Arc<Self> {
        Arc::new(Self {
                source,
                destination,
                processors: ProcessorChain::new(),
                faulted: AtomicBool::new(false),
                error_subscribers: ArcSwap::from_pointee(Vec::new()),
        })
    }

    pub fn source(&self) -> &Arc<dyn MidiSource> {
        &self.source
    }

    pub fn destination(&self) -> &Arc<dyn MidiDestination> {
        &self.destination
    }

    pub fn faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    pub fn add_processor(&self, processor: Arc<PLMutex<dyn MidiProcessor>>) {
        self.processors.push(processor);
    }

    pub fn remove_processor(&self, processor: &Arc<PLMutex<dyn MidiProcessor>>) {
        self.processors.remove(processor);
    }

    pub fn on_route_error(&self, subscriber: ErrorSubscriber) {
        self.error_subscribers.rcu(|current| {
                let mut next = current.clone();
                next.push(subscriber.clone());
                next
        });
    }

    /// Deliver a single incoming message: run the processor chain, then
    /// forward every resulting message to the destination. Faults the
    /// route (dropping every later message, "faulted within one
    /// message") on the destination's first failure.
    pub fn process_message(&self, message: MidiMessage) {
        if self.faulted() {
            return;
        }
        for outgoing in self.processors.process(message) {
            if let Err(err) = self.destination.send(outgoing) {
                self.fault(&err);
                return;
            }
        }
    }

    /// SysEx bypasses the processor chain entirely and only
    /// ever reaches physical destinations.
    pub fn process_sysex(&self, bytes: &[u8]) {
        if self.faulted() || !self.destination.is_physical() {
            return;
        }
        if let Err(err) = self.destination.send_sysex(bytes) {
            self.fault(&err);
        }
    }

    /// Pump time-driven processor stages (the arpeggiator) and forward
    /// whatever they emit.
    pub fn pump(&self, now_us: u64) {
        if self.faulted() {
            return;
        }
        for outgoing in self.processors.tick(now_us) {
            if let Err(err) = self.destination.send(outgoing) {
                self.fault(&err);
                return;
            }
        }
    }

    fn fault(&self, err: &SonaError) {
        self.faulted.store(true, Ordering::Release);
        log::error!("MIDI route to {} faulted: {}", self.destination.name(), err);
        for subscriber in self.error_subscribers.load().iter() {
            subscriber(self, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::RecordingDestination;
    use crate::processor::Transpose;
    use crate::source::InternalSource;
    use parking_lot::Mutex;

    #[test]
    fn message_reaches_destination_through_chain() {
        let source = Arc::new(InternalSource::new("src"));
        let destination = Arc::new(RecordingDestination::new("dst"));
        let route = Route::new(source, destination.clone());
        route.add_processor(Arc::new(Mutex::new(Transpose::new(12))));

        route.process_message(MidiMessage::note_on(1, 60, 100, 0));

        let received = destination.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].note(), Some(72));
    }

    #[test]
    fn failing_destination_faults_route_within_one_message() {
        let source = Arc::new(InternalSource::new("src"));
        let destination = Arc::new(RecordingDestination::always_failing("dst"));
        let route = Route::new(source, destination.clone());

        route.process_message(MidiMessage::note_on(1, 60, 100, 0));
        assert!(route.faulted());

        route.process_message(MidiMessage::note_on(1, 61, 100, 0));
        assert_eq!(destination.received().len(), 0);
    }

    #[test]
    fn route_error_subscriber_is_notified_on_fault() {
        let source = Arc::new(InternalSource::new("src"));
        let destination = Arc::new(RecordingDestination::always_failing("dst"));
        let route = Route::new(source, destination);

        let seen = Arc::new(Mutex::new(false));
        let seen_clone = seen.clone();
        route.on_route_error(Arc::new(move |_route, _err| {
                    *seen_clone.lock() = true;
        }));

        route.process_message(MidiMessage::note_on(1, 60, 100, 0));
        assert!(*seen.lock());
    }
}
