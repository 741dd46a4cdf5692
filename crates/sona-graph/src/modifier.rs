//! Modifier & analyzer contracts plus their thread-safe,
//! copy-on-write processor lists ("thread-safe processor
//! lists"): writers take a short lock and swap in a new immutable
//! snapshot; the audio thread loads the snapshot pointer atomically and
//! enumerates it without ever blocking on a structural edit.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use sona_core::Sample;

/// A pure block transformer. Must not allocate in steady state; parameter
/// mutations from other threads must be observed via atomic loads, not
/// locks taken inside `process`.
pub trait Modifier: Send {
    fn process(&mut self, buffer: &mut [Sample], channels: usize);
    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
}

/// A read-only observer over the post-modifier buffer.
pub trait Analyzer: Send {
    fn observe(&mut self, buffer: &[Sample], channels: usize);
}

/// Copy-on-write ordered list of modifiers.
pub struct ModifierChain {
    snapshot: ArcSwap<Vec<Arc<Mutex<dyn Modifier>>>>,
}

impl ModifierChain {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Snapshot-enumerate and run every enabled modifier in order.
    pub fn process(&self, buffer: &mut [Sample], channels: usize) {
        let snapshot = self.snapshot.load();
        for modifier in snapshot.iter() {
            let mut guard = modifier.lock();
            if guard.enabled() {
                guard.process(buffer, channels);
            }
        }
    }

    pub fn push(&self, modifier: Arc<Mutex<dyn Modifier>>) {
        self.snapshot.rcu(|current| {
                let mut next = current.clone();
                next.push(modifier.clone());
                next
        });
    }

    pub fn remove_at(&self, index: usize) {
        self.snapshot.rcu(|current| {
                let mut next = current.clone();
                if index < next.len() {
                    next.remove(index);
                }
                next
        });
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ModifierChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy-on-write unordered set of analyzers.
pub struct AnalyzerChain {
    snapshot: ArcSwap<Vec<Arc<Mutex<dyn Analyzer>>>>,
}

impl AnalyzerChain {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn observe(&self, buffer: &[Sample], channels: usize) {
        let snapshot = self.snapshot.load();
        for analyzer in snapshot.iter() {
            analyzer.lock().observe(buffer, channels);
        }
    }

    pub fn add(&self, analyzer: Arc<Mutex<dyn Analyzer>>) {
        self.snapshot.rcu(|current| {
                let mut next = current.clone();
                next.push(analyzer.clone());
                next
        });
    }

    pub fn remove(&self, target: &Arc<Mutex<dyn Analyzer>>) {
        self.snapshot.rcu(|current| {
                let mut next = current.clone();
                next.retain(|a| !Arc::ptr_eq(a, target));
                next
        });
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnalyzerChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp-to-range note transposer, a built-in MIDI-chain-style modifier
/// expressed here as an audio-block gain stage for testing the chain
/// machinery: multiplies every sample by a fixed gain.
pub struct GainModifier {
    gain: f32,
    enabled: bool,
}

impl GainModifier {
    pub fn new(gain: f32) -> Self {
        Self { gain, enabled: true }
    }
}

impl Modifier for GainModifier {
    fn process(&mut self, buffer: &mut [Sample], _channels: usize) {
        sona_dsp::apply_gain(buffer, self.gain);
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Peak-level analyzer: tracks the highest absolute sample seen since the
/// last reset, a minimal grounding for level metering.
pub struct PeakAnalyzer {
    peak: f32,
}

impl PeakAnalyzer {
    pub fn new() -> Self {
        Self { peak: 0.0 }
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn reset(&mut self) {
        self.peak = 0.0;
    }
}

impl Default for PeakAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for PeakAnalyzer {
    fn observe(&mut self, buffer: &[Sample], _channels: usize) {
        for &sample in buffer {
            self.peak = self.peak.max(sample.abs());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_chain_applies_in_order() {
        let chain = ModifierChain::new();
        chain.push(Arc::new(Mutex::new(GainModifier::new(0.5))));
        chain.push(Arc::new(Mutex::new(GainModifier::new(2.0))));
        let mut buffer = [1.0, 1.0, 1.0, 1.0];
        chain.process(&mut buffer, 2);
        for sample in buffer {
            assert!((sample - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn disabled_modifier_is_skipped() {
        let chain = ModifierChain::new();
        let gain = Arc::new(Mutex::new(GainModifier::new(0.0)));
        gain.lock().set_enabled(false);
        chain.push(gain);
        let mut buffer = [1.0, 1.0];
        chain.process(&mut buffer, 1);
        assert_eq!(buffer, [1.0, 1.0]);
    }

    #[test]
    fn analyzer_chain_observes_every_analyzer() {
        let chain = AnalyzerChain::new();
        let peak = Arc::new(Mutex::new(PeakAnalyzer::new()));
        chain.add(peak.clone());
        chain.observe(&[0.1, -0.8, 0.3], 1);
        assert!((peak.lock().peak() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn remove_at_drops_the_right_modifier() {
        let chain = ModifierChain::new();
        chain.push(Arc::new(Mutex::new(GainModifier::new(0.5))));
        chain.push(Arc::new(Mutex::new(GainModifier::new(2.0))));
        chain.remove_at(1);
        let mut buffer = [1.0];
        chain.process(&mut buffer, 1);
        assert!((buffer[0] - 0.5).abs() < 1e-6);
    }
}
