//! Graph node base: every node in the tree rooted
//! at the master mixer shares this state shape — name, enabled flag,
//! volume, pan, modifier chain, analyzer set, and a back-reference to its
//! parent for `mark-dirty`-style propagation.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use sona_core::Sample;

use crate::modifier::{AnalyzerChain, ModifierChain};

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity for a graph node, stable across the node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    pub fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared, atomically-readable state every [`Component`] owns.
///
/// Volume and pan are stored as bit-cast `f32` behind relaxed atomics: the
/// audio thread only ever needs the value observed at the start of a
/// render block, not a synchronized read.
pub struct ComponentState {
    id: ComponentId,
    name: String,
    enabled: AtomicBool,
    volume_bits: AtomicU32,
    pan_bits: AtomicU32,
    modifiers: ModifierChain,
    analyzers: AnalyzerChain,
    /// Back-reference to the parent mixer, relation-plus-lookup only.
    /// A bare `ComponentId` rather than a `Weak<dyn Component>` sidesteps
    /// `dyn Component` not being `Sized` while still letting a node find
    /// its parent through the owning graph's id table.
    parent: Mutex<Option<ComponentId>>,
}

impl ComponentState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ComponentId::next(),
            name: name.into(),
            enabled: AtomicBool::new(true),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            pan_bits: AtomicU32::new(0.5f32.to_bits()),
            modifiers: ModifierChain::new(),
            analyzers: AnalyzerChain::new(),
            parent: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// `pan ∈ [0, 1]`; 0.5 is center.
    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan_bits.load(Ordering::Relaxed))
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan_bits.store(pan.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn modifiers(&self) -> &ModifierChain {
        &self.modifiers
    }

    pub fn analyzers(&self) -> &AnalyzerChain {
        &self.analyzers
    }

    pub fn parent(&self) -> Option<ComponentId> {
        *self.parent.lock().expect("component parent lock poisoned")
    }

    pub fn set_parent(&self, parent: Option<ComponentId>) {
        *self.parent.lock().expect("component parent lock poisoned") = parent;
    }
}

/// Equal-power pan gains for `pan ∈ [0, 1]`.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(0.0, 1.0);
    let angle = pan * std::f32::consts::FRAC_PI_2;
    (angle.cos(), angle.sin())
}

/// A node in the pull-model graph: parents call `render` on
/// their children rather than children pushing samples upward.
pub trait Component: Send {
    fn state(&self) -> &ComponentState;

    /// Fill `buffer` (interleaved, `channels` wide) with this node's raw
    /// signal. Does *not* apply this node's own modifier chain or notify
    /// its own analyzers — data flow, that happens at the
    /// point where a parent pulls this node as a child.
    fn render(&mut self, buffer: &mut [Sample], channels: usize);

    fn id(&self) -> ComponentId {
        self.state().id()
    }

    fn name(&self) -> &str {
        self.state().name()
    }

    fn enabled(&self) -> bool {
        self.state().enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.state().set_enabled(enabled);
    }

    fn volume(&self) -> f32 {
        self.state().volume()
    }

    fn set_volume(&self, volume: f32) {
        self.state().set_volume(volume);
    }

    fn pan(&self) -> f32 {
        self.state().pan()
    }

    fn set_pan(&self, pan: f32) {
        self.state().set_pan(pan);
    }
}

/// Pull `child`, apply its modifier chain, notify its analyzers, then
/// accumulate the result into `dest` scaled by volume and equal-power pan.
/// Shared by [`crate::mixer::Mixer`] and the device-driven engine (which
/// plays the same role for the master mixer's own render call).
pub fn render_and_accumulate(
    child: &mut dyn Component,
    scratch: &mut [Sample],
    dest: &mut [Sample],
    channels: usize,
) {
    scratch.fill(0.0);
    child.render(scratch, channels);
    child.state().modifiers().process(scratch, channels);
    child.state().analyzers().observe(scratch, channels);

    let volume = child.volume();
    if channels >= 2 {
        let (gl, gr) = pan_gains(child.pan());
        for frame in dest.chunks_mut(channels).zip(scratch.chunks(channels)) {
            let (out_frame, in_frame) = frame;
            out_frame[0] += in_frame[0] * volume * gl;
            out_frame[1] += in_frame[1] * volume * gr;
            for ch in 2..channels {
                out_frame[ch] += in_frame[ch] * volume;
            }
        }
    } else {
        for (o, i) in dest.iter_mut().zip(scratch.iter()) {
            *o += *i * volume;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_center_is_equal_power() {
        let (l, r) = pan_gains(0.5);
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pan_hard_left_mutes_right() {
        let (l, r) = pan_gains(0.0);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn component_state_defaults_are_unity() {
        let state = ComponentState::new("test");
        assert!(state.enabled());
        assert_eq!(state.volume(), 1.0);
        assert_eq!(state.pan(), 0.5);
        assert!(state.parent().is_none());
    }
}
