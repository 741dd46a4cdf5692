//! A route's ordered processor chain: each stage receives a
//! message and produces 0..N messages; the router feeds one stage's
//! output into the next. The chain itself is copy-on-write, mirroring
//! the mixer/modifier-chain convention used by the rest of the graph.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rand::Rng;

use sona_core::{status, MidiCommand, MidiMessage};

/// One stage of a route's processor chain. `process` handles ordinary
/// messages as they arrive; `tick` drives stages (the arpeggiator) that
/// emit messages on their own schedule rather than in response to input.
pub trait MidiProcessor: Send {
    fn process(&mut self, message: MidiMessage) -> Vec<MidiMessage>;

    /// Called periodically with a monotonic microsecond clock. Default
    /// no-op; only time-driven stages override it.
    fn tick(&mut self, _now_us: u64) -> Vec<MidiMessage> {
        Vec::new()
    }
}

/// Copy-on-write ordered processor list: writers take
/// a short lock and swap in a new snapshot; the route enumerates the
/// current snapshot without blocking on structural edits.
#[derive(Default)]
pub struct ProcessorChain {
    snapshot: ArcSwap<Vec<Arc<Mutex<dyn MidiProcessor>>>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn push(&self, processor: Arc<Mutex<dyn MidiProcessor>>) {
        self.snapshot.rcu(|current| {
                let mut next = current.clone();
                next.push(processor.clone());
                next
        });
    }

    pub fn remove(&self, target: &Arc<Mutex<dyn MidiProcessor>>) {
        self.snapshot.rcu(|current| {
                let mut next = current.clone();
                next.retain(|p| !Arc::ptr_eq(p, target));
                next
        });
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feed `message` through every stage in order, returning whatever the
    /// last stage produces (a single input may fan out to, or be absorbed
    /// down to, any number of outputs).
    pub fn process(&self, message: MidiMessage) -> Vec<MidiMessage> {
        let snapshot = self.snapshot.load();
        let mut pending = vec![message];
        for processor in snapshot.iter() {
            let mut next = Vec::with_capacity(pending.len());
            let mut guard = processor.lock();
            for msg in pending.drain(..) {
                next.extend(guard.process(msg));
            }
            pending = next;
        }
        pending
    }

    /// Pump every time-driven stage, feeding whatever it emits through the
    /// remaining stages of the chain (same left-to-right contract as
    /// `process`).
    pub fn tick(&self, now_us: u64) -> Vec<MidiMessage> {
        let snapshot = self.snapshot.load();
        let mut out = Vec::new();
        for (index, processor) in snapshot.iter().enumerate() {
            let emitted = processor.lock().tick(now_us);
            if emitted.is_empty() {
                continue;
            }
            let mut pending = emitted;
            for downstream in snapshot[index + 1..].iter() {
                let mut next = Vec::with_capacity(pending.len());
                let mut guard = downstream.lock();
                for msg in pending.drain(..) {
                    next.extend(guard.process(msg));
                }
                pending = next;
            }
            out.extend(pending);
        }
        out
    }
}

fn note_of(message: &MidiMessage) -> Option<u8> {
    matches!(
        message.command(),
        MidiCommand::NoteOn | MidiCommand::NoteOff | MidiCommand::PolyPressure
    )
    .then_some(message.data1())
}

/// Clamp every note number by a fixed semitone offset, clamped to 0..127.
pub struct Transpose {
    pub semitones: i8,
}

impl Transpose {
    pub fn new(semitones: i8) -> Self {
        Self { semitones }
    }
}

impl MidiProcessor for Transpose {
    fn process(&mut self, message: MidiMessage) -> Vec<MidiMessage> {
        match note_of(&message) {
            Some(note) => {
                let shifted = (note as i16 + self.semitones as i16).clamp(0, 127) as u8;
                vec![MidiMessage::new(
                        message.status(),
                        shifted,
                        message.data2(),
                        message.timestamp(),
                )]
            }
            None => vec![message],
        }
    }
}

/// Drop every message whose channel doesn't match.
pub struct ChannelFilter {
    pub channel: u8,
}

impl ChannelFilter {
    pub fn new(channel: u8) -> Self {
        Self { channel }
    }
}

impl MidiProcessor for ChannelFilter {
    fn process(&mut self, message: MidiMessage) -> Vec<MidiMessage> {
        if message.status() & 0xF0 == status::SYSTEM || message.channel() == self.channel {
            vec![message]
        } else {
            Vec::new()
        }
    }
}

/// Scale note-on/note-off/poly-pressure velocity by a fixed factor.
pub struct VelocityScale {
    pub factor: f32,
}

impl VelocityScale {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }
}

impl MidiProcessor for VelocityScale {
    fn process(&mut self, message: MidiMessage) -> Vec<MidiMessage> {
        if note_of(&message).is_some() {
            let scaled = (message.data2() as f32 * self.factor).round().clamp(0.0, 127.0) as u8;
            vec![MidiMessage::new(
                    message.status(),
                    message.data1(),
                    scaled,
                    message.timestamp(),
            )]
        } else {
            vec![message]
        }
    }
}

/// Emit parallel notes at fixed intervals above the incoming note,
/// mirroring note-off for every interval it previously added.
pub struct Harmonizer {
    pub intervals: Vec<i8>,
}

impl Harmonizer {
    pub fn new(intervals: Vec<i8>) -> Self {
        Self { intervals }
    }
}

impl MidiProcessor for Harmonizer {
    fn process(&mut self, message: MidiMessage) -> Vec<MidiMessage> {
        match message.command() {
            MidiCommand::NoteOn | MidiCommand::NoteOff => {
                let mut out = Vec::with_capacity(1 + self.intervals.len());
                out.push(message);
                for &interval in &self.intervals {
                    let note = (message.data1() as i16 + interval as i16).clamp(0, 127) as u8;
                    out.push(MidiMessage::new(
                            message.status(),
                            note,
                            message.data2(),
                            message.timestamp(),
                    ));
                }
                out
            }
            _ => vec![message],
        }
    }
}

/// Jitter timing and velocity within configured bounds.
pub struct Randomizer {
    pub timing_jitter_us: u64,
    pub velocity_jitter: u8,
    rng: rand::rngs::StdRng,
}

impl Randomizer {
    pub fn new(timing_jitter_us: u64, velocity_jitter: u8) -> Self {
        Self {
            timing_jitter_us,
            velocity_jitter,
            rng: rand::SeedableRng::from_os_rng(),
        }
    }
}

impl MidiProcessor for Randomizer {
    fn process(&mut self, message: MidiMessage) -> Vec<MidiMessage> {
        let jitter_t = if self.timing_jitter_us > 0 {
            self.rng.random_range(0..=self.timing_jitter_us)
        } else {
            0
        };
        let timestamp = message.timestamp() + jitter_t;

        if let Some(velocity) = note_of(&message).map(|_| message.data2()) {
            let jitter_v = if self.velocity_jitter > 0 {
                self.rng.random_range(0..=self.velocity_jitter as i16)
                - (self.velocity_jitter as i16 / 2)
            } else {
                0
            };
            let scaled = (velocity as i16 + jitter_v).clamp(0, 127) as u8;
            vec![MidiMessage::new(message.status(), message.data1(), scaled, timestamp)]
        } else {
            vec![MidiMessage::new(message.status(), message.data1(), message.data2(), timestamp)]
        }
    }
}

/// Held-note arpeggio pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpPattern {
    Up,
    Down,
    UpDown,
    AsPlayed,
}

/// Replays held notes one at a time on a tempo clock ("held-note
/// list + pattern + tempo clock"). Swallows incoming note on/off (it
/// controls note output itself) and passes every other message through.
pub struct Arpeggiator {
    pattern: ArpPattern,
    bpm: f32,
    steps_per_beat: u32,
    held: Vec<u8>,
    velocity: u8,
    step_index: usize,
    ascending: bool,
    last_step_us: Option<u64>,
    sounding: Option<u8>,
}

impl Arpeggiator {
    pub fn new(pattern: ArpPattern, bpm: f32, steps_per_beat: u32) -> Self {
        Self {
            pattern,
            bpm,
            steps_per_beat: steps_per_beat.max(1),
            held: Vec::new(),
            velocity: 100,
            step_index: 0,
            ascending: true,
            last_step_us: None,
            sounding: None,
        }
    }

    fn step_interval_us(&self) -> u64 {
        let beats_per_sec = self.bpm.max(1.0) / 60.0;
        let steps_per_sec = beats_per_sec * self.steps_per_beat as f32;
        (1_000_000.0 / steps_per_sec) as u64
    }

    fn sequence(&mut self) -> Vec<u8> {
        let mut notes = self.held.clone();
        match self.pattern {
            ArpPattern::Up => notes.sort_unstable(),
            ArpPattern::Down => {
                notes.sort_unstable();
                notes.reverse();
            }
            ArpPattern::UpDown => {
                notes.sort_unstable();
                if !self.ascending {
                    notes.reverse();
                }
            }
            ArpPattern::AsPlayed => {}
        }
        notes
    }
}

impl MidiProcessor for Arpeggiator {
    fn process(&mut self, message: MidiMessage) -> Vec<MidiMessage> {
        match message.command() {
            MidiCommand::NoteOn => {
                self.velocity = message.data2();
                if !self.held.contains(&message.data1()) {
                    self.held.push(message.data1());
                }
                Vec::new()
            }
            MidiCommand::NoteOff => {
                self.held.retain(|&n| n != message.data1());
                if self.held.is_empty() {
                    self.step_index = 0;
                    if let Some(note) = self.sounding.take() {
                        return vec![MidiMessage::note_off(message.channel(), note, 0, message.timestamp())];
                    }
                }
                Vec::new()
            }
            _ => vec![message],
        }
    }

    fn tick(&mut self, now_us: u64) -> Vec<MidiMessage> {
        if self.held.is_empty() {
            return Vec::new();
        }
        let interval = self.step_interval_us();
        let due = match self.last_step_us {
            Some(last) => now_us.saturating_sub(last) >= interval,
            None => true,
        };
        if !due {
            return Vec::new();
        }
        self.last_step_us = Some(now_us);

        let sequence = self.sequence();
        if sequence.is_empty() {
            return Vec::new();
        }
        if self.pattern == ArpPattern::UpDown && self.step_index >= sequence.len().saturating_sub(1) {
            self.ascending = !self.ascending;
        }
        let index = self.step_index % sequence.len();
        let note = sequence[index];
        self.step_index = (self.step_index + 1) % sequence.len().max(1);

        let mut out = Vec::with_capacity(2);
        if let Some(previous) = self.sounding.replace(note) {
            if previous != note {
                out.push(MidiMessage::note_off(1, previous, 0, now_us));
            }
        }
        out.push(MidiMessage::note_on(1, note, self.velocity, now_us));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_shifts_note_numbers() {
        let mut t = Transpose::new(12);
        let out = t.process(MidiMessage::note_on(1, 60, 100, 0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].note(), Some(72));
    }

    #[test]
    fn transpose_clamps_to_midi_range() {
        let mut t = Transpose::new(100);
        let out = t.process(MidiMessage::note_on(1, 120, 100, 0));
        assert_eq!(out[0].note(), Some(127));
    }

    #[test]
    fn transpose_passes_non_note_messages_through_unchanged() {
        let mut t = Transpose::new(5);
        let cc = MidiMessage::control_change(1, 7, 64, 0);
        let out = t.process(cc);
        assert_eq!(out[0], cc);
    }

    #[test]
    fn channel_filter_drops_mismatched_channel() {
        let mut f = ChannelFilter::new(3);
        let out = f.process(MidiMessage::note_on(1, 60, 100, 0));
        assert!(out.is_empty());
        let out = f.process(MidiMessage::note_on(3, 60, 100, 0));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn velocity_scale_halves_velocity() {
        let mut v = VelocityScale::new(0.5);
        let out = v.process(MidiMessage::note_on(1, 60, 100, 0));
        assert_eq!(out[0].velocity(), Some(50));
    }

    #[test]
    fn harmonizer_emits_original_plus_intervals() {
        let mut h = Harmonizer::new(vec![4, 7]);
        let out = h.process(MidiMessage::note_on(1, 60, 100, 0));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].note(), Some(60));
        assert_eq!(out[1].note(), Some(64));
        assert_eq!(out[2].note(), Some(67));
    }

    #[test]
    fn chain_feeds_stage_output_into_next_stage() {
        let chain = ProcessorChain::new();
        chain.push(Arc::new(Mutex::new(Transpose::new(12))));
        chain.push(Arc::new(Mutex::new(VelocityScale::new(0.5))));
        let out = chain.process(MidiMessage::note_on(1, 60, 100, 0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].note(), Some(72));
        assert_eq!(out[0].velocity(), Some(50));
    }

    #[test]
    fn arpeggiator_swallows_note_on_and_emits_on_tick() {
        let mut arp = Arpeggiator::new(ArpPattern::Up, 120.0, 4);
        assert!(arp.process(MidiMessage::note_on(1, 60, 100, 0)).is_empty());
        let emitted = arp.tick(0);
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].is_note_on());
    }

    #[test]
    fn arpeggiator_note_off_clears_sounding_note() {
        let mut arp = Arpeggiator::new(ArpPattern::Up, 120.0, 4);
        arp.process(MidiMessage::note_on(1, 60, 100, 0));
        arp.tick(0);
        let out = arp.process(MidiMessage::note_off(1, 60, 0, 0));
        assert_eq!(out.len(), 1);
        assert!(out[0].is_note_off());
    }
}
