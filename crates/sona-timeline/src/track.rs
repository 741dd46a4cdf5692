//! `AudioTrack` and `MidiTrack`: a list of segments plus a
//! modifier chain, volume/pan, and mute/solo.

use std::sync::Arc;

use sona_core::{Sample, TempoMap};
use sona_graph::{pan_gains, ModifierChain};
use sona_midi::{MidiDestination, ProcessorChain};

use crate::segment::{AudioSegment, MidiSegment};

pub struct AudioTrack {
    pub name: String,
    segments: Vec<AudioSegment>,
    modifiers: ModifierChain,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub soloed: bool,
}

impl AudioTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segments: Vec::new(),
            modifiers: ModifierChain::new(),
            volume: 1.0,
            pan: 0.5,
            muted: false,
            soloed: false,
        }
    }

    pub fn modifiers(&self) -> &ModifierChain {
        &self.modifiers
    }

    /// Segments are re-sorted by timeline start on every insert: timeline
    /// start stays monotonic within the track's segment list.
    pub fn add_segment(&mut self, segment: AudioSegment) {
        self.segments.push(segment);
        self.segments.sort_by(|a, b| a.timeline_span().0.partial_cmp(&b.timeline_span().0).unwrap());
    }

    pub fn segments(&self) -> &[AudioSegment] {
        &self.segments
    }

    /// Sum every overlapping segment into `dest` for `[t0, t1)`, then apply
    /// this track's modifier chain and volume/pan. `any_soloed` mutes a
    /// non-soloed track whenever some other track in the composition is
    /// soloed.
    pub fn render(&mut self, t0: f64, t1: f64, sample_rate: f64, channels: usize, dest: &mut [Sample], any_soloed: bool) {
        if self.muted || (any_soloed && !self.soloed) {
            return;
        }

        let mut scratch = vec![0.0 as Sample; dest.len()];
        for segment in &mut self.segments {
            segment.render(t0, t1, sample_rate, channels, &mut scratch);
        }

        self.modifiers.process(&mut scratch, channels);

        let (gl, gr) = pan_gains(self.pan);
        for (frame_idx, frame) in scratch.chunks(channels).enumerate() {
            let dest_base = frame_idx * channels;
            if dest_base + channels > dest.len() {
                break;
            }
            if channels >= 2 {
                dest[dest_base] += frame[0] * self.volume * gl;
                dest[dest_base + 1] += frame[1] * self.volume * gr;
                for ch in 2..channels {
                    dest[dest_base + ch] += frame[ch] * self.volume;
                }
            } else {
                dest[dest_base] += frame[0] * self.volume;
            }
        }
    }
}

/// A MIDI track's segments render into ticks and forward to a shared
/// destination ("MIDI track rendering").
pub struct MidiTrack {
    pub name: String,
    segments: Vec<MidiSegment>,
    modifiers: ProcessorChain,
    destination: Arc<dyn MidiDestination>,
}

impl MidiTrack {
    pub fn new(name: impl Into<String>, destination: Arc<dyn MidiDestination>) -> Self {
        Self {
            name: name.into(),
            segments: Vec::new(),
            modifiers: ProcessorChain::new(),
            destination,
        }
    }

    pub fn modifiers(&self) -> &ProcessorChain {
        &self.modifiers
    }

    pub fn add_segment(&mut self, segment: MidiSegment) {
        self.segments
        .push(segment);
        self.segments.sort_by(|a, b| a.timeline_start_seconds.partial_cmp(&b.timeline_start_seconds).unwrap());
    }

    /// For `[t0, t1)`, convert to ticks via `tempo_map`, pull events from
    /// every overlapping segment, run the track's processor chain, and
    /// forward each result to the destination in non-decreasing tick order
    /// ( ordering guarantee).
    pub fn render(&self, t0: f64, t1: f64, tempo_map: &TempoMap) {
        let start_tick = tempo_map.seconds_to_tick(t0);
        let end_tick = tempo_map.seconds_to_tick(t1);

        let mut events: Vec<(u64, sona_core::MidiMessage)> = Vec::new();
        for segment in &self.segments {
            let segment_start_tick = tempo_map.seconds_to_tick(segment.timeline_start_seconds);
            let local_start = start_tick.saturating_sub(segment_start_tick) + segment.source_start_tick;
            let local_end = end_tick.saturating_sub(segment_start_tick) + segment.source_start_tick;
            for (tick, message) in segment.events_in_tick_range(local_start, local_end) {
                events.push((segment_start_tick + tick.saturating_sub(segment.source_start_tick), message));
            }
        }
        events.sort_by_key(|(tick, _)| *tick);

        for (_, message) in events {
            for routed in self.modifiers.process(message) {
                if let Err(err) = self.destination.send(routed) {
                    log::error!("midi track '{}' destination rejected an event: {err}", self.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sona_core::{AudioFormat, MidiMessage};
    use sona_graph::{SyntheticProvider, Waveform};
    use sona_midi::RecordingDestination;

    use crate::segment::{InMemoryMidiProvider, SegmentSettings};

    #[test]
    fn muted_track_contributes_silence() {
        let provider = Box::new(SyntheticProvider::new(AudioFormat::working(1000, 1), Waveform::Dc { level: 1.0 }, None));
        let mut track = AudioTrack::new("t");
        track.muted = true;
        track.add_segment(AudioSegment::new(provider, 0.0, 1.0, 0.0, SegmentSettings::default()));
        let mut dest = vec![0.0; 1000];
        track.render(0.0, 1.0, 1000.0, 1, &mut dest, false);
        assert!(dest.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn non_soloed_track_is_muted_when_another_is_soloed() {
        let provider = Box::new(SyntheticProvider::new(AudioFormat::working(1000, 1), Waveform::Dc { level: 1.0 }, None));
        let mut track = AudioTrack::new("t");
        track.add_segment(AudioSegment::new(provider, 0.0, 1.0, 0.0, SegmentSettings::default()));
        let mut dest = vec![0.0; 1000];
        track.render(0.0, 1.0, 1000.0, 1, &mut dest, true);
        assert!(dest.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn midi_track_forwards_events_to_destination_in_tick_order() {
        let destination = Arc::new(RecordingDestination::new("dest"));
        let tempo_map = TempoMap::new(960);
        let mut track = MidiTrack::new("m", destination.clone());
        let provider = InMemoryMidiProvider::new(vec![
                (100, MidiMessage::note_on(1, 60, 100, 0)),
                (50, MidiMessage::note_on(1, 59, 100, 0)),
        ]);
        track.add_segment(crate::segment::MidiSegment::new(Box::new(provider), 0.0, 0, 10_000));
        track.render(0.0, tempo_map.tick_to_seconds(10_000), &tempo_map);
        let received = destination.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].note(), Some(59));
        assert_eq!(received[1].note(), Some(60));
    }
}
