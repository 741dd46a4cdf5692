//! `Composition`: ordered audio and MIDI tracks over a shared tempo map.

use sona_core::{Sample, TempoMap};

use crate::track::{AudioTrack, MidiTrack};

pub struct Composition {
    pub sample_rate: f64,
    tempo_map: TempoMap,
    audio_tracks: Vec<AudioTrack>,
    midi_tracks: Vec<MidiTrack>,
    dirty: bool,
}

impl Composition {
    pub fn new(sample_rate: f64, ticks_per_quarter: u32) -> Self {
        Self {
            sample_rate,
            tempo_map: TempoMap::new(ticks_per_quarter),
            audio_tracks: Vec::new(),
            midi_tracks: Vec::new(),
            dirty: false,
        }
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    pub fn tempo_map_mut(&mut self) -> &mut TempoMap {
        self.dirty = true;
        &mut self.tempo_map
    }

    pub fn add_audio_track(&mut self, track: AudioTrack) {
        self.audio_tracks.push(track);
        self.dirty = true;
    }

    pub fn add_midi_track(&mut self, track: MidiTrack) {
        self.midi_tracks.push(track);
        self.dirty = true;
    }

    pub fn audio_tracks_mut(&mut self) -> &mut [AudioTrack] {
        &mut self.audio_tracks
    }

    pub fn midi_tracks(&self) -> &[MidiTrack] {
        &self.midi_tracks
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Render `[t0, t1)` of every audio track, honoring mute/solo, into
    /// `dest` (interleaved, `channels` wide, pre-sized for the window), and
    /// dispatch every MIDI track's events in the same window to their
    /// destinations.
    pub fn render(&mut self, t0: f64, t1: f64, channels: usize, dest: &mut [Sample]) {
        dest.fill(0.0);
        let any_soloed = self.audio_tracks.iter().any(|t| t.soloed);
        for track in &mut self.audio_tracks {
            track.render(t0, t1, self.sample_rate, channels, dest, any_soloed);
        }
        for track in &self.midi_tracks {
            track.render(t0, t1, &self.tempo_map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sona_core::AudioFormat;
    use sona_graph::{SyntheticProvider, Waveform};

    use crate::segment::{AudioSegment, SegmentSettings};

    #[test]
    fn overlapping_tracks_sum_in_the_composition_accumulator() {
        let mut composition = Composition::new(1000.0, 960);
        for _ in 0..2 {
            let provider = Box::new(SyntheticProvider::new(AudioFormat::working(1000, 1), Waveform::Dc { level: 0.25 }, None));
            let mut track = AudioTrack::new("t");
            track.add_segment(AudioSegment::new(provider, 0.0, 1.0, 0.0, SegmentSettings::default()));
            composition.add_audio_track(track);
        }
        let mut dest = vec![0.0; 1000];
        composition.render(0.0, 1.0, 1, &mut dest);
        assert!(dest.iter().skip(100).all(|&s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn adding_a_track_marks_the_composition_dirty() {
        let mut composition = Composition::new(1000.0, 960);
        assert!(!composition.is_dirty());
        composition.add_audio_track(AudioTrack::new("t"));
        assert!(composition.is_dirty());
        composition.mark_clean();
        assert!(!composition.is_dirty());
    }
}
