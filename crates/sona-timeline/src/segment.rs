//! `AudioSegment` and `MidiSegment`: placements of a data
//! provider on a track's timeline, with fades, volume/pan, looping, and
//! time-stretch.

use sona_core::{MidiMessage, Sample};
use sona_graph::{pan_gains, LoopPoints, ModifierChain, SoundDataProvider};

use crate::fade::Fade;

/// `source-duration` is the segment's *timeline* duration: when
/// `stretch > 1` playback is slower than real-time, so fewer source
/// seconds are consumed than the timeline span it occupies.
#[derive(Clone, Copy)]
pub struct SegmentSettings {
    pub volume: f32,
    pub pan: f32,
    pub fade_in: Fade,
    pub fade_out: Fade,
    pub loop_points: Option<LoopPoints>,
    /// > 1 stretches the source across more timeline time (slower,
    /// pitch-preserving when `pitch_preserving`); < 1 compresses it.
    pub stretch: f64,
    pub pitch_preserving: bool,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.5,
            fade_in: Fade::NONE,
            fade_out: Fade::NONE,
            loop_points: None,
            stretch: 1.0,
            pitch_preserving: true,
        }
    }
}

const STRETCH_FRAME_SIZE: usize = 1024;

pub struct AudioSegment {
    provider: Box<dyn SoundDataProvider>,
    source_start_seconds: f64,
    /// Timeline duration (see `SegmentSettings` doc comment).
    timeline_duration_seconds: f64,
    timeline_start_seconds: f64,
    pub settings: SegmentSettings,
    modifiers: ModifierChain,
}

impl AudioSegment {
    pub fn new(
        provider: Box<dyn SoundDataProvider>,
        source_start_seconds: f64,
        timeline_duration_seconds: f64,
        timeline_start_seconds: f64,
        settings: SegmentSettings,
    ) -> Self {
        assert!(source_start_seconds >= 0.0, "source-start-time must be >= 0");
        assert!(timeline_duration_seconds > 0.0, "source-duration must be > 0");
        Self {
            provider,
            source_start_seconds,
            timeline_duration_seconds,
            timeline_start_seconds,
            settings,
            modifiers: ModifierChain::new(),
        }
    }

    pub fn modifiers(&self) -> &ModifierChain {
        &self.modifiers
    }

    pub fn timeline_span(&self) -> (f64, f64) {
        (self.timeline_start_seconds, self.timeline_start_seconds + self.timeline_duration_seconds)
    }

    /// Render this segment's contribution to the global window `[t0, t1)`
    /// into `dest` (interleaved, `channels` wide, already sized for the
    /// whole window), accumulating rather than overwriting.
    pub fn render(&mut self, t0: f64, t1: f64, sample_rate: f64, channels: usize, dest: &mut [Sample]) {
        let (span_start, span_end) = self.timeline_span();
        let o0 = t0.max(span_start);
        let o1 = t1.min(span_end);
        if o0 >= o1 {
            return;
        }

        let stretch = self.settings.stretch.max(1e-6);
        let source_seconds = (o1 - o0) / stretch;
        let source_offset = self.source_start_seconds + (o0 - self.timeline_start_seconds) / stretch;
        let start_frame = (source_offset * self.provider.format().sample_rate() as f64).round().max(0.0) as u64;

        if self.provider.seek(start_frame).is_err() {
            log::warn!("audio segment source is not seekable, skipping window");
            return;
        }

        let source_channels = self.provider.format().channels() as usize;
        let raw_frames_needed =
        (source_seconds * self.provider.format().sample_rate() as f64).ceil() as usize + 1;
        let mut raw = vec![0.0 as Sample; raw_frames_needed * source_channels.max(1)];
        let total_read = self.read_with_loop(&mut raw);
        raw.truncate(total_read * source_channels.max(1));

        let output_frames = ((o1 - o0) * sample_rate).round() as usize;
        let mut block = vec![0.0 as Sample; output_frames * channels];
        self.resample_into(&raw, source_channels, stretch, output_frames, channels, &mut block);

        self.modifiers.process(&mut block, channels);

        let (gl, gr) = pan_gains(self.settings.pan);
        let dest_offset_frames = ((o0 - t0) * sample_rate).round() as usize;
        for frame in 0..output_frames {
            let global_time = o0 + frame as f64 / sample_rate;
            let fade_gain = self.fade_gain(global_time, span_start, span_end);
            let gain = fade_gain * self.settings.volume;

            let dest_base = (dest_offset_frames + frame) * channels;
            if dest_base + channels > dest.len() {
                break;
            }
            let src_base = frame * channels;
            if channels >= 2 {
                dest[dest_base] += block[src_base] * gain * gl;
                dest[dest_base + 1] += block[src_base + 1] * gain * gr;
                for ch in 2..channels {
                    dest[dest_base + ch] += block[src_base + ch] * gain;
                }
            } else {
                dest[dest_base] += block[src_base] * gain;
            }
        }
    }

    fn fade_gain(&self, t: f64, span_start: f64, span_end: f64) -> f32 {
        let mut gain = 1.0f32;
        if self.settings.fade_in.duration_seconds > 0.0 {
            let elapsed = t - span_start;
            if elapsed < self.settings.fade_in.duration_seconds {
                let progress = (elapsed / self.settings.fade_in.duration_seconds) as f32;
                gain *= self.settings.fade_in.curve.gain(progress);
            }
        }
        if self.settings.fade_out.duration_seconds > 0.0 {
            let remaining = span_end - t;
            if remaining < self.settings.fade_out.duration_seconds {
                let progress = (remaining / self.settings.fade_out.duration_seconds) as f32;
                gain *= self.settings.fade_out.curve.gain(progress);
            }
        }
        gain
    }

    /// Read raw frames, wrapping at the loop boundary sample-accurately
    /// when a loop is configured (mirrors the player's loop-wrap pattern).
    fn read_with_loop(&mut self, dst: &mut [Sample]) -> usize {
        let channels = self.provider.format().channels().max(1) as usize;
        let frames_wanted = dst.len() / channels;
        let mut total = 0usize;
        loop {
            if total >= frames_wanted {
                break;
            }
            let start = total * channels;
            let read = self.provider.read(&mut dst[start..frames_wanted * channels]);
            if read == 0 {
                match self.settings.loop_points {
                    Some(points) => {
                        if self.provider.seek(points.start_frame).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
                continue;
            }
            total += read;
            if let Some(points) = self.settings.loop_points {
                if points.end_frame >= 0 && self.provider.position() >= points.end_frame as u64 {
                    let _ = self.provider.seek(points.start_frame);
                }
            }
        }
        total
    }

    fn resample_into(
        &self,
        raw: &[Sample],
        source_channels: usize,
        stretch: f64,
        output_frames: usize,
        channels: usize,
        block: &mut [Sample],
    ) {
        let raw_frames = raw.len() / source_channels.max(1);
        if (stretch - 1.0).abs() < 1e-9 {
            for frame in 0..output_frames.min(raw_frames) {
                for ch in 0..channels {
                    let src_ch = ch.min(source_channels.saturating_sub(1));
                    block[frame * channels + ch] = raw[frame * source_channels + src_ch];
                }
            }
            return;
        }

        for out_ch in 0..channels {
            let src_ch = out_ch.min(source_channels.saturating_sub(1));
            let mono: Vec<Sample> = (0..raw_frames).map(|f| raw[f * source_channels + src_ch]).collect();
            let stretched = if self.settings.pitch_preserving {
                sona_dsp::stretch(&mono, STRETCH_FRAME_SIZE, stretch)
            } else {
                let mut resampler = sona_dsp::Resampler::new(1.0 / stretch);
                let mut out = Vec::with_capacity(sona_dsp::estimate_output_len(mono.len(), 1.0 / stretch));
                resampler.process(&mono, &mut out);
                out
            };
            for frame in 0..output_frames {
                block[frame * channels + out_ch] = stretched.get(frame).copied().unwrap_or(0.0);
            }
        }
    }
}

/// Supplies MIDI events for a tick range on demand ("the data
/// provider exposes `events-in-tick-range(start, end)`").
pub trait MidiDataProvider: Send {
    fn events_in_tick_range(&self, start_tick: u64, end_tick: u64) -> Vec<(u64, MidiMessage)>;
}

/// All events held in memory, sorted by tick — the common case for a
/// recorded or hand-authored MIDI clip.
pub struct InMemoryMidiProvider {
    events: Vec<(u64, MidiMessage)>,
}

impl InMemoryMidiProvider {
    pub fn new(mut events: Vec<(u64, MidiMessage)>) -> Self {
        events.sort_by_key(|(tick, _)| *tick);
        Self { events }
    }
}

impl MidiDataProvider for InMemoryMidiProvider {
    fn events_in_tick_range(&self, start_tick: u64, end_tick: u64) -> Vec<(u64, MidiMessage)> {
        let start_idx = self.events.partition_point(|(tick, _)| *tick < start_tick);
        self.events[start_idx..]
        .iter()
        .take_while(|(tick, _)| *tick < end_tick)
        .cloned()
        .collect()
    }
}

/// `(data-provider, timeline-start-time, source-duration)`.
/// `source_duration_ticks` bounds how many ticks of the provider's events
/// this placement spans on the timeline.
pub struct MidiSegment {
    provider: Box<dyn MidiDataProvider>,
    pub timeline_start_seconds: f64,
    pub source_duration_ticks: u64,
    pub source_start_tick: u64,
}

impl MidiSegment {
    pub fn new(
        provider: Box<dyn MidiDataProvider>,
        timeline_start_seconds: f64,
        source_start_tick: u64,
        source_duration_ticks: u64,
    ) -> Self {
        Self {
            provider,
            timeline_start_seconds,
            source_duration_ticks,
            source_start_tick,
        }
    }

    pub fn events_in_tick_range(&self, start_tick: u64, end_tick: u64) -> Vec<(u64, MidiMessage)> {
        let clamped_end = (self.source_start_tick + self.source_duration_ticks).min(end_tick);
        if start_tick >= clamped_end {
            return Vec::new();
        }
        self.provider.events_in_tick_range(start_tick, clamped_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sona_core::AudioFormat;
    use sona_graph::{SyntheticProvider, Waveform};

    fn mono_format() -> AudioFormat {
        AudioFormat::working(1000, 1)
    }

    #[test]
    fn outside_timeline_span_contributes_nothing() {
        let provider = Box::new(SyntheticProvider::new(mono_format(), Waveform::Dc { level: 1.0 }, None));
        let mut segment = AudioSegment::new(provider, 0.0, 1.0, 5.0, SegmentSettings::default());
        let mut dest = vec![0.0; 1000];
        segment.render(0.0, 1.0, 1000.0, 1, &mut dest);
        assert!(dest.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn overlapping_window_accumulates_source_signal() {
        let provider = Box::new(SyntheticProvider::new(mono_format(), Waveform::Dc { level: 0.5 }, None));
        let mut segment = AudioSegment::new(provider, 0.0, 2.0, 0.0, SegmentSettings::default());
        let mut dest = vec![0.0; 1000];
        segment.render(0.0, 1.0, 1000.0, 1, &mut dest);
        assert!(dest.iter().skip(100).all(|&s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn fade_in_silences_the_leading_edge() {
        let provider = Box::new(SyntheticProvider::new(mono_format(), Waveform::Dc { level: 1.0 }, None));
        let settings = SegmentSettings {
            fade_in: Fade::new(0.5, crate::fade::FadeCurve::Linear),
            ..SegmentSettings::default()
        };
        let mut segment = AudioSegment::new(provider, 0.0, 1.0, 0.0, settings);
        let mut dest = vec![0.0; 1000];
        segment.render(0.0, 1.0, 1000.0, 1, &mut dest);
        assert!(dest[0].abs() < 1e-3);
        assert!(dest[900] > 0.9);
    }

    #[test]
    fn midi_segment_clamps_queries_to_its_own_span() {
        let provider = InMemoryMidiProvider::new(vec![
                (10, MidiMessage::note_on(1, 60, 100, 0)),
                (500, MidiMessage::note_on(1, 61, 100, 0)),
        ]);
        let segment = MidiSegment::new(Box::new(provider), 0.0, 0, 100);
        let events = segment.events_in_tick_range(0, 1000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, 10);
    }
}
