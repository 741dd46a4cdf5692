//! Sound players: a playback state machine over
//! a [`SoundDataProvider`], with speed change via resampling or
//! time-stretch, surround panning, and loop points.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use sona_core::{Sample, SonaResult};
use sona_dsp::{build_window, PhaseVocoder, Resampler, WindowKind};

use crate::component::{Component, ComponentState};
use crate::provider::SoundDataProvider;

/// `Stopped → Playing ⇄ Paused → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Speed-change strategy: resample the pitch along with the rate, or hold
/// pitch constant via the phase vocoder (switching modes mid-playback
/// resets the vocoder to avoid a click).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    PitchShift,
    PitchPreserve,
}

const PHASE_VOCODER_FRAME_SIZE: usize = 1024;

/// `(start_frame, end_frame)`; `end_frame == -1` means "loop the whole
/// source".
#[derive(Debug, Clone, Copy)]
pub struct LoopPoints {
    pub start_frame: u64,
    pub end_frame: i64,
}

impl LoopPoints {
    pub const DISABLED: Self = Self {
        start_frame: 0,
        end_frame: 0,
    };

    pub fn whole_source(start_frame: u64) -> Self {
        Self {
            start_frame,
            end_frame: -1,
        }
    }
}

/// Streaming pitch-preserving time-stretch for one channel: wraps
/// [`PhaseVocoder::process_frame`] (a single-frame-in, single-frame-out
/// primitive) with a raw-sample backlog and an overlap-add accumulator so
/// it can be fed arbitrary-length chunks across repeated render calls,
/// the same calling convention [`Resampler::process`] uses.
struct ChannelStretcher {
    vocoder: PhaseVocoder,
    window: Vec<Sample>,
    backlog: Vec<Sample>,
    overlap_add: Vec<Sample>,
    overlap_norm: Vec<Sample>,
    frame: Vec<Sample>,
    synthesis_frame: Vec<Sample>,
}

impl ChannelStretcher {
    fn new(frame_size: usize) -> Self {
        Self {
            vocoder: PhaseVocoder::new(frame_size),
            window: build_window(WindowKind::Hann, frame_size),
            backlog: Vec::new(),
            overlap_add: vec![0.0; frame_size],
            overlap_norm: vec![0.0; frame_size],
            frame: vec![0.0; frame_size],
            synthesis_frame: vec![0.0; frame_size],
        }
    }

    fn reset(&mut self) {
        self.vocoder.reset();
        self.backlog.clear();
        self.overlap_add.iter_mut().for_each(|s| *s = 0.0);
        self.overlap_norm.iter_mut().for_each(|s| *s = 0.0);
    }

    /// Stretch `input` by `stretch_factor` and append the samples that have
    /// settled (no further frame will still add into them) to `output`.
    /// Phase state, the raw backlog, and the overlap-add tail all persist
    /// in `self` across calls.
    fn process(&mut self, input: &[Sample], stretch_factor: f64, output: &mut Vec<Sample>) {
        self.backlog.extend_from_slice(input);
        let frame_size = self.frame.len();
        let hop_analysis = self.vocoder.analysis_hop();
        let synthesis_hop = self.vocoder.synthesis_hop(stretch_factor).min(frame_size);

        let mut read = 0usize;
        while read + frame_size <= self.backlog.len() {
            self.frame.copy_from_slice(&self.backlog[read..read + frame_size]);
            self.vocoder.process_frame(&self.frame, stretch_factor, &mut self.synthesis_frame);

            for i in 0..frame_size {
                self.overlap_add[i] += self.synthesis_frame[i];
                self.overlap_norm[i] += self.window[i] * self.window[i];
            }

            for i in 0..synthesis_hop {
                let sample = if self.overlap_norm[i] > 1e-8 {
                    self.overlap_add[i] / self.overlap_norm[i]
                } else {
                    0.0
                };
                output.push(sample);
            }
            self.overlap_add.drain(0..synthesis_hop);
            self.overlap_norm.drain(0..synthesis_hop);
            self.overlap_add.resize(frame_size, 0.0);
            self.overlap_norm.resize(frame_size, 0.0);

            read += hop_analysis;
        }
        self.backlog.drain(0..read);
    }
}

struct PlayerInner {
    provider: Box<dyn SoundDataProvider>,
    source_channels: usize,
    /// One resampler per source channel — a single shared instance would
    /// interpolate across channel boundaries in the interleaved stream.
    resamplers: Vec<Resampler>,
    stretchers: Vec<ChannelStretcher>,
    mode: PlaybackMode,
    ended: bool,
    read_scratch: Vec<Sample>,
    channel_scratch: Vec<Vec<Sample>>,
    processed_scratch: Vec<Vec<Sample>>,
}

/// Playback-state machine, speed control, and looping over a single
/// [`SoundDataProvider`]. Placing the player in a speaker ring is
/// [`SurroundPlayer`]'s job.
pub struct SoundPlayer {
    state: ComponentState,
    playback_state: Mutex<PlaybackState>,
    inner: Mutex<PlayerInner>,
    speed_bits: AtomicU32,
    loop_start: AtomicI64,
    loop_end: AtomicI64,
    loop_enabled: AtomicBool,
}

impl SoundPlayer {
    pub fn new(name: impl Into<String>, provider: Box<dyn SoundDataProvider>) -> Self {
        let source_channels = (provider.format().channels() as usize).max(1);
        Self {
            state: ComponentState::new(name),
            playback_state: Mutex::new(PlaybackState::Stopped),
            inner: Mutex::new(PlayerInner {
                    provider,
                    source_channels,
                    resamplers: (0..source_channels).map(|_| Resampler::new(1.0)).collect(),
                    stretchers: (0..source_channels).map(|_| ChannelStretcher::new(PHASE_VOCODER_FRAME_SIZE)).collect(),
                    mode: PlaybackMode::PitchShift,
                    ended: false,
                    read_scratch: vec![0.0; PHASE_VOCODER_FRAME_SIZE * source_channels],
                    channel_scratch: vec![Vec::new(); source_channels],
                    processed_scratch: vec![Vec::new(); source_channels],
            }),
            speed_bits: AtomicU32::new(1.0f32.to_bits()),
            loop_start: AtomicI64::new(0),
            loop_end: AtomicI64::new(-1),
            loop_enabled: AtomicBool::new(false),
        }
    }

    pub fn source_channels(&self) -> usize {
        self.inner.lock().expect("player inner lock poisoned").source_channels
    }

    pub fn playback_state(&self) -> PlaybackState {
        *self.playback_state.lock().expect("playback state lock poisoned")
    }

    pub fn play(&self) {
        let mut state = self.playback_state.lock().expect("playback state lock poisoned");
        if *state != PlaybackState::Playing {
            *state = PlaybackState::Playing;
        }
    }

    pub fn pause(&self) {
        let mut state = self.playback_state.lock().expect("playback state lock poisoned");
        if *state == PlaybackState::Playing {
            *state = PlaybackState::Paused;
        }
    }

    pub fn stop(&self) {
        *self.playback_state.lock().expect("playback state lock poisoned") = PlaybackState::Stopped;
        self.inner.lock().expect("player inner lock poisoned").ended = false;
    }

    /// Seek is legal in any playback state.
    pub fn seek(&self, frames: u64) -> SonaResult<()> {
        let mut inner = self.inner.lock().expect("player inner lock poisoned");
        inner.provider.seek(frames)?;
        inner.ended = false;
        for resampler in &mut inner.resamplers {
            resampler.reset();
        }
        for stretcher in &mut inner.stretchers {
            stretcher.reset();
        }
        Ok(())
    }

    pub fn set_loop(&self, start_frame: u64, end_frame: i64) {
        self.loop_start.store(start_frame as i64, Ordering::Relaxed);
        self.loop_end.store(end_frame, Ordering::Relaxed);
        self.loop_enabled.store(true, Ordering::Relaxed);
    }

    pub fn clear_loop(&self) {
        self.loop_enabled.store(false, Ordering::Relaxed);
    }

    /// Clamped to `[0.25, 4.0]`.
    pub fn set_speed(&self, speed: f32) {
        let clamped = speed.clamp(0.25, 4.0);
        self.speed_bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    /// Mode changes apply at the next render block boundary and reset the
    /// resampler/phase-vocoder phase state to avoid a click.
    pub fn set_playback_mode(&self, mode: PlaybackMode) {
        let mut inner = self.inner.lock().expect("player inner lock poisoned");
        if inner.mode != mode {
            inner.mode = mode;
            for resampler in &mut inner.resamplers {
                resampler.reset();
            }
            for stretcher in &mut inner.stretchers {
                stretcher.reset();
            }
        }
    }

    pub fn has_ended(&self) -> bool {
        self.inner.lock().expect("player inner lock poisoned").ended
    }
}

impl Component for SoundPlayer {
    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn render(&mut self, buffer: &mut [Sample], channels: usize) {
        buffer.fill(0.0);
        if self.playback_state() != PlaybackState::Playing {
            return;
        }

        let channels = channels.max(1);
        let speed = self.speed();
        let mut inner = self.inner.lock().expect("player inner lock poisoned");
        let source_channels = inner.source_channels;
        let loop_enabled = self.loop_enabled.load(Ordering::Relaxed);
        let loop_points = loop_enabled.then(|| LoopPoints {
                start_frame: self.loop_start.load(Ordering::Relaxed).max(0) as u64,
                end_frame: self.loop_end.load(Ordering::Relaxed),
        });

        let frames_needed = buffer.len() / channels;
        let source_frames_needed = ((frames_needed as f64 * speed as f64).ceil() as usize).max(1);
        let source_len = source_frames_needed * source_channels;
        if inner.read_scratch.len() < source_len {
            inner.read_scratch.resize(source_len, 0.0);
        }

        let mut total_read = 0usize;
        while total_read < source_frames_needed {
            let dst_start = total_read * source_channels;
            let read = inner.provider.read(&mut inner.read_scratch[dst_start..source_len]);
            if read == 0 {
                if let Some(points) = loop_points {
                    let wrap_target = points.start_frame;
                    if inner.provider.seek(wrap_target).is_err() {
                        break;
                    }
                    continue;
                }
                inner.ended = true;
                break;
            }
            total_read += read;
            if let Some(points) = loop_points {
                if points.end_frame >= 0 && inner.provider.position() >= points.end_frame as u64 {
                    let _ = inner.provider.seek(points.start_frame);
                }
            }
        }

        if total_read == 0 {
            return;
        }

        let raw_len = total_read * source_channels;
        let PlayerInner {
            read_scratch,
            resamplers,
            stretchers,
            channel_scratch,
            processed_scratch,
            mode,
            ..
        } = &mut *inner;

        for (ch, deinterleaved) in channel_scratch.iter_mut().enumerate() {
            deinterleaved.clear();
            deinterleaved.extend(read_scratch[..raw_len].iter().skip(ch).step_by(source_channels));
        }

        if speed != 1.0 {
            match mode {
                PlaybackMode::PitchShift => {
                    for resampler in resamplers.iter_mut() {
                        resampler.set_ratio(speed as f64);
                    }
                    for (ch, deinterleaved) in channel_scratch.iter().enumerate() {
                        processed_scratch[ch].clear();
                        resamplers[ch].process(deinterleaved, &mut processed_scratch[ch]);
                    }
                }
                PlaybackMode::PitchPreserve => {
                    // `source_frames_needed == frames_needed * speed`, so
                    // consuming it and wanting `frames_needed` samples out
                    // means stretching by the reciprocal of speed.
                    let stretch_factor = 1.0 / speed as f64;
                    for (ch, deinterleaved) in channel_scratch.iter().enumerate() {
                        processed_scratch[ch].clear();
                        stretchers[ch].process(deinterleaved, stretch_factor, &mut processed_scratch[ch]);
                    }
                }
            }
        } else {
            for (ch, deinterleaved) in channel_scratch.iter().enumerate() {
                processed_scratch[ch].clear();
                processed_scratch[ch].extend_from_slice(deinterleaved);
            }
        }

        let output_frames = processed_scratch.iter().map(|c| c.len()).min().unwrap_or(0);
        let copy_frames = output_frames.min(buffer.len() / channels);
        interleave_remap(&processed_scratch[..], copy_frames, buffer, channels);
    }
}

/// Copy `frame_count` frames from deinterleaved `src` channels into
/// interleaved `dst`, reconciling a source channel count that differs from
/// `dst_channels`: mono source duplicates to every output channel,
/// multichannel-to-mono averages, and any other mismatch cycles through
/// the available source channels.
fn interleave_remap(src: &[Vec<Sample>], frame_count: usize, dst: &mut [Sample], dst_channels: usize) {
    let src_channels = src.len().max(1);
    if src_channels == dst_channels {
        for frame in 0..frame_count {
            for ch in 0..dst_channels {
                dst[frame * dst_channels + ch] = src[ch][frame];
            }
        }
        return;
    }
    if dst_channels == 1 {
        for frame in 0..frame_count {
            let sum: Sample = src.iter().map(|c| c[frame]).sum();
            dst[frame] = sum / src_channels as Sample;
        }
        return;
    }
    if src_channels == 1 {
        for frame in 0..frame_count {
            let sample = src[0][frame];
            for ch in 0..dst_channels {
                dst[frame * dst_channels + ch] = sample;
            }
        }
        return;
    }
    for frame in 0..frame_count {
        for ch in 0..dst_channels {
            dst[frame * dst_channels + ch] = src[ch % src_channels][frame];
        }
    }
}

/// Speaker position on the horizontal plane, in degrees, 0 = front center.
#[derive(Debug, Clone, Copy)]
pub struct SpeakerPosition {
    pub angle_degrees: f32,
}

/// How a surround player distributes one source across its speaker ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanningMethod {
    /// Gain varies linearly with angular distance between the two nearest
    /// speakers.
    Linear,
    /// Equal-power crossfade (the same `cos`/`sin` law [`crate::component::pan_gains`]
    /// uses for stereo pan) between the two nearest speakers.
    ConstantPower,
    /// Vector-base amplitude panning; see [`vbap_gains`].
    Vbap,
}

/// Vector-Base Amplitude Panning over a ring of speakers: picks
/// the two speakers with smallest angular distance to `source_angle` and
/// derives gains from the planar triangle solution.
pub fn vbap_gains(source_angle_degrees: f32, speakers: &[SpeakerPosition]) -> Vec<f32> {
    if speakers.is_empty() {
        return Vec::new();
    }
    if speakers.len() == 1 {
        return vec![1.0];
    }

    let (i, j) = two_nearest_speakers(source_angle_degrees, speakers);

    let theta1 = speakers[i].angle_degrees.to_radians();
    let theta2 = speakers[j].angle_degrees.to_radians();
    let theta = source_angle_degrees.to_radians();

    // Solve [cos(t1) cos(t2); sin(t1) sin(t2)] * [g1; g2] = [cos(t); sin(t)]
    let det = theta1.cos() * theta2.sin() - theta2.cos() * theta1.sin();
    let (g1, g2) = if det.abs() < 1e-6 {
        (0.5, 0.5)
    } else {
        let g1 = (theta.cos() * theta2.sin() - theta2.cos() * theta.sin()) / det;
        let g2 = (theta1.cos() * theta.sin() - theta.cos() * theta1.sin()) / det;
        (g1.max(0.0), g2.max(0.0))
    };

    let norm = (g1 * g1 + g2 * g2).sqrt().max(1e-9);
    let mut gains = vec![0.0; speakers.len()];
    gains[i] = g1 / norm;
    gains[j] = g2 / norm;
    gains
}

/// Linear or constant-power crossfade between the two nearest speakers,
/// parameterized by the fraction of angular distance toward the farther
/// one of the pair.
fn proportional_gains(source_angle_degrees: f32, speakers: &[SpeakerPosition], method: PanningMethod) -> Vec<f32> {
    if speakers.is_empty() {
        return Vec::new();
    }
    if speakers.len() == 1 {
        return vec![1.0];
    }

    let (i, j) = two_nearest_speakers(source_angle_degrees, speakers);
    let di = angular_distance(source_angle_degrees, speakers[i].angle_degrees);
    let dj = angular_distance(source_angle_degrees, speakers[j].angle_degrees);
    let span = (di + dj).max(1e-6);
    let t = (di / span).clamp(0.0, 1.0);

    let (gi, gj) = match method {
        PanningMethod::Linear => (1.0 - t, t),
        PanningMethod::ConstantPower => {
            let angle = t * std::f32::consts::FRAC_PI_2;
            (angle.cos(), angle.sin())
        }
        PanningMethod::Vbap => unreachable!("proportional_gains is only called for Linear/ConstantPower"),
    };

    let mut gains = vec![0.0; speakers.len()];
    gains[i] = gi;
    gains[j] = gj;
    gains
}

fn two_nearest_speakers(source_angle_degrees: f32, speakers: &[SpeakerPosition]) -> (usize, usize) {
    let mut by_distance: Vec<usize> = (0..speakers.len()).collect();
    by_distance.sort_by(|&a, &b| {
            angular_distance(source_angle_degrees, speakers[a].angle_degrees)
            .partial_cmp(&angular_distance(source_angle_degrees, speakers[b].angle_degrees))
            .unwrap()
    });
    (by_distance[0], by_distance[1])
}

fn angular_distance(a: f32, b: f32) -> f32 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}

/// A [`SoundPlayer`] placed in a speaker ring: it additionally carries a
/// listener position, the speaker layout, a source azimuth, and a
/// panning method, and renders by mixing the underlying player's output
/// down to mono, then panning that signal out to every speaker.
pub struct SurroundPlayer {
    player: SoundPlayer,
    speakers: Vec<SpeakerPosition>,
    listener_angle_degrees: f32,
    source_angle_degrees: f32,
    method: PanningMethod,
    source_scratch: Vec<Sample>,
    mixdown_scratch: Vec<Sample>,
}

impl SurroundPlayer {
    pub fn new(name: impl Into<String>, provider: Box<dyn SoundDataProvider>, speakers: Vec<SpeakerPosition>) -> Self {
        Self {
            player: SoundPlayer::new(name, provider),
            speakers,
            listener_angle_degrees: 0.0,
            source_angle_degrees: 0.0,
            method: PanningMethod::Vbap,
            source_scratch: Vec::new(),
            mixdown_scratch: Vec::new(),
        }
    }

    pub fn player(&self) -> &SoundPlayer {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut SoundPlayer {
        &mut self.player
    }

    pub fn speakers(&self) -> &[SpeakerPosition] {
        &self.speakers
    }

    pub fn set_speakers(&mut self, speakers: Vec<SpeakerPosition>) {
        self.speakers = speakers;
    }

    /// Listener facing direction, in degrees, 0 = front center; source
    /// panning is computed relative to this.
    pub fn set_listener_angle(&mut self, degrees: f32) {
        self.listener_angle_degrees = degrees;
    }

    /// Source azimuth, in degrees relative to the listener's own facing.
    pub fn set_source_angle(&mut self, degrees: f32) {
        self.source_angle_degrees = degrees;
    }

    pub fn set_panning_method(&mut self, method: PanningMethod) {
        self.method = method;
    }

    fn gains(&self) -> Vec<f32> {
        let relative_angle = (self.source_angle_degrees - self.listener_angle_degrees).rem_euclid(360.0);
        match self.method {
            PanningMethod::Vbap => vbap_gains(relative_angle, &self.speakers),
            PanningMethod::Linear | PanningMethod::ConstantPower => {
                proportional_gains(relative_angle, &self.speakers, self.method)
            }
        }
    }

    /// Fill `buffer` (interleaved, `speaker_count` wide) with the
    /// underlying player's signal, mixed to mono and panned across the
    /// speaker ring by the selected [`PanningMethod`].
    pub fn render(&mut self, buffer: &mut [Sample], speaker_count: usize) {
        buffer.fill(0.0);
        if speaker_count == 0 || self.speakers.is_empty() {
            return;
        }

        let frames = buffer.len() / speaker_count;
        let source_channels = self.player.source_channels();
        let source_len = frames * source_channels;
        if self.source_scratch.len() < source_len {
            self.source_scratch.resize(source_len, 0.0);
        }
        self.player.render(&mut self.source_scratch[..source_len], source_channels);

        self.mixdown_scratch.clear();
        self.mixdown_scratch.resize(frames, 0.0);
        for (frame_idx, frame) in self.source_scratch[..source_len].chunks(source_channels).enumerate() {
            let sum: Sample = frame.iter().sum();
            self.mixdown_scratch[frame_idx] = sum / source_channels as Sample;
        }

        let gains = self.gains();
        for frame in 0..frames {
            let sample = self.mixdown_scratch[frame];
            for (speaker, &gain) in gains.iter().enumerate() {
                buffer[frame * speaker_count + speaker] += sample * gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StreamDecodedProvider, SyntheticProvider, Waveform};
    use sona_core::AudioFormat;

    fn stereo_format() -> AudioFormat {
        AudioFormat::working(48_000, 2)
    }

    #[test]
    fn starts_stopped_and_silent() {
        let provider = Box::new(SyntheticProvider::new(stereo_format(), Waveform::Sine { frequency_hz: 440.0 }, None));
        let mut player = SoundPlayer::new("p", provider);
        let mut buffer = vec![1.0; 64];
        player.render(&mut buffer, 2);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn play_produces_nonsilent_output() {
        let provider = Box::new(SyntheticProvider::new(stereo_format(), Waveform::Sine { frequency_hz: 440.0 }, None));
        let mut player = SoundPlayer::new("p", provider);
        player.play();
        let mut buffer = vec![0.0; 256];
        player.render(&mut buffer, 2);
        assert!(buffer.iter().any(|&s| s.abs() > 1e-4));
    }

    #[test]
    fn stopping_resets_ended_flag() {
        let provider = Box::new(StreamDecodedProvider::new(stereo_format(), vec![0.1; 8]));
        let player = SoundPlayer::new("p", provider);
        player.play();
        assert!(!player.has_ended());
        player.stop();
        assert_eq!(player.playback_state(), PlaybackState::Stopped);
    }

    #[test]
    fn pause_does_not_transition_from_stopped() {
        let provider = Box::new(SyntheticProvider::new(stereo_format(), Waveform::Silence, None));
        let player = SoundPlayer::new("p", provider);
        player.pause();
        assert_eq!(player.playback_state(), PlaybackState::Stopped);
    }

    #[test]
    fn speed_is_clamped_to_documented_range() {
        let provider = Box::new(SyntheticProvider::new(stereo_format(), Waveform::Silence, None));
        let player = SoundPlayer::new("p", provider);
        player.set_speed(10.0);
        assert_eq!(player.speed(), 4.0);
        player.set_speed(0.0);
        assert_eq!(player.speed(), 0.25);
    }

    #[test]
    fn pitch_shift_speed_change_produces_nonsilent_output() {
        let provider = Box::new(SyntheticProvider::new(stereo_format(), Waveform::Sine { frequency_hz: 440.0 }, None));
        let mut player = SoundPlayer::new("p", provider);
        player.play();
        player.set_speed(1.5);
        let mut buffer = vec![0.0; 512];
        player.render(&mut buffer, 2);
        assert!(buffer.iter().any(|&s| s.abs() > 1e-4));
    }

    #[test]
    fn pitch_preserve_speed_change_produces_nonsilent_output() {
        let provider = Box::new(SyntheticProvider::new(stereo_format(), Waveform::Sine { frequency_hz: 440.0 }, None));
        let mut player = SoundPlayer::new("p", provider);
        player.play();
        player.set_playback_mode(PlaybackMode::PitchPreserve);
        player.set_speed(0.5);
        // The vocoder needs several frames of backlog before the first
        // synthesis hop settles; render a handful of blocks.
        let mut buffer = vec![0.0; 1024];
        let mut produced_sound = false;
        for _ in 0..8 {
            player.render(&mut buffer, 2);
            if buffer.iter().any(|&s| s.abs() > 1e-4) {
                produced_sound = true;
            }
        }
        assert!(produced_sound);
    }

    #[test]
    fn switching_to_pitch_preserve_resets_stretcher_backlog() {
        let provider = Box::new(SyntheticProvider::new(stereo_format(), Waveform::Sine { frequency_hz: 440.0 }, None));
        let player = SoundPlayer::new("p", provider);
        player.set_playback_mode(PlaybackMode::PitchPreserve);
        let inner = player.inner.lock().unwrap();
        assert!(inner.stretchers.iter().all(|s| s.backlog.is_empty()));
    }

    #[test]
    fn mono_source_renders_to_stereo_without_panicking() {
        let mono_format = AudioFormat::working(48_000, 1);
        let provider = Box::new(SyntheticProvider::new(mono_format, Waveform::Sine { frequency_hz: 220.0 }, None));
        let mut player = SoundPlayer::new("p", provider);
        player.play();
        let mut buffer = vec![0.0; 256];
        player.render(&mut buffer, 2);
        assert!(buffer.iter().any(|&s| s.abs() > 1e-4));
    }

    #[test]
    fn vbap_picks_nearest_two_speakers() {
        let speakers = vec![
            SpeakerPosition { angle_degrees: 0.0 },
            SpeakerPosition { angle_degrees: 90.0 },
            SpeakerPosition { angle_degrees: 180.0 },
        ];
        let gains = vbap_gains(45.0, &speakers);
        assert!(gains[0] > 0.0);
        assert!(gains[1] > 0.0);
        assert_eq!(gains[2], 0.0);
    }

    #[test]
    fn vbap_on_axis_concentrates_gain_on_one_speaker() {
        let speakers = vec![
            SpeakerPosition { angle_degrees: 0.0 },
            SpeakerPosition { angle_degrees: 90.0 },
        ];
        let gains = vbap_gains(0.0, &speakers);
        assert!(gains[0] > 0.99);
        assert!(gains[1] < 0.01);
    }

    #[test]
    fn surround_player_pans_across_ring() {
        let speakers = vec![
            SpeakerPosition { angle_degrees: 0.0 },
            SpeakerPosition { angle_degrees: 90.0 },
            SpeakerPosition { angle_degrees: 180.0 },
            SpeakerPosition { angle_degrees: 270.0 },
        ];
        let provider = Box::new(SyntheticProvider::new(stereo_format(), Waveform::Sine { frequency_hz: 440.0 }, None));
        let mut surround = SurroundPlayer::new("p", provider, speakers);
        surround.player_mut().play();
        surround.set_source_angle(0.0);
        let mut buffer = vec![0.0; 4 * 64];
        surround.render(&mut buffer, 4);
        let speaker_energy: Vec<f32> = (0..4)
        .map(|speaker| buffer.iter().skip(speaker).step_by(4).map(|s| s.abs()).sum())
        .collect();
        assert!(speaker_energy[0] > speaker_energy[2]);
    }

    #[test]
    fn constant_power_panning_sums_to_unity_gain() {
        let speakers = vec![
            SpeakerPosition { angle_degrees: 0.0 },
            SpeakerPosition { angle_degrees: 90.0 },
        ];
        let gains = proportional_gains(45.0, &speakers, PanningMethod::ConstantPower);
        assert!((gains[0] * gains[0] + gains[1] * gains[1] - 1.0).abs() < 1e-5);
    }
}
