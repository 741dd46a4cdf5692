//! Sound-data provider abstraction: a lazy, forward-read, optionally
//! seekable PCM source. `EndOfStream` is not an
//! error — it is the `end_of_stream` flag reaching `true` and
//! `read` returning 0.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::warn;
use sona_core::{AudioFormat, Sample, SonaError, SonaResult};

/// Lazy, forward-read PCM source.
pub trait SoundDataProvider: Send {
    fn format(&self) -> AudioFormat;

    /// Current read position, in frames.
    fn position(&self) -> u64;

    /// Total length in frames, or `None` if unknown/infinite.
    fn length(&self) -> Option<u64>;

    fn can_seek(&self) -> bool;

    /// Read up to `dst.len() / channels` frames, interleaved. Returns the
    /// number of frames actually read; 0 at end of stream, never an error.
    fn read(&mut self, dst: &mut [Sample]) -> usize;

    /// Reposition to `frames`. Fails with [`SonaError::NotSeekable`] when
    /// `can_seek` is false.
    fn seek(&mut self, frames: u64) -> SonaResult<()>;

    fn end_of_stream(&self) -> bool;
}

/// Already-decoded PCM held entirely in memory ("stream-decoded"
/// and "raw memory-mapped" variants share this shape once the bytes are
/// resident; codec decoding itself lives elsewhere.
pub struct StreamDecodedProvider {
    format: AudioFormat,
    data: Vec<Sample>,
    position_frames: u64,
}

impl StreamDecodedProvider {
    pub fn new(format: AudioFormat, data: Vec<Sample>) -> Self {
        Self {
            format,
            data,
            position_frames: 0,
        }
    }

    fn total_frames(&self) -> u64 {
        (self.data.len() / self.format.channels() as usize) as u64
    }
}

impl SoundDataProvider for StreamDecodedProvider {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn position(&self) -> u64 {
        self.position_frames
    }

    fn length(&self) -> Option<u64> {
        Some(self.total_frames())
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn read(&mut self, dst: &mut [Sample]) -> usize {
        let channels = self.format.channels() as usize;
        let start = self.position_frames as usize * channels;
        if start >= self.data.len() {
            return 0;
        }
        let available = (self.data.len() - start).min(dst.len());
        let frames = available / channels;
        let sample_count = frames * channels;
        dst[..sample_count].copy_from_slice(&self.data[start..start + sample_count]);
        self.position_frames += frames as u64;
        frames
    }

    fn seek(&mut self, frames: u64) -> SonaResult<()> {
        self.position_frames = frames.min(self.total_frames());
        Ok(())
    }

    fn end_of_stream(&self) -> bool {
        self.position_frames >= self.total_frames()
    }
}

/// Synthetic waveform shapes, useful as test fixtures and placeholder
/// sources ("synthetic (e.g. a silence generator)" variant).
#[derive(Debug, Clone, Copy)]
pub enum Waveform {
    Silence,
    Sine { frequency_hz: f64 },
    Dc { level: Sample },
}

/// Generates PCM on demand rather than storing it; `length()` is `None`
/// (infinite) unless a duration is supplied.
pub struct SyntheticProvider {
    format: AudioFormat,
    waveform: Waveform,
    total_frames: Option<u64>,
    position_frames: u64,
    phase: f64,
}

impl SyntheticProvider {
    pub fn new(format: AudioFormat, waveform: Waveform, total_frames: Option<u64>) -> Self {
        Self {
            format,
            waveform,
            total_frames,
            position_frames: 0,
            phase: 0.0,
        }
    }

    fn next_sample(&mut self) -> Sample {
        match self.waveform {
            Waveform::Silence => 0.0,
            Waveform::Dc { level } => level,
            Waveform::Sine { frequency_hz } => {
                let value = (self.phase * std::f64::consts::TAU).sin() as Sample;
                self.phase += frequency_hz / self.format.sample_rate() as f64;
                self.phase -= self.phase.floor();
                value
            }
        }
    }
}

impl SoundDataProvider for SyntheticProvider {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn position(&self) -> u64 {
        self.position_frames
    }

    fn length(&self) -> Option<u64> {
        self.total_frames
    }

    fn can_seek(&self) -> bool {
        matches!(self.waveform, Waveform::Silence | Waveform::Dc {.. } | Waveform::Sine {.. })
    }

    fn read(&mut self, dst: &mut [Sample]) -> usize {
        let channels = self.format.channels() as usize;
        let remaining_frames = self
        .total_frames
        .map(|total| total.saturating_sub(self.position_frames));
        let mut frames_to_write = dst.len() / channels;
        if let Some(remaining) = remaining_frames {
            frames_to_write = frames_to_write.min(remaining as usize);
        }
        for frame in 0..frames_to_write {
            let sample = self.next_sample();
            for ch in 0..channels {
                dst[frame * channels + ch] = sample;
            }
        }
        self.position_frames += frames_to_write as u64;
        frames_to_write
    }

    fn seek(&mut self, frames: u64) -> SonaResult<()> {
        self.position_frames = frames;
        // Phase is re-derived from position so a seek never introduces a
        // discontinuity relative to rendering from position 0 onward.
        if let Waveform::Sine { frequency_hz } = self.waveform {
            let seconds = frames as f64 / self.format.sample_rate() as f64;
            self.phase = (seconds * frequency_hz).fract();
        }
        Ok(())
    }

    fn end_of_stream(&self) -> bool {
        match self.total_frames {
            Some(total) => self.position_frames >= total,
            None => false,
        }
    }
}

/// Decodes blocks on demand via a user-supplied closure rather than
/// holding decoded PCM resident ("chunked-decoder" variant); the
/// external codec collaborator is represented here only by its call shape.
pub struct ChunkedDecoderProvider<F: FnMut(&mut [Sample]) -> usize + Send> {
    format: AudioFormat,
    decode_next: F,
    position_frames: u64,
    ended: bool,
}

impl<F: FnMut(&mut [Sample]) -> usize + Send> ChunkedDecoderProvider<F> {
    pub fn new(format: AudioFormat, decode_next: F) -> Self {
        Self {
            format,
            decode_next,
            position_frames: 0,
            ended: false,
        }
    }
}

impl<F: FnMut(&mut [Sample]) -> usize + Send> SoundDataProvider for ChunkedDecoderProvider<F> {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn position(&self) -> u64 {
        self.position_frames
    }

    fn length(&self) -> Option<u64> {
        None
    }

    fn can_seek(&self) -> bool {
        false
    }

    fn read(&mut self, dst: &mut [Sample]) -> usize {
        let frames = (self.decode_next)(dst);
        self.position_frames += frames as u64;
        if frames == 0 {
            self.ended = true;
        }
        frames
    }

    fn seek(&mut self, _frames: u64) -> SonaResult<()> {
        Err(SonaError::NotSeekable)
    }

    fn end_of_stream(&self) -> bool {
        self.ended
    }
}

/// Background-fed ring buffer with read-timeout backpressure (the
/// "network" variant): a producer thread (not owned by this type) pushes
/// decoded frames; `read` blocks up to `timeout` then returns short.
pub struct NetworkProvider {
    format: AudioFormat,
    consumer: rtrb::Consumer<Sample>,
    timeout: Duration,
    position_frames: u64,
    stream_ended: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl NetworkProvider {
    pub fn new(
        format: AudioFormat,
        consumer: rtrb::Consumer<Sample>,
        timeout: Duration,
        stream_ended: std::sync::Arc<std::sync::atomic::AtomicBool>,
    ) -> Self {
        Self {
            format,
            consumer,
            timeout,
            position_frames: 0,
            stream_ended,
        }
    }
}

impl SoundDataProvider for NetworkProvider {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn position(&self) -> u64 {
        self.position_frames
    }

    fn length(&self) -> Option<u64> {
        None
    }

    fn can_seek(&self) -> bool {
        false
    }

    fn read(&mut self, dst: &mut [Sample]) -> usize {
        let deadline = Instant::now() + self.timeout;
        let mut written = 0;
        while written < dst.len() && Instant::now() < deadline {
            match self.consumer.pop() {
                Ok(sample) => {
                    dst[written] = sample;
                    written += 1;
                }
                Err(_) => {
                    if self.stream_ended.load(std::sync::atomic::Ordering::Acquire) {
                        break;
                    }
                    std::thread::yield_now();
                }
            }
        }
        let frames = written / self.format.channels() as usize;
        self.position_frames += frames as u64;
        frames
    }

    fn seek(&mut self, _frames: u64) -> SonaResult<()> {
        Err(SonaError::NotSeekable)
    }

    fn end_of_stream(&self) -> bool {
        self.stream_ended.load(std::sync::atomic::Ordering::Acquire) && self.consumer.is_empty()
    }
}

/// Captures from a device into a bounded queue; drops the oldest frame on
/// overflow with a logged warning ("microphone" variant).
pub struct MicrophoneProvider {
    format: AudioFormat,
    queue: VecDeque<Sample>,
    capacity: usize,
    position_frames: u64,
}

impl MicrophoneProvider {
    pub fn new(format: AudioFormat, capacity_frames: usize) -> Self {
        Self {
            format,
            queue: VecDeque::with_capacity(capacity_frames * format.channels() as usize),
            capacity: capacity_frames * format.channels() as usize,
            position_frames: 0,
        }
    }

    /// Called from the capture callback to push newly-captured samples.
    pub fn push_captured(&mut self, samples: &[Sample]) {
        for &sample in samples {
            if self.queue.len() >= self.capacity {
                self.queue.pop_front();
                warn!("microphone provider overflow, dropping oldest frame");
            }
            self.queue.push_back(sample);
        }
    }
}

impl SoundDataProvider for MicrophoneProvider {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn position(&self) -> u64 {
        self.position_frames
    }

    fn length(&self) -> Option<u64> {
        None
    }

    fn can_seek(&self) -> bool {
        false
    }

    fn read(&mut self, dst: &mut [Sample]) -> usize {
        let mut written = 0;
        while written < dst.len() {
            match self.queue.pop_front() {
                Some(sample) => {
                    dst[written] = sample;
                    written += 1;
                }
                None => break,
            }
        }
        let frames = written / self.format.channels() as usize;
        self.position_frames += frames as u64;
        frames
    }

    fn seek(&mut self, _frames: u64) -> SonaResult<()> {
        Err(SonaError::NotSeekable)
    }

    fn end_of_stream(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sona_core::SampleFormat;

    fn stereo_format() -> AudioFormat {
        AudioFormat::working(48_000, 2)
    }

    #[test]
    fn stream_decoded_reads_and_reports_eos() {
        let mut provider = StreamDecodedProvider::new(stereo_format(), vec![0.1; 8]);
        let mut dst = [0.0; 4];
        assert_eq!(provider.read(&mut dst), 2);
        assert!(!provider.end_of_stream());
        assert_eq!(provider.read(&mut dst), 2);
        assert!(provider.end_of_stream());
        assert_eq!(provider.read(&mut dst), 0);
    }

    #[test]
    fn stream_decoded_seek_clamps_to_length() {
        let mut provider = StreamDecodedProvider::new(stereo_format(), vec![0.0; 8]);
        provider.seek(100).unwrap();
        assert_eq!(provider.position(), 4);
    }

    #[test]
    fn synthetic_silence_is_always_zero() {
        let mut provider =
        SyntheticProvider::new(stereo_format(), Waveform::Silence, Some(4));
        let mut dst = [1.0; 8];
        let frames = provider.read(&mut dst);
        assert_eq!(frames, 4);
        assert!(dst.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn synthetic_sine_ends_at_declared_length() {
        let mut provider = SyntheticProvider::new(
            AudioFormat::new(48_000, 1, SampleFormat::F32),
            Waveform::Sine { frequency_hz: 1000.0 },
            Some(10),
        );
        let mut dst = [0.0; 4];
        provider.read(&mut dst);
        provider.read(&mut dst);
        assert!(!provider.end_of_stream());
        provider.read(&mut dst);
        assert!(provider.end_of_stream());
    }

    #[test]
    fn chunked_decoder_is_not_seekable() {
        let mut provider = ChunkedDecoderProvider::new(stereo_format(), |dst| {
                dst.fill(0.25);
                dst.len() / 2
        });
        assert!(!provider.can_seek());
        assert!(matches!(provider.seek(0), Err(SonaError::NotSeekable)));
    }

    #[test]
    fn microphone_provider_drops_oldest_on_overflow() {
        let mut provider = MicrophoneProvider::new(AudioFormat::new(48_000, 1, SampleFormat::F32), 2);
        provider.push_captured(&[1.0, 2.0, 3.0]);
        let mut dst = [0.0; 2];
        provider.read(&mut dst);
        assert_eq!(dst, [2.0, 3.0]);
    }
}
