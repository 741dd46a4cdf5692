//! Device-driven engine: owns the device(s), the
//! master mixer, and the `audio-processed` broadcast; dispatches the audio
//! callback into the component graph.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use sona_core::{AudioFormat, Sample};
use sona_graph::Mixer;

use crate::device::{self, DeviceInfo};
use crate::stream::{AudioCallback, AudioStream};
use crate::{AudioConfig, AudioError, AudioResult};

/// Per-device lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    Uninitialized = 0,
    Stopped = 1,
    Running = 2,
}

impl DeviceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DeviceState::Stopped,
            2 => DeviceState::Running,
            _ => DeviceState::Uninitialized,
        }
    }
}

/// Which direction produced a block handed to an `audio-processed` subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Playback,
    Capture,
}

type CaptureSubscriber = Arc<dyn Fn(&[Sample]) + Send + Sync>;
type AudioProcessedSubscriber = Arc<dyn Fn(&[Sample], Capability) + Send + Sync>;

struct ManagedDevice {
    stream: AudioStream,
    format: AudioFormat,
    state: AtomicU8,
}

impl ManagedDevice {
    fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DeviceState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Owns the playback/capture device(s), the master mixer, and the
/// `audio-processed` event fan-out: an atomic subscriber-list snapshot,
/// called inline on the callback, so subscribers must be short and
/// non-blocking.
pub struct Engine {
    master_mixer: Arc<Mutex<Mixer>>,
    playback: StdMutex<Option<ManagedDevice>>,
    capture: StdMutex<Option<ManagedDevice>>,
    capture_subscribers: Arc<ArcSwap<Vec<CaptureSubscriber>>>,
    audio_processed_subscribers: Arc<ArcSwap<Vec<AudioProcessedSubscriber>>>,
}

impl Engine {
    /// `backend_priority` is accepted for host-selection hints; the
    /// underlying cpal host choice is made by [`device::get_host`].
    pub fn create(_backend_priority: Option<&str>) -> Self {
        Self {
            master_mixer: Arc::new(Mutex::new(Mixer::new("master"))),
            playback: StdMutex::new(None),
            capture: StdMutex::new(None),
            capture_subscribers: Arc::new(ArcSwap::from_pointee(Vec::new())),
            audio_processed_subscribers: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }

    pub fn master_mixer(&self) -> Arc<Mutex<Mixer>> {
        Arc::clone(&self.master_mixer)
    }

    pub fn list_playback_devices(&self) -> AudioResult<Vec<DeviceInfo>> {
        device::list_output_devices()
    }

    pub fn list_capture_devices(&self) -> AudioResult<Vec<DeviceInfo>> {
        device::list_input_devices()
    }

    fn check_deadline(deadline: Option<Instant>) -> AudioResult<()> {
        if let Some(deadline) = deadline {
            if Instant::now() > deadline {
                return Err(AudioError::Timeout);
            }
        }
        Ok(())
    }

    /// Open the default (or named) output device at `format` and start
    /// calling the master mixer's `render` on every callback.
    pub fn open_playback(
        &self,
        device_name: Option<&str>,
        format: AudioFormat,
        deadline: Option<Instant>,
    ) -> AudioResult<()> {
        Self::check_deadline(deadline)?;
        let output_device = match device_name {
            Some(name) => device::get_output_device_by_name(name)?,
            None => device::get_default_output_device()?,
        };

        let config = AudioConfig {
            sample_rate: sample_rate_from_format(format)?,
            buffer_size: Default::default(),
            input_channels: 0,
            output_channels: format.channels(),
        };

        let mixer = Arc::clone(&self.master_mixer);
        let audio_processed_subscribers = Arc::clone(&self.audio_processed_subscribers);
        let channels = format.channels() as usize;
        let callback: AudioCallback = Box::new(move |_input, output| {
                mixer.lock().render(output, channels);
                let snapshot = audio_processed_subscribers.load();
                for subscriber in snapshot.iter() {
                    subscriber(output, Capability::Playback);
                }
        });

        let stream = AudioStream::new(Some(&output_device), None, config, Some(callback), None)?;
        stream.start()?;

        let managed = ManagedDevice {
            stream,
            format,
            state: AtomicU8::new(DeviceState::Running as u8),
        };
        *self.playback.lock().expect("playback device lock poisoned") = Some(managed);
        Ok(())
    }

    /// Open the default (or named) input device at `format` and fan every
    /// captured block out to registered capture subscribers.
    pub fn open_capture(
        &self,
        device_name: Option<&str>,
        format: AudioFormat,
        deadline: Option<Instant>,
    ) -> AudioResult<()> {
        Self::check_deadline(deadline)?;
        let input_device = match device_name {
            Some(name) => device::get_input_device_by_name(name)?,
            None => device::get_default_input_device()?,
        };

        let config = AudioConfig {
            sample_rate: sample_rate_from_format(format)?,
            buffer_size: Default::default(),
            input_channels: format.channels(),
            output_channels: 0,
        };

        let capture_subscribers = Arc::clone(&self.capture_subscribers);
        let audio_processed_subscribers = Arc::clone(&self.audio_processed_subscribers);
        let capture_callback: crate::stream::CaptureCallback = Box::new(move |data| {
                let snapshot = capture_subscribers.load();
                for subscriber in snapshot.iter() {
                    subscriber(data);
                }
                let audio_processed_snapshot = audio_processed_subscribers.load();
                for subscriber in audio_processed_snapshot.iter() {
                    subscriber(data, Capability::Capture);
                }
        });
        let stream = AudioStream::new(None, Some(&input_device), config, None, Some(capture_callback))?;
        stream.start()?;

        let managed = ManagedDevice {
            stream,
            format,
            state: AtomicU8::new(DeviceState::Running as u8),
        };
        *self.capture.lock().expect("capture device lock poisoned") = Some(managed);
        Ok(())
    }

    /// Open both playback and capture against the same device pair.
    pub fn open_full_duplex(
        &self,
        device_name: Option<&str>,
        format: AudioFormat,
        deadline: Option<Instant>,
    ) -> AudioResult<()> {
        Self::check_deadline(deadline)?;
        self.open_playback(device_name, format, deadline)?;
        self.open_capture(device_name, format, deadline)
    }

    /// Loopback capture (recording the system's own output). Only
    /// meaningful on platforms whose native backend supports it.
    pub fn open_loopback(&self, _format: AudioFormat, _deadline: Option<Instant>) -> AudioResult<()> {
        if cfg!(target_os = "windows") {
            Err(AudioError::StreamError(
                    "loopback capture is not yet wired to a WASAPI loopback host".to_string(),
            ))
        } else {
            Err(AudioError::NotSupported)
        }
    }

    /// Stop the current device, open a new one with the same format/config,
    /// reattach (the master mixer and capture-subscriber list are never
    /// touched, so the attached subtree survives untouched), and restart if
    /// the old device was running.
    pub fn switch_device(&self, new_device_name: Option<&str>, deadline: Option<Instant>) -> AudioResult<()> {
        Self::check_deadline(deadline)?;
        let mut playback_slot = self.playback.lock().expect("playback device lock poisoned");
        let Some(old) = playback_slot.take() else {
            return Err(AudioError::DeviceNotFound("no playback device open".to_string()));
        };
        let was_running = old.state() == DeviceState::Running;
        let old_format = old.format;
        old.stream.stop()?;
        drop(old);
        drop(playback_slot);

        self.open_playback(new_device_name, old_format, deadline)?;

        if !was_running {
            if let Some(device) = self.playback.lock().expect("playback device lock poisoned").as_ref() {
                device.stream.stop()?;
                device.set_state(DeviceState::Stopped);
            }
        }
        Ok(())
    }

    pub fn playback_state(&self) -> DeviceState {
        self.playback
        .lock()
        .expect("playback device lock poisoned")
        .as_ref()
        .map(|d| d.state())
        .unwrap_or(DeviceState::Uninitialized)
    }

    pub fn capture_state(&self) -> DeviceState {
        self.capture
        .lock()
        .expect("capture device lock poisoned")
        .as_ref()
        .map(|d| d.state())
        .unwrap_or(DeviceState::Uninitialized)
    }

    pub fn add_capture_subscriber(&self, subscriber: CaptureSubscriber) {
        self.capture_subscribers.rcu(|current| {
                let mut next = current.clone();
                next.push(subscriber.clone());
                next
        });
    }

    pub fn add_audio_processed_subscriber(&self, subscriber: AudioProcessedSubscriber) {
        self.audio_processed_subscribers.rcu(|current| {
                let mut next = current.clone();
                next.push(subscriber.clone());
                next
        });
    }

    /// Broadcast a rendered/captured block to every `audio-processed`
    /// subscriber via an inline atomic snapshot; subscribers must be
    /// short and non-blocking.
    pub fn broadcast_audio_processed(&self, buffer: &[Sample], capability: Capability) {
        let snapshot = self.audio_processed_subscribers.load();
        for subscriber in snapshot.iter() {
            subscriber(buffer, capability);
        }
    }

    /// Release every native handle the engine owns.
    pub fn dispose(&self) -> AudioResult<()> {
        if let Some(device) = self.playback.lock().expect("playback device lock poisoned").take() {
            device.stream.stop()?;
        }
        if let Some(device) = self.capture.lock().expect("capture device lock poisoned").take() {
            device.stream.stop()?;
        }
        Ok(())
    }
}

fn sample_rate_from_format(format: AudioFormat) -> AudioResult<sona_core::SampleRate> {
    match format.sample_rate() {
        44_100 => Ok(sona_core::SampleRate::Hz44100),
        48_000 => Ok(sona_core::SampleRate::Hz48000),
        88_200 => Ok(sona_core::SampleRate::Hz88200),
        96_000 => Ok(sona_core::SampleRate::Hz96000),
        176_400 => Ok(sona_core::SampleRate::Hz176400),
        192_000 => Ok(sona_core::SampleRate::Hz192000),
        other => Err(AudioError::UnsupportedSampleRate(other)),
    }
}

/// Duration helper for callers building an explicit deadline for a
/// blocking control operation.
pub fn deadline_from_now(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_engine_reports_uninitialized_devices() {
        let engine = Engine::create(None);
        assert_eq!(engine.playback_state(), DeviceState::Uninitialized);
        assert_eq!(engine.capture_state(), DeviceState::Uninitialized);
    }

    #[test]
    fn audio_processed_subscribers_receive_broadcast() {
        let engine = Engine::create(None);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        engine.add_audio_processed_subscriber(Arc::new(move |buffer: &[Sample], capability| {
                    seen_clone.lock().unwrap().push((buffer.len(), capability));
        }));
        engine.broadcast_audio_processed(&[0.0; 8], Capability::Playback);
        let recorded = seen.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], (8, Capability::Playback));
    }

    #[test]
    fn deadline_in_the_past_times_out() {
        let past = Instant::now() - Duration::from_secs(1);
        assert!(matches!(Engine::check_deadline(Some(past)), Err(AudioError::Timeout)));
    }
}
