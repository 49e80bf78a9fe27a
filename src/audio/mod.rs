//! Audio device abstraction.
//!
//! A session talks to audio hardware through three traits:
//!
//! - [`AudioBackend`]: opens the microphone and the speaker
//! - [`InputDevice`]: an opened microphone whose stream feeds a lock-free ring buffer
//! - [`PlaybackEngine`]: an opened speaker that plays buffers at exact offsets
//!   on its own output clock
//!
//! [`CpalBackend`] drives real hardware; [`MockAudioBackend`] drives the same
//! session logic without any, for tests and CI.
//!
//! Device callbacks never block and never await. The capture callback only
//! pushes into the ring buffer; the playback callback only mixes buffers that
//! were scheduled ahead of time.

mod cpal_input;
mod cpal_output;
mod lease;
mod mixer;
mod mock;

pub use cpal_input::CpalInput;
pub use cpal_output::CpalOutput;
pub use lease::{DeviceLease, DeviceLeases};
pub use mock::{MockAudioBackend, MockPlayback, MockSource};

use std::sync::OnceLock;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::chunk::{DecodedAudio, PlaybackId};
use crate::session::PlaybackNotifier;
use crate::VoiceSessionError;

/// Native format of an opened input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    /// Device sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

/// Opens audio devices for a session.
///
/// Each backend enforces that at most one session holds its microphone and
/// speaker at a time: a second `open_*` call fails with
/// [`VoiceSessionError::DeviceBusy`] until the first device is closed.
pub trait AudioBackend: Send + Sync {
    /// Opens the microphone and prepares (but does not start) its stream.
    ///
    /// `buffer` sizes the ring buffer between the device callback and the
    /// capture task.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceSessionError::PermissionDenied`] if the platform refused
    /// microphone access, or a device error.
    fn open_input(
        &self,
        device: Option<&str>,
        buffer: Duration,
    ) -> Result<Box<dyn InputDevice>, VoiceSessionError>;

    /// Opens the speaker. Finished buffers are reported through `notifier`.
    fn open_output(
        &self,
        device: Option<&str>,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn PlaybackEngine>, VoiceSessionError>;
}

/// An opened microphone.
///
/// Not `Send`: hardware streams are pinned to the thread that created them.
pub trait InputDevice {
    /// Native format of the samples pushed into the ring buffer.
    fn format(&self) -> InputFormat;

    /// Starts the stream and hands over the read side of the ring buffer.
    ///
    /// Can only be called once; samples are interleaved `f32` in device format.
    fn start(&mut self) -> Result<ringbuf::HeapCons<f32>, VoiceSessionError>;

    /// Stops the stream. Returns `false` if it wasn't running.
    fn stop(&mut self) -> bool;

    /// Releases the device. Returns `false` if it was already closed.
    fn close(&mut self) -> bool;

    /// Returns `true` once [`close()`](InputDevice::close) has run.
    fn is_closed(&self) -> bool;
}

/// An opened speaker with a sample-accurate output clock.
pub trait PlaybackEngine {
    /// Current position of the output clock (time rendered so far).
    fn now(&self) -> Duration;

    /// Schedules `audio` to start at `start` on the output clock.
    ///
    /// A start time already in the past plays immediately.
    fn play(
        &mut self,
        id: PlaybackId,
        audio: DecodedAudio,
        start: Duration,
    ) -> Result<(), VoiceSessionError>;

    /// Stops one buffer. Returns `false` if it wasn't playing.
    fn stop(&mut self, id: PlaybackId) -> bool;

    /// Stops every scheduled buffer, returning how many were stopped.
    fn stop_all(&mut self) -> usize;

    /// Releases the device. Returns `false` if it was already closed.
    fn close(&mut self) -> bool;

    /// Returns `true` once [`close()`](PlaybackEngine::close) has run.
    fn is_closed(&self) -> bool;
}

/// Lease slots for the host's real devices, shared by every [`CpalBackend`].
fn host_leases() -> &'static DeviceLeases {
    static LEASES: OnceLock<DeviceLeases> = OnceLock::new();
    LEASES.get_or_init(DeviceLeases::default)
}

/// Audio backend for the host's CPAL devices.
///
/// All `CpalBackend`s in a process share one set of device leases, so two
/// sessions never hold the real microphone or speaker at the same time.
#[derive(Debug)]
pub struct CpalBackend {
    leases: DeviceLeases,
}

impl CpalBackend {
    /// Creates a backend for the default CPAL host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            leases: host_leases().clone(),
        }
    }

    /// The device leases this backend acquires from.
    pub fn leases(&self) -> &DeviceLeases {
        &self.leases
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(
        &self,
        device: Option<&str>,
        buffer: Duration,
    ) -> Result<Box<dyn InputDevice>, VoiceSessionError> {
        let lease = self.leases.acquire_input()?;
        let input = CpalInput::open(device, buffer, lease)?;
        Ok(Box::new(input))
    }

    fn open_output(
        &self,
        device: Option<&str>,
        notifier: PlaybackNotifier,
    ) -> Result<Box<dyn PlaybackEngine>, VoiceSessionError> {
        let lease = self.leases.acquire_output()?;
        let output = CpalOutput::open(device, notifier, lease)?;
        Ok(Box::new(output))
    }
}

/// Lists all available input devices.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_input_devices() -> Result<Vec<String>, VoiceSessionError> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(VoiceSessionError::backend)?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Lists all available output devices.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_output_devices() -> Result<Vec<String>, VoiceSessionError> {
    let host = cpal::default_host();
    let devices = host.output_devices().map_err(VoiceSessionError::backend)?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Gets the name of the default input device, if any.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}

/// Gets the name of the default output device, if any.
pub fn default_output_device_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| d.name().ok())
}
