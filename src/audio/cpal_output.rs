//! CPAL speaker wrapper.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig};

use super::mixer::Mixer;
use super::{DeviceLease, PlaybackEngine};
use crate::chunk::{DecodedAudio, PlaybackId};
use crate::format::{f32_to_pcm16, resample};
use crate::session::PlaybackNotifier;
use crate::VoiceSessionError;

fn find_output_device(name: Option<&str>) -> Result<Device, VoiceSessionError> {
    let host = cpal::default_host();
    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or(VoiceSessionError::NoDefaultOutputDevice);
    };

    let devices = host.output_devices().map_err(VoiceSessionError::backend)?;
    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(device);
            }
        }
    }

    Err(VoiceSessionError::DeviceNotFound {
        name: name.to_string(),
    })
}

/// An opened CPAL speaker.
///
/// The stream runs from open until close, rendering silence when nothing is
/// scheduled, so its frame counter is a continuous output clock. Buffers are
/// resampled to the device rate when scheduled.
pub struct CpalOutput {
    name: String,
    mixer: Arc<Mixer>,
    stream: Option<Stream>,
    lease: Option<DeviceLease>,
}

impl CpalOutput {
    /// Opens the named output device (or the default) and starts its clock.
    ///
    /// # Errors
    ///
    /// Returns a device error if the speaker can't be opened or started.
    pub fn open(
        name: Option<&str>,
        notifier: PlaybackNotifier,
        lease: DeviceLease,
    ) -> Result<Self, VoiceSessionError> {
        let device = find_output_device(name)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported_config = device
            .default_output_config()
            .map_err(VoiceSessionError::backend)?;
        let sample_format = supported_config.sample_format();
        let cpal_config: CpalStreamConfig = supported_config.into();

        let mixer = Arc::new(Mixer::new(
            cpal_config.sample_rate.0,
            cpal_config.channels,
            notifier,
        ));

        let stream = match sample_format {
            SampleFormat::F32 => build_f32_stream(&device, &cpal_config, Arc::clone(&mixer))?,
            SampleFormat::I16 => build_i16_stream(&device, &cpal_config, Arc::clone(&mixer))?,
            format => {
                return Err(VoiceSessionError::UnsupportedFormat {
                    format: format!("{format:?}"),
                });
            }
        };
        stream.play().map_err(VoiceSessionError::backend)?;

        tracing::info!(
            device = %device_name,
            sample_rate = cpal_config.sample_rate.0,
            channels = cpal_config.channels,
            "Opened output device"
        );

        Ok(Self {
            name: device_name,
            mixer,
            stream: Some(stream),
            lease: Some(lease),
        })
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn on_stream_error(err: cpal::StreamError) {
    tracing::error!("Output stream error: {}", err);
}

fn build_f32_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mixer: Arc<Mixer>,
) -> Result<Stream, VoiceSessionError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| mixer.render(data),
            on_stream_error,
            None,
        )
        .map_err(VoiceSessionError::backend)
}

fn build_i16_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mixer: Arc<Mixer>,
) -> Result<Stream, VoiceSessionError> {
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                // Grows to the device block size once, then stays put
                scratch.resize(data.len(), 0.0);
                mixer.render(&mut scratch);
                for (out, &sample) in data.iter_mut().zip(&scratch) {
                    *out = f32_to_pcm16(sample);
                }
            },
            on_stream_error,
            None,
        )
        .map_err(VoiceSessionError::backend)
}

impl PlaybackEngine for CpalOutput {
    fn now(&self) -> Duration {
        self.mixer.now()
    }

    fn play(
        &mut self,
        id: PlaybackId,
        audio: DecodedAudio,
        start: Duration,
    ) -> Result<(), VoiceSessionError> {
        if self.is_closed() {
            return Err(VoiceSessionError::BackendError(
                "output device is closed".into(),
            ));
        }
        let samples: Arc<[f32]> = if audio.sample_rate == self.mixer.sample_rate() {
            audio.samples
        } else {
            resample(&audio.samples, audio.sample_rate, self.mixer.sample_rate()).into()
        };
        self.mixer.add(id, samples, start);
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) -> bool {
        self.mixer.remove(id)
    }

    fn stop_all(&mut self) -> usize {
        self.mixer.clear()
    }

    fn close(&mut self) -> bool {
        if self.lease.is_none() {
            return false;
        }
        self.mixer.clear();
        self.stream = None;
        self.lease = None;
        tracing::debug!(
            device = %self.name,
            contended_blocks = self.mixer.contended_blocks(),
            "Closed output device"
        );
        true
    }

    fn is_closed(&self) -> bool {
        self.lease.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceLeases;
    use crate::session::inbox;

    // Note: Device tests require actual audio hardware and are skipped in CI
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_output() {
        let leases = DeviceLeases::default();
        let (tx, _rx) = inbox();
        let mut output = CpalOutput::open(
            None,
            PlaybackNotifier::new(tx),
            leases.acquire_output().unwrap(),
        )
        .unwrap();
        output
            .play(PlaybackId(0), DecodedAudio::silence(2400, 24000), Duration::ZERO)
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(output.now() > Duration::ZERO);
        assert!(output.close());
        assert!(!leases.output_held());
    }
}
