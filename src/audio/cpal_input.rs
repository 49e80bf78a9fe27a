//! CPAL microphone wrapper.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{DeviceLease, InputDevice, InputFormat};
use crate::VoiceSessionError;

/// Maps a CPAL error to a session error, recognising permission refusals.
///
/// Hosts report a refused microphone as a backend-specific error whose text
/// is the only reliable signal.
pub(crate) fn classify_input_error(err: impl std::fmt::Display) -> VoiceSessionError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    let denied = ["permission", "denied", "not permitted", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle));
    if denied {
        VoiceSessionError::PermissionDenied
    } else {
        VoiceSessionError::BackendError(message)
    }
}

/// Finds an input device by name, or the default one.
fn find_input_device(name: Option<&str>) -> Result<Device, VoiceSessionError> {
    let host = cpal::default_host();
    let Some(name) = name else {
        return host
            .default_input_device()
            .ok_or(VoiceSessionError::NoDefaultInputDevice);
    };

    let devices = host.input_devices().map_err(classify_input_error)?;
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

/// An opened CPAL microphone.
///
/// The stream is built at open time (which is where hosts refuse permission)
/// and started by [`InputDevice::start`]. Samples are converted to `f32` in
/// the callback and pushed into the ring buffer without blocking; if the ring
/// is full the newest samples are dropped.
pub struct CpalInput {
    name: String,
    format: InputFormat,
    stream: Option<Stream>,
    consumer: Option<HeapCons<f32>>,
    running: bool,
    lease: Option<DeviceLease>,
}

impl CpalInput {
    /// Opens the named input device (or the default) and builds its stream.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceSessionError::PermissionDenied`] if the host refuses
    /// access, or a device error if it can't be opened.
    pub fn open(
        name: Option<&str>,
        buffer: Duration,
        lease: DeviceLease,
    ) -> Result<Self, VoiceSessionError> {
        let device = find_input_device(name)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported_config = device
            .default_input_config()
            .map_err(classify_input_error)?;
        let sample_format = supported_config.sample_format();
        let cpal_config: CpalStreamConfig = supported_config.into();
        let format = InputFormat {
            sample_rate: cpal_config.sample_rate.0,
            channels: cpal_config.channels,
        };

        let capacity = ((f64::from(format.sample_rate) * buffer.as_secs_f64()) as usize)
            .max(1)
            * usize::from(format.channels);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let stream = match sample_format {
            SampleFormat::F32 => build_f32_stream(&device, &cpal_config, producer)?,
            SampleFormat::I16 => build_i16_stream(&device, &cpal_config, producer)?,
            SampleFormat::U16 => build_u16_stream(&device, &cpal_config, producer)?,
            format => {
                return Err(VoiceSessionError::UnsupportedFormat {
                    format: format!("{format:?}"),
                });
            }
        };

        tracing::info!(
            device = %device_name,
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Opened input device"
        );

        Ok(Self {
            name: device_name,
            format,
            stream: Some(stream),
            consumer: Some(consumer),
            running: false,
            lease: Some(lease),
        })
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn on_stream_error(err: cpal::StreamError) {
    tracing::error!("Input stream error: {}", err);
}

fn build_f32_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: HeapProd<f32>,
) -> Result<Stream, VoiceSessionError> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Non-blocking push - drops samples if buffer is full
                let _ = producer.push_slice(data);
            },
            on_stream_error,
            None,
        )
        .map_err(classify_input_error)
}

fn build_i16_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: HeapProd<f32>,
) -> Result<Stream, VoiceSessionError> {
    device
        .build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    let _ = producer.try_push(crate::format::pcm16_to_f32(sample));
                }
            },
            on_stream_error,
            None,
        )
        .map_err(classify_input_error)
}

fn build_u16_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: HeapProd<f32>,
) -> Result<Stream, VoiceSessionError> {
    device
        .build_input_stream(
            config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    let centered = (i32::from(sample) - 32768) as i16;
                    let _ = producer.try_push(crate::format::pcm16_to_f32(centered));
                }
            },
            on_stream_error,
            None,
        )
        .map_err(classify_input_error)
}

impl InputDevice for CpalInput {
    fn format(&self) -> InputFormat {
        self.format
    }

    fn start(&mut self) -> Result<HeapCons<f32>, VoiceSessionError> {
        let (Some(stream), Some(consumer)) = (self.stream.as_ref(), self.consumer.take()) else {
            return Err(VoiceSessionError::BackendError(
                "input stream already started or closed".into(),
            ));
        };
        stream.play().map_err(classify_input_error)?;
        self.running = true;
        Ok(consumer)
    }

    fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        if let Some(stream) = self.stream.as_ref() {
            if let Err(e) = stream.pause() {
                tracing::debug!(device = %self.name, "Pausing input stream failed: {}", e);
            }
        }
        true
    }

    fn close(&mut self) -> bool {
        if self.lease.is_none() {
            return false;
        }
        self.running = false;
        // Dropping the CPAL stream releases the device
        self.stream = None;
        self.consumer = None;
        self.lease = None;
        tracing::debug!(device = %self.name, "Closed input device");
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

    #[test]
    fn test_classify_permission_errors() {
        assert!(matches!(
            classify_input_error("Permission denied by user"),
            VoiceSessionError::PermissionDenied
        ));
        assert!(matches!(
            classify_input_error("app is not authorized to record"),
            VoiceSessionError::PermissionDenied
        ));
    }

    #[test]
    fn test_classify_other_errors() {
        let err = classify_input_error("device disconnected");
        assert!(matches!(err, VoiceSessionError::BackendError(ref m) if m == "device disconnected"));
    }

    // Note: Device tests require actual audio hardware and are skipped in CI
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_input() {
        let leases = DeviceLeases::default();
        let mut input = CpalInput::open(
            None,
            Duration::from_secs(1),
            leases.acquire_input().unwrap(),
        )
        .unwrap();
        println!("Default input: {} {:?}", input.name(), input.format());
        assert!(input.close());
        assert!(!input.close());
        assert!(!leases.input_held());
    }
}
