//! Exclusive ownership of a backend's devices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::VoiceSessionError;

/// Claim on one device of an [`AudioBackend`](super::AudioBackend).
///
/// The device is free again as soon as the lease is dropped.
#[derive(Debug)]
#[must_use]
pub struct DeviceLease {
    held: Arc<AtomicBool>,
}

impl DeviceLease {
    fn acquire(slot: &Arc<AtomicBool>) -> Result<Self, VoiceSessionError> {
        if slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VoiceSessionError::DeviceBusy);
        }
        Ok(Self {
            held: Arc::clone(slot),
        })
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Lease slots for a backend's microphone and speaker.
#[derive(Debug, Default, Clone)]
pub struct DeviceLeases {
    input: Arc<AtomicBool>,
    output: Arc<AtomicBool>,
}

impl DeviceLeases {
    /// Claims the microphone.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceSessionError::DeviceBusy`] if it is already claimed.
    pub fn acquire_input(&self) -> Result<DeviceLease, VoiceSessionError> {
        DeviceLease::acquire(&self.input)
    }

    /// Claims the speaker.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceSessionError::DeviceBusy`] if it is already claimed.
    pub fn acquire_output(&self) -> Result<DeviceLease, VoiceSessionError> {
        DeviceLease::acquire(&self.output)
    }

    /// Returns `true` if the microphone is claimed.
    pub fn input_held(&self) -> bool {
        self.input.load(Ordering::Acquire)
    }

    /// Returns `true` if the speaker is claimed.
    pub fn output_held(&self) -> bool {
        self.output.load(Ordering::Acquire)
    }
}
