//! Audio input capability
//!
//! The listener never talks to an audio backend directly. It subscribes to an
//! [`AudioInput`] and receives fixed-length mono buffers through a callback.

use crate::audio_buffer::AudioSample;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio input unavailable: {0}")]
    Unavailable(String),

    #[error("Audio engine failed to start: {0}")]
    EngineStart(String),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(u64),
}

/// Receives one fixed-length buffer per call.
///
/// Runs on the capture thread: it must return quickly and must not block.
pub type BufferCallback = Box<dyn FnMut(&[AudioSample]) + Send + 'static>;

/// Identifies one active subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Source of audio buffers
#[cfg_attr(test, mockall::automock)]
pub trait AudioInput {
    /// Start delivering buffers of `buffer_size` samples to `callback`
    fn subscribe(
        &mut self,
        buffer_size: usize,
        callback: BufferCallback,
    ) -> Result<SubscriptionHandle, InputError>;

    /// Stop delivery and release the subscription
    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), InputError>;
}
