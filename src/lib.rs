/// Whistle alarm library
///
/// This library listens to an audio input, detects sustained whistle-like
/// sounds with a debounced RMS threshold, and raises a sound, strobe and
/// notification alarm.

pub mod alarm;
pub mod audio_buffer;
pub mod backend;
pub mod config;
pub mod detector;
pub mod input;
pub mod level;
pub mod listener;
pub mod sensitivity;

// Re-export main types
pub use alarm::{
    AlarmDispatcher, AlarmReport, AlertConfig, AlertError, ChannelOutcome, Notifier, Playback,
    Strobe,
};
pub use audio_buffer::{AudioSample, FrameAssembler, DEFAULT_BUFFER_SIZE};
pub use config::{ConfigError, ListenerConfig};
pub use detector::{DetectorState, WhistleDetector, WhistleEvent, REQUIRED_FRAMES};
pub use input::{AudioInput, BufferCallback, InputError, SubscriptionHandle};
pub use listener::{ListenerError, ListenerState, ListenerStats, WhistleListener};
pub use sensitivity::Sensitivity;
