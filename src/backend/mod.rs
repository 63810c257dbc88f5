//! Platform backends for the capability traits
//!
//! - `CpalInput`: microphone capture
//! - `WavFileInput`: WAV file replay
//! - `RodioPlayback`: alarm sound playback
//! - `LedStrobe` / `NoStrobe`: strobe light
//! - `DesktopNotifier`: desktop notifications

pub mod cpal_input;
pub mod desktop_notifier;
pub mod led_strobe;
pub mod rodio_playback;
pub mod wav_input;

pub use cpal_input::CpalInput;
pub use desktop_notifier::DesktopNotifier;
pub use led_strobe::{LedStrobe, NoStrobe};
pub use rodio_playback::RodioPlayback;
pub use wav_input::WavFileInput;
