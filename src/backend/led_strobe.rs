//! Strobe backends
//!
//! `LedStrobe` drives a Linux LED class device (for example a camera flash
//! exposed under `/sys/class/leds`). `NoStrobe` stands in when no light is
//! configured; the dispatcher treats its error as a skipped channel.

use crate::alarm::{AlertError, Strobe};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// sysfs LED strobe
#[derive(Debug, Clone)]
pub struct LedStrobe {
    brightness: PathBuf,
    max_brightness: u32,
}

impl LedStrobe {
    /// Open the LED directory containing `brightness` and `max_brightness`
    pub fn open(led_dir: impl AsRef<Path>) -> Result<Self, AlertError> {
        let led_dir = led_dir.as_ref();
        let max_path = led_dir.join("max_brightness");

        let raw = fs::read_to_string(&max_path).map_err(|e| {
            AlertError::ResourceUnavailable(format!("{}: {}", max_path.display(), e))
        })?;
        let max_brightness = raw.trim().parse::<u32>().map_err(|_| {
            AlertError::Device(format!("Invalid max_brightness '{}'", raw.trim()))
        })?;

        debug!(
            "Using LED strobe {} (max brightness {})",
            led_dir.display(),
            max_brightness
        );

        Ok(Self {
            brightness: led_dir.join("brightness"),
            max_brightness,
        })
    }

    pub fn max_brightness(&self) -> u32 {
        self.max_brightness
    }

    fn write(&self, value: u32) -> Result<(), AlertError> {
        fs::write(&self.brightness, value.to_string()).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => AlertError::PermissionDenied(format!(
                "{}: {}",
                self.brightness.display(),
                e
            )),
            ErrorKind::NotFound => AlertError::ResourceUnavailable(format!(
                "{}: {}",
                self.brightness.display(),
                e
            )),
            _ => AlertError::Device(format!("{}: {}", self.brightness.display(), e)),
        })
    }
}

impl Strobe for LedStrobe {
    fn set_on(&self, intensity: f32) -> Result<(), AlertError> {
        let level = (self.max_brightness as f32 * intensity.clamp(0.0, 1.0)).round() as u32;
        self.write(level.max(1))
    }

    fn set_off(&self) -> Result<(), AlertError> {
        self.write(0)
    }
}

/// Strobe used when no light is available
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStrobe;

impl Strobe for NoStrobe {
    fn set_on(&self, _intensity: f32) -> Result<(), AlertError> {
        Err(AlertError::ResourceUnavailable("No strobe hardware".to_string()))
    }

    fn set_off(&self) -> Result<(), AlertError> {
        Ok(())
    }
}
