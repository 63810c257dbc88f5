/// Sensitivity levels and the threshold policy
///
/// Higher sensitivity means a lower loudness cutoff, so quieter whistles
/// are enough to raise the alarm.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown sensitivity '{0}': expected low, medium, high or 1-3")]
pub struct SensitivityParseError(pub String);

/// User-facing detection sensitivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// All levels, least sensitive first
    pub const ALL: [Sensitivity; 3] = [Sensitivity::Low, Sensitivity::Medium, Sensitivity::High];

    /// RMS loudness a buffer must exceed to count towards a whistle
    pub fn cutoff(self) -> f32 {
        match self {
            Sensitivity::Low => 0.08,
            Sensitivity::Medium => 0.05,
            Sensitivity::High => 0.03,
        }
    }

    /// Map a numeric level (1 = low, 2 = medium, 3 = high)
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Sensitivity::Low),
            2 => Some(Sensitivity::Medium),
            3 => Some(Sensitivity::High),
            _ => None,
        }
    }

    /// Numeric level of this sensitivity
    pub fn level(self) -> u8 {
        match self {
            Sensitivity::Low => 1,
            Sensitivity::Medium => 2,
            Sensitivity::High => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sensitivity {
    type Err = SensitivityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if let Ok(level) = trimmed.parse::<u8>() {
            return Self::from_level(level).ok_or_else(|| SensitivityParseError(s.to_string()));
        }

        Self::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| SensitivityParseError(s.to_string()))
    }
}
