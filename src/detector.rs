/// Whistle detector state machine
///
/// Converts a stream of per-buffer loudness readings into discrete whistle
/// events. A whistle is reported once the loudness stays above the cutoff for
/// `REQUIRED_FRAMES` consecutive buffers; any buffer at or below the cutoff
/// cancels the run. Single-buffer clicks and pops never get that far.

use crate::audio_buffer::AudioSample;
use crate::level;
use std::time::Instant;
use tracing::{debug, trace};

/// Consecutive loud buffers needed to report a whistle
pub const REQUIRED_FRAMES: u32 = 4;

/// A sustained whistle was detected
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhistleEvent {
    /// When the triggering buffer was measured
    pub detected_at: Instant,

    /// Loudness of the triggering buffer
    pub level: f32,
}

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No loud buffers in the current run
    Idle,

    /// Loud buffers seen, not yet enough to trigger
    Accumulating,
}

/// Consecutive-frame whistle detector
///
/// One instance belongs to one listening session and is mutated only from
/// the audio callback that owns it.
#[derive(Debug, Clone)]
pub struct WhistleDetector {
    required_frames: u32,
    consecutive_frames: u32,
    last_trigger: Option<Instant>,
    frames_processed: u64,
    whistles_detected: u64,
}

impl WhistleDetector {
    /// Create a detector requiring `REQUIRED_FRAMES` loud buffers
    pub fn new() -> Self {
        Self::with_required_frames(REQUIRED_FRAMES)
    }

    /// Create a detector with a custom run length (at least 1)
    pub fn with_required_frames(required_frames: u32) -> Self {
        Self {
            required_frames: required_frames.max(1),
            consecutive_frames: 0,
            last_trigger: None,
            frames_processed: 0,
            whistles_detected: 0,
        }
    }

    /// Feed one loudness reading; returns an event when a whistle completes
    pub fn on_level(&mut self, loudness: f32, cutoff: f32) -> Option<WhistleEvent> {
        self.frames_processed += 1;

        if loudness > cutoff {
            self.consecutive_frames += 1;
            trace!(
                "Loud frame: level={:.4}, cutoff={:.4}, run={}",
                loudness, cutoff, self.consecutive_frames
            );
        } else {
            self.consecutive_frames = 0;
        }

        if self.consecutive_frames < self.required_frames {
            return None;
        }

        let now = Instant::now();
        self.consecutive_frames = 0;
        self.last_trigger = Some(now);
        self.whistles_detected += 1;
        debug!("Whistle detected: level={:.4}, cutoff={:.4}", loudness, cutoff);

        Some(WhistleEvent {
            detected_at: now,
            level: loudness,
        })
    }

    /// Measure a raw buffer and feed the result
    pub fn process_buffer(&mut self, samples: &[AudioSample], cutoff: f32) -> Option<WhistleEvent> {
        self.on_level(level::rms(samples), cutoff)
    }

    pub fn state(&self) -> DetectorState {
        if self.consecutive_frames == 0 {
            DetectorState::Idle
        } else {
            DetectorState::Accumulating
        }
    }

    pub fn consecutive_frames(&self) -> u32 {
        self.consecutive_frames
    }

    pub fn required_frames(&self) -> u32 {
        self.required_frames
    }

    /// When the last whistle was reported, if any
    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            frames_processed: self.frames_processed,
            whistles_detected: self.whistles_detected,
            consecutive_frames: self.consecutive_frames,
        }
    }

    /// Reset detector to its initial state
    pub fn reset(&mut self) {
        self.consecutive_frames = 0;
        self.last_trigger = None;
        self.frames_processed = 0;
        self.whistles_detected = 0;
        debug!("Whistle detector reset");
    }
}

impl Default for WhistleDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Detector statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorStats {
    pub frames_processed: u64,
    pub whistles_detected: u64,
    pub consecutive_frames: u32,
}
