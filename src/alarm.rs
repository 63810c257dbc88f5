/// Alarm dispatcher
///
/// Fires the alert channels (sound, strobe, notification) for a detected
/// whistle. Every channel is best-effort: a failure is logged and recorded in
/// the returned report, and the remaining channels still fire.

use crate::detector::WhistleEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sound played once per alarm
pub const ALARM_SOUND: &str = "alarm";

/// Near-silent sound looped to keep the process active in the background
pub const KEEP_ALIVE_SOUND: &str = "silent";

/// Volume used for the keep-alive loop
pub const KEEP_ALIVE_VOLUME: f32 = 0.001;

/// Fixed notification id, so a new alarm replaces a pending one
pub const ALARM_NOTIFICATION_ID: &str = "WHISTLE_ALARM";

pub const ALARM_TITLE: &str = "WhistleFinder";
pub const ALARM_BODY: &str = "Whistle detected, alarm active";

/// Strobe pulse length
pub const DEFAULT_FLASH_DURATION: Duration = Duration::from_millis(250);

/// Minimum time between two detection-triggered alarms
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device error: {0}")]
    Device(String),
}

/// Sound output capability
#[cfg_attr(test, mockall::automock)]
pub trait Playback: Send + Sync {
    fn play_once(&self, sound: &str) -> Result<(), AlertError>;

    fn play_loop(&self, sound: &str, volume: f32) -> Result<(), AlertError>;

    fn stop_all(&self) -> Result<(), AlertError>;
}

/// Light output capability
#[cfg_attr(test, mockall::automock)]
pub trait Strobe: Send + Sync {
    /// Turn the light on, `intensity` in 0.0..=1.0
    fn set_on(&self, intensity: f32) -> Result<(), AlertError>;

    fn set_off(&self) -> Result<(), AlertError>;
}

/// User notification capability
///
/// Publishing with an id that is already shown replaces its content.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn publish(&self, id: &str, title: &str, body: &str) -> Result<(), AlertError>;

    fn withdraw(&self, id: &str) -> Result<(), AlertError>;
}

/// Per-session alert channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub flash_enabled: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { flash_enabled: true }
    }
}

/// What happened to one alert channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Delivered,
    /// Disabled by configuration, or cancelled by a stop
    Skipped,
    Failed(AlertError),
}

impl ChannelOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered)
    }
}

/// Outcome of one alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmReport {
    pub sound: ChannelOutcome,
    pub flash: ChannelOutcome,
    pub notification: ChannelOutcome,
}

impl AlarmReport {
    pub fn delivered_channels(&self) -> usize {
        [&self.sound, &self.flash, &self.notification]
            .into_iter()
            .filter(|outcome| outcome.is_delivered())
            .count()
    }
}

/// Fires alert channels and enforces the alarm cooldown
pub struct AlarmDispatcher {
    playback: Arc<dyn Playback>,
    strobe: Arc<dyn Strobe>,
    notifier: Arc<dyn Notifier>,
    cooldown: Duration,
    flash_duration: Duration,
    last_alarm: Mutex<Option<Instant>>,
}

impl AlarmDispatcher {
    pub fn new(
        playback: Arc<dyn Playback>,
        strobe: Arc<dyn Strobe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            playback,
            strobe,
            notifier,
            cooldown: DEFAULT_COOLDOWN,
            flash_duration: DEFAULT_FLASH_DURATION,
            last_alarm: Mutex::new(None),
        }
    }

    /// Set the cooldown; zero lets every detection fire
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_flash_duration(mut self, flash_duration: Duration) -> Self {
        self.flash_duration = flash_duration;
        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Fire the alarm for a detected whistle unless it falls inside the cooldown
    pub fn on_whistle(&self, event: &WhistleEvent, config: &AlertConfig) -> Option<AlarmReport> {
        self.on_whistle_while(event, config, || true)
    }

    /// Like [`on_whistle`](Self::on_whistle), but channels not yet started
    /// are skipped once `active` returns false
    pub fn on_whistle_while<F>(
        &self,
        event: &WhistleEvent,
        config: &AlertConfig,
        active: F,
    ) -> Option<AlarmReport>
    where
        F: Fn() -> bool,
    {
        if !active() {
            debug!("Whistle dropped, session stopped");
            return None;
        }

        {
            let mut last_alarm = self.last_alarm.lock();
            if let Some(last) = *last_alarm {
                let elapsed = event.detected_at.saturating_duration_since(last);
                if elapsed < self.cooldown {
                    debug!(
                        "Whistle suppressed by cooldown ({:?} of {:?} elapsed)",
                        elapsed, self.cooldown
                    );
                    return None;
                }
            }
            *last_alarm = Some(event.detected_at);
        }

        info!("Whistle detected (level={:.4}), raising alarm", event.level);
        Some(self.fire_while(config, active))
    }

    /// Fire all enabled channels now, bypassing the cooldown.
    ///
    /// Blocks for the strobe pulse when flashing is enabled.
    pub fn fire(&self, config: &AlertConfig) -> AlarmReport {
        self.fire_while(config, || true)
    }

    fn fire_while<F>(&self, config: &AlertConfig, active: F) -> AlarmReport
    where
        F: Fn() -> bool,
    {
        let sound = if active() {
            outcome("sound", self.playback.play_once(ALARM_SOUND))
        } else {
            ChannelOutcome::Skipped
        };

        let strobe_on = if config.flash_enabled && active() {
            Some(outcome("strobe", self.strobe.set_on(1.0)))
        } else {
            None
        };

        let notification = if active() {
            outcome(
                "notification",
                self.notifier
                    .publish(ALARM_NOTIFICATION_ID, ALARM_TITLE, ALARM_BODY),
            )
        } else {
            debug!("Alarm cancelled before notification");
            ChannelOutcome::Skipped
        };

        let flash = match strobe_on {
            None => ChannelOutcome::Skipped,
            Some(ChannelOutcome::Delivered) => {
                std::thread::sleep(self.flash_duration);
                // The pulse happened even if switching off fails
                outcome("strobe", self.strobe.set_off());
                ChannelOutcome::Delivered
            }
            Some(failed) => failed,
        };

        let report = AlarmReport {
            sound,
            flash,
            notification,
        };
        debug!("Alarm fired: {} channel(s) delivered", report.delivered_channels());
        report
    }

    /// Stop alarm playback and withdraw the alarm notification
    pub fn silence(&self) {
        outcome("sound", self.playback.stop_all());
        outcome("notification", self.notifier.withdraw(ALARM_NOTIFICATION_ID));
    }

    /// Loop the keep-alive sound at near-zero volume
    pub fn start_keep_alive(&self) -> bool {
        outcome(
            "keep-alive",
            self.playback.play_loop(KEEP_ALIVE_SOUND, KEEP_ALIVE_VOLUME),
        )
        .is_delivered()
    }
}

/// Absorb a channel result, logging failures
fn outcome(channel: &str, result: Result<(), AlertError>) -> ChannelOutcome {
    match result {
        Ok(()) => ChannelOutcome::Delivered,
        Err(AlertError::ResourceUnavailable(reason)) => {
            debug!("Skipping {} channel: {}", channel, reason);
            ChannelOutcome::Failed(AlertError::ResourceUnavailable(reason))
        }
        Err(e) => {
            warn!("{} channel failed: {}", channel, e);
            ChannelOutcome::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher(playback: MockPlayback, strobe: MockStrobe, notifier: MockNotifier) -> AlarmDispatcher {
        AlarmDispatcher::new(Arc::new(playback), Arc::new(strobe), Arc::new(notifier))
            .with_flash_duration(Duration::from_millis(1))
    }

    fn working_playback(times: usize) -> MockPlayback {
        let mut playback = MockPlayback::new();
        playback
            .expect_play_once()
            .withf(|sound| sound == ALARM_SOUND)
            .times(times)
            .returning(|_| Ok(()));
        playback
    }

    fn working_notifier(times: usize) -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_publish()
            .withf(|id, title, body| {
                id == ALARM_NOTIFICATION_ID && title == ALARM_TITLE && body == ALARM_BODY
            })
            .times(times)
            .returning(|_, _, _| Ok(()));
        notifier
    }

    fn working_strobe(times: usize) -> MockStrobe {
        let mut strobe = MockStrobe::new();
        strobe
            .expect_set_on()
            .withf(|intensity| *intensity == 1.0)
            .times(times).returning(|_| Ok(()));
        strobe.expect_set_off().times(times).returning(|| Ok(()));
        strobe
    }

    fn event_at(detected_at: Instant) -> WhistleEvent {
        WhistleEvent {
            detected_at,
            level: 0.2,
        }
    }

    #[test]
    fn test_fire_all_channels() {
        let dispatcher = dispatcher(working_playback(1), working_strobe(1), working_notifier(1));

        let report = dispatcher.fire(&AlertConfig { flash_enabled: true });

        assert_eq!(report.sound, ChannelOutcome::Delivered);
        assert_eq!(report.flash, ChannelOutcome::Delivered);
        assert_eq!(report.notification, ChannelOutcome::Delivered);
        assert_eq!(report.delivered_channels(), 3);
    }

    #[test]
    fn test_flash_disabled_skips_strobe() {
        let mut strobe = MockStrobe::new();
        strobe.expect_set_on().never();
        strobe.expect_set_off().never();
        let dispatcher = dispatcher(working_playback(1), strobe, working_notifier(1));

        let report = dispatcher.fire(&AlertConfig { flash_enabled: false });

        assert_eq!(report.flash, ChannelOutcome::Skipped);
        assert_eq!(report.delivered_channels(), 2);
    }

    #[test]
    fn test_missing_strobe_does_not_block_other_channels() {
        let mut strobe = MockStrobe::new();
        strobe
            .expect_set_on()
            .returning(|_| Err(AlertError::ResourceUnavailable("no torch".into())));
        strobe.expect_set_off().never();
        let dispatcher = dispatcher(working_playback(1), strobe, working_notifier(1));

        let report = dispatcher.fire(&AlertConfig::default());

        assert_eq!(report.sound, ChannelOutcome::Delivered);
        assert_eq!(report.notification, ChannelOutcome::Delivered);
        assert!(matches!(
            report.flash,
            ChannelOutcome::Failed(AlertError::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn test_every_channel_failing_is_absorbed() {
        let mut playback = MockPlayback::new();
        playback
            .expect_play_once()
            .returning(|_| Err(AlertError::ResourceUnavailable("alarm.wav missing".into())));
        let mut strobe = MockStrobe::new();
        strobe
            .expect_set_on()
            .returning(|_| Err(AlertError::Device("busy".into())));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_publish()
            .returning(|_, _, _| Err(AlertError::PermissionDenied("notifications off".into())));
        let dispatcher = dispatcher(playback, strobe, notifier);

        let report = dispatcher.fire(&AlertConfig::default());

        assert_eq!(report.delivered_channels(), 0);
    }

    #[test]
    fn test_strobe_off_failure_still_counts_pulse() {
        let mut strobe = MockStrobe::new();
        strobe.expect_set_on().returning(|_| Ok(()));
        strobe
            .expect_set_off()
            .returning(|| Err(AlertError::Device("write failed".into())));
        let dispatcher = dispatcher(working_playback(1), strobe, working_notifier(1));

        let report = dispatcher.fire(&AlertConfig::default());

        assert_eq!(report.flash, ChannelOutcome::Delivered);
    }

    #[test]
    fn test_cooldown_suppresses_repeat() {
        let dispatcher = dispatcher(working_playback(2), working_strobe(2), working_notifier(2))
            .with_cooldown(Duration::from_secs(3));
        let config = AlertConfig::default();
        let start = Instant::now();

        assert!(dispatcher.on_whistle(&event_at(start), &config).is_some());
        assert!(dispatcher
            .on_whistle(&event_at(start + Duration::from_secs(1)), &config)
            .is_none());
        assert!(dispatcher
            .on_whistle(&event_at(start + Duration::from_secs(4)), &config)
            .is_some());
    }

    #[test]
    fn test_zero_cooldown_fires_every_event() {
        let dispatcher = dispatcher(working_playback(3), working_strobe(3), working_notifier(3))
            .with_cooldown(Duration::ZERO);
        let config = AlertConfig::default();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(dispatcher.on_whistle(&event_at(now), &config).is_some());
        }
    }

    #[test]
    fn test_fire_bypasses_cooldown() {
        let dispatcher = dispatcher(working_playback(2), working_strobe(2), working_notifier(2))
            .with_cooldown(Duration::from_secs(60));
        let config = AlertConfig::default();

        dispatcher.fire(&config);
        let report = dispatcher.fire(&config);

        assert_eq!(report.delivered_channels(), 3);
    }

    #[test]
    fn test_stopped_session_skips_remaining_channels() {
        let mut strobe = MockStrobe::new();
        strobe.expect_set_on().never();
        strobe.expect_set_off().never();
        let mut notifier = MockNotifier::new();
        notifier.expect_publish().never();
        let dispatcher = dispatcher(working_playback(1), strobe, notifier);

        // Session stops right after the sound channel fired
        let checks = AtomicUsize::new(0);
        let report = dispatcher
            .on_whistle_while(&event_at(Instant::now()), &AlertConfig::default(), || {
                checks.fetch_add(1, Ordering::SeqCst) < 2
            })
            .expect("first alarm is outside the cooldown");

        assert_eq!(report.sound, ChannelOutcome::Delivered);
        assert_eq!(report.flash, ChannelOutcome::Skipped);
        assert_eq!(report.notification, ChannelOutcome::Skipped);
    }

    #[test]
    fn test_stopped_session_fires_nothing() {
        let mut playback = MockPlayback::new();
        playback.expect_play_once().never();
        let mut notifier = MockNotifier::new();
        notifier.expect_publish().never();
        let dispatcher = dispatcher(playback, MockStrobe::new(), notifier);

        let report =
            dispatcher.on_whistle_while(&event_at(Instant::now()), &AlertConfig::default(), || false);

        assert!(report.is_none());
    }

    #[test]
    fn test_silence_stops_playback_and_withdraws() {
        let mut playback = MockPlayback::new();
        playback.expect_stop_all().times(1).returning(|| Ok(()));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_withdraw()
            .withf(|id| id == ALARM_NOTIFICATION_ID)
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = dispatcher(playback, MockStrobe::new(), notifier);

        dispatcher.silence();
    }

    #[test]
    fn test_keep_alive_loops_silent_sound() {
        let mut playback = MockPlayback::new();
        playback
            .expect_play_loop()
            .withf(|sound, volume| sound == KEEP_ALIVE_SOUND && *volume == KEEP_ALIVE_VOLUME)
            .times(1)
            .returning(|_, _| Ok(()));
        let dispatcher = dispatcher(playback, MockStrobe::new(), MockNotifier::new());

        assert!(dispatcher.start_keep_alive());
    }
}
