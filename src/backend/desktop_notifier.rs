/// Desktop notifications through `notify-send`
///
/// The notification id is passed as a stack tag hint, so notification
/// servers that honour it replace the previous alarm bubble instead of
/// stacking a new one.

use crate::alarm::{AlertError, Notifier};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

const NOTIFY_SEND: &str = "notify-send";

/// `notify-send` backed notifier
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    program: Option<PathBuf>,
    app_name: String,
}

impl DesktopNotifier {
    /// Locate `notify-send` on `PATH`
    pub fn new(app_name: impl Into<String>) -> Self {
        let program = which::which(NOTIFY_SEND).ok();
        if program.is_none() {
            debug!("{} not found, desktop notifications disabled", NOTIFY_SEND);
        }

        Self::with_program(program, app_name)
    }

    /// Use an explicit notifier program (or none)
    pub fn with_program(program: Option<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            program,
            app_name: app_name.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn arguments(&self, id: &str, title: &str, body: &str) -> Vec<String> {
        vec![
            format!("--app-name={}", self.app_name),
            "--urgency=critical".to_string(),
            format!("--hint=string:x-dunst-stack-tag:{}", id),
            format!("--hint=string:x-canonical-private-synchronous:{}", id),
            title.to_string(),
            body.to_string(),
        ]
    }
}

impl Notifier for DesktopNotifier {
    fn publish(&self, id: &str, title: &str, body: &str) -> Result<(), AlertError> {
        let program = self.program.as_ref().ok_or_else(|| {
            AlertError::ResourceUnavailable(format!("{} not installed", NOTIFY_SEND))
        })?;

        let status = Command::new(program)
            .args(self.arguments(id, title, body))
            .status()
            .map_err(|e| AlertError::Device(format!("Failed to run {}: {}", NOTIFY_SEND, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(AlertError::Device(format!("{} exited with {}", NOTIFY_SEND, status)))
        }
    }

    fn withdraw(&self, id: &str) -> Result<(), AlertError> {
        // notify-send cannot close a notification; the next publish replaces it
        debug!("Withdraw of notification {} left to the notification server", id);
        Ok(())
    }
}
