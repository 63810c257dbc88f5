/// Listener controller
///
/// Owns the audio subscription and the lifecycle of a detection session.
/// Buffers flow from the input callback through the level meter into the
/// session's detector; detected whistles are handed to a dispatch task over a
/// bounded channel so the capture thread never waits on alarm side effects.

use crate::alarm::{AlarmDispatcher, AlarmReport, AlertConfig};
use crate::audio_buffer::{AudioSample, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
use crate::detector::{WhistleDetector, WhistleEvent};
use crate::input::{AudioInput, BufferCallback, InputError, SubscriptionHandle};
use crate::level;
use crate::sensitivity::Sensitivity;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Detected whistles waiting for the dispatch task
pub const EVENT_QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Audio input error: {0}")]
    Input(#[from] InputError),

    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(usize),

    #[error("Alarm dispatch failed: {0}")]
    Dispatch(#[from] JoinError),
}

/// Listener lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Listening,
}

/// Counters shared between the capture callback and the controller
#[derive(Default)]
struct Counters {
    frames_processed: CachePadded<AtomicU64>,
    whistles_detected: AtomicU64,
    alarms_fired: AtomicU64,
    events_dropped: AtomicU64,
}

/// Listener statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    pub frames_processed: u64,
    pub whistles_detected: u64,
    pub alarms_fired: u64,
    pub events_dropped: u64,
    pub state: ListenerState,
}

/// One active listening session
struct Session {
    handle: SubscriptionHandle,
    active: Arc<CachePadded<AtomicBool>>,
    dispatch_task: JoinHandle<()>,
    sensitivity: Sensitivity,
}

/// Whistle listener
pub struct WhistleListener {
    input: Box<dyn AudioInput>,
    dispatcher: Arc<AlarmDispatcher>,
    buffer_size: usize,
    keep_alive: bool,
    session: Option<Session>,
    counters: Arc<Counters>,
}

impl WhistleListener {
    pub fn new(input: Box<dyn AudioInput>, dispatcher: Arc<AlarmDispatcher>) -> Self {
        Self {
            input,
            dispatcher,
            buffer_size: DEFAULT_BUFFER_SIZE,
            keep_alive: false,
            session: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Samples per analysed buffer
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Loop the keep-alive sound while listening
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Start listening.
    ///
    /// A running session is torn down first. If the input cannot be opened
    /// the listener stays stopped and the error is returned.
    pub async fn start(
        &mut self,
        sensitivity: Sensitivity,
        config: AlertConfig,
    ) -> Result<(), ListenerError> {
        if self.session.is_some() {
            warn!("Listener already running, restarting session");
            self.teardown();
            // The old session's keep-alive loop must not outlive it
            self.dispatcher.silence();
        }

        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(ListenerError::InvalidBufferSize(self.buffer_size));
        }

        if self.keep_alive {
            self.dispatcher.start_keep_alive();
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let active = Arc::new(CachePadded::new(AtomicBool::new(true)));
        let callback = buffer_callback(
            sensitivity.cutoff(),
            Arc::clone(&active),
            Arc::clone(&self.counters),
            event_tx,
        );

        let handle = match self.input.subscribe(self.buffer_size, callback) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start listening: {}", e);
                if self.keep_alive {
                    self.dispatcher.silence();
                }
                return Err(e.into());
            }
        };

        let dispatch_task = tokio::spawn(dispatch_loop(
            event_rx,
            Arc::clone(&self.dispatcher),
            config,
            Arc::clone(&active),
            Arc::clone(&self.counters),
        ));

        self.session = Some(Session {
            handle,
            active,
            dispatch_task,
            sensitivity,
        });

        info!(
            "Listening: sensitivity={}, cutoff={}, buffer_size={}, flash={}",
            sensitivity,
            sensitivity.cutoff(),
            self.buffer_size,
            config.flash_enabled
        );

        Ok(())
    }

    /// Stop listening; calling it while stopped does nothing
    pub async fn stop(&mut self) {
        if self.session.is_none() {
            debug!("Listener not running");
            return;
        }

        self.teardown();
        self.dispatcher.silence();
        info!("Stopped listening");
    }

    /// Fire the alarm directly, bypassing detection and cooldown
    pub async fn test_alert(&self, config: AlertConfig) -> Result<AlarmReport, ListenerError> {
        info!("Test alert requested");

        let dispatcher = Arc::clone(&self.dispatcher);
        let report = tokio::task::spawn_blocking(move || dispatcher.fire(&config)).await?;
        self.counters.alarms_fired.fetch_add(1, Ordering::Relaxed);

        Ok(report)
    }

    pub fn state(&self) -> ListenerState {
        if self.session.is_some() {
            ListenerState::Listening
        } else {
            ListenerState::Stopped
        }
    }

    /// Sensitivity of the running session
    pub fn sensitivity(&self) -> Option<Sensitivity> {
        self.session.as_ref().map(|session| session.sensitivity)
    }

    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            frames_processed: self.counters.frames_processed.load(Ordering::Relaxed),
            whistles_detected: self.counters.whistles_detected.load(Ordering::Relaxed),
            alarms_fired: self.counters.alarms_fired.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
            state: self.state(),
        }
    }

    /// Release the subscription and dispatch task without waiting on them
    fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        // Flip the flag first so an in-flight callback stops feeding events
        session.active.store(false, Ordering::Release);

        if let Err(e) = self.input.unsubscribe(session.handle) {
            warn!("Failed to release audio subscription: {}", e);
        }

        session.dispatch_task.abort();
        debug!("Session {} torn down", session.handle.id());
    }
}

impl Drop for WhistleListener {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Build the per-buffer callback that owns the session's detector
fn buffer_callback(
    cutoff: f32,
    active: Arc<CachePadded<AtomicBool>>,
    counters: Arc<Counters>,
    events: mpsc::Sender<WhistleEvent>,
) -> BufferCallback {
    let mut detector = WhistleDetector::new();

    Box::new(move |samples: &[AudioSample]| {
        if !active.load(Ordering::Acquire) {
            return;
        }

        counters.frames_processed.fetch_add(1, Ordering::Relaxed);

        if let Some(event) = detector.on_level(level::rms(samples), cutoff) {
            counters.whistles_detected.fetch_add(1, Ordering::Relaxed);
            if events.try_send(event).is_err() {
                counters.events_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    })
}

/// Run alarms for detected whistles, one at a time
async fn dispatch_loop(
    mut events: mpsc::Receiver<WhistleEvent>,
    dispatcher: Arc<AlarmDispatcher>,
    config: AlertConfig,
    active: Arc<CachePadded<AtomicBool>>,
    counters: Arc<Counters>,
) {
    while let Some(event) = events.recv().await {
        let dispatcher = Arc::clone(&dispatcher);
        let active = Arc::clone(&active);
        let fired = tokio::task::spawn_blocking(move || {
            dispatcher.on_whistle_while(&event, &config, || active.load(Ordering::Acquire))
        })
        .await;

        match fired {
            Ok(Some(_)) => {
                counters.alarms_fired.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {}
            Err(e) => warn!("Alarm dispatch failed: {}", e),
        }
    }

    debug!("Dispatch loop finished");
}
