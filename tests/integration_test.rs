/// Integration tests for the whistle alarm
///
/// Replays synthetic WAV recordings through the listener and checks which
/// alarms reach the alert channels.

use std::f32::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use whistle_alarm::backend::WavFileInput;
use whistle_alarm::{
    AlarmDispatcher, AlertConfig, AlertError, ListenerState, Notifier, Playback, Sensitivity,
    Strobe, WhistleListener,
};

const SAMPLE_RATE: u32 = 44_100;
const BUFFER_SIZE: usize = 1024;

/// Alert channels that only count calls
#[derive(Default)]
struct Recorder {
    sounds: AtomicUsize,
    flashes: AtomicUsize,
    notifications: AtomicUsize,
    stops: AtomicUsize,
}

impl Playback for Recorder {
    fn play_once(&self, _sound: &str) -> Result<(), AlertError> {
        self.sounds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn play_loop(&self, _sound: &str, _volume: f32) -> Result<(), AlertError> {
        Ok(())
    }

    fn stop_all(&self) -> Result<(), AlertError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Strobe for Recorder {
    fn set_on(&self, _intensity: f32) -> Result<(), AlertError> {
        self.flashes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_off(&self) -> Result<(), AlertError> {
        Ok(())
    }
}

impl Notifier for Recorder {
    fn publish(&self, _id: &str, _title: &str, _body: &str) -> Result<(), AlertError> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn withdraw(&self, _id: &str) -> Result<(), AlertError> {
        Ok(())
    }
}

/// Generate a sine tone
fn generate_tone(frequency: f32, samples: usize, amplitude: f32) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Short loud bursts separated by quiet buffers, never four loud buffers in a row
fn generate_clicks(bursts: usize) -> Vec<f32> {
    let mut samples = Vec::new();
    for _ in 0..bursts {
        samples.extend(generate_tone(2000.0, BUFFER_SIZE * 3, 0.5));
        samples.extend(vec![0.0; BUFFER_SIZE]);
    }
    samples
}

fn write_wav(path: &Path, samples: &[f32]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

fn dispatcher(recorder: &Arc<Recorder>) -> Arc<AlarmDispatcher> {
    Arc::new(
        AlarmDispatcher::new(recorder.clone(), recorder.clone(), recorder.clone())
            .with_flash_duration(Duration::from_millis(1)),
    )
}

fn listener_for(
    samples: &[f32],
    recorder: &Arc<Recorder>,
    realtime: bool,
) -> (WhistleListener, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.wav");
    write_wav(&path, samples);

    let input = WavFileInput::open(&path).unwrap().realtime(realtime);
    let listener = WhistleListener::new(Box::new(input), dispatcher(recorder))
        .with_buffer_size(BUFFER_SIZE);

    (listener, dir)
}

/// Wait until every full buffer of the recording has been analysed
async fn wait_for_frames(listener: &WhistleListener, frames: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while listener.stats().frames_processed < frames {
        assert!(Instant::now() < deadline, "replay did not finish in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_sustained_whistle_raises_one_alarm() {
    let recorder = Arc::new(Recorder::default());
    let samples = generate_tone(2000.0, BUFFER_SIZE * 40, 0.5);
    let (mut listener, _dir) = listener_for(&samples, &recorder, false);

    listener
        .start(Sensitivity::Medium, AlertConfig::default())
        .await
        .unwrap();
    assert_eq!(listener.state(), ListenerState::Listening);

    wait_for_frames(&listener, 40).await;
    settle().await;

    let stats = listener.stats();
    assert_eq!(stats.whistles_detected, 10);
    assert_eq!(stats.alarms_fired, 1, "cooldown should collapse repeated detections");
    assert_eq!(recorder.sounds.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.flashes.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.notifications.load(Ordering::SeqCst), 1);

    listener.stop().await;
    assert_eq!(listener.state(), ListenerState::Stopped);
    assert!(recorder.stops.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_silence_raises_no_alarm() {
    let recorder = Arc::new(Recorder::default());
    let samples = generate_tone(2000.0, BUFFER_SIZE * 20, 0.01);
    let (mut listener, _dir) = listener_for(&samples, &recorder, false);

    listener
        .start(Sensitivity::High, AlertConfig::default())
        .await
        .unwrap();

    wait_for_frames(&listener, 20).await;
    settle().await;

    let stats = listener.stats();
    assert_eq!(stats.whistles_detected, 0);
    assert_eq!(stats.alarms_fired, 0);
    assert_eq!(recorder.sounds.load(Ordering::SeqCst), 0);

    listener.stop().await;
}

#[tokio::test]
async fn test_intermittent_clicks_raise_no_alarm() {
    let recorder = Arc::new(Recorder::default());
    let samples = generate_clicks(8);
    let (mut listener, _dir) = listener_for(&samples, &recorder, false);

    listener
        .start(Sensitivity::High, AlertConfig::default())
        .await
        .unwrap();

    wait_for_frames(&listener, 32).await;
    settle().await;

    assert_eq!(listener.stats().whistles_detected, 0);
    assert_eq!(recorder.sounds.load(Ordering::SeqCst), 0);

    listener.stop().await;
}

#[tokio::test]
async fn test_sensitivity_changes_detection() {
    // RMS of about 0.035: above the high cutoff, below the medium one
    let samples = generate_tone(2000.0, BUFFER_SIZE * 8, 0.05);

    let recorder = Arc::new(Recorder::default());
    let (mut medium, _dir) = listener_for(&samples, &recorder, false);
    medium
        .start(Sensitivity::Medium, AlertConfig::default())
        .await
        .unwrap();
    wait_for_frames(&medium, 8).await;
    settle().await;
    assert_eq!(medium.stats().whistles_detected, 0);
    medium.stop().await;

    let recorder = Arc::new(Recorder::default());
    let (mut high, _dir) = listener_for(&samples, &recorder, false);
    high.start(Sensitivity::High, AlertConfig::default())
        .await
        .unwrap();
    wait_for_frames(&high, 8).await;
    settle().await;
    assert_eq!(high.stats().whistles_detected, 2);
    assert_eq!(recorder.sounds.load(Ordering::SeqCst), 1);
    high.stop().await;
}

#[tokio::test]
async fn test_flash_disabled_skips_strobe() {
    let recorder = Arc::new(Recorder::default());
    let samples = generate_tone(2000.0, BUFFER_SIZE * 4, 0.5);
    let (mut listener, _dir) = listener_for(&samples, &recorder, false);

    listener
        .start(Sensitivity::Medium, AlertConfig { flash_enabled: false })
        .await
        .unwrap();

    wait_for_frames(&listener, 4).await;
    settle().await;

    assert_eq!(recorder.sounds.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.flashes.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.notifications.load(Ordering::SeqCst), 1);

    listener.stop().await;
}

#[tokio::test]
async fn test_alert_while_stopped() {
    let recorder = Arc::new(Recorder::default());
    let (listener, _dir) = listener_for(&[0.0; BUFFER_SIZE], &recorder, false);

    let report = listener.test_alert(AlertConfig::default()).await.unwrap();

    assert_eq!(report.delivered_channels(), 3);
    assert_eq!(listener.state(), ListenerState::Stopped);
    assert_eq!(listener.stats().alarms_fired, 1);
}

#[tokio::test]
async fn test_detection_latency() {
    let recorder = Arc::new(Recorder::default());
    let samples = generate_tone(2000.0, BUFFER_SIZE * 16, 0.5);
    let (mut listener, _dir) = listener_for(&samples, &recorder, true);

    let start = Instant::now();
    listener
        .start(Sensitivity::Medium, AlertConfig::default())
        .await
        .unwrap();

    let deadline = start + Duration::from_secs(2);
    while recorder.sounds.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "alarm not raised in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Four buffers of 1024 samples at 44.1 kHz is under 100 ms of audio
    let latency = start.elapsed();
    println!("Detection latency: {:?}", latency);
    assert!(latency < Duration::from_millis(1000));

    listener.stop().await;
}
