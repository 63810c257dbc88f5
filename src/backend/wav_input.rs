/// WAV file replay input
///
/// Plays a WAV file into the listener as if it came from a microphone. Each
/// subscription replays the file once on its own thread, optionally paced at
/// the file's sample rate. Trailing samples that do not fill a buffer are
/// dropped, matching a capture tap that only delivers full buffers.

use crate::audio_buffer::AudioSample;
use crate::input::{AudioInput, BufferCallback, InputError, SubscriptionHandle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

struct Replay {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// WAV-backed audio input
pub struct WavFileInput {
    path: PathBuf,
    samples: Arc<Vec<AudioSample>>,
    sample_rate: u32,
    realtime: bool,
    replays: HashMap<u64, Replay>,
    next_id: u64,
}

impl WavFileInput {
    /// Decode the first channel of `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref().to_path_buf();
        let mut reader = hound::WavReader::open(&path).map_err(|e| {
            InputError::Unavailable(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let decoded: Result<Vec<f32>, hound::Error> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().step_by(channels).collect(),
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .step_by(channels)
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect()
            }
        };

        let samples = decoded.map_err(|e| {
            InputError::Unavailable(format!("Failed to decode {}: {}", path.display(), e))
        })?;

        info!(
            "Loaded {}: {} samples at {} Hz",
            path.display(),
            samples.len(),
            spec.sample_rate
        );

        Ok(Self {
            path,
            samples: Arc::new(samples),
            sample_rate: spec.sample_rate,
            realtime: false,
            replays: HashMap::new(),
            next_id: 0,
        })
    }

    /// Pace delivery at the file's sample rate instead of as fast as possible
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playing time of the file
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.max(1) as f64)
    }
}

impl AudioInput for WavFileInput {
    fn subscribe(
        &mut self,
        buffer_size: usize,
        mut callback: BufferCallback,
    ) -> Result<SubscriptionHandle, InputError> {
        let samples = Arc::clone(&self.samples);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let pace = self.realtime.then(|| {
            Duration::from_secs_f64(buffer_size as f64 / self.sample_rate.max(1) as f64)
        });

        self.next_id += 1;
        let id = self.next_id;

        let thread = std::thread::Builder::new()
            .name(format!("wav-replay-{}", id))
            .spawn(move || {
                for buffer in samples.chunks_exact(buffer_size.max(1)) {
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    callback(buffer);
                    if let Some(pace) = pace {
                        std::thread::sleep(pace);
                    }
                }
                debug!("WAV replay {} finished", id);
            })
            .map_err(|e| InputError::EngineStart(format!("Failed to spawn replay thread: {}", e)))?;

        debug!("Replaying {} as subscription {}", self.path.display(), id);
        self.replays.insert(id, Replay { stop, thread });

        Ok(SubscriptionHandle::new(id))
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), InputError> {
        let replay = self
            .replays
            .remove(&handle.id())
            .ok_or(InputError::UnknownSubscription(handle.id()))?;

        replay.stop.store(true, Ordering::Release);
        if replay.thread.join().is_err() {
            warn!("WAV replay thread panicked");
        }

        Ok(())
    }
}

impl Drop for WavFileInput {
    fn drop(&mut self) {
        for (_, replay) in self.replays.drain() {
            replay.stop.store(true, Ordering::Release);
            if replay.thread.join().is_err() {
                warn!("WAV replay thread panicked");
            }
        }
    }
}
