/// Audio buffer module for assembling fixed-length analysis frames
///
/// Audio devices deliver callbacks of whatever size they like, often with
/// interleaved channels. The detector wants fixed-length mono buffers, so the
/// assembler stages samples in a ring buffer and hands out one frame at a time.
/// All storage is allocated up front; pushing samples never allocates.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::debug;

/// Audio sample format (normalized 32-bit float, -1.0..=1.0)
pub type AudioSample = f32;

/// Samples per analysed buffer (matches a 2048-frame input tap)
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Largest buffer size accepted by the configuration layer
pub const MAX_BUFFER_SIZE: usize = 65_536;

/// Ring capacity, in frames, kept ahead of the frame being assembled
const RING_FRAMES: usize = 4;

/// Turns arbitrarily sized sample chunks into fixed-length frames
pub struct FrameAssembler {
    producer: HeapProd<AudioSample>,
    consumer: HeapCons<AudioSample>,
    frame: Vec<AudioSample>,
    frames_emitted: u64,
}

impl FrameAssembler {
    /// Create an assembler producing frames of `frame_size` samples
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        let capacity = frame_size * RING_FRAMES;
        debug!(
            "Creating frame assembler: frame_size={}, capacity={} samples",
            frame_size, capacity
        );

        let rb = HeapRb::<AudioSample>::new(capacity);
        let (producer, consumer) = rb.split();

        Self {
            producer,
            consumer,
            frame: vec![0.0; frame_size],
            frames_emitted: 0,
        }
    }

    /// Push mono samples, calling `on_frame` for every completed frame.
    ///
    /// Chunks larger than the ring are handled by draining frames while
    /// pushing, so no sample is ever dropped.
    pub fn push_samples<I, F>(&mut self, samples: I, mut on_frame: F)
    where
        I: IntoIterator<Item = AudioSample>,
        F: FnMut(&[AudioSample]),
    {
        let mut pending = samples.into_iter().peekable();

        while pending.peek().is_some() {
            self.producer.push_iter(&mut pending);

            while self.consumer.occupied_len() >= self.frame.len() {
                self.consumer.pop_slice(&mut self.frame);
                self.frames_emitted += 1;
                on_frame(&self.frame);
            }
        }
    }

    /// Push interleaved samples, keeping only the first channel
    pub fn push_interleaved<F>(&mut self, data: &[AudioSample], channels: usize, on_frame: F)
    where
        F: FnMut(&[AudioSample]),
    {
        self.push_samples(data.iter().step_by(channels.max(1)).copied(), on_frame);
    }

    /// Samples per emitted frame
    pub fn frame_size(&self) -> usize {
        self.frame.len()
    }

    /// Samples waiting for the next frame to complete
    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Number of frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Discard any partially assembled frame
    pub fn clear(&mut self) {
        let occupied = self.consumer.occupied_len();
        self.consumer.skip(occupied);
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}
