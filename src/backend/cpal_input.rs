/// Microphone input through cpal
///
/// Each subscription opens its own input stream. The device callback feeds a
/// frame assembler that hands fixed-length mono buffers to the subscriber.

use crate::audio_buffer::FrameAssembler;
use crate::input::{AudioInput, BufferCallback, InputError, SubscriptionHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, SampleFormat, Stream};
use std::collections::HashMap;
use tracing::{error, info};

/// cpal-backed audio input
pub struct CpalInput {
    device_name: Option<String>,
    streams: HashMap<u64, Stream>,
    next_id: u64,
}

impl CpalInput {
    /// Use the named input device, or the host default when `None`
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            streams: HashMap::new(),
            next_id: 0,
        }
    }

    /// Names of the input devices on the default host
    pub fn device_names() -> Result<Vec<String>, InputError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| InputError::Unavailable(format!("Failed to enumerate devices: {}", e)))?;

        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn open_device(&self) -> Result<Device, InputError> {
        let host = cpal::default_host();

        match &self.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| InputError::Unavailable(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| InputError::Unavailable(format!("Device '{}' not found", name))),
            None => host
                .default_input_device()
                .ok_or_else(|| InputError::Unavailable("No default input device".to_string())),
        }
    }
}

impl AudioInput for CpalInput {
    fn subscribe(
        &mut self,
        buffer_size: usize,
        mut callback: BufferCallback,
    ) -> Result<SubscriptionHandle, InputError> {
        let device = self.open_device()?;
        let supported = device
            .default_input_config()
            .map_err(|e| InputError::EngineStart(format!("Failed to get device config: {}", e)))?;

        let channels = supported.channels() as usize;
        let sample_format = supported.sample_format();
        let config = supported.config();

        info!(
            "Using audio device: {} ({} Hz, {} ch, {:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            channels,
            sample_format
        );

        let mut assembler = FrameAssembler::new(buffer_size);

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    assembler.push_interleaved(data, channels, |frame| callback(frame));
                },
                log_stream_error,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples = data
                        .iter()
                        .step_by(channels.max(1))
                        .map(|&s| s as f32 / i16::MAX as f32);
                    assembler.push_samples(samples, |frame| callback(frame));
                },
                log_stream_error,
                None,
            ),
            other => {
                return Err(InputError::EngineStart(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| InputError::EngineStart(format!("Failed to start stream: {}", e)))?;

        self.next_id += 1;
        let id = self.next_id;
        self.streams.insert(id, stream);

        Ok(SubscriptionHandle::new(id))
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), InputError> {
        let stream = self
            .streams
            .remove(&handle.id())
            .ok_or(InputError::UnknownSubscription(handle.id()))?;

        if let Err(e) = stream.pause() {
            error!("Failed to pause input stream: {}", e);
        }

        // Dropping the stream closes it and releases the callback
        drop(stream);
        Ok(())
    }
}

fn log_stream_error(err: cpal::StreamError) {
    error!("Audio stream error: {}", err);
}

fn map_build_error(err: BuildStreamError) -> InputError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            InputError::Unavailable("Input device no longer available".to_string())
        }
        other => InputError::EngineStart(format!("Failed to open stream: {}", other)),
    }
}
