//! Stereo audio capture
//!
//! Provides device selection and the live capture stream using CPAL
//! (Cross-Platform Audio Library). The input callback owns the estimator:
//! each captured block is deinterleaved into reusable channel buffers,
//! processed under the latest mode from the control path, and published
//! through the shared snapshot cell.

use crate::estimator::{Estimator, Mode, SnapshotCell, StereoBuffer};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BufferSize, Device, SampleFormat, StreamConfig};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Capture error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No default input device found")]
    NoDefaultDevice,
    #[error("Input device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Device '{0}' has no float32 input configuration")]
    NoFloatInput(String),
    #[error("Failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("Failed to query device configurations: {0}")]
    Configs(#[from] cpal::SupportedStreamConfigsError),
    #[error("Failed to read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),
    #[error("Failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
}

/// Information about an available audio input device
#[derive(Debug)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub max_channels: u16,
    pub supported_sample_rates: Vec<u32>,
}

/// Selected input device with a stereo-preferring stream configuration
pub struct StereoCapture {
    device: Device,
    device_name: String,
    config: StreamConfig,
}

impl StereoCapture {
    /// Open an input device, preferring a 2-channel float32 configuration
    ///
    /// Falls back to mono when the device has no stereo config; the capture
    /// callback then mirrors the single channel into both estimator inputs.
    pub fn new(preferred_device: Option<&str>, buffer_frames: u32) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = match preferred_device {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
            None => host
                .default_input_device()
                .ok_or(CaptureError::NoDefaultDevice)?,
        };
        let device_name = device.name()?;

        let mut config = Self::pick_config(&device, &device_name)?;
        config.buffer_size = BufferSize::Fixed(buffer_frames);

        Ok(Self {
            device,
            device_name,
            config,
        })
    }

    /// Choose the best float32 input config: stereo over mono, and the
    /// smallest channel count that still carries a left/right pair
    fn pick_config(device: &Device, name: &str) -> Result<StreamConfig, CaptureError> {
        let mut best: Option<cpal::SupportedStreamConfigRange> = None;

        for range in device.supported_input_configs()? {
            if range.sample_format() != SampleFormat::F32 {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    let have_stereo = current.channels() >= 2;
                    let is_stereo = range.channels() >= 2;
                    if have_stereo != is_stereo {
                        is_stereo
                    } else {
                        range.channels() < current.channels() && is_stereo
                    }
                }
            };
            if better {
                best = Some(range);
            }
        }

        let range = best.ok_or_else(|| CaptureError::NoFloatInput(name.to_string()))?;
        Ok(range.with_max_sample_rate().config())
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Build the capture stream around an estimator
    ///
    /// The caller plays and pauses the returned stream as the mode lifecycle
    /// asks for capture. Mode changes arrive through the watch channel and
    /// are picked up at the next buffer.
    pub fn start(
        &self,
        mut estimator: Estimator,
        mode_rx: watch::Receiver<Mode>,
        cell: Arc<SnapshotCell>,
    ) -> Result<cpal::Stream, CaptureError> {
        let channels = self.config.channels as usize;
        let mut left: Vec<f32> = Vec::new();
        let mut right: Vec<f32> = Vec::new();

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mode = *mode_rx.borrow();
                if mode != estimator.mode() {
                    // Capture start/stop is the driver's job; the estimator
                    // applies its own calibration reset here
                    let _ = estimator.set_mode(mode);
                }

                // Reused buffers: no allocation once capacity has settled
                left.clear();
                right.clear();
                if channels == 1 {
                    left.extend_from_slice(data);
                    right.extend_from_slice(data);
                } else {
                    for frame in data.chunks_exact(channels) {
                        left.push(frame[0]);
                        right.push(frame[1]);
                    }
                }

                estimator.process_buffer(&StereoBuffer::new(&left, &right), mode);
                cell.store(estimator.snapshot());
            },
            |err| {
                eprintln!("Audio stream error: {}", err);
            },
            None,
        )?;

        Ok(stream)
    }
}

/// List all available audio input devices
pub fn list_devices() -> Result<Vec<AudioDeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let devices = host.input_devices()?;
    let default_device = host.default_input_device();

    let mut device_infos = Vec::new();

    for device in devices {
        let name = device.name().unwrap_or("Unknown Device".to_string());
        let is_default = default_device
            .as_ref()
            .map(|d| d.name().unwrap_or_default() == name)
            .unwrap_or(false);

        let mut max_channels = 0;
        let mut supported_sample_rates = Vec::new();
        for range in device.supported_input_configs()? {
            max_channels = max_channels.max(range.channels());
            supported_sample_rates.push(range.max_sample_rate().0);
        }
        supported_sample_rates.sort_unstable();
        supported_sample_rates.dedup();

        device_infos.push(AudioDeviceInfo {
            name,
            is_default,
            max_channels,
            supported_sample_rates,
        });
    }

    Ok(device_infos)
}
