//! WAV input for offline analysis
//!
//! Reads a stereo (or mono, mirrored) WAV file into split channel buffers so
//! the `analyze` subcommand can drive the estimator without a live device.

use crate::estimator::StereoBuffer;
use std::path::Path;
use thiserror::Error;

/// WAV decoding error types
#[derive(Error, Debug)]
pub enum WavError {
    #[error("Failed to read WAV data: {0}")]
    Decode(#[from] hound::Error),
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBits(u16),
    #[error("File has no audio channels")]
    NoChannels,
}

/// Split channel data from a WAV file, normalized to [-1, 1]
pub struct WavChannels {
    left: Vec<f32>,
    right: Vec<f32>,
    sample_rate: u32,
}

impl WavChannels {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Fixed-size stereo chunks over the file; the final chunk may be short
    pub fn chunks(&self, frames: usize) -> impl Iterator<Item = StereoBuffer<'_>> {
        self.left
            .chunks(frames)
            .zip(self.right.chunks(frames))
            .map(|(left, right)| StereoBuffer::new(left, right))
    }
}

/// Read a WAV file into split channel buffers
///
/// Supports 16/24/32-bit integer and 32-bit float samples. Mono files are
/// mirrored into both channels; files with more than two channels contribute
/// their first two.
pub fn read_wav_channels<P: AsRef<Path>>(path: P) -> Result<WavChannels, WavError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(WavError::NoChannels);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = match spec.bits_per_sample {
                16 => 32_768.0,
                24 => 8_388_608.0,
                32 => 2_147_483_648.0,
                other => return Err(WavError::UnsupportedBits(other)),
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let frames = interleaved.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(if channels > 1 { frame[1] } else { frame[0] });
    }

    Ok(WavChannels {
        left,
        right,
        sample_rate: spec.sample_rate,
    })
}
