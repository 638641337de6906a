//! WAV loading for the measurement pipeline.
//!
//! Recordings are expected to be mono; integer sample formats are normalized
//! to [-1.0, 1.0] so the in-crate estimator sees the same scale regardless of
//! bit depth. External engines read the file themselves and only need the
//! path.

use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// One loaded recording, owned by the per-file processing step.
#[derive(Debug, Clone)]
pub struct SoundFile {
    path: PathBuf,
    samples: Vec<f64>,
    fs: f64,
}

impl SoundFile {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let reader = hound::WavReader::open(path).map_err(|e| PipelineError::wav(path, e))?;
        let spec = reader.spec();

        if spec.channels != 1 {
            return Err(PipelineError::wav_channels(path, spec.channels));
        }

        let samples: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| v as f64))
                .collect::<Result<_, _>>()
                .map_err(|e| PipelineError::wav(path, e))?,
            hound::SampleFormat::Int => {
                // max_val = 2^(bits-1), e.g. 32768 for 16-bit audio
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f64 / max_val))
                    .collect::<Result<_, _>>()
                    .map_err(|e| PipelineError::wav(path, e))?
            }
        };

        tracing::debug!(
            path = %path.display(),
            samples = samples.len(),
            sample_rate = spec.sample_rate,
            "loaded WAV"
        );

        Ok(Self {
            path: path.to_path_buf(),
            samples,
            fs: spec.sample_rate as f64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename used in the Filename output column.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Sibling segmentation file: the WAV path with a `.TextGrid` extension.
    pub fn textgrid_path(&self) -> PathBuf {
        self.path.with_extension("TextGrid")
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Sample count.
    pub fn ns(&self) -> usize {
        self.samples.len()
    }

    /// Sample rate in Hz.
    pub fn fs(&self) -> f64 {
        self.fs
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 / self.fs * 1000.0
    }
}
