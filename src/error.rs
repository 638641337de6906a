use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {message}")]
    Config { message: String },
    #[error("{engine} engine failed while {context}: {source}")]
    EngineIo {
        engine: &'static str,
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{engine} engine error: {message}")]
    Engine {
        engine: &'static str,
        message: String,
    },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read WAV file {}: {source}", .path.display())]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("WAV file {} has {channels} channels; only mono input is supported", .path.display())]
    WavChannels { path: PathBuf, channels: u16 },
    #[error("cannot parse TextGrid {}: {message}", .path.display())]
    TextGrid { path: PathBuf, message: String },
}

impl PipelineError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn engine_io(
        engine: &'static str,
        context: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::EngineIo {
            engine,
            context: context.into(),
            source,
        }
    }

    pub(crate) fn engine(engine: &'static str, message: impl Into<String>) -> Self {
        Self::Engine {
            engine,
            message: message.into(),
        }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn wav(path: &Path, source: hound::Error) -> Self {
        Self::Wav {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn wav_channels(path: &Path, channels: u16) -> Self {
        Self::WavChannels {
            path: path.to_path_buf(),
            channels,
        }
    }

    pub(crate) fn textgrid(path: &Path, message: impl Into<String>) -> Self {
        Self::TextGrid {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Process exit status for this error: configuration problems use the
    /// conventional argument-parser code, everything else is a runtime failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            _ => 1,
        }
    }
}
