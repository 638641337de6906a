pub mod align;
pub mod config;
pub mod engines;
pub mod error;
pub mod grid;
pub mod labels;
pub mod measure;
pub mod output;
pub mod pipeline;
pub mod sound;

pub use config::{CliOverrides, Configuration, OptionSet, Resolver};
pub use engines::{EngineSource, MeasurementSource};
pub use error::PipelineError;
pub use grid::FrameGrid;
pub use measure::{Measurement, NativeSeries};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use sound::SoundFile;
