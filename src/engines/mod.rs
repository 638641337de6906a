//! Measurement engines.
//!
//! Each measurement is produced by an adapter around an external program
//! (snack via a tclsh session, praat via one-shot script runs) or by the
//! in-crate subharmonic estimator. The pipeline talks to all of them through
//! [`MeasurementSource`], so tests can substitute a deterministic source.

use std::path::PathBuf;

use crate::config::Configuration;
use crate::error::PipelineError;
use crate::measure::{Measurement, NativeSeries};
use crate::sound::SoundFile;

pub mod praat;
pub mod shr;
pub mod snack;

use snack::SnackSession;

/// Produces native-timebase series for one measurement of one recording.
///
/// A measurement may expand to several series: formants return one per
/// frequency and bandwidth column.
pub trait MeasurementSource: Send {
    fn compute(
        &mut self,
        measurement: Measurement,
        sound: &SoundFile,
        cfg: &Configuration,
    ) -> Result<Vec<NativeSeries>, PipelineError>;
}

/// The real engine set. The tclsh session starts lazily on first snack use
/// and is reused across files; the SHR analysis is cached so `shrF0` and
/// `SHR` of the same recording share one computation.
#[derive(Default)]
pub struct EngineSource {
    snack: Option<SnackSession>,
    shr_cache: Option<CachedShr>,
}

struct CachedShr {
    path: PathBuf,
    output: shr::ShrOutput,
}

impl EngineSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn snack_session(&mut self, cfg: &Configuration) -> Result<&mut SnackSession, PipelineError> {
        match &mut self.snack {
            Some(session) => Ok(session),
            slot @ None => {
                let session = SnackSession::spawn(&cfg.snack)?;
                Ok(slot.insert(session))
            }
        }
    }

    fn shr_output(
        &mut self,
        sound: &SoundFile,
        cfg: &Configuration,
    ) -> Result<&shr::ShrOutput, PipelineError> {
        let stale = match &self.shr_cache {
            Some(cached) => cached.path != sound.path(),
            None => true,
        };
        if stale {
            let params = shr::ShrParams {
                fs: sound.fs(),
                frame_shift_ms: cfg.frame_shift_ms,
                window_size_ms: cfg.window_size_ms,
                min_f0: cfg.min_f0,
                max_f0: cfg.max_f0,
            };
            let output = shr::compute(sound.samples(), &params);
            self.shr_cache = Some(CachedShr {
                path: sound.path().to_path_buf(),
                output,
            });
        }
        // The cache was just filled on the stale path.
        match &self.shr_cache {
            Some(cached) => Ok(&cached.output),
            None => Err(PipelineError::engine("shr", "analysis cache is empty")),
        }
    }
}

impl MeasurementSource for EngineSource {
    fn compute(
        &mut self,
        measurement: Measurement,
        sound: &SoundFile,
        cfg: &Configuration,
    ) -> Result<Vec<NativeSeries>, PipelineError> {
        match measurement {
            Measurement::SnackF0 => {
                let series = self.snack_session(cfg)?.pitch(sound, cfg)?;
                Ok(vec![series])
            }
            Measurement::PraatF0 => Ok(vec![praat::pitch(sound, cfg)?]),
            Measurement::PraatFormants => praat::formants(sound, cfg),
            Measurement::ShrF0 => {
                let shift = cfg.frame_shift_ms;
                let output = self.shr_output(sound, cfg)?;
                let mut series = NativeSeries::new("shrF0", shift);
                series.times_ms = output.times_ms.clone();
                series.values = output.f0.clone();
                Ok(vec![series])
            }
            Measurement::Shr => {
                let shift = cfg.frame_shift_ms;
                let output = self.shr_output(sound, cfg)?;
                let mut series = NativeSeries::new("SHR", shift);
                series.times_ms = output.times_ms.clone();
                series.values = output.shr.clone();
                Ok(vec![series])
            }
        }
    }
}
