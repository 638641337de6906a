//! The per-run measurement pipeline.
//!
//! One pipeline processes every input file of a resolved configuration and
//! streams one shared table to the output destination. Per file: load the
//! WAV, build the canonical grid, compute and align every requested
//! measurement, plan the row blocks from the segmentation, and emit rows.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::align::align;
use crate::config::Configuration;
use crate::engines::{EngineSource, MeasurementSource};
use crate::error::PipelineError;
use crate::grid::FrameGrid;
use crate::labels::{load_intervals, plan_labeled_blocks, whole_grid_block, RowBlock};
use crate::measure::Measurement;
use crate::output::{OutputRow, TableWriter};
use crate::sound::SoundFile;

pub struct PipelineBuilder {
    config: Configuration,
    source: Option<Box<dyn MeasurementSource>>,
}

impl PipelineBuilder {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            source: None,
        }
    }

    /// Replaces the real engines, used by tests to run without tclsh or
    /// praat installed.
    pub fn with_source(mut self, source: Box<dyn MeasurementSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> Pipeline {
        let source = self
            .source
            .unwrap_or_else(|| Box::new(EngineSource::new()));
        Pipeline {
            config: self.config,
            source,
        }
    }
}

pub struct Pipeline {
    config: Configuration,
    source: Box<dyn MeasurementSource>,
}

impl Pipeline {
    /// Runs the whole table to the configured destination.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        match self.config.output.clone() {
            Some(path) => {
                let mut file = File::create(&path)
                    .map_err(|e| PipelineError::io("creating output file", e))?;
                self.write_output(&mut file)
            }
            None => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                self.write_output(&mut lock)
            }
        }
    }

    /// Runs the whole table into `out`. The header is written once even
    /// across multiple input files.
    pub fn write_output(&mut self, out: &mut dyn Write) -> Result<(), PipelineError> {
        let columns = self.config.output_columns();
        let mut writer = TableWriter::new(out, &self.config);
        writer.write_header(&columns)?;

        let progress = ProgressBar::new(self.config.wav_files.len() as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );

        for wav in self.config.wav_files.clone() {
            progress.set_message(wav.display().to_string());
            self.process_file(&wav, &mut writer)?;
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(())
    }

    fn process_file(
        &mut self,
        wav: &Path,
        writer: &mut TableWriter<'_>,
    ) -> Result<(), PipelineError> {
        let sound = SoundFile::open(wav)?;
        let grid = FrameGrid::build(sound.duration_ms(), self.config.frame_shift_ms);
        let filename = sound.basename();

        let mut columns: Vec<Vec<f64>> = Vec::new();
        for &measurement in &self.config.measurements {
            // Praat reports its own frame centers; the configured precision
            // widens the alignment tolerance for them.
            let precision = match measurement {
                Measurement::PraatF0 | Measurement::PraatFormants => {
                    self.config.praat.frame_precision
                }
                _ => 1.0,
            };
            for series in self.source.compute(measurement, &sound, &self.config)? {
                columns.push(align(&grid, &series, precision));
            }
        }

        let blocks = self.plan_blocks(&sound, &grid)?;
        let mut rows = 0usize;
        for block in &blocks {
            for frame in block.first_frame..=block.last_frame {
                let values: Vec<f64> = columns.iter().map(|c| c[frame]).collect();
                writer.write_row(&OutputRow {
                    filename: &filename,
                    label: &block.label,
                    seg_start_ms: block.seg_start_ms,
                    seg_end_ms: block.seg_end_ms,
                    t_ms: grid.time_ms(frame),
                    values: &values,
                })?;
                rows += 1;
            }
        }
        tracing::debug!(
            file = %filename,
            frames = grid.len(),
            blocks = blocks.len(),
            rows,
            "file done"
        );
        Ok(())
    }

    /// The row blocks for one file: tier intervals when a TextGrid applies,
    /// otherwise one unlabeled block spanning the grid. A missing TextGrid
    /// is not an error; the file is processed without labels.
    fn plan_blocks(
        &self,
        sound: &SoundFile,
        grid: &FrameGrid,
    ) -> Result<Vec<RowBlock>, PipelineError> {
        if !self.config.use_textgrid {
            return Ok(whole_grid_block(grid));
        }
        let textgrid = sound.textgrid_path();
        if !textgrid.is_file() {
            tracing::warn!(
                path = %textgrid.display(),
                "no TextGrid found, emitting unlabeled rows"
            );
            return Ok(whole_grid_block(grid));
        }
        let intervals = load_intervals(&textgrid, self.config.tier.as_deref())?;
        Ok(plan_labeled_blocks(
            grid,
            &intervals,
            self.config.include_empty_labels,
            &self.config.ignore_labels,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliOverrides, Resolver};
    use crate::measure::NativeSeries;
    use std::path::PathBuf;

    /// Deterministic source: every series holds the frame index on the
    /// canonical timebase, plus a per-measurement offset.
    struct MockSource;

    impl MeasurementSource for MockSource {
        fn compute(
            &mut self,
            measurement: Measurement,
            sound: &SoundFile,
            cfg: &Configuration,
        ) -> Result<Vec<NativeSeries>, PipelineError> {
            let grid = FrameGrid::build(sound.duration_ms(), cfg.frame_shift_ms);
            let offset = match measurement {
                Measurement::SnackF0 => 0.0,
                Measurement::PraatF0 => 1000.0,
                Measurement::ShrF0 => 2000.0,
                Measurement::Shr => 3000.0,
                Measurement::PraatFormants => 4000.0,
            };
            let columns = measurement.output_columns(cfg.praat.num_formants);
            let mut series = Vec::new();
            for (c, column) in columns.into_iter().enumerate() {
                let mut s = NativeSeries::new(column, cfg.frame_shift_ms);
                for i in 0..grid.len() {
                    s.push(grid.time_ms(i), offset + c as f64 * 100.0 + i as f64);
                }
                series.push(s);
            }
            Ok(series)
        }
    }

    fn write_wav(path: &Path, fs: u32, n: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: fs,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for i in 0..n {
            writer
                .write_sample(((i % 64) as i16) << 6)
                .expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    fn resolve(cli: CliOverrides) -> Configuration {
        Resolver::with_search_paths(Vec::new(), Vec::new())
            .resolve(cli)
            .expect("resolve config")
    }

    fn run_to_string(cfg: Configuration) -> String {
        let mut pipeline = PipelineBuilder::new(cfg)
            .with_source(Box::new(MockSource))
            .build();
        let mut buf = Vec::new();
        pipeline.write_output(&mut buf).expect("pipeline run");
        String::from_utf8(buf).expect("utf8 output")
    }

    #[test]
    fn unlabeled_run_emits_one_row_per_grid_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wav = dir.path().join("tone.wav");
        // 1000 samples at 8 kHz = 125 ms = 125 one-ms frames.
        write_wav(&wav, 8_000, 1_000);

        let mut cli = CliOverrides {
            wav_files: vec![wav],
            ..Default::default()
        };
        cli.options.measurements = Some(vec!["snackF0".to_string()]);
        cli.options.use_textgrid = Some(false);
        let out = run_to_string(resolve(cli));

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 126);
        assert_eq!(lines[0], "Filename\tt_ms\tsnackF0");
        assert_eq!(lines[1], "tone.wav\t0.000\t0.000");
        assert_eq!(lines[125], "tone.wav\t124.000\t124.000");
    }

    #[test]
    fn multiple_files_share_one_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, 8_000, 800);
        write_wav(&b, 8_000, 400);

        let mut cli = CliOverrides {
            wav_files: vec![a, b],
            ..Default::default()
        };
        cli.options.measurements = Some(vec!["snackF0".to_string()]);
        cli.options.use_textgrid = Some(false);
        let out = run_to_string(resolve(cli));

        let lines: Vec<&str> = out.lines().collect();
        // 100 + 50 data rows after a single header.
        assert_eq!(lines.len(), 151);
        assert_eq!(lines.iter().filter(|l| l.starts_with("Filename")).count(), 1);
        assert!(lines[1].starts_with("a.wav\t"));
        assert!(lines[150].starts_with("b.wav\t"));
    }

    #[test]
    fn formant_columns_expand_between_scalar_measurements() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wav = dir.path().join("tone.wav");
        write_wav(&wav, 8_000, 80);

        let mut cli = CliOverrides {
            wav_files: vec![wav],
            ..Default::default()
        };
        cli.options.measurements = Some(vec![
            "snackF0".to_string(),
            "praatFormants".to_string(),
            "SHR".to_string(),
        ]);
        cli.options.use_textgrid = Some(false);
        let out = run_to_string(resolve(cli));

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            "Filename\tt_ms\tsnackF0\tpF1\tpF2\tpF3\tpF4\tpB1\tpB2\tpB3\tpB4\tSHR"
        );
        // Frame 2: snack 2, formant columns 4000..4702, SHR 3002.
        assert_eq!(
            lines[3],
            "tone.wav\t2.000\t2.000\t4002.000\t4102.000\t4202.000\t4302.000\
             \t4402.000\t4502.000\t4602.000\t4702.000\t3002.000"
        );
    }

    #[test]
    fn missing_textgrid_keeps_the_labeled_layout_with_empty_labels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wav = dir.path().join("tone.wav");
        write_wav(&wav, 8_000, 160);

        let mut cli = CliOverrides {
            wav_files: vec![wav],
            ..Default::default()
        };
        cli.options.measurements = Some(vec!["snackF0".to_string()]);
        let out = run_to_string(resolve(cli));

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            "Filename\tLabel\tseg_Start\tseg_End\tt_ms\tsnackF0"
        );
        // 20 one-ms frames; the unlabeled block spans the grid.
        assert_eq!(lines.len(), 21);
        assert_eq!(lines[1], "tone.wav\t\t0.000\t0.019\t0.000\t0.000");
    }

    #[test]
    fn output_file_destination_is_honored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wav = dir.path().join("tone.wav");
        let out_path = dir.path().join("table.tsv");
        write_wav(&wav, 8_000, 160);

        let mut cli = CliOverrides {
            wav_files: vec![wav],
            ..Default::default()
        };
        cli.options.measurements = Some(vec!["snackF0".to_string()]);
        cli.options.output = Some(out_path.clone());
        let mut pipeline = PipelineBuilder::new(resolve(cli))
            .with_source(Box::new(MockSource))
            .build();
        pipeline.run().expect("pipeline run");

        let written = std::fs::read_to_string(&out_path).expect("read output");
        assert_eq!(written.lines().count(), 21);
    }

    #[test]
    fn missing_wav_file_aborts_with_a_wav_error() {
        let mut cli = CliOverrides {
            wav_files: vec![PathBuf::from("/nonexistent/missing.wav")],
            ..Default::default()
        };
        cli.options.measurements = Some(vec!["snackF0".to_string()]);
        let mut pipeline = PipelineBuilder::new(resolve(cli))
            .with_source(Box::new(MockSource))
            .build();
        let mut buf = Vec::new();
        let err = pipeline.write_output(&mut buf).expect_err("must fail");
        assert!(matches!(err, PipelineError::Wav { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
