//! End-to-end table checks against the reference segmentation geometry:
//! a 2341.5 ms recording whose TextGrid holds C1/V1/C2/V2 between lead-in
//! and trail-out silence. Engines are replaced by a deterministic source so
//! the tests run without tclsh or praat installed.

use std::path::{Path, PathBuf};

use voicegrid::{
    CliOverrides, Configuration, FrameGrid, Measurement, MeasurementSource, NativeSeries,
    PipelineBuilder, PipelineError, Resolver, SoundFile,
};

const REF_DURATION_MS: f64 = 2341.5;

/// Every column is a ramp carrying the canonical frame index, so any cell
/// can be predicted from its t_ms. praatF0 stops five frames early to leave
/// a NaN tail after alignment.
struct RampSource;

impl MeasurementSource for RampSource {
    fn compute(
        &mut self,
        measurement: Measurement,
        sound: &SoundFile,
        cfg: &Configuration,
    ) -> Result<Vec<NativeSeries>, PipelineError> {
        let grid = FrameGrid::build(sound.duration_ms(), cfg.frame_shift_ms);
        let native_len = match measurement {
            Measurement::PraatF0 => grid.len().saturating_sub(5),
            _ => grid.len(),
        };
        let columns = measurement.output_columns(cfg.praat.num_formants);
        let mut series = Vec::new();
        for column in columns {
            let mut s = NativeSeries::new(column, cfg.frame_shift_ms);
            for i in 0..native_len {
                s.push(grid.time_ms(i), i as f64);
            }
            series.push(s);
        }
        Ok(series)
    }
}

fn write_wav(path: &Path, duration_ms: f64) {
    let fs = 8_000u32;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: fs,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    let n = (duration_ms / 1000.0 * fs as f64).round() as usize;
    for i in 0..n {
        writer
            .write_sample(((i % 32) as i16) << 7)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

fn write_reference_textgrid(path: &Path) {
    let intervals = [
        (0.0, 0.766, ""),
        (0.766, 0.866, "C1"),
        (0.866, 1.074, "V1"),
        (1.074, 1.192, "C2"),
        (1.192, 1.35, "V2"),
        (1.35, 2.3415, ""),
    ];
    let mut body = String::from(
        "File type = \"ooTextFile\"\n\
         Object class = \"TextGrid\"\n\
         \n\
         xmin = 0\n\
         xmax = 2.3415\n\
         tiers? <exists>\n\
         size = 1\n\
         item []:\n\
         \x20   item [1]:\n\
         \x20       class = \"IntervalTier\"\n\
         \x20       name = \"phones\"\n\
         \x20       xmin = 0\n\
         \x20       xmax = 2.3415\n\
         \x20       intervals: size = 6\n",
    );
    for (i, (xmin, xmax, text)) in intervals.iter().enumerate() {
        body.push_str(&format!(
            "        intervals [{}]:\n\
             \x20           xmin = {xmin}\n\
             \x20           xmax = {xmax}\n\
             \x20           text = \"{text}\"\n",
            i + 1
        ));
    }
    std::fs::write(path, body).expect("write TextGrid");
}

/// Reference recording plus its TextGrid in a fresh directory.
fn reference_pair(dir: &Path) -> PathBuf {
    let wav = dir.join("ref.wav");
    write_wav(&wav, REF_DURATION_MS);
    write_reference_textgrid(&dir.join("ref.TextGrid"));
    wav
}

fn base_cli(wav: &Path) -> CliOverrides {
    let mut cli = CliOverrides {
        wav_files: vec![wav.to_path_buf()],
        ..Default::default()
    };
    cli.options.measurements = Some(vec!["snackF0".to_string()]);
    cli
}

fn run(cli: CliOverrides) -> String {
    let config = Resolver::with_search_paths(Vec::new(), Vec::new())
        .resolve(cli)
        .expect("resolve config");
    run_with_resolver_output(config)
}

fn run_with_resolver_output(config: Configuration) -> String {
    let mut pipeline = PipelineBuilder::new(config)
        .with_source(Box::new(RampSource))
        .build();
    let mut buf = Vec::new();
    pipeline.write_output(&mut buf).expect("pipeline run");
    String::from_utf8(buf).expect("utf8 output")
}

fn count_label(out: &str, label: &str) -> usize {
    let needle = format!("\t{label}\t");
    out.lines().filter(|l| l.contains(&needle)).count()
}

#[test]
fn labeled_run_reproduces_the_reference_row_counts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let out = run(base_cli(&wav));

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 589);
    assert_eq!(lines[0], "Filename\tLabel\tseg_Start\tseg_End\tt_ms\tsnackF0");
    assert_eq!(count_label(&out, "C1"), 101);
    assert_eq!(count_label(&out, "V1"), 209);
    assert_eq!(count_label(&out, "C2"), 119);
    assert_eq!(count_label(&out, "V2"), 159);

    // Any cell is predictable from its frame time.
    assert!(out.contains("ref.wav\tC1\t0.766\t0.866\t865.000\t865.000\n"));
    // Shared boundaries belong to both neighbors.
    let at_866 = out
        .lines()
        .filter(|l| l.contains("\t866.000\t866.000"))
        .count();
    assert_eq!(at_866, 2);
}

#[test]
fn empty_labels_extend_the_table_to_the_whole_grid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let mut cli = base_cli(&wav);
    cli.options.include_empty_labels = Some(true);
    let out = run(cli);

    assert_eq!(out.lines().count(), 2347);
    // The lead-in silence now duplicates its boundary with C1.
    let at_766 = out
        .lines()
        .filter(|l| l.contains("\t766.000\t766.000"))
        .count();
    assert_eq!(at_766, 2);
    assert!(out.contains("ref.wav\t\t0.000\t0.766\t0.000\t0.000\n"));
}

#[test]
fn no_textgrid_emits_every_frame_without_label_columns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let mut cli = base_cli(&wav);
    cli.options.use_textgrid = Some(false);
    let out = run(cli);

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2342);
    assert_eq!(lines[0], "Filename\tt_ms\tsnackF0");
    assert_eq!(lines[1], "ref.wav\t0.000\t0.000");
    assert_eq!(lines[2341], "ref.wav\t2340.000\t2340.000");
}

#[test]
fn hidden_labels_keep_the_textgrid_filtering() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let mut cli = base_cli(&wav);
    cli.options.include_labels = Some(false);
    let out = run(cli);

    let lines: Vec<&str> = out.lines().collect();
    // Same 588 labeled rows, three columns.
    assert_eq!(lines.len(), 589);
    assert_eq!(lines[0], "Filename\tt_ms\tsnackF0");
    assert_eq!(lines[1], "ref.wav\t766.000\t766.000");
}

#[test]
fn ignored_labels_drop_their_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let mut cli = base_cli(&wav);
    cli.options.ignore_labels = vec!["C2".to_string()];
    let out = run(cli);

    assert_eq!(out.lines().count(), 470);
    assert_eq!(count_label(&out, "C2"), 0);
    assert_eq!(count_label(&out, "V2"), 159);
}

#[test]
fn coarser_frame_shift_scales_every_block() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let mut cli = base_cli(&wav);
    cli.options.frame_shift_ms = Some(2.0);
    let out = run(cli);

    assert_eq!(out.lines().count(), 297);
    assert_eq!(count_label(&out, "C1"), 51);
    assert_eq!(count_label(&out, "V1"), 105);
    assert_eq!(count_label(&out, "C2"), 60);
    assert_eq!(count_label(&out, "V2"), 80);
}

#[test]
fn f0_column_is_appended_after_the_requested_measurements() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());

    let mut cli = base_cli(&wav);
    cli.options.measurements = Some(vec!["SHR".to_string()]);
    let out = run(cli);
    assert_eq!(
        out.lines().next(),
        Some("Filename\tLabel\tseg_Start\tseg_End\tt_ms\tSHR")
    );

    let mut cli = base_cli(&wav);
    cli.options.measurements = Some(vec!["SHR".to_string()]);
    cli.options.include_f0_column = Some(true);
    let out = run(cli);
    assert_eq!(
        out.lines().next(),
        Some("Filename\tLabel\tseg_Start\tseg_End\tt_ms\tSHR\tsnackF0")
    );
}

#[test]
fn short_native_series_pad_with_the_nan_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let mut cli = base_cli(&wav);
    cli.options.measurements = Some(vec!["praatF0".to_string()]);
    cli.options.include_empty_labels = Some(true);
    cli.options.nan_token = Some("--undefined--".to_string());
    let out = run(cli);

    // praatF0 has no native frames for the last five grid frames.
    let last = out.lines().last().expect("last line");
    assert!(last.starts_with("ref.wav\t\t1.350\t"));
    assert!(last.contains("\t2340.000\t"));
    assert!(last.ends_with("\t--undefined--"));
    assert_eq!(
        out.lines()
            .filter(|l| l.ends_with("\t--undefined--"))
            .count(),
        5
    );
}

#[test]
fn several_files_share_one_header_and_keep_their_own_labels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let plain = dir.path().join("plain.wav");
    write_wav(&plain, 200.0);

    let mut cli = base_cli(&wav);
    cli.wav_files.push(plain);
    let out = run(cli);

    let lines: Vec<&str> = out.lines().collect();
    // 588 labeled reference rows, then 200 unlabeled rows.
    assert_eq!(lines.len(), 789);
    assert_eq!(
        lines.iter().filter(|l| l.starts_with("Filename")).count(),
        1
    );
    assert!(lines[588].starts_with("ref.wav\tV2\t"));
    assert_eq!(lines[589], "plain.wav\t\t0.000\t0.199\t0.000\t0.000");
}

#[test]
fn discovered_settings_apply_under_explicit_and_cli_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wav = reference_pair(dir.path());
    let settings = dir.path().join("voicegrid.settings");
    std::fs::write(&settings, "frame-shift 2\nignore-label C2\n").expect("write settings");

    // Discovered settings alone: 2 ms shift without C2.
    let resolver = Resolver::with_search_paths(vec![settings], Vec::new());
    let config = resolver
        .resolve(base_cli(&wav))
        .expect("resolve with discovered settings");
    let out = run_with_resolver_output(config);
    assert_eq!(out.lines().count(), 297 - 60);
    assert_eq!(count_label(&out, "C2"), 0);

    // The command line wins the frame shift back; the ignore set is a union.
    let mut cli = base_cli(&wav);
    cli.options.frame_shift_ms = Some(1.0);
    cli.options.ignore_labels = vec!["V2".to_string()];
    let settings = dir.path().join("voicegrid.settings");
    let resolver = Resolver::with_search_paths(vec![settings], Vec::new());
    let config = resolver.resolve(cli).expect("resolve with overrides");
    let out = run_with_resolver_output(config);
    assert_eq!(out.lines().count(), 589 - 119 - 159);
    assert_eq!(count_label(&out, "C1"), 101);
}
