//! Praat pitch and formant tracking.
//!
//! Every call generates a praat script into a temp file, runs
//! `praat --run script wav out params…`, and parses the tab-separated track
//! the script wrote. Praat prints `--undefined--` for unvoiced or untracked
//! frames; those become NaN and survive alignment as-is. Native frame times
//! come from the output file, not from an assumed grid, because praat centers
//! its frames inside the analyzable part of the signal.

use std::io::Write;
use std::process::Command;

use crate::config::{Configuration, PraatConfig};
use crate::error::PipelineError;
use crate::measure::{Measurement, NativeSeries};
use crate::sound::SoundFile;

const ENGINE: &str = "praat";
const UNDEFINED: &str = "--undefined--";

pub fn pitch(sound: &SoundFile, cfg: &Configuration) -> Result<NativeSeries, PipelineError> {
    let script = pitch_script(&cfg.praat);
    let args = [
        format!("{}", cfg.frame_shift_ms / 1000.0),
        format!("{}", cfg.min_f0),
        format!("{}", cfg.max_f0),
    ];
    let contents = run_script(&cfg.praat, &script, sound, &args)?;
    let rows = parse_track(&contents).map_err(|msg| PipelineError::engine(ENGINE, msg))?;
    let mut series = series_from_rows(rows, vec!["praatF0".to_string()], cfg.frame_shift_ms)?;
    match series.pop() {
        Some(series) => Ok(series),
        None => Err(PipelineError::engine(ENGINE, "empty pitch track")),
    }
}

pub fn formants(
    sound: &SoundFile,
    cfg: &Configuration,
) -> Result<Vec<NativeSeries>, PipelineError> {
    let script = formant_script();
    let args = [
        format!("{}", cfg.frame_shift_ms / 1000.0),
        format!("{}", cfg.praat.formant_window_ms / 1000.0),
        format!("{}", cfg.praat.num_formants),
        format!("{}", cfg.praat.max_formant_hz),
    ];
    let contents = run_script(&cfg.praat, &script, sound, &args)?;
    let rows = parse_track(&contents).map_err(|msg| PipelineError::engine(ENGINE, msg))?;
    let columns = Measurement::PraatFormants.output_columns(cfg.praat.num_formants);
    series_from_rows(rows, columns, cfg.frame_shift_ms)
}

/// Pitch script. Time step and pitch bounds arrive as arguments; the
/// path-finder thresholds and any post-processing steps are baked in at
/// generation time.
fn pitch_script(praat: &PraatConfig) -> String {
    let mut script = format!(
        concat!(
            "form Pitch track\n",
            "    sentence Wav_file\n",
            "    sentence Out_file\n",
            "    real Time_step 0.001\n",
            "    real Min_pitch 40\n",
            "    real Max_pitch 500\n",
            "endform\n",
            "Read from file: wav_file$\n",
            "pitch = To Pitch ({method}): time_step, min_pitch, 15, \"no\", ",
            "{silence}, {voice}, {octave}, {jump}, {vuv}, max_pitch\n"
        ),
        method = praat.method.as_str(),
        silence = praat.silence_threshold,
        voice = praat.voice_threshold,
        octave = praat.octave_cost,
        jump = praat.octave_jumpcost,
        vuv = praat.voiced_unvoiced_cost,
    );
    if praat.kill_octave_jumps {
        script.push_str("pitch = Kill octave jumps\n");
    }
    if praat.smooth {
        script.push_str(&format!("pitch = Smooth: {}\n", praat.smooth_bandwidth));
    }
    if praat.interpolate {
        script.push_str("pitch = Interpolate\n");
    }
    script.push_str(concat!(
        "frames = Get number of frames\n",
        "writeFile: out_file$, \"\"\n",
        "for f from 1 to frames\n",
        "    t = Get time from frame number: f\n",
        "    v = Get value in frame: f, \"Hertz\"\n",
        "    if v = undefined\n",
        "        appendFileLine: out_file$, fixed$(t, 6), tab$, \"--undefined--\"\n",
        "    else\n",
        "        appendFileLine: out_file$, fixed$(t, 6), tab$, fixed$(v, 6)\n",
        "    endif\n",
        "endfor\n"
    ));
    script
}

/// Formant script: Burg analysis, then one line per frame holding the
/// frequency of each formant followed by the bandwidth of each formant.
fn formant_script() -> String {
    concat!(
        "form Formant track\n",
        "    sentence Wav_file\n",
        "    sentence Out_file\n",
        "    real Time_step 0.001\n",
        "    real Window_length 0.025\n",
        "    positive Num_formants 4\n",
        "    real Max_formant 6000\n",
        "endform\n",
        "Read from file: wav_file$\n",
        "To Formant (burg): time_step, num_formants, max_formant, window_length, 50\n",
        "frames = Get number of frames\n",
        "writeFile: out_file$, \"\"\n",
        "for f from 1 to frames\n",
        "    t = Get time from frame number: f\n",
        "    line$ = fixed$(t, 6)\n",
        "    for i from 1 to num_formants\n",
        "        v = Get value at time: i, t, \"hertz\", \"Linear\"\n",
        "        if v = undefined\n",
        "            line$ = line$ + tab$ + \"--undefined--\"\n",
        "        else\n",
        "            line$ = line$ + tab$ + fixed$(v, 6)\n",
        "        endif\n",
        "    endfor\n",
        "    for i from 1 to num_formants\n",
        "        b = Get bandwidth at time: i, t, \"hertz\", \"Linear\"\n",
        "        if b = undefined\n",
        "            line$ = line$ + tab$ + \"--undefined--\"\n",
        "        else\n",
        "            line$ = line$ + tab$ + fixed$(b, 6)\n",
        "        endif\n",
        "    endfor\n",
        "    appendFileLine: out_file$, line$\n",
        "endfor\n"
    )
    .to_string()
}

/// Writes the script, runs praat on it, and returns the produced track file.
fn run_script(
    praat: &PraatConfig,
    script_text: &str,
    sound: &SoundFile,
    args: &[String],
) -> Result<String, PipelineError> {
    let mut script = tempfile::Builder::new()
        .prefix("voicegrid-")
        .suffix(".praat")
        .tempfile()
        .map_err(|e| PipelineError::engine_io(ENGINE, "creating script file", e))?;
    script
        .write_all(script_text.as_bytes())
        .map_err(|e| PipelineError::engine_io(ENGINE, "writing script file", e))?;

    let out = tempfile::Builder::new()
        .prefix("voicegrid-")
        .suffix(".track")
        .tempfile()
        .map_err(|e| PipelineError::engine_io(ENGINE, "creating track file", e))?;

    let output = Command::new(&praat.path)
        .arg("--run")
        .arg(script.path())
        .arg(sound.path())
        .arg(out.path())
        .args(args)
        .output()
        .map_err(|e| {
            PipelineError::engine_io(ENGINE, format!("running '{}'", praat.path.display()), e)
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::engine(
            ENGINE,
            format!("praat exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    std::fs::read_to_string(out.path())
        .map_err(|e| PipelineError::engine_io(ENGINE, "reading track file", e))
}

/// Parses `time<TAB>value…` lines. `--undefined--` cells become NaN.
fn parse_track(contents: &str) -> Result<Vec<(f64, Vec<f64>)>, String> {
    let mut rows = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let time: f64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| format!("line {lineno}: missing frame time"))?;
        let values = fields
            .map(|field| parse_cell(field, lineno))
            .collect::<Result<Vec<f64>, String>>()?;
        rows.push((time, values));
    }
    Ok(rows)
}

fn parse_cell(field: &str, lineno: usize) -> Result<f64, String> {
    if field == UNDEFINED {
        return Ok(f64::NAN);
    }
    field
        .parse()
        .map_err(|_| format!("line {lineno}: unparseable value '{field}'"))
}

/// Splits row-major track data into one series per column. Frame times are
/// praat seconds and convert to milliseconds here.
fn series_from_rows(
    rows: Vec<(f64, Vec<f64>)>,
    columns: Vec<String>,
    frame_shift_ms: f64,
) -> Result<Vec<NativeSeries>, PipelineError> {
    let mut series: Vec<NativeSeries> = columns
        .into_iter()
        .map(|name| NativeSeries::new(name, frame_shift_ms))
        .collect();
    for (time_s, values) in rows {
        if values.len() != series.len() {
            return Err(PipelineError::engine(
                ENGINE,
                format!(
                    "expected {} values per frame, got {}",
                    series.len(),
                    values.len()
                ),
            ));
        }
        let t_ms = time_s * 1000.0;
        for (slot, value) in series.iter_mut().zip(values) {
            slot.push(t_ms, value);
        }
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_praat() -> PraatConfig {
        PraatConfig {
            path: "/usr/bin/praat".into(),
            method: crate::config::PraatMethod::Cc,
            frame_precision: 1.0,
            silence_threshold: 0.03,
            voice_threshold: 0.45,
            octave_cost: 0.01,
            octave_jumpcost: 0.35,
            voiced_unvoiced_cost: 0.14,
            kill_octave_jumps: false,
            interpolate: false,
            smooth: false,
            smooth_bandwidth: 5.0,
            formant_window_ms: 25.0,
            num_formants: 4,
            max_formant_hz: 6000.0,
        }
    }

    #[test]
    fn pitch_script_uses_path_finder_parameters() {
        let script = pitch_script(&reference_praat());
        assert!(script.contains("To Pitch (cc): time_step, min_pitch, 15, \"no\", 0.03, 0.45, 0.01, 0.35, 0.14, max_pitch"));
        assert!(!script.contains("Kill octave jumps"));
        assert!(!script.contains("Smooth:"));
        assert!(!script.contains("Interpolate"));
    }

    #[test]
    fn pitch_post_steps_appear_when_enabled() {
        let mut praat = reference_praat();
        praat.method = crate::config::PraatMethod::Ac;
        praat.kill_octave_jumps = true;
        praat.smooth = true;
        praat.interpolate = true;
        let script = pitch_script(&praat);
        assert!(script.contains("To Pitch (ac):"));
        assert!(script.contains("Kill octave jumps"));
        assert!(script.contains("Smooth: 5"));
        assert!(script.contains("Interpolate"));
    }

    #[test]
    fn formant_script_runs_burg_and_reports_bandwidths() {
        let script = formant_script();
        assert!(script.contains("To Formant (burg):"));
        assert!(script.contains("Get bandwidth at time:"));
    }

    #[test]
    fn track_parsing_maps_undefined_to_nan() {
        let rows = parse_track("0.025000\t--undefined--\n0.026000\t222.251000\n").expect("parse");
        assert_eq!(rows.len(), 2);
        assert!((rows[0].0 - 0.025).abs() < 1e-9);
        assert!(rows[0].1[0].is_nan());
        assert!((rows[1].1[0] - 222.251).abs() < 1e-9);
    }

    #[test]
    fn malformed_track_lines_are_rejected() {
        assert!(parse_track("not-a-time\t1.0\n").is_err());
        assert!(parse_track("0.5\tbogus\n").is_err());
    }

    #[test]
    fn rows_split_into_per_column_series_in_ms() {
        let rows = vec![
            (0.025, vec![500.0, 1500.0, 60.0, 90.0]),
            (0.026, vec![f64::NAN, 1510.0, 61.0, 91.0]),
        ];
        let columns = vec![
            "pF1".to_string(),
            "pF2".to_string(),
            "pB1".to_string(),
            "pB2".to_string(),
        ];
        let series = series_from_rows(rows, columns, 1.0).expect("split");
        assert_eq!(series.len(), 4);
        assert_eq!(series[0].column, "pF1");
        assert_eq!(series[3].column, "pB2");
        assert!((series[0].times_ms[0] - 25.0).abs() < 1e-9);
        assert!(series[0].values[1].is_nan());
        assert_eq!(series[1].values, vec![1500.0, 1510.0]);
    }

    #[test]
    fn ragged_rows_are_an_engine_error() {
        let rows = vec![(0.025, vec![1.0])];
        let err = series_from_rows(rows, vec!["a".to_string(), "b".to_string()], 1.0)
            .expect_err("ragged row");
        assert!(matches!(err, PipelineError::Engine { .. }));
    }
}
