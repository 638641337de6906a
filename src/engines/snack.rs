//! Snack pitch tracking through a tclsh subprocess.
//!
//! One tclsh session is spawned on first use and reused for every file in
//! the run. The session loads the snack extension once, then answers one
//! pitch request per recording over stdin/stdout. Frame values arrive on the
//! snack ESPS timebase: one frame per frame shift starting at t = 0, with
//! unvoiced frames reported as 0.0 rather than NaN.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::config::{Configuration, SnackConfig};
use crate::error::PipelineError;
use crate::measure::NativeSeries;
use crate::sound::SoundFile;

const ENGINE: &str = "snack";
const READY: &str = "READY";
const END: &str = "END";

/// A live tclsh process with the snack extension loaded.
pub struct SnackSession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SnackSession {
    /// Spawns the configured tcl command and performs the load handshake.
    /// A missing interpreter or a tcl installation without the snack package
    /// fails here, before any file is processed.
    pub fn spawn(cfg: &SnackConfig) -> Result<Self, PipelineError> {
        let mut child = Command::new(&cfg.tcl_cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PipelineError::engine_io(ENGINE, format!("spawning '{}'", cfg.tcl_cmd), e)
            })?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => return Err(PipelineError::engine(ENGINE, "tclsh stdin unavailable")),
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => BufReader::new(stdout),
            None => return Err(PipelineError::engine(ENGINE, "tclsh stdout unavailable")),
        };

        let mut session = Self {
            child,
            stdin,
            stdout,
        };
        session.send(concat!(
            "package require snack\n",
            "snack::sound s\n",
            "puts READY\n",
            "flush stdout\n"
        ))?;
        match session.read_line() {
            Ok(line) if line == READY => {
                tracing::debug!(tcl_cmd = %cfg.tcl_cmd, "snack session ready");
                Ok(session)
            }
            _ => Err(session.handshake_failure(&cfg.tcl_cmd)),
        }
    }

    /// Runs the ESPS pitch tracker on one recording.
    pub fn pitch(
        &mut self,
        sound: &SoundFile,
        cfg: &Configuration,
    ) -> Result<NativeSeries, PipelineError> {
        self.send(&pitch_command(sound.path(), cfg))?;

        let count_line = self.read_line()?;
        let count: usize = count_line.parse().map_err(|_| {
            PipelineError::engine(
                ENGINE,
                format!("expected a frame count, got '{count_line}'"),
            )
        })?;

        let mut series = NativeSeries::new("snackF0", cfg.frame_shift_ms);
        for i in 0..count {
            let line = self.read_line()?;
            let f0 = parse_frame_line(&line).ok_or_else(|| {
                PipelineError::engine(ENGINE, format!("malformed pitch frame '{line}'"))
            })?;
            series.push(i as f64 * cfg.frame_shift_ms, f0);
        }

        let terminator = self.read_line()?;
        if terminator != END {
            return Err(PipelineError::engine(
                ENGINE,
                format!("expected end of frame list, got '{terminator}'"),
            ));
        }
        tracing::debug!(file = %sound.basename(), frames = count, "snack pitch done");
        Ok(series)
    }

    fn send(&mut self, script: &str) -> Result<(), PipelineError> {
        self.stdin
            .write_all(script.as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| PipelineError::engine_io(ENGINE, "writing to tclsh session", e))
    }

    fn read_line(&mut self) -> Result<String, PipelineError> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| PipelineError::engine_io(ENGINE, "reading from tclsh session", e))?;
        if n == 0 {
            return Err(PipelineError::engine(
                ENGINE,
                "tclsh session closed unexpectedly",
            ));
        }
        Ok(line.trim_end().to_string())
    }

    /// Collects whatever the dying interpreter wrote to stderr so the error
    /// names the real cause (usually `can't find package snack`).
    fn handshake_failure(&mut self, tcl_cmd: &str) -> PipelineError {
        let _ = self.child.kill();
        let mut detail = String::new();
        if let Some(stderr) = self.child.stderr.take() {
            let mut reader = BufReader::new(stderr);
            let _ = reader.read_to_string(&mut detail);
        }
        let _ = self.child.wait();
        let detail = detail.trim();
        if detail.is_empty() {
            PipelineError::engine(ENGINE, format!("'{tcl_cmd}' failed to load the snack package"))
        } else {
            PipelineError::engine(
                ENGINE,
                format!("'{tcl_cmd}' failed to load the snack package: {detail}"),
            )
        }
    }
}

impl Drop for SnackSession {
    fn drop(&mut self) {
        let _ = self.stdin.write_all(b"exit\n");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

/// The per-file tcl fragment. Snack wants frame and window lengths in
/// seconds; the frame list is echoed back one frame per line between a count
/// line and an END sentinel.
fn pitch_command(wav: &Path, cfg: &Configuration) -> String {
    format!(
        concat!(
            "s read {{{path}}}\n",
            "set f0data [s pitch -method esps -framelength {framelength} ",
            "-windowlength {windowlength} -maxpitch {maxpitch} -minpitch {minpitch}]\n",
            "puts [llength $f0data]\n",
            "foreach frame $f0data {{ puts $frame }}\n",
            "puts END\n",
            "flush stdout\n"
        ),
        path = wav.display(),
        framelength = cfg.frame_shift_ms / 1000.0,
        windowlength = cfg.window_size_ms / 1000.0,
        maxpitch = cfg.max_f0,
        minpitch = cfg.min_f0,
    )
}

/// One ESPS frame is four values: F0, voicing probability, local RMS, and
/// AC peak. Only the pitch track is consumed.
fn parse_frame_line(line: &str) -> Option<f64> {
    line.split_whitespace().next()?.parse().ok()
}
