//! Configuration resolution.
//!
//! Option values come from four ranked sources, highest precedence first:
//! explicit command-line values, an explicitly named settings file, the first
//! existing default settings file from an ordered search list, and built-in
//! defaults. The measurement list has its own chain (command line > settings
//! `measurements` directive > explicit measurements file > discovered
//! measurements file). All merging happens here, on plain option records;
//! settings files are never replayed through the argument parser.
//!
//! Search locations are injectable so tests can point the resolver at
//! deterministic paths.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::measure::Measurement;

/// Snack invocation methods. The original tool also shipped Windows-exe and
/// in-process variants; the tcl subprocess is the one that survives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnackMethod {
    Tcl,
}

impl SnackMethod {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "tcl" => Some(Self::Tcl),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PraatMethod {
    Cc,
    Ac,
}

impl PraatMethod {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "cc" => Some(Self::Cc),
            "ac" => Some(Self::Ac),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cc => "cc",
            Self::Ac => "ac",
        }
    }
}

/// Snack engine options.
#[derive(Debug, Clone)]
pub struct SnackConfig {
    pub method: SnackMethod,
    pub tcl_cmd: String,
}

/// Praat engine options. The pitch post-processing and formant parameters
/// are pass-through marshaling values with the reference defaults; the
/// adapters hand them to praat untouched.
#[derive(Debug, Clone)]
pub struct PraatConfig {
    pub path: PathBuf,
    pub method: PraatMethod,
    pub frame_precision: f64,
    pub silence_threshold: f64,
    pub voice_threshold: f64,
    pub octave_cost: f64,
    pub octave_jumpcost: f64,
    pub voiced_unvoiced_cost: f64,
    pub kill_octave_jumps: bool,
    pub interpolate: bool,
    pub smooth: bool,
    pub smooth_bandwidth: f64,
    pub formant_window_ms: f64,
    pub num_formants: usize,
    pub max_formant_hz: f64,
}

/// The resolved, immutable run configuration.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub wav_files: Vec<PathBuf>,
    /// Requested measurements in output order, with the F0 column already
    /// appended when enabled.
    pub measurements: Vec<Measurement>,
    pub f0: Measurement,
    pub include_f0_column: bool,
    pub frame_shift_ms: f64,
    pub window_size_ms: f64,
    pub min_f0: f64,
    pub max_f0: f64,
    pub use_textgrid: bool,
    pub include_labels: bool,
    pub include_empty_labels: bool,
    pub ignore_labels: BTreeSet<String>,
    pub tier: Option<String>,
    pub nan_token: String,
    pub output: Option<PathBuf>,
    pub snack: SnackConfig,
    pub praat: PraatConfig,
}

impl Configuration {
    pub const DEFAULT_FRAME_SHIFT_MS: f64 = 1.0;
    pub const DEFAULT_WINDOW_SIZE_MS: f64 = 25.0;
    pub const DEFAULT_MIN_F0: f64 = 40.0;
    pub const DEFAULT_MAX_F0: f64 = 500.0;
    pub const DEFAULT_NAN_TOKEN: &'static str = "NaN";

    /// Whether the label columns appear in the output.
    pub fn labels_visible(&self) -> bool {
        self.use_textgrid && self.include_labels
    }

    /// Output column names in final order, formants expanded in place.
    pub fn output_columns(&self) -> Vec<String> {
        self.measurements
            .iter()
            .flat_map(|m| m.output_columns(self.praat.num_formants))
            .collect()
    }
}

/// One source's partial option record: `None` means "not set here".
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    pub measurements: Option<Vec<String>>,
    pub f0: Option<String>,
    pub include_f0_column: Option<bool>,
    pub frame_shift_ms: Option<f64>,
    pub window_size_ms: Option<f64>,
    pub min_f0: Option<f64>,
    pub max_f0: Option<f64>,
    pub ignore_labels: Vec<String>,
    pub include_empty_labels: Option<bool>,
    pub use_textgrid: Option<bool>,
    pub include_labels: Option<bool>,
    pub tier: Option<String>,
    pub measurements_file: Option<PathBuf>,
    pub nan_token: Option<String>,
    pub output: Option<PathBuf>,
    pub snack_method: Option<String>,
    pub tcl_cmd: Option<String>,
    pub praat_path: Option<PathBuf>,
    pub praat_method: Option<String>,
}

/// What the command line provided, before merging.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub wav_files: Vec<PathBuf>,
    pub settings_file: Option<PathBuf>,
    pub options: OptionSet,
}

#[derive(Debug, Clone, Copy)]
enum Origin<'a> {
    Cli,
    File(&'a Path),
}

impl Origin<'_> {
    fn describe(&self) -> String {
        match self {
            Origin::Cli => "on the command line".to_string(),
            Origin::File(path) => format!("in settings file {}", path.display()),
        }
    }
}

/// Resolves `CliOverrides` into a validated `Configuration`.
pub struct Resolver {
    settings_locs: Vec<PathBuf>,
    measurements_locs: Vec<PathBuf>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Resolver with the standard search locations: the working directory,
    /// the user config directory, and (for settings) a home dotfile.
    pub fn new() -> Self {
        let mut settings_locs = vec![PathBuf::from("voicegrid.settings")];
        let mut measurements_locs = vec![PathBuf::from("voicegrid.measurements")];
        if let Some(dir) = dirs::config_dir() {
            settings_locs.push(dir.join("voicegrid").join("settings"));
            measurements_locs.push(dir.join("voicegrid").join("measurements"));
        }
        if let Some(home) = dirs::home_dir() {
            settings_locs.push(home.join(".voicegridrc"));
        }
        Self {
            settings_locs,
            measurements_locs,
        }
    }

    /// Resolver with explicit search locations, for tests and embedding.
    pub fn with_search_paths(
        settings_locs: Vec<PathBuf>,
        measurements_locs: Vec<PathBuf>,
    ) -> Self {
        Self {
            settings_locs,
            measurements_locs,
        }
    }

    pub fn resolve(&self, cli: CliOverrides) -> Result<Configuration, PipelineError> {
        let (file_opts, settings_path) = self.load_settings(&cli)?;
        let file_origin = settings_path.as_deref().map(Origin::File);

        let frame_shift_ms = pick(
            cli.options.frame_shift_ms,
            file_opts.frame_shift_ms,
            Configuration::DEFAULT_FRAME_SHIFT_MS,
        );
        if frame_shift_ms <= 0.0 {
            return Err(PipelineError::config(format!(
                "frame shift must be positive, got {frame_shift_ms}"
            )));
        }
        let window_size_ms = pick(
            cli.options.window_size_ms,
            file_opts.window_size_ms,
            Configuration::DEFAULT_WINDOW_SIZE_MS,
        );
        let min_f0 = pick(cli.options.min_f0, file_opts.min_f0, Configuration::DEFAULT_MIN_F0);
        let max_f0 = pick(cli.options.max_f0, file_opts.max_f0, Configuration::DEFAULT_MAX_F0);

        let f0 = self.resolve_f0(&cli.options, &file_opts, file_origin)?;
        let include_f0_column = pick(
            cli.options.include_f0_column,
            file_opts.include_f0_column,
            false,
        );

        let mut measurements =
            self.resolve_measurements(&cli.options, &file_opts, file_origin)?;
        if include_f0_column && !measurements.contains(&f0) {
            measurements.push(f0);
        }
        if measurements.is_empty() {
            return Err(PipelineError::config(
                "no measurements specified; use --measurements, a settings file, \
                 or a default measurements file",
            ));
        }

        if cli.wav_files.is_empty() {
            return Err(PipelineError::config(
                "at least one wavfile argument is required",
            ));
        }

        let mut ignore_labels = BTreeSet::new();
        ignore_labels.extend(file_opts.ignore_labels.iter().cloned());
        ignore_labels.extend(cli.options.ignore_labels.iter().cloned());

        let snack_method_name =
            pick_cloned(&cli.options.snack_method, &file_opts.snack_method, "tcl");
        let snack_method = SnackMethod::parse(&snack_method_name).ok_or_else(|| {
            PipelineError::config(format!("unknown snack method '{snack_method_name}'"))
        })?;
        let praat_method_name =
            pick_cloned(&cli.options.praat_method, &file_opts.praat_method, "cc");
        let praat_method = PraatMethod::parse(&praat_method_name).ok_or_else(|| {
            PipelineError::config(format!("unknown praat method '{praat_method_name}'"))
        })?;

        let snack = SnackConfig {
            method: snack_method,
            tcl_cmd: pick_cloned(&cli.options.tcl_cmd, &file_opts.tcl_cmd, default_tcl_cmd()),
        };
        let praat = PraatConfig {
            path: cli
                .options
                .praat_path
                .or(file_opts.praat_path)
                .unwrap_or_else(default_praat_path),
            method: praat_method,
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
        };

        Ok(Configuration {
            wav_files: cli.wav_files,
            measurements,
            f0,
            include_f0_column,
            frame_shift_ms,
            window_size_ms,
            min_f0,
            max_f0,
            use_textgrid: pick(cli.options.use_textgrid, file_opts.use_textgrid, true),
            include_labels: pick(cli.options.include_labels, file_opts.include_labels, true),
            include_empty_labels: pick(
                cli.options.include_empty_labels,
                file_opts.include_empty_labels,
                false,
            ),
            ignore_labels,
            tier: cli.options.tier.or(file_opts.tier),
            nan_token: pick_cloned(
                &cli.options.nan_token,
                &file_opts.nan_token,
                Configuration::DEFAULT_NAN_TOKEN,
            ),
            output: cli.options.output.or(file_opts.output),
            snack,
            praat,
        })
    }

    fn load_settings(
        &self,
        cli: &CliOverrides,
    ) -> Result<(OptionSet, Option<PathBuf>), PipelineError> {
        if let Some(path) = &cli.settings_file {
            let opts = parse_settings_file(path)?;
            return Ok((opts, Some(path.clone())));
        }
        for candidate in &self.settings_locs {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "using discovered settings file");
                let opts = parse_settings_file(candidate)?;
                return Ok((opts, Some(candidate.clone())));
            }
        }
        Ok((OptionSet::default(), None))
    }

    fn resolve_f0(
        &self,
        cli: &OptionSet,
        file: &OptionSet,
        file_origin: Option<Origin<'_>>,
    ) -> Result<Measurement, PipelineError> {
        let (name, origin) = match (&cli.f0, &file.f0) {
            (Some(name), _) => (name.as_str(), Origin::Cli),
            (None, Some(name)) => (
                name.as_str(),
                file_origin.unwrap_or(Origin::Cli),
            ),
            (None, None) => return Ok(Measurement::SnackF0),
        };
        match Measurement::parse(name) {
            Some(m) if m.is_f0() => Ok(m),
            _ => Err(PipelineError::config(format!(
                "unknown F0 algorithm '{name}' {}",
                origin.describe()
            ))),
        }
    }

    fn resolve_measurements(
        &self,
        cli: &OptionSet,
        file: &OptionSet,
        file_origin: Option<Origin<'_>>,
    ) -> Result<Vec<Measurement>, PipelineError> {
        if let Some(names) = &cli.measurements {
            return parse_measurement_names(names, Origin::Cli);
        }
        if let Some(names) = &file.measurements {
            let origin = file_origin.unwrap_or(Origin::Cli);
            return parse_measurement_names(names, origin);
        }
        let explicit = cli
            .measurements_file
            .as_ref()
            .or(file.measurements_file.as_ref());
        if let Some(path) = explicit {
            return parse_measurements_file(path);
        }
        for candidate in &self.measurements_locs {
            if candidate.is_file() {
                tracing::debug!(
                    path = %candidate.display(),
                    "using discovered measurements file"
                );
                return parse_measurements_file(candidate);
            }
        }
        Ok(Vec::new())
    }
}

fn pick<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}

fn pick_cloned(cli: &Option<String>, file: &Option<String>, default: &str) -> String {
    cli.clone()
        .or_else(|| file.clone())
        .unwrap_or_else(|| default.to_string())
}

fn default_tcl_cmd() -> &'static str {
    if cfg!(target_os = "macos") {
        "tclsh8.4"
    } else {
        "tclsh"
    }
}

fn default_praat_path() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/Praat.app/Contents/MacOS/Praat")
    } else if cfg!(target_os = "windows") {
        PathBuf::from("C:\\Program Files\\Praat\\Praat.exe")
    } else {
        PathBuf::from("/usr/bin/praat")
    }
}

fn parse_measurement_names(
    names: &[String],
    origin: Origin<'_>,
) -> Result<Vec<Measurement>, PipelineError> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let m = Measurement::parse(name).ok_or_else(|| {
            PipelineError::config(format!(
                "unknown measurement '{name}' {}",
                origin.describe()
            ))
        })?;
        if !out.contains(&m) {
            out.push(m);
        }
    }
    Ok(out)
}

/// Measurements file: one measurement name per line, `#` comments and blank
/// lines ignored. Line numbers in errors are zero-based, as they always were.
fn parse_measurements_file(path: &Path) -> Result<Vec<Measurement>, PipelineError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::config(format!(
            "cannot read measurements file {}: {e}",
            path.display()
        ))
    })?;
    let mut out = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let m = Measurement::parse(line).ok_or_else(|| {
            PipelineError::config(format!(
                "unknown measurement '{line}' on line {lineno} of {}",
                path.display()
            ))
        })?;
        if !out.contains(&m) {
            out.push(m);
        }
    }
    Ok(out)
}

/// Settings file: one `option value…` directive per line using the long CLI
/// flag vocabulary, `#` comments and blank lines ignored. Parsing stops at
/// the first error. The `measurements` directive must not be the final
/// directive in the file: under the original grammar it would consume
/// whatever followed it, filenames included, so the restriction is kept.
fn parse_settings_file(path: &Path) -> Result<OptionSet, PipelineError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::config(format!("cannot read settings file {}: {e}", path.display()))
    })?;

    let mut opts = OptionSet::default();
    let mut last_option: Option<String> = None;

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let option = tokens.next().unwrap_or_default().to_string();
        let values: Vec<&str> = tokens.collect();
        apply_settings_directive(&mut opts, &option, &values, path)?;
        last_option = Some(option);
    }

    if last_option.as_deref() == Some("measurements") {
        return Err(PipelineError::config(format!(
            "'measurements' must not be the last directive in settings file {}: \
             it would consume any filenames that follow it",
            path.display()
        )));
    }

    Ok(opts)
}

fn apply_settings_directive(
    opts: &mut OptionSet,
    option: &str,
    values: &[&str],
    path: &Path,
) -> Result<(), PipelineError> {
    let flag = |values: &[&str]| -> Result<(), PipelineError> {
        if values.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::config(format!(
                "option '{option}' takes no value in settings file {}",
                path.display()
            )))
        }
    };
    let one = |values: &[&str]| -> Result<String, PipelineError> {
        match values {
            [v] => Ok((*v).to_string()),
            [] => Err(PipelineError::config(format!(
                "option '{option}' requires a value in settings file {}",
                path.display()
            ))),
            _ => Err(PipelineError::config(format!(
                "option '{option}' takes one value in settings file {}",
                path.display()
            ))),
        }
    };
    let numeric = |values: &[&str]| -> Result<f64, PipelineError> {
        let v = one(values)?;
        v.parse::<f64>().map_err(|_| {
            PipelineError::config(format!(
                "invalid value '{v}' for option '{option}' in settings file {}",
                path.display()
            ))
        })
    };

    match option {
        "settings" => {
            return Err(PipelineError::config(format!(
                "option 'settings' is not allowed inside settings file {}",
                path.display()
            )));
        }
        "measurements" => {
            if values.is_empty() {
                return Err(PipelineError::config(format!(
                    "option 'measurements' requires at least one value in settings file {}",
                    path.display()
                )));
            }
            opts.measurements = Some(values.iter().map(|v| v.to_string()).collect());
        }
        "f0" | "F0" => opts.f0 = Some(one(values)?),
        "include-f0-column" | "include-F0-column" => {
            flag(values)?;
            opts.include_f0_column = Some(true);
        }
        "no-f0-column" | "no-F0-column" => {
            flag(values)?;
            opts.include_f0_column = Some(false);
        }
        "frame-shift" => opts.frame_shift_ms = Some(numeric(values)?),
        "window-size" => opts.window_size_ms = Some(numeric(values)?),
        "min-f0" | "min-F0" => opts.min_f0 = Some(numeric(values)?),
        "max-f0" | "max-F0" => opts.max_f0 = Some(numeric(values)?),
        "ignore-label" => opts.ignore_labels.push(one(values)?),
        "include-empty-labels" => {
            flag(values)?;
            opts.include_empty_labels = Some(true);
        }
        "use-textgrid" => {
            flag(values)?;
            opts.use_textgrid = Some(true);
        }
        "no-textgrid" => {
            flag(values)?;
            opts.use_textgrid = Some(false);
        }
        "include-labels" => {
            flag(values)?;
            opts.include_labels = Some(true);
        }
        "no-labels" => {
            flag(values)?;
            opts.include_labels = Some(false);
        }
        "tier" => opts.tier = Some(one(values)?),
        "default-measurements-file" => {
            opts.measurements_file = Some(PathBuf::from(one(values)?));
        }
        "NaN" => opts.nan_token = Some(one(values)?),
        "output" => opts.output = Some(PathBuf::from(one(values)?)),
        "snack-method" => opts.snack_method = Some(one(values)?),
        "tcl-cmd" => opts.tcl_cmd = Some(one(values)?),
        "praat-path" => opts.praat_path = Some(PathBuf::from(one(values)?)),
        "praat-method" => opts.praat_method = Some(one(values)?),
        unknown => {
            return Err(PipelineError::config(format!(
                "unknown option '{unknown}' in settings file {}",
                path.display()
            )));
        }
    }
    Ok(())
}
