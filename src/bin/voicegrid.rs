use std::path::PathBuf;

use clap::Parser;

use voicegrid::{CliOverrides, OptionSet, PipelineBuilder, Resolver};

#[derive(Debug, Parser)]
#[command(name = "voicegrid")]
#[command(about = "Frame-aligned acoustic measurement tables from WAV recordings")]
struct Args {
    /// Input WAV recordings. A sibling .TextGrid provides the labels.
    #[arg(value_name = "WAVFILE")]
    wav_files: Vec<PathBuf>,

    /// Measurements to compute, in output order.
    #[arg(long, num_args = 1.., value_name = "NAME")]
    measurements: Option<Vec<String>>,

    /// F0 algorithm used wherever a single F0 track is needed.
    #[arg(long, alias = "F0", value_name = "NAME")]
    f0: Option<String>,

    /// Append the chosen F0 algorithm as an output column.
    #[arg(long, alias = "include-F0-column", overrides_with = "no_f0_column")]
    include_f0_column: bool,
    #[arg(long, alias = "no-F0-column", overrides_with = "include_f0_column")]
    no_f0_column: bool,

    /// Output frame spacing in milliseconds.
    #[arg(long, value_name = "MS")]
    frame_shift: Option<f64>,

    /// Analysis window in milliseconds.
    #[arg(long, value_name = "MS")]
    window_size: Option<f64>,

    #[arg(long, alias = "min-F0", value_name = "HZ")]
    min_f0: Option<f64>,

    #[arg(long, alias = "max-F0", value_name = "HZ")]
    max_f0: Option<f64>,

    /// Skip intervals with this label; may be given several times.
    #[arg(long, value_name = "LABEL")]
    ignore_label: Vec<String>,

    /// Keep intervals whose label is empty.
    #[arg(long)]
    include_empty_labels: bool,

    #[arg(long, overrides_with = "no_textgrid")]
    use_textgrid: bool,
    /// Process whole files without any TextGrid segmentation.
    #[arg(long, overrides_with = "use_textgrid")]
    no_textgrid: bool,

    #[arg(long, overrides_with = "no_labels")]
    include_labels: bool,
    /// Hide the Label, seg_Start and seg_End columns.
    #[arg(long, overrides_with = "include_labels")]
    no_labels: bool,

    /// Interval tier to read; the first interval tier when unset.
    #[arg(long, value_name = "NAME")]
    tier: Option<String>,

    /// Settings file to use instead of the searched locations.
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Measurements file to use instead of the searched locations.
    #[arg(long, short = 'm', value_name = "PATH")]
    default_measurements_file: Option<PathBuf>,

    /// Placeholder printed for missing values.
    #[arg(long = "NaN", value_name = "TOKEN", allow_hyphen_values = true)]
    nan: Option<String>,

    /// Write the table here instead of stdout.
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    #[arg(long, value_name = "METHOD")]
    snack_method: Option<String>,

    /// Tcl interpreter used for snack.
    #[arg(long, value_name = "CMD")]
    tcl_cmd: Option<String>,

    /// Praat executable.
    #[arg(long, value_name = "PATH")]
    praat_path: Option<PathBuf>,

    /// Praat pitch method, cc or ac.
    #[arg(long, value_name = "METHOD")]
    praat_method: Option<String>,
}

impl Args {
    fn into_overrides(self) -> CliOverrides {
        let options = OptionSet {
            measurements: self.measurements,
            f0: self.f0,
            include_f0_column: flag_pair(self.include_f0_column, self.no_f0_column),
            frame_shift_ms: self.frame_shift,
            window_size_ms: self.window_size,
            min_f0: self.min_f0,
            max_f0: self.max_f0,
            ignore_labels: self.ignore_label,
            include_empty_labels: self.include_empty_labels.then_some(true),
            use_textgrid: flag_pair(self.use_textgrid, self.no_textgrid),
            include_labels: flag_pair(self.include_labels, self.no_labels),
            tier: self.tier,
            measurements_file: self.default_measurements_file,
            nan_token: self.nan,
            output: self.output,
            snack_method: self.snack_method,
            tcl_cmd: self.tcl_cmd,
            praat_path: self.praat_path,
            praat_method: self.praat_method,
        };
        CliOverrides {
            wav_files: self.wav_files,
            settings_file: self.settings,
            options,
        }
    }
}

/// Collapses an on/off flag pair into a tristate. Mutual `overrides_with`
/// keeps only the last of the two on the command line.
fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("voicegrid: {err}");
        std::process::exit(err.exit_code());
    }
}

fn run() -> Result<(), voicegrid::PipelineError> {
    let args = Args::parse();
    let config = Resolver::new().resolve(args.into_overrides())?;
    let mut pipeline = PipelineBuilder::new(config).build();
    pipeline.run()
}
