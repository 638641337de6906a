//! The closed set of supported measurements and the native-timebase series
//! the engine adapters return for them.

/// A supported measurement, selected by validated parse rather than free-form
/// string lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    SnackF0,
    PraatF0,
    ShrF0,
    Shr,
    PraatFormants,
}

impl Measurement {
    pub const ALL: [Measurement; 5] = [
        Measurement::SnackF0,
        Measurement::PraatF0,
        Measurement::ShrF0,
        Measurement::Shr,
        Measurement::PraatFormants,
    ];

    /// Canonical name as it appears on the command line and in headers.
    pub fn name(self) -> &'static str {
        match self {
            Self::SnackF0 => "snackF0",
            Self::PraatF0 => "praatF0",
            Self::ShrF0 => "shrF0",
            Self::Shr => "SHR",
            Self::PraatFormants => "praatFormants",
        }
    }

    /// Names are case-sensitive, matching the original vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Whether this measurement is an F0 track usable for `--f0`.
    pub fn is_f0(self) -> bool {
        matches!(self, Self::SnackF0 | Self::PraatF0 | Self::ShrF0)
    }

    /// Output column names this measurement contributes, in order. Formants
    /// expand to one frequency and one bandwidth column per formant.
    pub fn output_columns(self, num_formants: usize) -> Vec<String> {
        match self {
            Self::PraatFormants => {
                let mut cols = Vec::with_capacity(num_formants * 2);
                for i in 1..=num_formants {
                    cols.push(format!("pF{i}"));
                }
                for i in 1..=num_formants {
                    cols.push(format!("pB{i}"));
                }
                cols
            }
            other => vec![other.name().to_string()],
        }
    }
}

/// One measurement series on its engine's own timebase, before alignment.
///
/// `times_ms` and `values` have equal length; values may be NaN where the
/// engine reports nothing. `frame_shift_ms` is the engine's own frame step,
/// which the alignment engine uses as its matching tolerance base.
#[derive(Debug, Clone)]
pub struct NativeSeries {
    pub column: String,
    pub times_ms: Vec<f64>,
    pub values: Vec<f64>,
    pub frame_shift_ms: f64,
}

impl NativeSeries {
    pub fn new(column: impl Into<String>, frame_shift_ms: f64) -> Self {
        Self {
            column: column.into(),
            times_ms: Vec::new(),
            values: Vec::new(),
            frame_shift_ms,
        }
    }

    pub fn push(&mut self, time_ms: f64, value: f64) {
        self.times_ms.push(time_ms);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
