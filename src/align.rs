//! Mapping native measurement series onto the canonical frame grid.
//!
//! Engines report on their own timebase: snack starts at t = 0 on the
//! requested shift, the SHR estimator centers frames half a window in, praat
//! places frames wherever its windowing decides. Every column is aligned
//! independently; a canonical frame with no native sample close enough stays
//! NaN.

use crate::grid::FrameGrid;
use crate::measure::NativeSeries;

const SHIFT_MATCH_EPS_MS: f64 = 1e-9;

/// Align one native series to the grid.
///
/// When the native shift equals the canonical shift and the series starts at
/// t = 0, indices correspond directly and frames beyond the native length get
/// NaN. Otherwise each canonical frame takes the nearest native sample whose
/// time lies within `0.5 * native_shift * precision_frames` ms. Nearest
/// sample, never interpolation.
pub fn align(grid: &FrameGrid, series: &NativeSeries, precision_frames: f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; grid.len()];
    if series.is_empty() || grid.is_empty() {
        return out;
    }

    let direct = (series.frame_shift_ms - grid.frame_shift_ms()).abs() < SHIFT_MATCH_EPS_MS
        && series.times_ms[0].abs() < SHIFT_MATCH_EPS_MS;
    if direct {
        let n = grid.len().min(series.len());
        out[..n].copy_from_slice(&series.values[..n]);
        return out;
    }

    let tolerance = 0.5 * series.frame_shift_ms * precision_frames + SHIFT_MATCH_EPS_MS;
    let times = &series.times_ms;
    let mut j = 0usize;
    for (i, slot) in out.iter_mut().enumerate() {
        let t = grid.time_ms(i);
        // Both timebases are monotone, so the nearest native sample only
        // moves forward. Exact ties keep the earlier sample.
        while j + 1 < times.len() && (times[j + 1] - t).abs() < (times[j] - t).abs() {
            j += 1;
        }
        if (times[j] - t).abs() <= tolerance {
            *slot = series.values[j];
        }
    }
    out
}
