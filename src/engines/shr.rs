//! Subharmonic-to-harmonic ratio pitch estimation.
//!
//! Runs entirely in-crate. Each analysis frame is Hann-windowed and
//! zero-padded into an FFT; the amplitude spectrum is resampled onto a
//! uniform log2-frequency axis, where a harmonic series becomes a fixed
//! comb of offsets. For a pitch candidate p the harmonic sum SH adds the
//! amplitudes at n·p and the subharmonic sum SS adds the amplitudes at
//! (n-1/2)·p, both weighted by the inverse harmonic number so a candidate
//! cannot win on the strength of its own multiples alone. The candidate with
//! the largest SH is the pitch; SHR = SS/SH, and a ratio above the threshold
//! means the energy pattern fits the half pitch better, so F0 drops an
//! octave when that half pitch is still in range.
//!
//! Frames whose energy is below the floor are unvoiced: NaN F0 and NaN SHR.
//! Frame centers sit at window/2 + i*shift, so the first and last grid
//! frames of a recording have no SHR value.

use rustfft::{num_complex::Complex, FftPlanner};

/// Log2-axis resolution. At 256 points per octave the candidate spacing at
/// 200 Hz is about 0.5 Hz.
const POINTS_PER_OCTAVE: usize = 256;
/// Harmonics summed per candidate.
const MAX_HARMONIC: usize = 5;
/// SS/SH above this favors the subharmonic.
const SHR_THRESHOLD: f64 = 0.4;
/// Frame RMS below this is silence.
const ENERGY_FLOOR: f64 = 1e-5;

#[derive(Debug, Clone)]
pub struct ShrParams {
    pub fs: f64,
    pub frame_shift_ms: f64,
    pub window_size_ms: f64,
    pub min_f0: f64,
    pub max_f0: f64,
}

/// Parallel per-frame tracks. `f0` and `shr` are NaN on unvoiced frames.
#[derive(Debug, Clone, Default)]
pub struct ShrOutput {
    pub times_ms: Vec<f64>,
    pub f0: Vec<f64>,
    pub shr: Vec<f64>,
}

pub fn compute(samples: &[f64], params: &ShrParams) -> ShrOutput {
    let mut out = ShrOutput::default();
    let window_len = (params.window_size_ms / 1000.0 * params.fs).round() as usize;
    let shift_len = (params.frame_shift_ms / 1000.0 * params.fs).round() as usize;
    if window_len < 2 || shift_len == 0 || samples.len() < window_len {
        return out;
    }

    let fft_len = (window_len * 4).next_power_of_two();
    let bin_hz = params.fs / fft_len as f64;
    let axis = match LogAxis::build(params, bin_hz) {
        Some(axis) => axis,
        None => return out,
    };

    let hann: Vec<f64> = (0..window_len)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / (window_len - 1) as f64;
            0.5 - 0.5 * phase.cos()
        })
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let mut buffer = vec![Complex::new(0.0, 0.0); fft_len];
    let mut amplitude = vec![0.0; fft_len / 2];
    let mut log_spectrum = vec![0.0; axis.len];

    let frame_count = (samples.len() - window_len) / shift_len + 1;
    let half_window_ms = params.window_size_ms / 2.0;
    for frame in 0..frame_count {
        out.times_ms
            .push(half_window_ms + frame as f64 * params.frame_shift_ms);

        let slice = &samples[frame * shift_len..frame * shift_len + window_len];
        let mean = slice.iter().sum::<f64>() / window_len as f64;
        let rms = (slice.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>()
            / window_len as f64)
            .sqrt();
        if rms < ENERGY_FLOOR {
            out.f0.push(f64::NAN);
            out.shr.push(f64::NAN);
            continue;
        }

        for slot in buffer.iter_mut() {
            *slot = Complex::new(0.0, 0.0);
        }
        for (i, (&s, &w)) in slice.iter().zip(&hann).enumerate() {
            buffer[i] = Complex::new((s - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (k, slot) in amplitude.iter_mut().enumerate() {
            *slot = buffer[k].norm();
        }

        axis.resample(&amplitude, bin_hz, &mut log_spectrum);
        let (f0, shr) = axis.strongest_candidate(&log_spectrum, params.min_f0);
        out.f0.push(f0);
        out.shr.push(shr);
    }
    out
}

/// Uniform log2-frequency grid with precomputed comb offsets.
struct LogAxis {
    log_lo: f64,
    step: f64,
    len: usize,
    cand_lo: usize,
    cand_hi: usize,
    /// (grid offset, weight) per harmonic n: offset log2(n), weight 1/n.
    harmonic_offsets: Vec<(isize, f64)>,
    /// Same for the half-integer positions (n - 1/2).
    subharmonic_offsets: Vec<(isize, f64)>,
}

impl LogAxis {
    fn build(params: &ShrParams, bin_hz: f64) -> Option<Self> {
        if params.min_f0 <= 0.0 || params.max_f0 <= params.min_f0 {
            return None;
        }
        // The axis starts an octave below the lowest candidate so the n = 1
        // subharmonic position exists, and stops where the highest summed
        // harmonic would leave the spectrum.
        let lo_hz = (params.min_f0 / 2.0).max(bin_hz);
        let hi_hz = (params.max_f0 * MAX_HARMONIC as f64).min(params.fs / 2.0 - bin_hz);
        if lo_hz >= hi_hz {
            return None;
        }

        let step = 1.0 / POINTS_PER_OCTAVE as f64;
        let log_lo = lo_hz.log2();
        let len = ((hi_hz.log2() - log_lo) / step).floor() as usize + 1;
        let cand_lo = (((params.min_f0.log2() - log_lo) / step).ceil().max(0.0)) as usize;
        let cand_hi_f = ((params.max_f0.log2() - log_lo) / step).floor();
        if cand_hi_f < cand_lo as f64 {
            return None;
        }
        let cand_hi = (cand_hi_f as usize).min(len - 1);

        let mut harmonic_offsets = Vec::with_capacity(MAX_HARMONIC);
        let mut subharmonic_offsets = Vec::with_capacity(MAX_HARMONIC);
        for n in 1..=MAX_HARMONIC {
            let h = n as f64;
            harmonic_offsets.push(((h.log2() / step).round() as isize, 1.0 / h));
            let s = h - 0.5;
            subharmonic_offsets.push(((s.log2() / step).round() as isize, 1.0 / s));
        }

        Some(Self {
            log_lo,
            step,
            len,
            cand_lo,
            cand_hi,
            harmonic_offsets,
            subharmonic_offsets,
        })
    }

    /// Linear interpolation of the FFT amplitude spectrum onto the grid.
    fn resample(&self, amplitude: &[f64], bin_hz: f64, out: &mut [f64]) {
        for (idx, slot) in out.iter_mut().enumerate() {
            let hz = (self.log_lo + idx as f64 * self.step).exp2();
            let pos = hz / bin_hz;
            let k = pos.floor() as usize;
            if k + 1 >= amplitude.len() {
                *slot = 0.0;
                continue;
            }
            let frac = pos - k as f64;
            *slot = amplitude[k] * (1.0 - frac) + amplitude[k + 1] * frac;
        }
    }

    /// Scans the candidate band and returns (f0, shr), NaN pairs for frames
    /// with no usable harmonic structure.
    fn strongest_candidate(&self, log_spectrum: &[f64], min_f0: f64) -> (f64, f64) {
        let mut best_idx = None;
        let mut best_sh = 0.0;
        let mut best_ss = 0.0;
        for idx in self.cand_lo..=self.cand_hi {
            let mut sh = 0.0;
            for &(off, weight) in &self.harmonic_offsets {
                let at = idx as isize + off;
                if (at as usize) < self.len {
                    sh += log_spectrum[at as usize] * weight;
                }
            }
            // Equal sums prefer the higher candidate, so a lone partial is
            // read as a fundamental rather than as its own subharmonic.
            if sh >= best_sh {
                let mut ss = 0.0;
                for &(off, weight) in &self.subharmonic_offsets {
                    let at = idx as isize + off;
                    if at >= 0 && (at as usize) < self.len {
                        ss += log_spectrum[at as usize] * weight;
                    }
                }
                best_idx = Some(idx);
                best_sh = sh;
                best_ss = ss;
            }
        }

        let idx = match best_idx {
            Some(idx) if best_sh > f64::EPSILON => idx,
            _ => return (f64::NAN, f64::NAN),
        };
        let mut f0 = (self.log_lo + idx as f64 * self.step).exp2();
        let shr = best_ss / best_sh;
        if shr > SHR_THRESHOLD && f0 / 2.0 >= min_f0 {
            f0 /= 2.0;
        }
        (f0, shr)
    }
}
