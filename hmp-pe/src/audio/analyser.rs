//! Spectrum analyser for visualizations
//!
//! Follows the usual analyser-node model: the most recent `fft_size` samples
//! are windowed (Blackman), transformed, magnitudes are smoothed over time
//! and mapped from decibels onto `0..=255`.
//!
//! The analyser is owned by the playback engine, created on first request and
//! dropped when the engine is destroyed.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

/// Default transform size
pub const DEFAULT_FFT_SIZE: usize = 256;
/// Default smoothing time constant
pub const DEFAULT_SMOOTHING: f32 = 0.8;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Analyser shared between the engine (owner), the sink (writer) and the UI (reader)
pub type SharedAnalyser = Arc<Mutex<SpectrumAnalyser>>;

pub struct SpectrumAnalyser {
    fft_size: usize,
    smoothing: f32,
    samples: VecDeque<f32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING)
    }
}

impl SpectrumAnalyser {
    /// `fft_size` is rounded up to a power of two (minimum 32); `smoothing`
    /// is clamped to `[0, 1]`
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let window = (0..fft_size)
            .map(|n| {
                let x = 2.0 * PI * n as f32 / fft_size as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            samples: VecDeque::from(vec![0.0; fft_size]),
            window,
            smoothed: vec![0.0; fft_size / 2],
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
        }
    }

    pub fn shared() -> SharedAnalyser {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// Number of bins returned by [`frequency_data`](Self::frequency_data)
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Feed mono samples; only the last `fft_size` are kept
    pub fn push_samples(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            self.samples.pop_front();
            self.samples.push_back(sample);
        }
    }

    /// Current magnitude spectrum as bytes
    ///
    /// Each call advances the smoothing by one step.
    pub fn frequency_data(&mut self) -> Vec<u8> {
        for ((slot, sample), w) in self.buffer.iter_mut().zip(&self.samples).zip(&self.window) {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let n = self.fft_size as f32;
        let smoothing = self.smoothing;
        let scale = 255.0 / (MAX_DECIBELS - MIN_DECIBELS);

        self.smoothed
            .iter_mut()
            .zip(&self.buffer)
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() / n;
                *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;

                if *smoothed > 0.0 {
                    let db = 20.0 * smoothed.log10();
                    (scale * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8
                } else {
                    0
                }
            })
            .collect()
    }

    /// Forget history (new source installed)
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
    }
}
