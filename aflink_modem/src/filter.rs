//! Second-order Butterworth biquads used by the demodulator's filter bank.
//!
//! Shaped like `bbx_dsp::blocks::effectors::filter::FilterBlock`: a small
//! struct holding per-instance coefficients and running state, a
//! `process_sample` hot path, and a `reset()`. The topology differs from the
//! teacher's state-variable filter -- a direct-form-II transposed biquad is
//! the natural target of a bilinear-transform Butterworth design -- but the
//! surrounding shape is the same.

use std::f64::consts::PI;

/// Coefficients and state for one second-order IIR section.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self { b0, b1, b2, a1, a2, z1: 0.0, z2: 0.0 }
    }

    /// Process one sample through the transposed direct-form-II section.
    #[inline]
    pub fn process_sample(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Design a 2nd-order Butterworth band-pass section via the bilinear
    /// transform, centered at `center_hz` with total bandwidth `bandwidth_hz`.
    pub fn bandpass(sample_rate: f64, center_hz: f64, bandwidth_hz: f64) -> Self {
        let w0 = 2.0 * PI * center_hz / sample_rate;
        let bw = 2.0 * PI * bandwidth_hz / sample_rate;
        let q = w0 / bw.max(1e-9);
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self::new(b0 / a0, b1 / a0, b2 / a0, a1 / a0, a2 / a0)
    }

    /// Design a 2nd-order Butterworth low-pass section via the bilinear
    /// transform, with cutoff `cutoff_hz`.
    pub fn lowpass(sample_rate: f64, cutoff_hz: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let q = std::f64::consts::FRAC_1_SQRT_2; // Butterworth Q for a 2nd-order section
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self::new(b0 / a0, b1 / a0, b2 / a0, a1 / a0, a2 / a0)
    }

    /// Filter an entire buffer, returning a new buffer of the same length.
    pub fn process_buffer(&mut self, samples: &[f32]) -> Vec<f64> {
        samples.iter().map(|&s| self.process_sample(s as f64)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let sr = 48_000.0;
        let mut lp = Biquad::lowpass(sr, 600.0);
        let n = 4096;
        let high: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 8_000.0 * i as f64 / sr).sin() as f32)
            .collect();
        let out = lp.process_buffer(&high);
        let settled = &out[n / 2..];
        let rms = (settled.iter().map(|v| v * v).sum::<f64>() / settled.len() as f64).sqrt();
        assert!(rms < 0.2, "expected strong attenuation of 8kHz tone, got rms {rms}");
    }

    #[test]
    fn lowpass_passes_below_cutoff() {
        let sr = 48_000.0;
        let mut lp = Biquad::lowpass(sr, 2_000.0);
        let n = 4096;
        let low: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 100.0 * i as f64 / sr).sin() as f32)
            .collect();
        let out = lp.process_buffer(&low);
        let settled = &out[n / 2..];
        let rms = (settled.iter().map(|v| v * v).sum::<f64>() / settled.len() as f64).sqrt();
        assert!(rms > 0.4, "expected low-frequency tone to pass mostly intact, got rms {rms}");
    }

    #[test]
    fn bandpass_passes_center_attenuates_far_tone() {
        let sr = 48_000.0;
        let mut bp_mark = Biquad::bandpass(sr, 1200.0, 800.0);
        let mut bp_far = Biquad::bandpass(sr, 1200.0, 800.0);
        let n = 4096;
        let at_center: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 1200.0 * i as f64 / sr).sin() as f32)
            .collect();
        let far: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 6_000.0 * i as f64 / sr).sin() as f32)
            .collect();

        let out_center = bp_mark.process_buffer(&at_center);
        let out_far = bp_far.process_buffer(&far);

        let rms = |v: &[f64]| (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt();
        let rms_center = rms(&out_center[n / 2..]);
        let rms_far = rms(&out_far[n / 2..]);
        assert!(rms_center > rms_far * 2.0);
    }

    #[test]
    fn reset_clears_state() {
        let mut lp = Biquad::lowpass(48_000.0, 600.0);
        lp.process_sample(1.0);
        lp.process_sample(1.0);
        lp.reset();
        assert_eq!(lp.z1, 0.0);
        assert_eq!(lp.z2, 0.0);
    }
}
