//! Modem configuration: acoustic parameters that both peers must agree on.

/// Parameters shared by the modulator and demodulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModemConfig {
    pub sample_rate: u32,
    pub baud_rate: u32,
    pub mark_freq: f64,
    pub space_freq: f64,
    /// Transmitter amplitude as a fraction of full scale; kept low to avoid
    /// clipping and receiver AGC overshoot.
    pub amplitude: f32,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self { sample_rate: 48_000, baud_rate: 300, mark_freq: 1200.0, space_freq: 2200.0, amplitude: 0.1 }
    }
}

impl ModemConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Samples per bit at this configuration, as a float (exact only when
    /// `sample_rate` divides evenly by `baud_rate`).
    pub fn samples_per_bit(&self) -> f64 {
        self.sample_rate as f64 / self.baud_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_parameters() {
        let cfg = ModemConfig::default();
        assert_eq!(cfg.sample_rate, 48_000);
        assert_eq!(cfg.baud_rate, 300);
        assert_eq!(cfg.samples_per_bit(), 160.0);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = ModemConfig::default().with_sample_rate(44_100).with_baud_rate(600);
        assert_eq!(cfg.sample_rate, 44_100);
        assert_eq!(cfg.baud_rate, 600);
    }
}
