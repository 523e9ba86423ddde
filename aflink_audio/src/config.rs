//! Audio port configuration.

/// Configuration knobs recognized by every `AudioPort` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioConfig {
    pub input_device: Option<usize>,
    pub output_device: Option<usize>,
    pub sample_rate: u32,
    pub block_size: usize,
    /// Bypass hardware entirely: sent buffers appear as received blocks.
    pub loopback: bool,
    /// In loopback mode, also play to the speaker.
    pub audible: bool,
}

impl AudioConfig {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate, block_size: 1024, ..Default::default() }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    pub fn with_audible(mut self, audible: bool) -> Self {
        self.audible = audible;
        self
    }

    pub fn with_input_device(mut self, index: usize) -> Self {
        self.input_device = Some(index);
        self
    }

    pub fn with_output_device(mut self, index: usize) -> Self {
        self.output_device = Some(index);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_default_block_size() {
        let cfg = AudioConfig::new(48_000);
        assert_eq!(cfg.sample_rate, 48_000);
        assert_eq!(cfg.block_size, 1024);
        assert!(!cfg.loopback);
    }

    #[test]
    fn builders_override_fields() {
        let cfg = AudioConfig::new(44_100).with_loopback(true).with_audible(true).with_block_size(512);
        assert!(cfg.loopback);
        assert!(cfg.audible);
        assert_eq!(cfg.block_size, 512);
    }
}
