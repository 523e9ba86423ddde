//! The audio port contract: what the protocol stack consumes from L0.

use std::time::Duration;

use aflink_core::{Result, SampleBlock};

/// Deliver mono float sample blocks from a microphone; play a buffer to a
/// speaker; report the device's native sample rate.
///
/// Mirrors `bbx_player::backend::Backend` in shape: an object-safe, `Send`
/// trait with swappable implementations rather than one monolithic audio
/// struct.
pub trait AudioPort: Send {
    /// Open streams. Fails with `AudioUnavailable` if the host has no
    /// usable driver.
    fn start(&mut self) -> Result<()>;

    /// Close streams. Idempotent.
    fn stop(&mut self) -> Result<()>;

    /// The device's actual operating sample rate, which may differ from a
    /// requested configuration value.
    fn native_sample_rate(&self) -> u32;

    /// Play `block`. While transmitting, and for a short guard interval
    /// after, the input side must discard received samples to suppress
    /// self-echo. The input queue is cleared at both the start and the end
    /// of the call. If `blocking`, returns only once playback completes.
    fn transmit(&mut self, block: &SampleBlock, blocking: bool) -> Result<()>;

    /// Accumulate input blocks until a signal is detected (some block's RMS
    /// exceeds `2 * threshold`) and then trails into `silence_duration`
    /// seconds below `threshold`, or until `timeout` elapses.
    fn receive_until_silence(
        &mut self,
        threshold: f32,
        min_samples: usize,
        silence_duration: f64,
        timeout: Duration,
    ) -> Result<SampleBlock>;

    /// Drain the input queue without returning its contents.
    fn clear_input(&mut self);
}
