//! In-memory audio port: transmitted buffers are deposited directly into a
//! peer's input queue, with no real hardware involved. Used by every test
//! and by the demo binary's loopback mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aflink_core::{sample_queue, CoreError, QueueConsumer, QueueProducer, Result, SampleBlock};

/// Short guard interval after transmit during which received samples are
/// discarded, suppressing self-echo on a shared physical channel.
const ECHO_GUARD: Duration = Duration::from_millis(80);

/// Loopback implementation of [`crate::AudioPort`].
pub struct LoopbackAudioPort {
    sample_rate: u32,
    tx: QueueProducer,
    rx: QueueConsumer,
    running: bool,
    transmitting: Arc<AtomicBool>,
    audible: bool,
    #[cfg(feature = "hardware")]
    playback: Option<rodio::OutputStreamHandle>,
    #[cfg(feature = "hardware")]
    _stream: Option<rodio::OutputStream>,
}

impl LoopbackAudioPort {
    /// Create a port whose own transmissions loop back to its own receiver.
    /// Useful for single-endpoint tests of the frame/ARQ layers.
    pub fn new_self_paired(sample_rate: u32, queue_capacity: usize) -> Self {
        let (tx, rx) = sample_queue(queue_capacity);
        Self::from_parts(sample_rate, tx, rx)
    }

    /// Create a cross-wired pair: `a`'s transmissions arrive on `b`'s
    /// receiver and vice versa, modeling two peers sharing an acoustic
    /// channel.
    pub fn new_pair(sample_rate: u32, queue_capacity: usize) -> (Self, Self) {
        let (tx_ab, rx_ab) = sample_queue(queue_capacity);
        let (tx_ba, rx_ba) = sample_queue(queue_capacity);
        (Self::from_parts(sample_rate, tx_ab, rx_ba), Self::from_parts(sample_rate, tx_ba, rx_ab))
    }

    fn from_parts(sample_rate: u32, tx: QueueProducer, rx: QueueConsumer) -> Self {
        Self {
            sample_rate,
            tx,
            rx,
            running: false,
            transmitting: Arc::new(AtomicBool::new(false)),
            audible: false,
            #[cfg(feature = "hardware")]
            playback: None,
            #[cfg(feature = "hardware")]
            _stream: None,
        }
    }

    pub fn set_audible(&mut self, audible: bool) {
        self.audible = audible;
        #[cfg(feature = "hardware")]
        if audible && self.playback.is_none() {
            if let Ok((stream, handle)) = rodio::OutputStream::try_default() {
                self._stream = Some(stream);
                self.playback = Some(handle);
            }
        }
    }

}

impl crate::AudioPort for LoopbackAudioPort {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.clear_input();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn native_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn transmit(&mut self, block: &SampleBlock, blocking: bool) -> Result<()> {
        if !self.running {
            return Err(CoreError::NotRunning);
        }

        self.clear_input();
        self.transmitting.store(true, Ordering::Release);

        self.tx.push(block.clone());

        #[cfg(feature = "hardware")]
        if self.audible {
            if let Some(handle) = &self.playback {
                let source = rodio::buffer::SamplesBuffer::new(1, self.sample_rate, block.samples.clone());
                let _ = handle.play_raw(rodio::Source::convert_samples(source));
            }
        }

        if blocking {
            let duration_secs = block.len() as f64 / self.sample_rate as f64;
            std::thread::sleep(Duration::from_secs_f64(duration_secs));
        }

        self.transmitting.store(false, Ordering::Release);
        std::thread::sleep(ECHO_GUARD);
        self.clear_input();
        Ok(())
    }

    fn receive_until_silence(
        &mut self,
        threshold: f32,
        min_samples: usize,
        silence_duration: f64,
        timeout: Duration,
    ) -> Result<SampleBlock> {
        if !self.running {
            return Err(CoreError::NotRunning);
        }

        let deadline = Instant::now() + timeout;
        let mut merged = SampleBlock::silence(0, self.sample_rate);
        let mut signal_detected = false;
        let mut last_activity = Instant::now();
        let quiet_window = Duration::from_secs_f64(silence_duration);

        loop {
            if Instant::now() >= deadline {
                break;
            }
            match self.rx.pop() {
                Some(block) => {
                    if block.rms() > 2.0 * threshold {
                        signal_detected = true;
                    }
                    merged.append(&block);
                    last_activity = Instant::now();
                }
                None => {
                    if signal_detected && last_activity.elapsed() >= quiet_window {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
            }
        }

        if merged.len() < min_samples && !signal_detected {
            return Ok(SampleBlock::silence(0, self.sample_rate));
        }
        Ok(merged)
    }

    fn clear_input(&mut self) {
        while self.rx.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioPort;

    #[test]
    fn self_paired_loopback_receives_what_it_sent() {
        let mut port = LoopbackAudioPort::new_self_paired(8_000, 16);
        port.start().unwrap();
        let block = SampleBlock::new(vec![1.0; 4_000], 8_000);
        port.transmit(&block, true).unwrap();
        let received = port.receive_until_silence(0.1, 10, 0.05, Duration::from_millis(500)).unwrap();
        assert!(!received.is_empty());
    }

    #[test]
    fn cross_wired_pair_routes_to_the_other_peer() {
        let (mut a, mut b) = LoopbackAudioPort::new_pair(8_000, 16);
        a.start().unwrap();
        b.start().unwrap();

        let block = SampleBlock::new(vec![0.5; 2_000], 8_000);
        a.transmit(&block, true).unwrap();

        let received = b.receive_until_silence(0.05, 10, 0.05, Duration::from_millis(500)).unwrap();
        assert!(!received.is_empty());

        // a's own receiver should not see its own transmission
        let own = a.receive_until_silence(0.05, 10, 0.01, Duration::from_millis(50)).unwrap();
        assert!(own.is_empty());
    }

    #[test]
    fn transmit_without_start_fails() {
        let mut port = LoopbackAudioPort::new_self_paired(8_000, 16);
        let block = SampleBlock::silence(100, 8_000);
        assert_eq!(port.transmit(&block, false), Err(CoreError::NotRunning));
    }
}
