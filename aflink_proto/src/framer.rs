//! Frame I/O: wraps the modulator/demodulator with a small reorder queue so
//! concurrent logical waits can each find the frame they're looking for.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use aflink_audio::AudioPort;
use aflink_modem::{Demodulator, Modulator};

use crate::frame::{Frame, FrameKind};

/// Half-duplex turnaround delay observed before every transmit.
const TX_DELAY: Duration = Duration::from_millis(50);

/// Sends and receives frames over an audio port, with a reorder queue for
/// frames that arrive while something else is waiting on a different kind
/// or sequence number.
pub struct Framer<P: AudioPort> {
    port: P,
    modulator: Modulator,
    demodulator: Demodulator,
    reorder_queue: VecDeque<Frame>,
}

impl<P: AudioPort> Framer<P> {
    pub fn new(port: P, modulator: Modulator, demodulator: Demodulator) -> Self {
        Self { port, modulator, demodulator, reorder_queue: VecDeque::new() }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Encode and transmit one frame, observing the half-duplex turnaround
    /// delay first.
    pub fn send_frame(&mut self, frame: &Frame) -> aflink_core::Result<()> {
        std::thread::sleep(TX_DELAY);
        let block = self.modulator.modulate(&frame.encode());
        self.port.transmit(&block, true)
    }

    /// Drain one item from the reorder queue if present; otherwise listen
    /// until silence and attempt to decode a frame.
    pub fn receive_frame(&mut self, timeout: Duration) -> Option<Frame> {
        if let Some(frame) = self.reorder_queue.pop_front() {
            return Some(frame);
        }

        let block = self.port.receive_until_silence(0.02, 160, 0.3, timeout).ok()?;
        if block.is_empty() {
            return None;
        }
        let bytes = self.demodulator.demodulate(&block.samples);
        if bytes.is_empty() {
            return None;
        }
        Frame::decode(&bytes).ok()
    }

    /// Receive frames until one matches `expected_kind`/`expected_seq` (when
    /// given) or `timeout` elapses. Non-matching frames are pushed back onto
    /// the reorder queue, preserving arrival order for the next consumer.
    pub fn wait_for_frame(
        &mut self,
        expected_kind: Option<FrameKind>,
        expected_seq: Option<u16>,
        timeout: Duration,
    ) -> Option<Frame> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let frame = match self.receive_frame(remaining) {
                Some(frame) => frame,
                None => continue,
            };
            if frame_matches(&frame, expected_kind, expected_seq) {
                return Some(frame);
            }
            self.reorder_queue.push_back(frame);
        }
    }
}

fn frame_matches(frame: &Frame, expected_kind: Option<FrameKind>, expected_seq: Option<u16>) -> bool {
    if let Some(kind) = expected_kind {
        if frame.kind != kind {
            return false;
        }
    }
    if let Some(seq) = expected_seq {
        if frame.sequence != seq {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use aflink_audio::LoopbackAudioPort;
    use aflink_modem::ModemConfig;

    fn make_framer() -> Framer<LoopbackAudioPort> {
        let config = ModemConfig::default();
        let port = LoopbackAudioPort::new_self_paired(config.sample_rate, 1024);
        Framer::new(port, Modulator::new(config), Demodulator::new(config))
    }

    #[test]
    fn send_then_receive_round_trip() {
        let mut framer = make_framer();
        framer.port_mut().start().unwrap();
        let frame = Frame::data(1, b"hi".to_vec()).unwrap();
        framer.send_frame(&frame).unwrap();
        let received = framer.receive_frame(Duration::from_millis(500));
        assert_eq!(received, Some(frame));
    }

    #[test]
    fn non_matching_frames_are_requeued_in_order() {
        let mut framer = make_framer();
        framer.port_mut().start().unwrap();

        let ack = Frame::ack(5);
        let data = Frame::data(1, b"x".to_vec()).unwrap();
        framer.send_frame(&ack).unwrap();
        framer.send_frame(&data).unwrap();

        let found = framer.wait_for_frame(Some(FrameKind::Data), None, Duration::from_millis(500));
        assert_eq!(found, Some(data));

        // the ack that was skipped over should still be waiting, in order
        let leftover = framer.receive_frame(Duration::from_millis(10));
        assert_eq!(leftover, Some(ack));
    }
}
