//! Bounded sample-block queue between the audio port and the demodulator.
//!
//! Shaped like `bbx_net::buffer`'s producer/consumer handles over
//! `bbx_core::spsc`, but with one deliberate behavioral change: a push
//! against a full queue drops the oldest queued block instead of rejecting
//! the new one. Dropping the oldest-in-favor-of-newest cannot be expressed
//! as a pure SPSC ring buffer (only the consumer is allowed to advance the
//! tail), so this queue is a small `Mutex`-guarded deque instead of a
//! lock-free ring. The audio callback that feeds it must never block
//! indefinitely; a short mutex hold under a single `VecDeque` push is an
//! acceptable trade against the real-time guarantee a lock-free structure
//! would give, since losing a stale block is preferable to losing the
//! newest one -- the demodulator's alignment search tolerates gaps far
//! better than it tolerates falling behind the live signal.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::sample::SampleBlock;

struct Shared {
    blocks: Mutex<VecDeque<SampleBlock>>,
    capacity: usize,
}

/// Create a bound queue of the given capacity.
pub fn sample_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared { blocks: Mutex::new(VecDeque::with_capacity(capacity)), capacity });
    (QueueProducer { shared: Arc::clone(&shared) }, QueueConsumer { shared })
}

/// Producer side of the bounded sample queue. Owned by the audio callback.
#[derive(Clone)]
pub struct QueueProducer {
    shared: Arc<Shared>,
}

impl QueueProducer {
    /// Push a block, dropping the oldest queued block if the queue is full.
    ///
    /// Returns `true` if an older block was dropped to make room.
    pub fn push(&mut self, block: SampleBlock) -> bool {
        let mut blocks = self.shared.blocks.lock().expect("sample queue mutex poisoned");
        let dropped = if blocks.len() >= self.shared.capacity {
            blocks.pop_front();
            true
        } else {
            false
        };
        blocks.push_back(block);
        dropped
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.shared.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.blocks.lock().expect("sample queue mutex poisoned").len()
    }
}

/// Consumer side of the bounded sample queue. Owned by the demodulator thread.
pub struct QueueConsumer {
    shared: Arc<Shared>,
}

impl QueueConsumer {
    pub fn pop(&mut self) -> Option<SampleBlock> {
        self.shared.blocks.lock().expect("sample queue mutex poisoned").pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.shared.blocks.lock().expect("sample queue mutex poisoned").len()
    }

    /// Drain every currently queued block into a single concatenated block,
    /// in arrival order. Used by `receive_until_silence` to gather the full
    /// capture once trailing silence has been detected.
    pub fn drain_into_one(&mut self, sample_rate: u32) -> SampleBlock {
        let mut merged = SampleBlock::silence(0, sample_rate);
        while let Some(block) = self.pop() {
            merged.append(&block);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trip() {
        let (mut p, mut c) = sample_queue(4);
        p.push(SampleBlock::new(vec![1.0], 8_000));
        p.push(SampleBlock::new(vec![2.0], 8_000));
        assert_eq!(c.pop().unwrap().samples, vec![1.0]);
        assert_eq!(c.pop().unwrap().samples, vec![2.0]);
        assert!(c.pop().is_none());
    }

    #[test]
    fn overflow_drops_oldest_not_newest() {
        let (mut p, mut c) = sample_queue(2);
        p.push(SampleBlock::new(vec![1.0], 8_000));
        p.push(SampleBlock::new(vec![2.0], 8_000));
        let dropped = p.push(SampleBlock::new(vec![3.0], 8_000));
        assert!(dropped);
        assert_eq!(c.pop().unwrap().samples, vec![2.0]);
        assert_eq!(c.pop().unwrap().samples, vec![3.0]);
        assert!(c.pop().is_none());
    }

    #[test]
    fn drain_into_one_concatenates_in_order() {
        let (mut p, mut c) = sample_queue(4);
        p.push(SampleBlock::new(vec![1.0, 2.0], 8_000));
        p.push(SampleBlock::new(vec![3.0], 8_000));
        let merged = c.drain_into_one(8_000);
        assert_eq!(merged.samples, vec![1.0, 2.0, 3.0]);
    }
}
