//! Foundational primitives shared by every layer of the acoustic link:
//! sample blocks, the bounded audio queue, and common error types.

pub mod error;
pub mod math;
pub mod queue;
pub mod sample;
pub mod spsc;

pub use error::{CoreError, Result};
pub use queue::{sample_queue, QueueConsumer, QueueProducer};
pub use sample::SampleBlock;
