//! The audio port contract and its two implementations: an in-memory
//! loopback port for tests and demos, and a real-hardware `cpal` port.

pub mod config;
#[cfg(feature = "hardware")]
pub mod cpal_port;
pub mod loopback;
pub mod port;

pub use config::AudioConfig;
#[cfg(feature = "hardware")]
pub use cpal_port::CpalAudioPort;
pub use loopback::LoopbackAudioPort;
pub use port::AudioPort;
