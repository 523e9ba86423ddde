//! AFSK modulator and demodulator: the acoustic link's physical layer.

pub mod config;
pub mod demodulator;
pub mod filter;
pub mod modulator;

pub use config::ModemConfig;
pub use demodulator::Demodulator;
pub use modulator::Modulator;
