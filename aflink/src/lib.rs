//! Facade crate re-exporting the acoustic link stack as a single `prelude`.

pub mod prelude {
    pub use aflink_audio::{AudioConfig, AudioPort, LoopbackAudioPort};
    #[cfg(feature = "hardware")]
    pub use aflink_audio::CpalAudioPort;

    pub use aflink_core::{CoreError, SampleBlock};

    pub use aflink_modem::{Demodulator, ModemConfig, Modulator};

    pub use aflink_proto::{
        Frame, FrameKind, Framer, MessageTransport, ProtoError, ReliableTransport, Session, SessionConfig,
        SessionManager, Stats, TransportConfig,
    };
}
