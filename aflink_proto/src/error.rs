//! Error types for frame I/O, transport, and session layers.

use std::fmt;

/// Errors surfaced above the framer. Per the propagation policy, physical
/// and framing failures are absorbed as "no frame" and never reach here;
/// this enum covers only transport- and session-level outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtoError {
    /// The ARQ transport exhausted its retries without an ACK.
    SendFailed,
    /// The peer sent RST.
    PeerRst,
    /// The peer sent FIN (graceful close).
    PeerFin,
    /// The session did not reach ESTABLISHED within `handshake_retries`.
    HandshakeFailed,
    /// The operation requires an ESTABLISHED session.
    NotConnected,
    /// The underlying audio port is unavailable.
    AudioUnavailable,
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoError::SendFailed => write!(f, "send failed: retries exhausted"),
            ProtoError::PeerRst => write!(f, "connection reset by peer"),
            ProtoError::PeerFin => write!(f, "connection closed by peer"),
            ProtoError::HandshakeFailed => write!(f, "handshake did not complete"),
            ProtoError::NotConnected => write!(f, "session is not established"),
            ProtoError::AudioUnavailable => write!(f, "audio port unavailable"),
        }
    }
}

impl std::error::Error for ProtoError {}

impl From<aflink_core::CoreError> for ProtoError {
    fn from(err: aflink_core::CoreError) -> Self {
        match err {
            aflink_core::CoreError::AudioUnavailable => ProtoError::AudioUnavailable,
            aflink_core::CoreError::NotRunning => ProtoError::AudioUnavailable,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
