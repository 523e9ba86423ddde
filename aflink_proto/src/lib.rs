//! Frame format, frame I/O, Stop-and-Wait ARQ transport, and the session
//! handshake: layers L2 through L4 of the acoustic link.

pub mod error;
pub mod frame;
pub mod framer;
pub mod session;
pub mod transport;

pub use error::{ProtoError, Result};
pub use frame::{Frame, FrameError, FrameKind, MAX_PAYLOAD_SIZE};
pub use framer::Framer;
pub use session::{Session, SessionConfig, SessionManager, SessionId, SessionState};
pub use transport::{MessageTransport, ReliableTransport, Stats, TransportConfig};
