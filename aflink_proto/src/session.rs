//! Three-way-handshake session layer on top of the ARQ transport.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use aflink_audio::AudioPort;

use crate::error::{ProtoError, Result};
use crate::frame::FrameKind;
use crate::transport::ReliableTransport;

/// Session handshake/close configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub handshake_retries: u32,
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(8),
            handshake_retries: 5,
            close_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    SynSent,
    SynReceived,
    Established,
    FinWait,
    CloseWait,
    LastAck,
    TimeWait,
}

/// A session FSM driving one [`ReliableTransport`].
pub struct Session<P: AudioPort> {
    transport: ReliableTransport<P>,
    config: SessionConfig,
    state: SessionState,
}

impl<P: AudioPort> Session<P> {
    pub fn new(transport: ReliableTransport<P>, config: SessionConfig) -> Self {
        Self { transport, config, state: SessionState::Closed }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Active open: send SYN, retry on timeout, transition to ESTABLISHED
    /// on a matching SYN-ACK.
    pub fn connect(&mut self) -> Result<()> {
        use crate::frame::Frame;

        self.state = SessionState::SynSent;
        let deadline = Instant::now() + self.config.connect_timeout;

        for _attempt in 0..=self.config.handshake_retries {
            if Instant::now() >= deadline {
                break;
            }
            let seq = self.transport.tx_seq();
            self.transport.framer_mut().send_frame(&Frame::syn(seq))?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            let per_try_timeout = remaining.min(self.config.connect_timeout / (self.config.handshake_retries + 1).max(1));
            if let Some(frame) = self.transport.framer_mut().wait_for_frame(None, None, per_try_timeout) {
                if frame.kind == FrameKind::SynAck {
                    self.transport.framer_mut().send_frame(&Frame::ack(frame.sequence))?;
                    self.transport.reset();
                    self.state = SessionState::Established;
                    return Ok(());
                }
                if frame.kind == FrameKind::Rst {
                    self.state = SessionState::Closed;
                    return Err(ProtoError::HandshakeFailed);
                }
            }
        }

        self.state = SessionState::Closed;
        Err(ProtoError::HandshakeFailed)
    }

    /// Passive open: wait for SYN, reply SYN-ACK, transition to ESTABLISHED
    /// on a matching ACK.
    pub fn accept(&mut self) -> Result<()> {
        use crate::frame::Frame;

        let deadline = Instant::now() + self.config.connect_timeout;

        for _attempt in 0..=self.config.handshake_retries {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if self.transport.framer_mut().wait_for_frame(Some(FrameKind::Syn), None, remaining).is_none() {
                continue;
            }

            self.state = SessionState::SynReceived;
            let seq = self.transport.tx_seq();
            self.transport.framer_mut().send_frame(&Frame::syn_ack(seq))?;

            let ack_remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(ack) = self.transport.framer_mut().wait_for_frame(Some(FrameKind::Ack), None, ack_remaining) {
                let _ = ack;
                self.transport.reset();
                self.state = SessionState::Established;
                return Ok(());
            }
        }

        self.state = SessionState::Closed;
        Err(ProtoError::HandshakeFailed)
    }

    /// Send on the established transport.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.state != SessionState::Established {
            return Err(ProtoError::NotConnected);
        }
        self.transport.send(data)
    }

    /// Receive on the established transport.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if self.state != SessionState::Established {
            return Err(ProtoError::NotConnected);
        }
        match self.transport.receive(timeout) {
            Ok(payload) => Ok(payload),
            Err(ProtoError::PeerFin) => {
                // transits CLOSE_WAIT -> CLOSED; the transport has already
                // ACKed the FIN, so there is nothing left to do in between.
                self.state = SessionState::Closed;
                Err(ProtoError::PeerFin)
            }
            Err(ProtoError::PeerRst) => {
                self.state = SessionState::Closed;
                Err(ProtoError::PeerRst)
            }
            Err(err) => Err(err),
        }
    }

    /// Graceful close: FIN, wait for ACK, CLOSED either way.
    pub fn close(&mut self) -> Result<()> {
        if self.state != SessionState::Established {
            self.state = SessionState::Closed;
            return Ok(());
        }
        self.state = SessionState::FinWait;
        let result = self.transport.close();
        self.state = SessionState::Closed;
        result
    }

    /// Hard reset: send RST, immediately CLOSED.
    pub fn reset(&mut self) -> Result<()> {
        use crate::frame::Frame;
        let seq = self.transport.tx_seq();
        let _ = self.transport.framer_mut().send_frame(&Frame::rst(seq));
        self.state = SessionState::Closed;
        Ok(())
    }
}

/// Identifies one of several sessions multiplexed over a single physical
/// channel. No addressing is implied beyond bookkeeping: only one session
/// is ever ESTABLISHED and actively exchanging frames at a time, matching
/// the half-duplex, single-peer-pair model.
pub type SessionId = u64;

/// Tracks multiple sessions created against the same underlying transport
/// construction parameters, supplementing the single-session description
/// with the bookkeeping a host application needs to juggle connect/accept
/// cycles without hand-rolling an id scheme.
pub struct SessionManager<P: AudioPort> {
    sessions: HashMap<SessionId, Session<P>>,
    next_id: SessionId,
}

impl<P: AudioPort> Default for SessionManager<P> {
    fn default() -> Self {
        Self { sessions: HashMap::new(), next_id: 0 }
    }
}

impl<P: AudioPort> SessionManager<P> {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, session: Session<P>) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(id, session);
        id
    }

    pub fn create_session(&mut self, transport: ReliableTransport<P>, config: SessionConfig) -> SessionId {
        self.insert(Session::new(transport, config))
    }

    /// Create a session and immediately drive it through `connect()`.
    pub fn create_client_session(&mut self, transport: ReliableTransport<P>, config: SessionConfig) -> Result<SessionId> {
        let mut session = Session::new(transport, config);
        session.connect()?;
        Ok(self.insert(session))
    }

    /// Create a session and immediately drive it through `accept()`.
    pub fn accept_server_session(&mut self, transport: ReliableTransport<P>, config: SessionConfig) -> Result<SessionId> {
        let mut session = Session::new(transport, config);
        session.accept()?;
        Ok(self.insert(session))
    }

    pub fn get_session(&mut self, id: SessionId) -> Option<&mut Session<P>> {
        self.sessions.get_mut(&id)
    }

    pub fn close_all(&mut self) {
        for session in self.sessions.values_mut() {
            let _ = session.close();
        }
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aflink_audio::LoopbackAudioPort;
    use aflink_modem::{Demodulator, ModemConfig, Modulator};
    use crate::framer::Framer;
    use crate::transport::TransportConfig;

    fn make_session_pair() -> (Session<LoopbackAudioPort>, Session<LoopbackAudioPort>) {
        let config = ModemConfig::default();
        let (port_a, port_b) = LoopbackAudioPort::new_pair(config.sample_rate, 32);
        let mut framer_a = Framer::new(port_a, Modulator::new(config), Demodulator::new(config));
        let mut framer_b = Framer::new(port_b, Modulator::new(config), Demodulator::new(config));
        framer_a.port_mut().start().unwrap();
        framer_b.port_mut().start().unwrap();

        let tcfg = TransportConfig::default().with_timeout(Duration::from_millis(300));
        let scfg = SessionConfig {
            connect_timeout: Duration::from_secs(3),
            handshake_retries: 5,
            close_timeout: Duration::from_secs(1),
        };
        (
            Session::new(ReliableTransport::new(framer_a, tcfg), scfg),
            Session::new(ReliableTransport::new(framer_b, tcfg), scfg),
        )
    }

    #[test]
    fn concurrent_connect_and_accept_reach_established() {
        let (mut a, mut b) = make_session_pair();

        let connector = std::thread::spawn(move || {
            a.connect().unwrap();
            a
        });
        b.accept().unwrap();
        let a = connector.join().unwrap();

        assert!(a.is_established());
        assert!(b.is_established());
        assert_eq!(a.transport.tx_seq(), 0);
        assert_eq!(b.transport.rx_seq(), 0);
    }

    #[test]
    fn send_before_connect_is_not_connected() {
        let (mut a, _b) = make_session_pair();
        assert_eq!(a.send(b"hi"), Err(ProtoError::NotConnected));
    }
}
