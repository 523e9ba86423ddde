//! Sends a short text message peer-to-peer over loopback audio, end to end
//! through the session, transport, framer, and modem layers.

use std::time::Duration;

use aflink::prelude::*;
use aflink_audio::LoopbackAudioPort;

fn main() {
    let modem_config = ModemConfig::default();
    let (mut port_a, mut port_b) = LoopbackAudioPort::new_pair(modem_config.sample_rate, 64);
    port_a.start().expect("loopback port always starts");
    port_b.start().expect("loopback port always starts");

    let framer_a = Framer::new(port_a, Modulator::new(modem_config), Demodulator::new(modem_config));
    let framer_b = Framer::new(port_b, Modulator::new(modem_config), Demodulator::new(modem_config));

    let transport_a = ReliableTransport::new(framer_a, TransportConfig::default());
    let transport_b = ReliableTransport::new(framer_b, TransportConfig::default());

    let session_config = SessionConfig::default();
    let mut session_a = Session::new(transport_a, session_config);
    let mut session_b = Session::new(transport_b, session_config);

    let server = std::thread::spawn(move || {
        session_b.accept().expect("accept should reach ESTABLISHED");
        let received = session_b.receive(Duration::from_secs(5)).expect("receive should not error");
        println!("server received: {:?}", received.map(|b| String::from_utf8_lossy(&b).into_owned()));
        session_b.close().expect("close should complete");
    });

    session_a.connect().expect("connect should reach ESTABLISHED");
    session_a.send(b"hello over acoustic link").expect("send should succeed");
    session_a.close().expect("close should complete");

    server.join().expect("server thread should not panic");
}
