//! Tests for Gateway request/reply and notification behavior
//!
//! A tiny peer on localhost stands in for LiveOSC:
//! - replies on the request address (or a configured one) with canned values
//! - stays silent for addresses it doesn't know
//! - can push unsolicited notifications back to the gateway

use liveosc::{codec, Gateway, GatewayConfig, GatewayError, OscValue};
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

type Reply = (String, Vec<OscValue>);

/// Answers requests from a fixed table, replying to the sender's address.
struct Peer {
    addr: SocketAddr,
    socket: Arc<UdpSocket>,
    stop: Arc<AtomicBool>,
}

impl Peer {
    fn spawn(table: HashMap<&'static str, Reply>) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let (sock, halt) = (Arc::clone(&socket), Arc::clone(&stop));
        thread::spawn(move || {
            let mut buf = vec![0u8; 65_536];
            while !halt.load(Ordering::SeqCst) {
                let Ok((len, from)) = sock.recv_from(&mut buf) else {
                    continue;
                };
                for msg in codec::decode(&buf[..len]).unwrap() {
                    if let Some((reply_addr, args)) = table.get(msg.address.as_str()) {
                        let bytes = codec::encode(reply_addr, args).unwrap();
                        sock.send_to(&bytes, from).unwrap();
                    }
                }
            }
        });

        Self { addr, socket, stop }
    }

    fn push(&self, to: SocketAddr, address: &str, args: Vec<OscValue>) {
        let bytes = codec::encode(address, &args).unwrap();
        self.socket.send_to(&bytes, to).unwrap();
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn gateway_for(remote: SocketAddr, timeout: Duration) -> Gateway {
    let config = GatewayConfig::new("test", remote, "127.0.0.1:0".parse().unwrap())
        .with_timeout(timeout);
    Gateway::connect(config).unwrap()
}

fn unused_port() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}

#[test]
fn test_request_returns_full_reply() {
    let mut table = HashMap::new();
    table.insert(
        "/live/volume",
        ("/live/volume".to_string(), vec![OscValue::Int(2), OscValue::Float(0.85)]),
    );
    let peer = Peer::spawn(table);
    let gateway = gateway_for(peer.addr, Duration::from_secs(1));

    let reply = gateway
        .request("/live/volume", vec![OscValue::Int(2)])
        .unwrap();
    assert_eq!(reply, vec![OscValue::Int(2), OscValue::Float(0.85)]);
}

#[test]
fn test_request_with_distinct_response_address() {
    let mut table = HashMap::new();
    table.insert(
        "/live/device",
        (
            "/live/device/allparam".to_string(),
            vec![OscValue::Int(0), OscValue::Int(0), OscValue::Int(1), OscValue::Float(0.5), OscValue::Str("Drive".into())],
        ),
    );
    let peer = Peer::spawn(table);
    let gateway = gateway_for(peer.addr, Duration::from_secs(1));

    let reply = gateway
        .request_with(
            "/live/device",
            vec![OscValue::Int(0), OscValue::Int(0)],
            "/live/device/allparam",
            Duration::from_secs(1),
        )
        .unwrap();
    assert_eq!(reply.len(), 5);
    assert_eq!(reply[4].as_str(), Some("Drive"));
}

/// Nothing listening: the request must give up close to its timeout
#[test]
fn test_unreachable_remote_times_out_promptly() {
    let gateway = gateway_for(unused_port(), Duration::from_millis(100));

    let start = Instant::now();
    let result = gateway.request("/live/tempo", vec![]);
    let elapsed = start.elapsed();

    match result {
        Err(e) => assert!(e.is_connection(), "unexpected error {:?}", e),
        Ok(v) => panic!("got a reply from nobody: {:?}", v),
    }
    assert!(
        elapsed < Duration::from_millis(600),
        "request took {:?} with a 100ms timeout",
        elapsed
    );
    assert_eq!(gateway.stats().timeouts, 1);
}

#[test]
fn test_second_request_on_same_address_is_rejected() {
    let silent = Peer::spawn(HashMap::new());
    let gateway = Arc::new(gateway_for(silent.addr, Duration::from_millis(300)));

    let first = {
        let gateway = Arc::clone(&gateway);
        thread::spawn(move || gateway.request("/live/tempo", vec![]))
    };
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    let second = gateway.request("/live/tempo", vec![]);
    assert!(matches!(second, Err(GatewayError::RequestPending { .. })));
    assert!(start.elapsed() < Duration::from_millis(100));

    assert!(matches!(
        first.join().unwrap(),
        Err(GatewayError::Timeout { .. })
    ));

    // slot is free again once the first request gave up
    let third = gateway.request_with(
        "/live/tempo",
        vec![],
        "/live/tempo",
        Duration::from_millis(20),
    );
    assert!(matches!(third, Err(GatewayError::Timeout { .. })));
}

#[test]
fn test_different_addresses_may_overlap() {
    let mut table = HashMap::new();
    table.insert("/live/tempo", ("/live/tempo".to_string(), vec![OscValue::Float(120.0)]));
    let peer = Peer::spawn(table);
    let gateway = Arc::new(gateway_for(peer.addr, Duration::from_millis(300)));

    let waiting = {
        let gateway = Arc::clone(&gateway);
        thread::spawn(move || gateway.request("/live/never", vec![]))
    };
    thread::sleep(Duration::from_millis(20));

    let tempo = gateway.request("/live/tempo", vec![]).unwrap();
    assert_eq!(tempo, vec![OscValue::Float(120.0)]);
    assert!(waiting.join().unwrap().is_err());
}

#[test]
fn test_notifications_reach_handlers() {
    let peer = Peer::spawn(HashMap::new());
    let gateway = gateway_for(peer.addr, Duration::from_secs(1));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    gateway.add_handler("/live/clip/info", move |args| s.lock().unwrap().push(args.to_vec()));

    let local = gateway.local_addr().unwrap();
    peer.push(
        local,
        "/live/clip/info",
        vec![OscValue::Int(1), OscValue::Int(0), OscValue::Int(2)],
    );

    let deadline = Instant::now() + Duration::from_secs(1);
    while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec![vec![OscValue::Int(1), OscValue::Int(0), OscValue::Int(2)]]
    );
}

#[test]
fn test_garbage_datagrams_are_counted_and_ignored() {
    let peer = Peer::spawn(HashMap::new());
    let gateway = gateway_for(peer.addr, Duration::from_secs(1));
    let local = gateway.local_addr().unwrap();

    peer.socket.send_to(b"\x00\x01 definitely not OSC", local).unwrap();

    let deadline = Instant::now() + Duration::from_secs(1);
    while gateway.stats().undecodable == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(gateway.stats().undecodable, 1);
    assert!(gateway.is_running());
}
