//! Blocking OSC gateway to LiveOSC.
//!
//! Architecture:
//! - One UDP socket, bound to the port LiveOSC replies to; outbound messages
//!   leave from the same socket
//! - One listener thread per gateway decodes inbound datagrams and dispatches
//!   them: registered handlers first, then a waiting request, then the beat
//!   and startup callback slots
//! - Requests block the calling thread on a one-shot channel polled in short
//!   steps until the reply lands or the deadline passes
//!
//! LiveOSC replies carry no request id. A reply is matched to its request by
//! address alone, so only one request per reply address may be outstanding.
//!
//! Usage:
//! ```ignore
//! let gateway = Gateway::connect(GatewayConfig::from_config(&config)?)?;
//! let tempo = gateway.request("/live/tempo", vec![])?;
//! gateway.send("/live/play", vec![])?;
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use liveconf::LiveConfig;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Message};
use crate::error::{GatewayError, Result};
use crate::value::OscValue;

/// LiveOSC pushes this on every beat, with the beat count as its argument.
pub const BEAT_ADDRESS: &str = "/live/beat";

/// LiveOSC pushes this once when the control surface comes up.
pub const STARTUP_ADDRESS: &str = "/live/startup";

/// How long the listener blocks in `recv` before re-checking for shutdown.
const LISTEN_TICK: Duration = Duration::from_millis(50);

/// Largest datagram we accept. Track-name blocks can be long.
const MAX_DATAGRAM: usize = 65_536;

/// Callback for a notification address.
pub type Handler = Arc<dyn Fn(&[OscValue]) + Send + Sync>;

/// What to run when a beat notification arrives.
pub enum BeatCallback {
    /// Called with no arguments.
    Tick(Box<dyn Fn() + Send + Sync>),
    /// Called with the beat count.
    Count(Box<dyn Fn(i32) + Send + Sync>),
}

impl BeatCallback {
    pub fn tick<F: Fn() + Send + Sync + 'static>(f: F) -> Self {
        BeatCallback::Tick(Box::new(f))
    }

    pub fn count<F: Fn(i32) + Send + Sync + 'static>(f: F) -> Self {
        BeatCallback::Count(Box::new(f))
    }

    fn invoke(&self, args: &[OscValue]) {
        match self {
            BeatCallback::Tick(f) => f(),
            BeatCallback::Count(f) => match args.first().and_then(OscValue::as_i32) {
                Some(beat) => f(beat),
                None => trace!("beat without a count, skipping counting callback"),
            },
        }
    }
}

/// Configuration for a gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Name used in log lines.
    pub name: String,
    /// Where LiveOSC listens.
    pub remote: SocketAddr,
    /// Local address to bind; LiveOSC sends replies here.
    pub listen: SocketAddr,
    /// Default request timeout.
    pub timeout: Duration,
    /// Step between checks while blocked.
    pub poll_interval: Duration,
}

impl GatewayConfig {
    pub fn new(name: &str, remote: SocketAddr, listen: SocketAddr) -> Self {
        Self {
            name: name.to_string(),
            remote,
            listen,
            timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Build from loaded configuration, resolving the remote host.
    pub fn from_config(config: &LiveConfig) -> Result<Self> {
        let target = format!("{}:{}", config.osc.host, config.osc.send_port);
        let remote = target
            .to_socket_addrs()
            .map_err(|_| GatewayError::Resolve(target.clone()))?
            .next()
            .ok_or_else(|| GatewayError::Resolve(target.clone()))?;
        let listen = SocketAddr::from(([0, 0, 0, 0], config.osc.listen_port));

        Ok(Self::new("liveosc", remote, listen)
            .with_timeout(config.timeout())
            .with_poll_interval(config.poll_interval()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }
}

/// Traffic counters.
#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    timeouts: AtomicU64,
    undecodable: AtomicU64,
}

/// Point-in-time copy of the gateway counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub sent: u64,
    pub received: u64,
    pub timeouts: u64,
    pub undecodable: u64,
}

struct PendingRequest {
    ticket: u64,
    reply_tx: Sender<Vec<OscValue>>,
}

type StartupCallback = Arc<dyn Fn() + Send + Sync>;
type Monitor = Arc<dyn Fn(&Message) + Send + Sync>;

/// State shared between callers and the listener thread.
struct Shared {
    name: String,
    socket: UdpSocket,
    remote: SocketAddr,
    running: AtomicBool,
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    beat: Mutex<Option<Arc<BeatCallback>>>,
    startup: Mutex<Option<StartupCallback>>,
    monitor: Mutex<Option<Monitor>>,
    next_ticket: AtomicU64,
    counters: Counters,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn dispatch(&self, message: Message) {
        trace!("{}: <- {} {:?}", self.name, message.address, message.args);

        let monitor = lock(&self.monitor).clone();
        if let Some(monitor) = monitor {
            monitor(&message);
        }

        let handlers = lock(&self.handlers).get(&message.address).cloned();
        for handler in handlers.iter().flatten() {
            handler(&message.args);
        }

        if let Some(pending) = lock(&self.pending).remove(&message.address) {
            // bounded(1) and removed from the map, so this is the only send
            let _ = pending.reply_tx.try_send(message.args.clone());
        }

        if message.address == BEAT_ADDRESS {
            let callback = lock(&self.beat).clone();
            if let Some(callback) = callback {
                callback.invoke(&message.args);
            }
        } else if message.address == STARTUP_ADDRESS {
            let callback = lock(&self.startup).clone();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    fn listen(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        debug!("{}: listener started on {:?}", self.name, self.socket.local_addr());

        while self.running.load(Ordering::SeqCst) {
            let len = match self.socket.recv_from(&mut buf) {
                Ok((len, _from)) => len,
                Err(e) => {
                    match e.kind() {
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {}
                        // ICMP port-unreachable from an earlier send; Live just isn't there
                        std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::ConnectionReset => {
                            trace!("{}: remote unreachable: {}", self.name, e);
                        }
                        _ => {
                            warn!("{}: recv failed: {}", self.name, e);
                            thread::sleep(LISTEN_TICK);
                        }
                    }
                    continue;
                }
            };

            self.counters.received.fetch_add(1, Ordering::Relaxed);
            match codec::decode(&buf[..len]) {
                Ok(messages) => {
                    for message in messages {
                        self.dispatch(message);
                    }
                }
                Err(e) => {
                    self.counters.undecodable.fetch_add(1, Ordering::Relaxed);
                    debug!("{}: dropping undecodable datagram ({} bytes): {}", self.name, len, e);
                }
            }
        }

        // Wake anyone still waiting
        lock(&self.pending).clear();
        debug!("{}: listener stopped", self.name);
    }
}

/// Removes a pending slot when its request finishes, unless the slot has
/// already been consumed and reused by a later request.
struct PendingGuard<'a> {
    shared: &'a Shared,
    address: &'a str,
    ticket: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = lock(&self.shared.pending);
        if pending.get(self.address).map(|p| p.ticket) == Some(self.ticket) {
            pending.remove(self.address);
        }
    }
}

/// OSC endpoint talking to one LiveOSC instance.
pub struct Gateway {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
    poll_interval: Duration,
}

impl Gateway {
    /// Bind the listen socket and start the listener thread.
    pub fn connect(config: GatewayConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.listen).map_err(|e| GatewayError::Bind {
            addr: config.listen,
            source: e,
        })?;
        socket
            .set_read_timeout(Some(LISTEN_TICK))
            .map_err(|e| GatewayError::Bind {
                addr: config.listen,
                source: e,
            })?;

        let shared = Arc::new(Shared {
            name: config.name.clone(),
            socket,
            remote: config.remote,
            running: AtomicBool::new(true),
            handlers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            beat: Mutex::new(None),
            startup: Mutex::new(None),
            monitor: Mutex::new(None),
            next_ticket: AtomicU64::new(1),
            counters: Counters::default(),
        });

        let worker = Arc::clone(&shared);
        let listener = thread::Builder::new()
            .name(format!("{}-listener", config.name))
            .spawn(move || worker.listen())
            .map_err(|e| GatewayError::Bind {
                addr: config.listen,
                source: e,
            })?;

        info!(
            "{}: listening on {:?}, sending to {}",
            config.name,
            shared.socket.local_addr().ok(),
            config.remote
        );

        Ok(Self {
            shared,
            listener: Mutex::new(Some(listener)),
            timeout: config.timeout,
            poll_interval: config.poll_interval,
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn remote(&self) -> SocketAddr {
        self.shared.remote
    }

    /// Address actually bound (useful when the config asked for port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.socket.local_addr().ok()
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> GatewayStats {
        let c = &self.shared.counters;
        GatewayStats {
            sent: c.sent.load(Ordering::Relaxed),
            received: c.received.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            undecodable: c.undecodable.load(Ordering::Relaxed),
        }
    }

    /// Fire-and-forget.
    pub fn send(&self, address: &str, args: Vec<OscValue>) -> Result<()> {
        let datagram = codec::encode(address, &args)?;
        trace!("{}: -> {} {:?}", self.shared.name, address, args);

        self.shared
            .socket
            .send_to(&datagram, self.shared.remote)
            .map_err(|e| GatewayError::Send {
                address: address.to_string(),
                remote: self.shared.remote,
                source: e,
            })?;
        self.shared.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Send and wait for a reply on the same address, with the default timeout.
    pub fn request(&self, address: &str, args: Vec<OscValue>) -> Result<Vec<OscValue>> {
        self.request_with(address, args, address, self.timeout)
    }

    /// Send and wait for the first message on `response_address`.
    ///
    /// Returns the reply's full argument list, echoed coordinates included.
    pub fn request_with(
        &self,
        address: &str,
        args: Vec<OscValue>,
        response_address: &str,
        timeout: Duration,
    ) -> Result<Vec<OscValue>> {
        if !self.is_running() {
            return Err(GatewayError::ListenerStopped);
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let ticket = self.shared.next_ticket.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = lock(&self.shared.pending);
            if pending.contains_key(response_address) {
                return Err(GatewayError::RequestPending {
                    address: response_address.to_string(),
                });
            }
            pending.insert(
                response_address.to_string(),
                PendingRequest { ticket, reply_tx },
            );
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            address: response_address,
            ticket,
        };

        self.send(address, args)?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.shared.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "{}: no reply on {} after {:?}",
                    self.shared.name, response_address, timeout
                );
                return Err(GatewayError::Timeout {
                    address: response_address.to_string(),
                    timeout,
                });
            }

            match reply_rx.recv_timeout(remaining.min(self.poll_interval)) {
                Ok(values) => return Ok(values),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(GatewayError::ListenerStopped),
            }
        }
    }

    /// Register a callback for every message on `address`.
    ///
    /// Callbacks run on the listener thread in registration order. They must
    /// not issue requests: the reply could only be delivered by the thread
    /// that is busy running them.
    pub fn add_handler<F>(&self, address: &str, handler: F)
    where
        F: Fn(&[OscValue]) + Send + Sync + 'static,
    {
        lock(&self.shared.handlers)
            .entry(address.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Drop every callback for `address`.
    pub fn remove_handlers(&self, address: &str) {
        lock(&self.shared.handlers).remove(address);
    }

    /// Replace the beat callback.
    pub fn set_beat_callback(&self, callback: BeatCallback) {
        *lock(&self.shared.beat) = Some(Arc::new(callback));
    }

    pub fn clear_beat_callback(&self) {
        *lock(&self.shared.beat) = None;
    }

    /// Replace the startup callback.
    pub fn set_startup_callback<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        *lock(&self.shared.startup) = Some(Arc::new(callback));
    }

    /// See every inbound message before anything else does.
    pub fn set_monitor<F: Fn(&Message) + Send + Sync + 'static>(&self, monitor: F) {
        *lock(&self.shared.monitor) = Some(Arc::new(monitor));
    }

    /// Stop the listener thread. Waiting requests fail with `ListenerStopped`.
    pub fn shutdown(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            debug!("{}: shutting down", self.shared.name);
        }
        if let Some(handle) = lock(&self.listener).take() {
            if handle.join().is_err() {
                warn!("{}: listener thread panicked", self.shared.name);
            }
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn loopback_gateway() -> Gateway {
        let remote: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let listen: SocketAddr = "127.0.0.1:0".parse().unwrap();
        Gateway::connect(GatewayConfig::new("test", remote, listen)).unwrap()
    }

    #[test]
    fn test_dispatch_runs_handlers_in_order() {
        let gateway = loopback_gateway();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            gateway.add_handler("/live/clip/info", move |_| order.lock().unwrap().push(tag));
        }

        gateway
            .shared
            .dispatch(Message::new("/live/clip/info", vec![OscValue::Int(0)]));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_monitor_sees_everything_first() {
        let gateway = loopback_gateway();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        gateway.set_monitor(move |m| s.lock().unwrap().push(m.address.clone()));
        let s = Arc::clone(&seen);
        gateway.add_handler("/live/tempo", move |_| s.lock().unwrap().push("handler".into()));

        gateway.shared.dispatch(Message::new("/live/tempo", vec![OscValue::Float(120.0)]));
        gateway.shared.dispatch(Message::new("/live/unknown", vec![]));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["/live/tempo".to_string(), "handler".to_string(), "/live/unknown".to_string()]
        );
    }

    #[test]
    fn test_beat_callback_variants() {
        let gateway = loopback_gateway();
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&ticks);
        gateway.set_beat_callback(BeatCallback::tick(move || {
            t.fetch_add(1, Ordering::SeqCst);
        }));
        gateway.shared.dispatch(Message::new(BEAT_ADDRESS, vec![]));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        let last = Arc::new(Mutex::new(None));
        let l = Arc::clone(&last);
        gateway.set_beat_callback(BeatCallback::count(move |beat| {
            *l.lock().unwrap() = Some(beat);
        }));
        gateway
            .shared
            .dispatch(Message::new(BEAT_ADDRESS, vec![OscValue::Int(12)]));
        assert_eq!(*last.lock().unwrap(), Some(12));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_startup_callback() {
        let gateway = loopback_gateway();
        let started = Arc::new(AtomicBool::new(false));
        let s = Arc::clone(&started);
        gateway.set_startup_callback(move || s.store(true, Ordering::SeqCst));
        gateway.shared.dispatch(Message::new(STARTUP_ADDRESS, vec![]));
        assert!(started.load(Ordering::SeqCst));
    }

    #[test]
    fn test_request_after_shutdown_fails() {
        let gateway = loopback_gateway();
        gateway.shutdown();
        assert!(!gateway.is_running());
        assert!(matches!(
            gateway.request("/live/tempo", vec![]),
            Err(GatewayError::ListenerStopped)
        ));
    }

    #[test]
    fn test_from_config_uses_ports() {
        let mut config = LiveConfig::default();
        config.osc.send_port = 9100;
        config.osc.listen_port = 9101;
        let gw = GatewayConfig::from_config(&config).unwrap();
        assert_eq!(gw.remote.port(), 9100);
        assert_eq!(gw.listen.port(), 9101);
        assert_eq!(gw.timeout, Duration::from_secs(3));
    }
}
