use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Transport failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("could not bind OSC listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("could not send {address} to {remote} (is Live running?): {source}")]
    Send {
        address: String,
        remote: SocketAddr,
        source: std::io::Error,
    },

    #[error("could not encode OSC message {address}: {message}")]
    Encode { address: String, message: String },

    #[error("no reply on {address} within {timeout:?} (is Live running?)")]
    Timeout { address: String, timeout: Duration },

    /// Replies carry no request id, so a second waiter on the same address
    /// could be handed the first one's answer.
    #[error("a request is already waiting for a reply on {address}")]
    RequestPending { address: String },

    #[error("OSC listener has stopped")]
    ListenerStopped,

    #[error("wait interrupted")]
    Interrupted,

    #[error("invalid remote address {0}")]
    Resolve(String),
}

impl GatewayError {
    /// True for failures that mean the remote side is unreachable or silent.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            GatewayError::Bind { .. }
                | GatewayError::Send { .. }
                | GatewayError::Timeout { .. }
                | GatewayError::ListenerStopped
                | GatewayError::Resolve(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
