//! OSC over UDP transport to Ableton Live's LiveOSC control surface.
//!
//! - [`Gateway`]: one socket, one listener thread, blocking request/reply
//!   correlated by address, notification handlers
//! - [`OscValue`]: the argument values LiveOSC exchanges
//! - [`Signal`] / [`Interrupt`]: poll-based waits that can be cancelled

pub mod codec;
pub mod error;
pub mod gateway;
pub mod signal;
pub mod value;

pub use codec::Message;
pub use error::{GatewayError, Result};
pub use gateway::{
    BeatCallback, Gateway, GatewayConfig, GatewayStats, Handler, BEAT_ADDRESS, STARTUP_ADDRESS,
};
pub use signal::{Interrupt, Signal};
pub use value::OscValue;
