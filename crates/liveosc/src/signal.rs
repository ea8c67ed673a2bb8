//! Poll-based wait primitives.
//!
//! Every blocking wait in this crate sleeps in short steps and re-checks an
//! [`Interrupt`] between steps, so a Ctrl-C handler (or any other thread) can
//! get a caller out of an otherwise unbounded wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{GatewayError, Result};

/// Binary event: reset, set once from any thread, polled by a waiter.
#[derive(Debug, Default)]
pub struct Signal {
    flag: AtomicBool,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep in `poll` steps until set.
    ///
    /// Returns `Ok(true)` when the signal fired, `Ok(false)` when `deadline`
    /// passed first, and `Interrupted` if `interrupt` was raised.
    pub fn wait(&self, poll: Duration, deadline: Option<Instant>, interrupt: &Interrupt) -> Result<bool> {
        loop {
            if self.is_set() {
                return Ok(true);
            }
            if interrupt.is_raised() {
                return Err(GatewayError::Interrupted);
            }
            match deadline {
                Some(d) if Instant::now() >= d => return Ok(false),
                _ => thread::sleep(poll),
            }
        }
    }
}

/// Shared cancel flag for unbounded waits.
///
/// Cloning shares the flag. Raising it makes the current and any later waits
/// fail until [`Interrupt::clear`] is called.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
