//! Countdown latch that runs an action when it reaches zero.
//!
//! [`ActionCountdown`] is constructed with a count and a callback. Each
//! [`signal`](ActionCountdown::signal) decrements the count; the call that
//! brings it to zero runs the callback synchronously on its own thread.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use parakit::sync::ActionCountdown;
//!
//! let fired = Arc::new(AtomicBool::new(false));
//! let flag = fired.clone();
//! let latch = ActionCountdown::new(2, move || flag.store(true, Ordering::SeqCst));
//!
//! assert_eq!(latch.signal(), Ok(false));
//! assert!(!fired.load(Ordering::SeqCst));
//! assert_eq!(latch.signal(), Ok(true));
//! assert!(fired.load(Ordering::SeqCst));
//!
//! // Signalling past zero is a contract violation.
//! assert!(latch.signal().is_err());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::CountdownError;

type Action = Box<dyn FnOnce() + Send + 'static>;

/// Latch that fires a one-shot action after `count` signals.
pub struct ActionCountdown {
    remaining: AtomicUsize,
    action: Mutex<Option<Action>>,
}

impl ActionCountdown {
    /// Creates a countdown with `count` outstanding signals.
    ///
    /// A zero `count` runs `action` before this constructor returns.
    pub fn new<F>(count: usize, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        if count == 0 {
            tracing::trace!("countdown created already at zero; firing");
            action();
            return Self {
                remaining: AtomicUsize::new(0),
                action: Mutex::new(None),
            };
        }
        Self {
            remaining: AtomicUsize::new(count),
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Delivers one signal. Returns `Ok(true)` if this call fired the action.
    pub fn signal(&self) -> Result<bool, CountdownError> {
        self.signal_many(1)
    }

    /// Delivers `n` signals at once.
    ///
    /// Fails without changing the count when `n` exceeds the remaining count.
    pub fn signal_many(&self, n: usize) -> Result<bool, CountdownError> {
        if n == 0 {
            return Ok(false);
        }
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(n)
            })
            .map_err(|remaining| CountdownError::OverSignaled {
                remaining,
                requested: n,
            })?;

        if previous != n {
            return Ok(false);
        }
        let action = self.action.lock().take();
        if let Some(action) = action {
            tracing::trace!("countdown reached zero; firing");
            action();
        }
        Ok(true)
    }

    /// Adds `n` outstanding signals.
    ///
    /// Fails with [`CountdownError::AlreadySet`] once the action has fired.
    pub fn add_count(&self, n: usize) -> Result<(), CountdownError> {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == 0 {
                    None
                } else {
                    current.checked_add(n)
                }
            })
            .map(|_| ())
            .map_err(|_| CountdownError::AlreadySet)
    }

    /// Number of signals still required.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Returns `true` once the count reached zero.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.remaining() == 0
    }
}

impl fmt::Debug for ActionCountdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCountdown")
            .field("remaining", &self.remaining())
            .finish()
    }
}
