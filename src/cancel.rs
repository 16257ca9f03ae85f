//! Cooperative cancellation threaded through a whole request.
//!
//! A [`CancelSignal`] fires either when [`CancelSignal::cancel`] is called or
//! when its deadline passes. The limiter wait, every attempt and every backoff
//! sleep observe the same signal.

use std::{fmt, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};

/// Why a [`CancelSignal`] fired.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelReason {
    /// [`CancelSignal::cancel`] was called.
    Cancelled,
    /// The signal's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Cloneable cancellation handle with an optional deadline.
///
/// Clones and signals derived with [`CancelSignal::with_timeout`] share the
/// same cancel switch.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    switch: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    /// Creates a signal that only fires when cancelled explicitly.
    pub fn new() -> Self {
        let (switch, _) = watch::channel(false);
        Self {
            switch: Arc::new(switch),
            deadline: None,
        }
    }

    /// Creates a signal that fires after `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::new().with_timeout(timeout)
    }

    /// Derives a signal whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a signal whose deadline is the earlier of `deadline` and the
    /// current one.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            switch: Arc::clone(&self.switch),
            deadline: Some(deadline),
        }
    }

    /// Deadline after which the signal fires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fires the signal for this handle and every clone sharing its switch.
    pub fn cancel(&self) {
        self.switch.send_replace(true);
    }

    /// Returns the reason if the signal has already fired.
    pub fn reason(&self) -> Option<CancelReason> {
        if *self.switch.borrow() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Whether the signal has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the signal fires.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.switch.subscribe();
        let switched = async move {
            // Err only if the sender is gone, which `self` prevents.
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = switched => CancelReason::Cancelled,
                _ = sleep_until(deadline) => CancelReason::DeadlineExceeded,
            },
            None => {
                switched.await;
                CancelReason::Cancelled
            }
        }
    }
}
