use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{RaceError, Result};

#[derive(Debug)]
struct State {
    available: u32,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    /// Fired on every release and on close; each waiter re-checks the counter.
    changed: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // The counter stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Counting guard bounding how many units of work may be in flight at once.
///
/// Capacity is fixed at construction. `acquire(n)` waits until `n` units are
/// free and deducts them atomically; the returned [`Permit`] gives them back
/// when released or dropped.
///
/// Every release wakes all waiters, so any waiter whose request now fits
/// proceeds, even if a larger request queued before it. No ordering between
/// waiters is promised.
#[derive(Debug, Clone)]
pub struct AdmissionLimiter {
    shared: Arc<Shared>,
    capacity: u32,
}

/// Capacity handed out by [`AdmissionLimiter::acquire`].
///
/// Dropping the permit releases its units, so error and cancellation paths
/// cannot leak capacity.
#[derive(Debug)]
#[must_use = "dropping a permit releases its capacity immediately"]
pub struct Permit {
    shared: Arc<Shared>,
    units: u32,
}

impl Permit {
    /// Number of units this permit holds.
    pub fn units(&self) -> u32 {
        self.units
    }

    /// Return the units to the limiter and wake waiters.
    pub fn release(self) {
        tracing::trace!(units = self.units, "Permit released");
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.shared.lock().available += self.units;
        self.shared.changed.notify_waiters();
    }
}

impl AdmissionLimiter {
    pub fn new(capacity: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    available: capacity,
                    closed: false,
                }),
                changed: Notify::new(),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Units currently free.
    pub fn available(&self) -> u32 {
        self.shared.lock().available
    }

    /// Units acquired and not yet released.
    pub fn outstanding(&self) -> u32 {
        self.capacity - self.available()
    }

    /// Wait until `units` are free, then take them.
    ///
    /// A request larger than the total capacity could never be served and is
    /// rejected with [`RaceError::CapacityExceeded`] instead of blocking.
    /// Dropping the future while it waits takes nothing.
    pub async fn acquire(&self, units: u32) -> Result<Permit> {
        self.check_request(units)?;
        loop {
            // Register before checking so a release in between is not missed.
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            {
                let mut state = self.shared.lock();
                if state.closed {
                    return Err(RaceError::LimiterClosed);
                }
                if state.available >= units {
                    state.available -= units;
                    tracing::trace!(units, available = state.available, "Permit acquired");
                    return Ok(Permit {
                        shared: self.shared.clone(),
                        units,
                    });
                }
            }
            changed.await;
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`RaceError::Cancelled`] once `cancel` fires.
    pub async fn acquire_cancellable(
        &self,
        units: u32,
        cancel: &CancellationToken,
    ) -> Result<Permit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RaceError::Cancelled),
            permit = self.acquire(units) => permit,
        }
    }

    /// Block until every outstanding unit has been released.
    ///
    /// Only watches the counter; acquires made while a drain is pending are
    /// served as usual and extend the wait.
    pub async fn drain_wait(&self) {
        loop {
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if self.shared.lock().available == self.capacity {
                return;
            }
            changed.await;
        }
    }

    /// Wake all waiters with [`RaceError::LimiterClosed`]; later acquires
    /// fail. Held permits still return their units.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.changed.notify_waiters();
    }

    fn check_request(&self, units: u32) -> Result<()> {
        if units > self.capacity {
            return Err(RaceError::CapacityExceeded {
                requested: units,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}
