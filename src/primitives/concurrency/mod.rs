use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::types::{Result, StrudexError};

/// Retry and lease settings for a [`LockService`].
#[derive(Clone, Copy, Debug)]
pub struct LockOptions {
    /// Attempts made by [`LockService::acquire`] before reporting `LockBusy`.
    pub max_attempts: u32,
    /// Time spent waiting on each attempt after the first.
    pub backoff: Duration,
    /// Hold time after which releasing the lease logs a warning.
    pub lease: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            backoff: Duration::from_millis(20),
            lease: Duration::from_secs(5),
        }
    }
}

/// Snapshot of lock activity for observability.
#[derive(Default, Debug, Clone, Copy)]
pub struct LockSnapshot {
    /// Whether a lease is currently held.
    pub held: bool,
    /// Leases granted so far.
    pub acquisitions: u64,
    /// Acquisitions that found the lock already held at least once.
    pub contended: u64,
    /// Acquisitions that gave up with `LockBusy`.
    pub busy: u64,
}

#[derive(Default)]
struct Counters {
    acquisitions: AtomicU64,
    contended: AtomicU64,
    busy: AtomicU64,
}

/// Coarse mutual-exclusion gate owning the state it protects.
///
/// At most one [`Lease`] exists at a time. Acquisition never blocks without
/// bound: [`acquire`](Self::acquire) retries with a fixed backoff and then
/// fails with [`StrudexError::LockBusy`].
pub struct LockService<T> {
    name: &'static str,
    state: Mutex<T>,
    opts: LockOptions,
    counters: Counters,
}

/// A held lock. Dropping it releases the lock.
pub struct Lease<'a, T> {
    guard: MutexGuard<'a, T>,
    acquired_at: Instant,
    lease: Duration,
    name: &'static str,
}

impl<T> LockService<T> {
    /// Wraps `value` behind a lock named `name` (used in log events).
    pub fn new(name: &'static str, value: T, opts: LockOptions) -> Self {
        Self {
            name,
            state: Mutex::new(value),
            opts,
            counters: Counters::default(),
        }
    }

    /// Name used in log events.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Configured retry and lease settings.
    pub fn options(&self) -> &LockOptions {
        &self.opts
    }

    /// Tries to take the lock, waiting at most `timeout`.
    ///
    /// Returns `None` when the lock stayed busy for the whole window.
    pub fn try_acquire(&self, timeout: Duration) -> Option<Lease<'_, T>> {
        let guard = match self.state.try_lock() {
            Some(guard) => guard,
            None => {
                self.counters.contended.fetch_add(1, Ordering::Relaxed);
                self.state.try_lock_for(timeout)?
            }
        };
        Some(self.grant(guard))
    }

    /// Takes the lock, retrying up to `max_attempts` times with `backoff`
    /// between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`StrudexError::LockBusy`] once every attempt found the lock held.
    pub fn acquire(&self) -> Result<Lease<'_, T>> {
        let attempts = self.opts.max_attempts.max(1);
        if let Some(guard) = self.state.try_lock() {
            return Ok(self.grant(guard));
        }
        self.counters.contended.fetch_add(1, Ordering::Relaxed);
        for attempt in 2..=attempts {
            if let Some(guard) = self.state.try_lock_for(self.opts.backoff) {
                debug!(lock = self.name, attempt, "lock.acquired_after_retry");
                return Ok(self.grant(guard));
            }
        }
        self.counters.busy.fetch_add(1, Ordering::Relaxed);
        warn!(lock = self.name, attempts, "lock.busy");
        Err(StrudexError::LockBusy { attempts })
    }

    /// Returns a snapshot of the lock counters.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            held: self.state.is_locked(),
            acquisitions: self.counters.acquisitions.load(Ordering::Relaxed),
            contended: self.counters.contended.load(Ordering::Relaxed),
            busy: self.counters.busy.load(Ordering::Relaxed),
        }
    }

    /// Consumes the service and returns the protected state.
    pub fn into_inner(self) -> T {
        self.state.into_inner()
    }

    fn grant<'a>(&'a self, guard: MutexGuard<'a, T>) -> Lease<'a, T> {
        self.counters.acquisitions.fetch_add(1, Ordering::Relaxed);
        Lease {
            guard,
            acquired_at: Instant::now(),
            lease: self.opts.lease,
            name: self.name,
        }
    }
}

impl<T> Lease<'_, T> {
    /// Time since the lease was granted.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl<T> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        let held = self.acquired_at.elapsed();
        if held > self.lease {
            warn!(
                lock = self.name,
                held_ms = held.as_millis() as u64,
                lease_ms = self.lease.as_millis() as u64,
                "lock.lease_overrun"
            );
        }
    }
}
