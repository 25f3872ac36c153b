//! Move-only claims on a bounded memory budget.
//!
//! A [`Reservation`] is taken when a record is read and travels with it
//! through the pipeline. Batches merge the reservations of their inputs into
//! one handle, and whichever stage consumes the batch last releases it.
//! Release consumes the handle, so a double release does not type-check;
//! a handle dropped without release returns its bytes from `Drop`.

use crate::errors::ReservationError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// A bounded pool of bytes that records may claim while buffered.
#[derive(Debug)]
pub struct MemoryBudget {
    capacity: u64,
    used: AtomicU64,
    released: Notify,
}

impl MemoryBudget {
    /// Creates a budget of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: u64) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            used: AtomicU64::new(0),
            released: Notify::new(),
        })
    }

    /// Total bytes in the budget.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently reserved.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Bytes currently free.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.capacity.saturating_sub(self.used())
    }

    /// Reserves `bytes` if they are free right now.
    pub fn try_reserve(self: &Arc<Self>, bytes: u64) -> Result<Reservation, ReservationError> {
        if bytes > self.capacity {
            return Err(ReservationError::ExceedsCapacity {
                requested: bytes,
                capacity: self.capacity,
            });
        }

        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.checked_add(bytes)?;
                (next <= self.capacity).then_some(next)
            })
            .map_err(|used| ReservationError::Exhausted {
                requested: bytes,
                available: self.capacity.saturating_sub(used),
            })?;

        Ok(Reservation {
            bytes,
            budget: Some(Arc::clone(self)),
        })
    }

    /// Reserves `bytes`, waiting for other reservations to be released.
    pub async fn reserve(self: &Arc<Self>, bytes: u64) -> Result<Reservation, ReservationError> {
        loop {
            let released = self.released.notified();
            match self.try_reserve(bytes) {
                Err(ReservationError::Exhausted { .. }) => released.await,
                other => return other,
            }
        }
    }

    fn give_back(&self, bytes: u64) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
        self.released.notify_waiters();
    }
}

/// A transferable claim on part of a [`MemoryBudget`].
#[derive(Debug, Default)]
pub struct Reservation {
    bytes: u64,
    budget: Option<Arc<MemoryBudget>>,
}

impl Reservation {
    /// A reservation of zero bytes, not tied to any budget.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bytes held.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Combines two reservations into one holding the sum.
    ///
    /// Both inputs are consumed. On error each input is released when dropped.
    pub fn merge(mut self, mut other: Self) -> Result<Self, ReservationError> {
        let budget = match (self.budget.take(), other.budget.take()) {
            (Some(a), Some(b)) => {
                if !Arc::ptr_eq(&a, &b) {
                    self.budget = Some(a);
                    other.budget = Some(b);
                    return Err(ReservationError::MismatchedBudget);
                }
                Some(a)
            }
            (a, b) => a.or(b),
        };

        Ok(Self {
            bytes: self.bytes + other.bytes,
            budget,
        })
    }

    /// Returns the bytes to the budget. Returns how many bytes were released.
    pub fn release(mut self) -> u64 {
        match self.budget.take() {
            Some(budget) => {
                budget.give_back(self.bytes);
                self.bytes
            }
            None => 0,
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some(budget) = self.budget.take() {
            if self.bytes > 0 {
                warn!(bytes = self.bytes, "Reservation dropped without explicit release");
            }
            budget.give_back(self.bytes);
        }
    }
}
