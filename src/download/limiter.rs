//! Admission gate bounding the number of simultaneous transfers.
//!
//! [`ConcurrencyLimiter`] hands out at most `max_at_one_time`
//! [`TransferPermit`]s. A permit is returned to the pool when it is dropped,
//! so a transfer that fails, is cancelled or panics still frees its slot.
//! Waiters are served in FIFO order by the underlying tokio semaphore.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Reasons a permit could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The run was cancelled before a permit became free.
    #[error("cancelled while waiting for a transfer slot")]
    Cancelled,
}

#[derive(Debug, Default)]
struct Gauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Counting gate shared by every transfer task of a run.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_at_one_time: usize,
    gauge: Arc<Gauge>,
}

/// One held slot; dropping it releases the slot.
#[derive(Debug)]
pub struct TransferPermit {
    _permit: OwnedSemaphorePermit,
    gauge: Arc<Gauge>,
}

impl Drop for TransferPermit {
    fn drop(&mut self) {
        self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyLimiter {
    /// Creates a gate with `max_at_one_time` permits.
    ///
    /// Callers validate the limit; a zero limit would admit nothing.
    #[must_use]
    pub fn new(max_at_one_time: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_at_one_time)),
            max_at_one_time,
            gauge: Arc::new(Gauge::default()),
        }
    }

    /// Returns the configured limit.
    #[must_use]
    pub fn max_at_one_time(&self) -> usize {
        self.max_at_one_time
    }

    /// Number of permits currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.gauge.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at the same time since creation.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    /// Number of permits free right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot.
    ///
    /// Returns early with [`AcquireError::Cancelled`] if `cancel` fires first;
    /// an already-cancelled token never takes a slot.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Cancelled`] on cancellation.
    #[instrument(level = "trace", skip(self, cancel))]
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<TransferPermit, AcquireError> {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AcquireError::Cancelled),
            // The semaphore is private and never closed, so this only fails
            // if the limiter is being torn down.
            result = Arc::clone(&self.semaphore).acquire_owned() => {
                result.map_err(|_| AcquireError::Cancelled)?
            }
        };

        let now = self.gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        debug!(in_flight = now, max = self.max_at_one_time, "transfer slot acquired");

        Ok(TransferPermit {
            _permit: permit,
            gauge: Arc::clone(&self.gauge),
        })
    }
}
