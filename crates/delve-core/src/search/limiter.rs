//! Bounded concurrency with optional call spacing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{AcquireError, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::ConcurrencyConfig;

/// Counting semaphore plus a minimum interval between permit grants.
///
/// Used both by the engine's fan-out stage and by the orchestrator's
/// `parallel` strategy. Each owner keeps its own instance.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    min_interval: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            min_interval,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self::new(
            config.max_concurrent,
            Duration::from_millis(config.min_interval_ms),
        )
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Waits for a free slot, then for the spacing window.
    ///
    /// The permit is released when dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;

        if !self.min_interval.is_zero() {
            let wait_until = {
                let mut next_slot = self.next_slot.lock().await;
                let now = Instant::now();
                let slot = next_slot.map_or(now, |slot| slot.max(now));
                *next_slot = Some(slot + self.min_interval);
                slot
            };
            tokio::time::sleep_until(wait_until).await;
        }

        Ok(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let limiter = ConcurrencyLimiter::new(2, Duration::ZERO);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let active = active.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let _permit = limiter.acquire().await.unwrap();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_min_interval_spaces_grants() {
        let limiter = ConcurrencyLimiter::new(4, Duration::from_millis(20));
        let started = Instant::now();
        for _ in 0..3 {
            let _permit = limiter.acquire().await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_zero_limit_is_raised_to_one() {
        assert_eq!(ConcurrencyLimiter::new(0, Duration::ZERO).max_concurrent(), 1);
    }
}
