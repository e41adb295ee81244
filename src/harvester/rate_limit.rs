//! Request rate limiting
//!
//! A single limiter is shared by every worker so the pool as a whole stays
//! within the upstream request budget, however many workers are running.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Sliding-window request limiter
#[derive(Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    /// Create a request-based rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum requests per window
    /// * `window` - Time window for rate limit
    pub fn request_based(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_requests)),
            max_requests,
            window,
        }
    }

    /// Requests allowed per window
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Length of the rate limit window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Currently available permits
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire permits for a request
    ///
    /// Permits are held for the full window and released by a background task,
    /// so at most `max_requests` weight is spent in any window.
    pub async fn acquire(&self, weight: usize) -> Result<(), RateLimitError> {
        let weight = weight.clamp(1, self.max_requests);
        let permit = self
            .semaphore
            .clone()
            .acquire_many_owned(weight as u32)
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });

        Ok(())
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire permits
    #[error("failed to acquire rate limit permits: {0}")]
    AcquireError(String),
}
