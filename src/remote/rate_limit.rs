use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Gate acquired before every mutating remote call
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn acquire(&self);
}

/// No throttling
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn acquire(&self) {}
}

/// Allows `capacity` operations per `window`; the next caller waits for the window to close
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    window: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    used: u32,
    window_start: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            state: Mutex::new(BucketState {
                used: 0,
                window_start: Instant::now(),
            }),
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let elapsed = state.window_start.elapsed();
        if elapsed >= self.window {
            state.used = 0;
            state.window_start = Instant::now();
        } else if state.used >= self.capacity {
            let wait = self.window - elapsed;
            info!(
                operations = state.used,
                wait_ms = wait.as_millis(),
                "Rate limit reached, cooling down"
            );
            tokio::time::sleep(wait).await;
            state.used = 0;
            state.window_start = Instant::now();
        }

        state.used += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = Unlimited;
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_bucket_waits_after_capacity() {
        let limiter = TokenBucket::new(2, Duration::from_millis(80));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(80));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_bucket_resets_after_idle_window() {
        let limiter = TokenBucket::new(1, Duration::from_millis(20));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
