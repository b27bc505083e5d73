use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use avastream_core::error::{AvatarError, Result};

/// Sliding-window byte budget shared by every sender of one client.
///
/// Each grant is logged with its timestamp; a request waits until the grants
/// still inside the window leave room for it. Waiters are served in arrival
/// order because the log sits behind a fair async mutex held across the wait.
#[derive(Debug)]
pub struct RatePacer {
    budget: usize,
    window: Duration,
    log: Mutex<VecDeque<(Instant, usize)>>,
}

impl RatePacer {
    pub fn new(bytes_per_sec: usize) -> Self {
        Self::with_window(bytes_per_sec, Duration::from_secs(1))
    }

    pub fn with_window(budget: usize, window: Duration) -> Self {
        Self {
            budget: budget.max(1),
            window,
            log: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until `bytes` fit in the window, then record them.
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, bytes: usize) -> Result<Duration> {
        if bytes > self.budget {
            return Err(AvatarError::PayloadTooLarge {
                kind: "frame",
                size: bytes,
                max: self.budget,
            });
        }

        let started = Instant::now();
        let mut log = self.log.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&(at, _)) = log.front() {
                if now.duration_since(at) >= self.window {
                    log.pop_front();
                } else {
                    break;
                }
            }

            let used: usize = log.iter().map(|&(_, n)| n).sum();
            if used + bytes <= self.budget {
                log.push_back((now, bytes));
                return Ok(now.duration_since(started));
            }

            // Earliest instant at which enough old grants have aged out.
            let mut free = self.budget - used;
            let mut wake = now + self.window;
            for &(at, n) in log.iter() {
                free += n;
                if free >= bytes {
                    wake = at + self.window;
                    break;
                }
            }
            tokio::time::sleep_until(wake).await;
        }
    }

    /// Bytes granted within the current window.
    pub async fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.log
            .lock()
            .await
            .iter()
            .filter(|&&(at, _)| now.duration_since(at) < self.window)
            .map(|&(_, n)| n)
            .sum()
    }
}
