//! Request admission over a fixed quota window
//!
//! The registry API allows a small number of requests per minute and
//! blocks identities that exceed it, so admission happens client-side:
//! callers past the quota sleep out the window remainder instead of
//! being rejected.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

struct WindowState {
    issued: u32,
    started: Instant,
}

/// A quota counter over a fixed rolling window.
///
/// The lock covers bookkeeping only; waiting callers sleep without
/// holding it, so unrelated work is never serialized behind a full
/// window.
pub struct RateWindow {
    state: Mutex<WindowState>,
    quota: u32,
    length: Duration,
}

impl RateWindow {
    /// Create a window admitting `quota` requests per `length`
    pub fn new(quota: u32, length: Duration) -> Self {
        Self {
            state: Mutex::new(WindowState {
                issued: 0,
                started: Instant::now(),
            }),
            quota,
            length,
        }
    }

    /// Block until the caller may issue one request.
    ///
    /// Returns immediately while the current window has quota left;
    /// otherwise sleeps until the window elapses, then takes a slot in
    /// the fresh window.
    pub async fn admit(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                if now.duration_since(state.started) >= self.length {
                    state.started = now;
                    state.issued = 0;
                }
                if state.issued < self.quota {
                    state.issued += 1;
                    None
                } else {
                    Some(self.length.saturating_sub(now.duration_since(state.started)))
                }
            };

            match wait {
                None => return,
                Some(remaining) => {
                    debug!(wait_ms = remaining.as_millis() as u64, "quota reached, pausing");
                    sleep(remaining).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_quota_admits_without_waiting() {
        let window = RateWindow::new(3, Duration::from_secs(60));
        let before = Instant::now();
        for _ in 0..3 {
            window.admit().await;
        }
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_request_waits_out_the_window() {
        let window = RateWindow::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            window.admit().await;
        }
        let before = Instant::now();
        window.admit().await;
        assert!(Instant::now().duration_since(before) >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_elapse() {
        let window = RateWindow::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            window.admit().await;
        }
        sleep(Duration::from_secs(61)).await;

        let before = Instant::now();
        window.admit().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_admissions_respect_quota() {
        let window = Arc::new(RateWindow::new(3, Duration::from_secs(60)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..7 {
            let window = window.clone();
            handles.push(tokio::spawn(async move {
                window.admit().await;
                Instant::now().duration_since(start)
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        // No sliding 60s span may contain more than 3 admissions.
        for (i, stamp) in stamps.iter().enumerate() {
            let in_window = stamps[i..]
                .iter()
                .take_while(|s| **s - *stamp < Duration::from_secs(60))
                .count();
            assert!(in_window <= 3, "{} admissions within one window", in_window);
        }
    }
}
