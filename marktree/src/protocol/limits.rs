//! Request limits and the per-second rate limiter.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Limits the dispatcher enforces and advertises through `protocol.getCapabilities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    /// Most sub-operations a single batch may carry.
    pub max_batch_size: usize,
    /// Largest request payload, in bytes of its JSON text.
    pub max_payload_bytes: usize,
    pub max_requests_per_second: usize,
    /// Advertised to clients; a dispatcher handles one request at a time.
    pub max_concurrent_requests: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_batch_size: 100,
            max_payload_bytes: 1_048_576,
            max_requests_per_second: 50,
            max_concurrent_requests: 4,
        }
    }
}

const WINDOW: Duration = Duration::from_secs(1);

/// Sliding one-second window over accepted requests.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: usize,
    accepted: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(limit: usize) -> Self {
        RateLimiter {
            limit,
            accepted: VecDeque::with_capacity(limit),
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Record a request arriving at `now` if the window has room for it.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.accepted.front() {
            if now.duration_since(oldest) >= WINDOW {
                self.accepted.pop_front();
            } else {
                break;
            }
        }
        if self.accepted.len() >= self.limit {
            return false;
        }
        self.accepted.push_back(now);
        true
    }
}
