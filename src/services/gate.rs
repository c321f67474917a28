// src/services/gate.rs

//! Per-host request pacing.
//!
//! At most one in-flight (or spacing-delayed) request per host at a time,
//! independent of global concurrency. Spacing comes from the host's
//! robots.txt crawl-delay, with a configured floor when none is declared.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Per-host serialization point: the instant the last request started.
type HostSlot = Arc<AsyncMutex<Option<Instant>>>;

/// Gate shared across workers that spaces requests per host.
pub struct HostGate {
    default_delay: Duration,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

/// Holds the host slot for the duration of one request. Dropping it lets
/// the next waiter through.
pub struct HostPermit {
    _slot: OwnedMutexGuard<Option<Instant>>,
}

impl HostGate {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until a request to `host` is due, then hold the host slot.
    ///
    /// `delay` overrides the default spacing when the host's crawl policy
    /// declares one. Spacing is measured between request starts.
    pub async fn acquire(&self, host: &str, delay: Option<Duration>) -> HostPermit {
        let slot = {
            let mut hosts = self.hosts.lock().expect("host gate poisoned");
            Arc::clone(
                hosts
                    .entry(host.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(None))),
            )
        };

        let mut guard = slot.lock_owned().await;
        let spacing = delay.unwrap_or(self.default_delay);
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }
        *guard = Some(Instant::now());

        HostPermit { _slot: guard }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spacing_between_requests() {
        let gate = HostGate::new(Duration::from_millis(250));

        let start = Instant::now();
        drop(gate.acquire("example.com", None).await);
        drop(gate.acquire("example.com", None).await);

        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_delay_override() {
        let gate = HostGate::new(Duration::from_millis(100));

        let start = Instant::now();
        drop(
            gate.acquire("example.com", Some(Duration::from_secs(2)))
                .await,
        );
        drop(
            gate.acquire("example.com", Some(Duration::from_secs(2)))
                .await,
        );

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_are_independent() {
        let gate = HostGate::new(Duration::from_secs(10));

        let start = Instant::now();
        drop(gate.acquire("a.example", None).await);
        drop(gate.acquire("b.example", None).await);

        // No spacing applies across different hosts
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
