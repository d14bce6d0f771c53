//! Helpers for the preview server shown to a person before deployment.
//!
//! The preview server itself is an external collaborator; this module only
//! finds it a port, waits for it to come up, and names what should happen to
//! it once the preview decision is made.

use serde::{Deserialize, Serialize};
use std::net::TcpListener;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::errors::PreviewError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// What to do with a running preview server after approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerAction {
    Keep,
    Kill,
}

impl std::fmt::Display for ServerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerAction::Keep => write!(f, "keep"),
            ServerAction::Kill => write!(f, "kill"),
        }
    }
}

/// Probe `start`, `start + 1`, ... for a bindable localhost port.
///
/// With `attempts == 0` no port is probed.
pub fn find_available_port(start: u16, attempts: u16) -> Result<u16, PreviewError> {
    for offset in 0..attempts {
        let Some(port) = start.checked_add(offset) else {
            break;
        };
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            tracing::debug!(port, "found available port");
            return Ok(port);
        }
    }
    Err(PreviewError::NoPortAvailable {
        start,
        end: start as u32 + attempts as u32,
        attempts,
    })
}

/// Poll `addr` until it accepts a TCP connection, backing off exponentially.
///
/// Returns how long the server took to come up.
pub async fn wait_for_health(addr: &str, timeout: Duration) -> Result<Duration, PreviewError> {
    let start = Instant::now();
    let deadline = start + timeout;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        if let Ok(Ok(_)) = tokio::time::timeout(remaining, TcpStream::connect(addr)).await {
            let waited = start.elapsed();
            tracing::info!(addr, waited_ms = waited.as_millis() as u64, "preview server healthy");
            return Ok(waited);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(backoff.min(remaining)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    Err(PreviewError::HealthCheckTimeout {
        addr: addr.to_string(),
        waited_ms: start.elapsed().as_millis(),
    })
}
