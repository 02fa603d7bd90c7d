// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Runs `op` up to `attempts` times, doubling the delay after each failure.
///
/// Only used for idempotent reads made while wiring adapters (decimals,
/// balances); decision-cycle calls are never retried.
pub async fn retry_async<F, Fut, T, E>(
    mut op: F,
    attempts: usize,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                tracing::debug!(
                    target: "retry",
                    attempt,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying RPC read"
                );
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let res: Result<u32, String> = retry_async(
            |attempt| {
                calls.fetch_add(1, Ordering::Relaxed);
                async move {
                    if attempt < 3 {
                        Err(format!("attempt {attempt} failed"))
                    } else {
                        Ok(7)
                    }
                }
            },
            4,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(res.unwrap(), 7);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn gives_up_after_last_attempt() {
        let calls = AtomicUsize::new(0);
        let res: Result<(), String> = retry_async(
            |_| {
                calls.fetch_add(1, Ordering::Relaxed);
                async { Err("nope".to_string()) }
            },
            2,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(res.unwrap_err(), "nope");
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
