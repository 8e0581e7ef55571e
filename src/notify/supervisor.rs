// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Restart-on-panic supervision for background workers.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Spawn `make_worker` and keep it running until `shutdown` fires.
///
/// A worker that panics is restarted after `restart_delay`. A worker that
/// returns normally is not restarted.
pub fn spawn_supervised<F, Fut>(
    name: impl Into<String>,
    shutdown: CancellationToken,
    restart_delay: Duration,
    make_worker: F,
) -> JoinHandle<()>
where
    F: Fn(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        let mut restarts: u32 = 0;
        loop {
            let worker = tokio::spawn(make_worker(shutdown.clone()));
            match worker.await {
                Ok(()) => {
                    info!(worker = %name, "Worker stopped");
                    return;
                }
                Err(e) if e.is_panic() => {
                    restarts = restarts.saturating_add(1);
                    error!(worker = %name, restarts, "Worker panicked, restarting");
                }
                Err(e) => {
                    error!(worker = %name, error = %e, "Worker task cancelled");
                    return;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(restart_delay) => {},
                _ = shutdown.cancelled() => {
                    info!(worker = %name, "Supervisor shutting down");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn panicking_worker_is_restarted() {
        let starts = Arc::new(AtomicU32::new(0));
        let shutdown = CancellationToken::new();

        let handle = {
            let starts = starts.clone();
            spawn_supervised("flaky", shutdown.clone(), Duration::from_millis(5), move |token| {
                let starts = starts.clone();
                async move {
                    if starts.fetch_add(1, Ordering::SeqCst) < 2 {
                        panic!("worker failure");
                    }
                    token.cancelled().await;
                }
            })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while starts.load(Ordering::SeqCst) < 3 {
            assert!(tokio::time::Instant::now() < deadline, "worker was not restarted");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn worker_that_returns_is_not_restarted() {
        let starts = Arc::new(AtomicU32::new(0));
        let handle = {
            let starts = starts.clone();
            spawn_supervised("oneshot", CancellationToken::new(), Duration::ZERO, move |_| {
                let starts = starts.clone();
                async move {
                    starts.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        handle.await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }
}
