// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use transfer_ledger::{
    api::router,
    config::AppConfig,
    ledger::LedgerStore,
    logging,
    notify::{
        spawn_supervised, ConsumerConfig, HttpWebhookSink, NoopWebhookSink, NotificationConsumer,
        Reconciler, WebhookSink,
    },
    queue::{EventQueue, RedbEventQueue, Subscription},
    state::{AppState, AuthConfig},
    storage::{open_database, RedbStore},
};

/// Delay before a panicked worker is restarted.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// How long shutdown waits for background workers to finish.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), BoxError> {
    let db = open_database(&config.database_path())?;
    let store = RedbStore::new(db.clone());
    let queue = Arc::new(RedbEventQueue::new(db));

    for (user_id, balance) in &config.seed_wallets {
        store.open_wallet(user_id, *balance)?;
    }

    let auth_config = AuthConfig::from_secret(config.jwt_secret.clone());
    if auth_config.jwt_secret.is_none() {
        if auth_config.allow_unsigned {
            warn!("AUTH_JWT_SECRET not set: accepting UNSIGNED tokens (dev build)");
        } else {
            warn!("AUTH_JWT_SECRET not set: all authenticated requests will be rejected");
        }
    }

    let state = AppState::new(
        store.clone(),
        queue.clone(),
        config.lock_wait_timeout,
        auth_config,
    );

    let shutdown = CancellationToken::new();
    let workers = spawn_workers(&config, &store, queue, &shutdown)?;

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Transfer ledger listening (docs at /docs)");

    let serve_result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    info!("HTTP server stopped, draining background workers");
    shutdown.cancel();
    let drain = join_workers(workers);
    if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("Background workers did not stop in time");
    }

    serve_result?;
    info!("Shutdown complete");
    Ok(())
}

fn spawn_workers(
    config: &AppConfig,
    store: &RedbStore,
    queue: Arc<RedbEventQueue>,
    shutdown: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, BoxError> {
    let webhook: Arc<dyn WebhookSink> = match &config.webhook {
        Some(webhook) => {
            info!(url = %webhook.url, signed = webhook.secret.is_some(), "Webhook delivery enabled");
            Arc::new(HttpWebhookSink::new(
                webhook.url.clone(),
                webhook.secret.clone(),
                webhook.timeout,
            )?)
        }
        None => Arc::new(NoopWebhookSink),
    };

    let consumer_config = ConsumerConfig {
        max_attempts: config.consumer_max_attempts,
        base_backoff: config.consumer_base_backoff,
        max_backoff: config.consumer_max_backoff,
        visibility_timeout: config.consumer_visibility_timeout,
        idle_wait: config.consumer_idle_wait,
    };

    let ledger_store: Arc<dyn LedgerStore> = Arc::new(store.clone());
    let queue: Arc<dyn EventQueue> = queue;
    let mut workers = Vec::with_capacity(config.consumer_instances + 1);

    for index in 0..config.consumer_instances {
        let name = format!("notification-consumer-{index}");
        let consumer = Arc::new(NotificationConsumer::new(
            name.clone(),
            ledger_store.clone(),
            Arc::new(store.clone()),
            webhook.clone(),
            Subscription::new(
                queue.clone(),
                consumer_config.visibility_timeout,
                consumer_config.idle_wait,
            ),
            consumer_config.clone(),
        ));
        workers.push(spawn_supervised(
            name,
            shutdown.clone(),
            RESTART_DELAY,
            move |token| {
                let consumer = consumer.clone();
                async move { consumer.run(token).await }
            },
        ));
    }

    let interval = config.reconcile_interval;
    let reconcile_store = ledger_store.clone();
    let reconcile_queue = queue.clone();
    workers.push(spawn_supervised(
        "outbox-reconciler",
        shutdown.clone(),
        RESTART_DELAY,
        move |token| {
            Reconciler::new(reconcile_store.clone(), reconcile_queue.clone(), interval).run(token)
        },
    ));

    info!(consumers = config.consumer_instances, "Background workers started");
    Ok(workers)
}

async fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Background worker ended abnormally");
        }
    }
}

/// Resolve on Ctrl-C, SIGTERM, or when `shutdown` is cancelled elsewhere.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
        _ = shutdown.cancelled() => {},
    }
}
