// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relational_ledger_server::api::router;
use relational_ledger_server::config::{Settings, LOG_FORMAT_ENV};
use relational_ledger_server::state::AppState;
use relational_ledger_server::storage::{AuditLog, LedgerDb, LEDGER_DB_FILE};

#[tokio::main]
async fn main() {
    init_tracing();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!(%err, "configuration error");
            std::process::exit(1);
        }
    };

    let ledger = match LedgerDb::open(&settings.data_dir.join(LEDGER_DB_FILE)) {
        Ok(ledger) => ledger,
        Err(err) => {
            error!(%err, path = %settings.data_dir.display(), "failed to open ledger database");
            std::process::exit(1);
        }
    };

    let audit = AuditLog::new(&settings.data_dir);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .expect("Failed to parse bind address");

    let app = router(AppState::new(ledger, settings, audit));

    info!("Relational Ledger server listening on http://{addr} (docs at /docs)");

    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_listener(handle.clone()));

    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .expect("HTTP server failed");
}

/// Pick the log format from `LOG_FORMAT` (`json` for one-line JSON events,
/// anything else for the human-readable default) and honor `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Drain in-flight requests on Ctrl+C or SIGTERM, then stop the server.
async fn shutdown_listener(handle: axum_server::Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
