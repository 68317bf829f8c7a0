//! Serve command - run the JSON web API

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use colored::Colorize;

use budgetsheet_core::{BudgetContext, EntryPoint};

use super::{get_app_dir, get_logger, log_command};
use crate::api::{self, AppState};
use crate::output;

pub fn run(addr: Option<String>) -> Result<()> {
    let logger = get_logger(EntryPoint::Server);
    log_command(&logger, "serve");

    let app_dir = get_app_dir()?;
    std::fs::create_dir_all(&app_dir)?;
    let mut ctx = BudgetContext::new(&app_dir, false, logger)?;

    // Requests retry the connection, so a missing token only warns here
    if let Err(e) = ctx.ledger.authenticate() {
        output::warning(&format!("Not connected yet: {}", e));
    }

    let addr = addr.unwrap_or_else(|| ctx.config.bind_address.clone());
    let ledger = Arc::new(Mutex::new(ctx.ledger));
    let app = api::router(AppState::new(Arc::clone(&ledger)));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!(%addr, "web API listening");
        println!("{} http://{}/api/sheets/", "Serving".green(), addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")
    })?;

    // The ledger owns a blocking HTTP client, which must be dropped outside the runtime
    drop(runtime);
    drop(ledger);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
