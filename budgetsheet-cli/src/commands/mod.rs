//! CLI command implementations

pub mod auth;
pub mod ledger;
pub mod logs;
pub mod serve;
pub mod setup;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use budgetsheet_core::{BudgetContext, EntryPoint, LoggingService};

/// Get the logging service for an entry point
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger(entry_point: EntryPoint) -> Option<Arc<LoggingService>> {
    let app_dir = get_app_dir().ok()?;
    match LoggingService::new(&app_dir, entry_point, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            tracing::warn!(error = %e, "event log unavailable");
            None
        }
    }
}

/// Record which command ran, ignoring any errors
pub fn log_command(logger: &Option<Arc<LoggingService>>, command: &str) {
    if let Some(l) = logger {
        let _ = l.log_command(command);
    }
}

/// Get the application directory from environment or default
pub fn get_app_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("BUDGETSHEET_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".budgetsheet"))
        .context("Could not find home directory; set BUDGETSHEET_DIR")
}

/// Build a context with an authenticated ledger
pub fn get_context(
    interactive: bool,
    logger: Option<Arc<LoggingService>>,
) -> Result<BudgetContext> {
    let app_dir = get_app_dir()?;
    std::fs::create_dir_all(&app_dir)
        .with_context(|| format!("Failed to create budgetsheet directory: {:?}", app_dir))?;

    let mut ctx = BudgetContext::new(&app_dir, interactive, logger)
        .context("Failed to initialize budgetsheet context")?;
    if !ctx.ledger.is_authenticated() {
        ctx.ledger.authenticate()?;
    }
    Ok(ctx)
}
