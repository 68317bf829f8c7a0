//! budgetsheet core - a budget ledger kept in a Google spreadsheet
//!
//! This crate follows hexagonal architecture:
//!
//! - **domain**: Ledger rows, table layout, formulas, credentials
//! - **ports**: Trait definitions for external dependencies (TabularStore, StoreConnector)
//! - **services**: Ledger operations and the event log
//! - **adapters**: Concrete implementations (Google Sheets, OAuth, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
mod log_migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use rust_decimal::Decimal;

use adapters::memory::{MemoryConnector, MemoryStore};
use adapters::oauth::CredentialManager;
use adapters::sheets::GoogleSheetsConnector;
use config::Config;
use ports::StoreConnector;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, OperationStatus};
pub use domain::{Expense, LedgerData, LedgerSchema};
pub use services::{EntryPoint, InitializeReport, LedgerService, LoggingService};

/// Main context for budgetsheet operations
///
/// Holds the resolved configuration and a ledger service wired to the
/// configured backend. The service is not yet authenticated.
pub struct BudgetContext {
    pub config: Config,
    pub ledger: LedgerService,
}

impl BudgetContext {
    /// Create a context from the settings in `app_dir`.
    ///
    /// `interactive` controls whether the browser consent flow may run when
    /// no usable token is cached.
    pub fn new(
        app_dir: &Path,
        interactive: bool,
        logger: Option<Arc<LoggingService>>,
    ) -> Result<Self> {
        let config = Config::load(app_dir)?;
        let connector = Self::connector(&config, interactive)?;

        let mut ledger = LedgerService::new(connector).with_categories(&config.categories);
        if config.demo_mode {
            seed_demo(&mut ledger)?;
        }
        if let Some(logger) = logger {
            ledger = ledger.with_logger(logger);
        }

        Ok(Self { config, ledger })
    }

    fn connector(config: &Config, interactive: bool) -> Result<Box<dyn StoreConnector>> {
        if config.demo_mode {
            return Ok(Box::new(MemoryConnector::new(Arc::new(MemoryStore::new()))));
        }

        let credentials = CredentialManager::new(&config.credentials_path, &config.token_path)?
            .interactive(interactive);
        Ok(Box::new(
            GoogleSheetsConnector::new(credentials, config.spreadsheet_id.clone())
                .with_base_url(config.sheets_base_url.clone()),
        ))
    }
}

/// Fill a demo ledger with a budget and a few expenses.
///
/// Demo data lives in memory and disappears with the process.
fn seed_demo(ledger: &mut LedgerService) -> Result<()> {
    ledger.authenticate()?;
    ledger.initialize()?;
    ledger.update_budget(Decimal::new(5000, 0))?;

    let today = Local::now().date_naive();
    let samples = [
        ("equipment", "Laptop", Decimal::new(1200, 0)),
        ("marketing", "Conference booth", Decimal::new(45000, 2)),
        ("miscellaneous", "Office snacks", Decimal::new(3899, 2)),
    ];
    let categories = ledger.categories().to_vec();
    for (category, description, amount) in samples {
        // Custom category sets may not include the sample categories
        let category = if categories.iter().any(|c| c == category) {
            category.to_string()
        } else {
            match categories.first() {
                Some(c) => c.clone(),
                None => break,
            }
        };
        ledger.add_expense(&Expense::new(today, category, description, amount))?;
    }
    Ok(())
}
