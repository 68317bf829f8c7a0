//! Core domain entities
//!
//! Ledger rows, the spreadsheet layout they live in, and the credential
//! documents used to reach it. Pure data and validation - no I/O.

pub mod credential;
mod expense;
pub mod formula;
mod ledger;
pub mod result;
pub mod schema;

/// One spreadsheet row as JSON cell values
pub type Row = Vec<serde_json::Value>;

pub use credential::{AuthorizedUser, ClientConfig, ClientSecrets, SHEETS_SCOPE};
pub use expense::{decimal_cell, normalize_category, text_cell, Expense, DEFAULT_CATEGORIES};
pub use ledger::{cell_text, BudgetHealth, BudgetStatus, LedgerData, WARNING_UTILIZATION_PERCENT};
pub use schema::{Field, LedgerSchema, TableSchema};
