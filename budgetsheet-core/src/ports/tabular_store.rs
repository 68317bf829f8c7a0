//! Tabular store port - the remote spreadsheet abstraction
//!
//! The ledger only needs a handful of range primitives. Addresses are A1
//! strings (`Expenses!A2`, `'Budget Overview'!A2:D2`) produced by the schema.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::Row;

/// How written strings are interpreted by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueInput {
    /// Stored verbatim, never parsed as a formula or number
    Raw,
    /// Parsed as if typed by a user: `=...` becomes a formula
    UserEntered,
}

impl ValueInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueInput::Raw => "RAW",
            ValueInput::UserEntered => "USER_ENTERED",
        }
    }
}

/// Named tables of rows with remote formula evaluation
///
/// Implementations are blocking. Nothing here is transactional: a sequence
/// of calls from two callers can interleave.
pub trait TabularStore: Send + Sync {
    /// Titles of every table in the store
    fn table_names(&self) -> Result<Vec<String>>;

    /// Create tables in a single batched request
    fn add_tables(&self, names: &[String]) -> Result<()>;

    /// Overwrite cells starting at the top-left of `range`
    fn update(&self, range: &str, rows: &[Row], input: ValueInput) -> Result<()>;

    /// Insert rows after the last used row of the table found at `range`
    fn append(&self, range: &str, rows: &[Row], input: ValueInput) -> Result<()>;

    /// Read several ranges in one request.
    ///
    /// Returns one entry per requested range, in order. Empty ranges yield
    /// an empty row list, not an error.
    fn batch_get(&self, ranges: &[String]) -> Result<Vec<Vec<Row>>>;
}

/// Produces an authenticated store handle
///
/// Connecting is where credentials are loaded, refreshed or obtained, so a
/// connector failure is an authentication failure.
pub trait StoreConnector: Send + Sync {
    /// Backend name (e.g., "google-sheets", "memory")
    fn name(&self) -> &str;

    /// Authenticate and return a connected store
    fn connect(&self) -> Result<Arc<dyn TabularStore>>;
}
