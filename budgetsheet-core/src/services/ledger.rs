//! Ledger service - budget operations over a tabular store
//!
//! Keeps a budget in three tables (overview, expenses, per-category
//! analysis). All arithmetic is left to formulas evaluated by the store;
//! this service only writes rows and reads them back.

use std::sync::Arc;

use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::formula;
use crate::domain::result::{Error, Result};
use crate::domain::schema::{FIRST_DATA_ROW, HEADER_ROW};
use crate::domain::{
    decimal_cell, normalize_category, BudgetStatus, Expense, Field, LedgerData, LedgerSchema, Row,
    TableSchema, DEFAULT_CATEGORIES,
};
use crate::ports::{StoreConnector, TabularStore, ValueInput};
use crate::services::logging::{LogEvent, LoggingService};

/// Outcome of table initialization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeReport {
    /// Tables that did not exist and were created
    pub created: Vec<String>,
    /// Tables whose header row was (re)written
    pub headers_written: Vec<String>,
}

/// Service for reading and writing the budget ledger
pub struct LedgerService {
    connector: Box<dyn StoreConnector>,
    schema: LedgerSchema,
    categories: Vec<String>,
    store: Option<Arc<dyn TabularStore>>,
    logger: Option<Arc<LoggingService>>,
}

impl LedgerService {
    pub fn new(connector: Box<dyn StoreConnector>) -> Self {
        Self {
            connector,
            schema: LedgerSchema::standard(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            store: None,
            logger: None,
        }
    }

    /// Replace the category set; names are normalized and deduplicated
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for c in categories {
            let name = normalize_category(c.as_ref());
            if !name.is_empty() && !normalized.contains(&name) {
                normalized.push(name);
            }
        }
        self.categories = normalized;
        self
    }

    pub fn with_schema(mut self, schema: LedgerSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn schema(&self) -> &LedgerSchema {
        &self.schema
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn backend(&self) -> &str {
        self.connector.name()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_some()
    }

    /// Obtain credentials and connect to the store
    pub fn authenticate(&mut self) -> Result<()> {
        let result = self.connector.connect();
        let result = self.record("authenticate", result);
        self.store = Some(result?);
        Ok(())
    }

    /// Drop the store handle; the next operation needs `authenticate` again
    pub fn disconnect(&mut self) {
        if self.store.take().is_some() {
            tracing::debug!(backend = self.connector.name(), "disconnected from store");
        }
    }

    /// Create any missing ledger tables and (re)write their header rows
    pub fn initialize(&self) -> Result<InitializeReport> {
        let tables = self.schema.tables();
        self.initialize_tables(&tables)
    }

    /// Create the given tables if absent, then overwrite row 1 of each with
    /// its header. Safe to run repeatedly.
    pub fn initialize_tables(&self, tables: &[&TableSchema]) -> Result<InitializeReport> {
        let result = self.store().and_then(|store| {
            let existing = store.table_names()?;

            let mut missing: Vec<String> = Vec::new();
            for table in tables {
                if !existing.contains(&table.name) && !missing.contains(&table.name) {
                    missing.push(table.name.clone());
                }
            }

            if !missing.is_empty() {
                store.add_tables(&missing)?;
                for name in &missing {
                    tracing::info!(table = %name, "created table");
                    self.log(LogEvent::new("table_created").with_operation("initialize").with_table(name));
                }
            }

            let mut headers_written = Vec::new();
            for table in tables {
                store.update(
                    &table.anchor(HEADER_ROW),
                    &[table.header_row()],
                    ValueInput::Raw,
                )?;
                headers_written.push(table.name.clone());
            }

            Ok(InitializeReport {
                created: missing,
                headers_written,
            })
        });
        self.record("initialize", result)
    }

    /// Set the total budget, stamping the update time and rewriting the
    /// derived overview formulas
    pub fn update_budget(&self, amount: Decimal) -> Result<()> {
        let result = self.store().and_then(|store| {
            if amount <= Decimal::ZERO {
                return Err(Error::validation(format!(
                    "Budget amount must be positive, got {}",
                    amount
                )));
            }

            let overview = &self.schema.overview;
            let row = overview.build_row(&[
                (Field::TotalBudget, decimal_cell(amount)),
                (
                    Field::LastUpdated,
                    JsonValue::String(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
                ),
                (
                    Field::TotalExpenses,
                    JsonValue::String(formula::total_expenses(&self.schema)?),
                ),
                (
                    Field::RemainingBudget,
                    JsonValue::String(formula::remaining_budget(&self.schema)?),
                ),
            ])?;

            store.update(
                &overview.row_range(FIRST_DATA_ROW),
                &[row],
                ValueInput::UserEntered,
            )
        });
        self.record("update_budget", result)
    }

    /// Append one expense, then refresh the category summary
    pub fn add_expense(&self, expense: &Expense) -> Result<()> {
        let result = self.store().and_then(|store| {
            let expense = expense.validated(&self.categories)?;
            let row = expense.to_row(&self.schema)?;
            store.append(
                &self.schema.expenses.anchor(FIRST_DATA_ROW),
                &[row],
                ValueInput::UserEntered,
            )
        });
        self.record("add_expense", result)?;
        self.update_category_totals()
    }

    /// Overwrite the category summary with one row per configured category.
    ///
    /// Anything previously in those rows, budget allocations included, is
    /// replaced.
    pub fn update_category_totals(&self) -> Result<()> {
        let result = self.store().and_then(|store| {
            let analysis = &self.schema.categories;
            let rows = self
                .categories
                .iter()
                .map(|category| {
                    analysis.build_row(&[
                        (Field::Category, JsonValue::String(category.clone())),
                        (
                            Field::TotalSpent,
                            JsonValue::String(formula::category_total(&self.schema, category)?),
                        ),
                        (Field::BudgetAllocation, JsonValue::String(String::new())),
                    ])
                })
                .collect::<Result<Vec<Row>>>()?;

            store.update(
                &analysis.anchor(FIRST_DATA_ROW),
                &rows,
                ValueInput::UserEntered,
            )
        });
        self.record("update_category_totals", result)
    }

    /// Read all three tables in one batched request
    pub fn get_all_data(&self) -> Result<LedgerData> {
        let result = self.store().and_then(|store| {
            let ranges = vec![
                self.schema.overview.row_range(FIRST_DATA_ROW),
                self.schema.expenses.body_range(),
                self.schema.categories.body_range(),
            ];
            let mut values = store.batch_get(&ranges)?.into_iter();

            let overview = values
                .next()
                .and_then(|rows| rows.into_iter().next())
                .filter(|row| !row.is_empty())
                .unwrap_or_else(LedgerData::default_overview);

            let status = BudgetStatus::from_overview(&self.schema.overview, &overview);
            Ok(LedgerData {
                overview,
                expenses: values.next().unwrap_or_default(),
                analysis: values.next().unwrap_or_default(),
                status,
            })
        });
        self.record("get_all_data", result)
    }

    fn store(&self) -> Result<&Arc<dyn TabularStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::auth("not authenticated"))
    }

    /// Emit the outcome of an operation to tracing and the event log
    fn record<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                tracing::info!(operation, backend = self.connector.name(), "ledger operation completed");
                self.log(LogEvent::new("operation_completed").with_operation(operation));
            }
            Err(e) => {
                tracing::warn!(operation, kind = e.kind(), error = %e, "ledger operation failed");
                self.log(
                    LogEvent::new("operation_failed")
                        .with_operation(operation)
                        .with_error(e),
                );
            }
        }
        result
    }

    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log(event) {
                tracing::debug!(error = %e, "failed to write event log");
            }
        }
    }
}
