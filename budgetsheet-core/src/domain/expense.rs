//! Expense domain model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::formula;
use super::result::{Error, Result};
use super::schema::{Field, LedgerSchema};
use super::Row;

/// Categories every new ledger starts with
pub const DEFAULT_CATEGORIES: &[&str] = &["equipment", "salaries", "marketing", "miscellaneous"];

/// A single spending entry appended to the Expenses table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub date: NaiveDate,
    pub category: String,
    pub description: String,
    pub amount: Decimal,
}

impl Expense {
    pub fn new(
        date: NaiveDate,
        category: impl Into<String>,
        description: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            date,
            category: category.into(),
            description: description.into(),
            amount,
        }
    }

    /// Check the expense against the configured category set and return a
    /// normalized copy (trimmed description, lower-case category).
    pub fn validated(&self, categories: &[String]) -> Result<Expense> {
        let description = self.description.trim();
        if description.is_empty() {
            return Err(Error::validation("Expense description cannot be empty"));
        }

        if self.amount <= Decimal::ZERO {
            return Err(Error::validation(format!(
                "Expense amount must be positive, got {}",
                self.amount
            )));
        }

        let category = normalize_category(&self.category);
        if category.is_empty() {
            return Err(Error::validation("Expense category cannot be empty"));
        }
        if !categories.iter().any(|c| normalize_category(c) == category) {
            return Err(Error::validation(format!(
                "Unknown category '{}'. Expected one of: {}",
                category,
                categories.join(", ")
            )));
        }

        Ok(Expense {
            date: self.date,
            category,
            description: description.to_string(),
            amount: self.amount,
        })
    }

    /// Cells for the Expenses table, running-total formula included
    pub fn to_row(&self, schema: &LedgerSchema) -> Result<Row> {
        schema.expenses.build_row(&[
            (Field::Date, JsonValue::String(self.date.format("%Y-%m-%d").to_string())),
            (Field::Category, JsonValue::String(self.category.clone())),
            (Field::Description, text_cell(&self.description)),
            (Field::Amount, decimal_cell(self.amount)),
            (Field::RunningTotal, JsonValue::String(formula::running_total(schema)?)),
        ])
    }
}

/// Category names compare trimmed and case-insensitively
pub fn normalize_category(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Free text for a user-entered cell.
///
/// Text starting with a formula, sign or quote character gets a leading
/// apostrophe so the store keeps it as a literal string.
pub fn text_cell(text: &str) -> JsonValue {
    if text.starts_with(['=', '+', '-', '@', '\'']) {
        JsonValue::String(format!("'{}", text))
    } else {
        JsonValue::String(text.to_string())
    }
}

/// Decimal as a JSON number when it converts exactly, otherwise as text
pub fn decimal_cell(value: Decimal) -> JsonValue {
    let value = value.normalize();
    let text = value.to_string();
    match text.parse::<serde_json::Number>() {
        Ok(number) if number.to_string().parse::<Decimal>().ok() == Some(value) => {
            JsonValue::Number(number)
        }
        _ => JsonValue::String(text),
    }
}
