//! Table layout of the ledger spreadsheet
//!
//! Column order is load-bearing: formulas reference other cells by letter.
//! Everything that needs an address (ranges for reads and writes, cell
//! references inside formulas) asks the schema instead of spelling one out,
//! so moving a column only means editing the column list.

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::result::{Error, Result};
use super::Row;

/// Row holding the column headers
pub const HEADER_ROW: u32 = 1;

/// First row below the headers
pub const FIRST_DATA_ROW: u32 = 2;

/// Logical meaning of a column, independent of its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    // Budget Overview
    TotalBudget,
    LastUpdated,
    TotalExpenses,
    RemainingBudget,
    // Expenses
    Date,
    Category,
    Description,
    Amount,
    RunningTotal,
    // Categories
    TotalSpent,
    BudgetAllocation,
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub field: Field,
    pub header: String,
}

/// A named table (spreadsheet tab) and its ordered columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: &[(Field, &str)]) -> Self {
        Self {
            name: name.into(),
            columns: columns
                .iter()
                .map(|(field, header)| Column {
                    field: *field,
                    header: header.to_string(),
                })
                .collect(),
        }
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Header cells in column order
    pub fn header_row(&self) -> Row {
        self.columns
            .iter()
            .map(|c| JsonValue::String(c.header.clone()))
            .collect()
    }

    /// Lay out field values in column order.
    ///
    /// Columns without a value are written as empty strings, which the store
    /// treats as blank cells.
    pub fn build_row(&self, cells: &[(Field, JsonValue)]) -> Result<Row> {
        let mut row = vec![JsonValue::String(String::new()); self.width()];
        for (field, value) in cells {
            row[self.position(*field)?] = value.clone();
        }
        Ok(row)
    }

    /// Zero-based position of a field
    pub fn position(&self, field: Field) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.field == field)
            .ok_or_else(|| {
                Error::config(format!(
                    "Table '{}' has no column for {:?}",
                    self.name, field
                ))
            })
    }

    /// Column letter of a field (`D` for the fourth column)
    pub fn letter(&self, field: Field) -> Result<String> {
        Ok(column_letter(self.position(field)?))
    }

    /// Sheet qualifier for A1 references, quoted when needed
    pub fn sheet_prefix(&self) -> String {
        format!("{}!", quote_sheet_name(&self.name))
    }

    /// Unqualified cell address, e.g. `C2`
    pub fn cell(&self, field: Field, row: u32) -> Result<String> {
        Ok(format!("{}{}", self.letter(field)?, row))
    }

    /// Top-left cell of a row, e.g. `Expenses!A2`
    pub fn anchor(&self, row: u32) -> String {
        format!("{}A{}", self.sheet_prefix(), row)
    }

    /// One full row, e.g. `'Budget Overview'!A2:D2`
    pub fn row_range(&self, row: u32) -> String {
        format!(
            "{}A{}:{}{}",
            self.sheet_prefix(),
            row,
            self.last_letter(),
            row
        )
    }

    /// Every data row, open-ended downwards, e.g. `Expenses!A2:E`
    pub fn body_range(&self) -> String {
        format!(
            "{}A{}:{}",
            self.sheet_prefix(),
            FIRST_DATA_ROW,
            self.last_letter()
        )
    }

    /// Data cells of one column without the sheet qualifier, e.g. `D2:D`
    pub fn local_column_span(&self, field: Field) -> Result<String> {
        let letter = self.letter(field)?;
        Ok(format!("{}{}:{}", letter, FIRST_DATA_ROW, letter))
    }

    /// Data cells of one column, e.g. `Expenses!D2:D`
    pub fn column_span(&self, field: Field) -> Result<String> {
        Ok(format!(
            "{}{}",
            self.sheet_prefix(),
            self.local_column_span(field)?
        ))
    }

    fn last_letter(&self) -> String {
        column_letter(self.width().saturating_sub(1))
    }
}

/// The three tables making up a ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSchema {
    pub overview: TableSchema,
    pub expenses: TableSchema,
    pub categories: TableSchema,
}

impl LedgerSchema {
    /// Layout used by the spreadsheets this tool creates
    pub fn standard() -> Self {
        Self {
            overview: TableSchema::new(
                "Budget Overview",
                &[
                    (Field::TotalBudget, "Total Budget"),
                    (Field::LastUpdated, "Last Updated"),
                    (Field::TotalExpenses, "Total Expenses"),
                    (Field::RemainingBudget, "Remaining Budget"),
                ],
            ),
            expenses: TableSchema::new(
                "Expenses",
                &[
                    (Field::Date, "Date"),
                    (Field::Category, "Category"),
                    (Field::Description, "Description"),
                    (Field::Amount, "Amount"),
                    (Field::RunningTotal, "Running Total"),
                ],
            ),
            categories: TableSchema::new(
                "Categories",
                &[
                    (Field::Category, "Category"),
                    (Field::TotalSpent, "Total Spent"),
                    (Field::BudgetAllocation, "Budget Allocation"),
                ],
            ),
        }
    }

    pub fn tables(&self) -> [&TableSchema; 3] {
        [&self.overview, &self.expenses, &self.categories]
    }
}

impl Default for LedgerSchema {
    fn default() -> Self {
        Self::standard()
    }
}

/// Convert a zero-based column index to letters (0 → A, 25 → Z, 26 → AA)
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Convert column letters to a zero-based index (A → 0, AA → 26)
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        n = n * 26 + (c as usize - 'A' as usize + 1);
    }
    Some(n - 1)
}

/// Quote a sheet name for A1 notation when it is not a bare identifier
pub fn quote_sheet_name(name: &str) -> String {
    let bare = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if bare {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}
