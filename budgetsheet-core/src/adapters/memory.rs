//! In-memory tabular store
//!
//! Follows the Sheets API range semantics closely enough to run the ledger
//! against it: quoted sheet names, open-ended ranges, append after the last
//! used row, trailing blanks trimmed on read, duplicate sheet titles
//! rejected. Formulas are kept as text and never evaluated.
//!
//! Used by tests and by demo mode.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};
use crate::domain::schema::column_index;
use crate::domain::Row;
use crate::ports::{StoreConnector, TabularStore, ValueInput};

/// A parsed A1 reference such as `'Budget Overview'!A2:D2` or `Expenses!A2:E`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    /// 1-based
    pub start_row: u32,
    /// 0-based
    pub start_col: usize,
    /// Inclusive; `None` means open-ended
    pub end_row: Option<u32>,
    /// Inclusive; `None` means open-ended
    pub end_col: Option<usize>,
}

fn a1_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:'((?:[^']|'')+)'|([^'!][^!]*))(?:!([A-Z]+)(\d+)?(?::([A-Z]+)(\d+)?)?)?$")
            .unwrap()
    })
}

impl A1Range {
    pub fn parse(range: &str) -> Result<Self> {
        let unparseable = || Error::remote(format!("Unable to parse range: {}", range));

        let caps = a1_regex().captures(range).ok_or_else(unparseable)?;

        let sheet = match (caps.get(1), caps.get(2)) {
            (Some(quoted), _) => quoted.as_str().replace("''", "'"),
            (None, Some(bare)) => bare.as_str().to_string(),
            _ => return Err(unparseable()),
        };

        let col = |i: usize| -> Result<Option<usize>> {
            match caps.get(i) {
                Some(m) => column_index(m.as_str()).map(Some).ok_or_else(unparseable),
                None => Ok(None),
            }
        };
        let row = |i: usize| -> Result<Option<u32>> {
            match caps.get(i) {
                Some(m) => match m.as_str().parse::<u32>() {
                    Ok(0) | Err(_) => Err(unparseable()),
                    Ok(n) => Ok(Some(n)),
                },
                None => Ok(None),
            }
        };

        let start_col = col(3)?;
        let start_row = row(4)?;
        let has_end = caps.get(5).is_some();

        let (end_col, end_row) = match start_col {
            // Whole sheet
            None => (None, None),
            // Single cell, or whole column like `D` when no row was given
            Some(c) if !has_end => (Some(c), start_row),
            Some(_) => (col(5)?, row(6)?),
        };

        Ok(Self {
            sheet,
            start_row: start_row.unwrap_or(1),
            start_col: start_col.unwrap_or(0),
            end_row,
            end_col,
        })
    }

    fn contains_row(&self, row: u32) -> bool {
        row >= self.start_row && self.end_row.map_or(true, |end| row <= end)
    }

    fn contains_col(&self, col: usize) -> bool {
        col >= self.start_col && self.end_col.map_or(true, |end| col <= end)
    }
}

/// One call made against the store, recorded in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRequest {
    TableNames,
    AddTables(Vec<String>),
    Update { range: String, input: ValueInput },
    Append { range: String, input: ValueInput },
    BatchGet(Vec<String>),
}

#[derive(Debug, Default)]
struct Sheet {
    title: String,
    /// `cells[0]` is spreadsheet row 1
    cells: Vec<Row>,
}

impl Sheet {
    fn set(&mut self, row: u32, col: usize, value: JsonValue) {
        let r = (row - 1) as usize;
        if self.cells.len() <= r {
            self.cells.resize(r + 1, Vec::new());
        }
        let cells = &mut self.cells[r];
        if cells.len() <= col {
            cells.resize(col + 1, JsonValue::Null);
        }
        cells[col] = value;
    }

    fn row_used_from(&self, r: usize, start_col: usize) -> bool {
        self.cells
            .get(r)
            .map(|cells| cells.iter().skip(start_col).any(|v| !v.is_null()))
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    sheets: Vec<Sheet>,
    journal: Vec<StoreRequest>,
    failure: Option<String>,
}

impl MemoryState {
    fn sheet_mut(&mut self, range: &A1Range, raw: &str) -> Result<&mut Sheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.title == range.sheet)
            .ok_or_else(|| Error::remote(format!("Unable to parse range: {}", raw)))
    }

    fn sheet(&self, range: &A1Range, raw: &str) -> Result<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.title == range.sheet)
            .ok_or_else(|| Error::remote(format!("Unable to parse range: {}", raw)))
    }

    fn check_failure(&self) -> Result<()> {
        match &self.failure {
            Some(msg) => Err(Error::remote(msg.clone())),
            None => Ok(()),
        }
    }
}

/// Empty strings clear a cell, as they do in Sheets
fn stored_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) if s.is_empty() => JsonValue::Null,
        other => other.clone(),
    }
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already has the given (empty) tables
    pub fn with_tables(names: &[&str]) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            for name in names {
                state.sheets.push(Sheet {
                    title: name.to_string(),
                    cells: Vec::new(),
                });
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))
    }

    /// Every cell of a table, row 1 first, with trailing blanks trimmed
    pub fn table_rows(&self, name: &str) -> Option<Vec<Row>> {
        let state = self.lock().ok()?;
        let sheet = state.sheets.iter().find(|s| s.title == name)?;
        Some(trim_rows(
            sheet.cells.iter().map(|r| trim_row(r.clone())).collect(),
        ))
    }

    /// Calls made so far, oldest first
    pub fn requests(&self) -> Vec<StoreRequest> {
        self.lock().map(|s| s.journal.clone()).unwrap_or_default()
    }

    pub fn clear_requests(&self) {
        if let Ok(mut state) = self.lock() {
            state.journal.clear();
        }
    }

    /// Make every subsequent call fail with a remote error (`None` to reset)
    pub fn set_failure(&self, message: Option<&str>) {
        if let Ok(mut state) = self.lock() {
            state.failure = message.map(str::to_string);
        }
    }
}

impl TabularStore for MemoryStore {
    fn table_names(&self) -> Result<Vec<String>> {
        let mut state = self.lock()?;
        state.journal.push(StoreRequest::TableNames);
        state.check_failure()?;
        Ok(state.sheets.iter().map(|s| s.title.clone()).collect())
    }

    fn add_tables(&self, names: &[String]) -> Result<()> {
        let mut state = self.lock()?;
        state.journal.push(StoreRequest::AddTables(names.to_vec()));
        state.check_failure()?;

        // The batch is all-or-nothing
        for (i, name) in names.iter().enumerate() {
            let duplicate = state.sheets.iter().any(|s| &s.title == name)
                || names[..i].contains(name);
            if duplicate {
                return Err(Error::remote(format!(
                    "Invalid requests[{}].addSheet: A sheet with the name \"{}\" already exists. Please enter another name.",
                    i, name
                )));
            }
        }

        for name in names {
            state.sheets.push(Sheet {
                title: name.clone(),
                cells: Vec::new(),
            });
        }
        Ok(())
    }

    fn update(&self, range: &str, rows: &[Row], input: ValueInput) -> Result<()> {
        let mut state = self.lock()?;
        state.journal.push(StoreRequest::Update {
            range: range.to_string(),
            input,
        });
        state.check_failure()?;

        let target = A1Range::parse(range)?;

        // Single-cell anchors grow to fit the data; explicit areas must hold it
        let is_anchor = target.end_row == Some(target.start_row)
            && target.end_col == Some(target.start_col);
        if !is_anchor {
            for (i, row) in rows.iter().enumerate() {
                let r = target.start_row + i as u32;
                let last_col = target.start_col + row.len().saturating_sub(1);
                if !target.contains_row(r) || (!row.is_empty() && !target.contains_col(last_col)) {
                    return Err(Error::remote(format!(
                        "Requested writing within range [{}], but tried writing to row [{}]",
                        range, r
                    )));
                }
            }
        }

        let sheet = state.sheet_mut(&target, range)?;
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                sheet.set(target.start_row + i as u32, target.start_col + j, stored_value(value));
            }
        }
        Ok(())
    }

    fn append(&self, range: &str, rows: &[Row], input: ValueInput) -> Result<()> {
        let mut state = self.lock()?;
        state.journal.push(StoreRequest::Append {
            range: range.to_string(),
            input,
        });
        state.check_failure()?;

        let target = A1Range::parse(range)?;
        let sheet = state.sheet_mut(&target, range)?;

        let first = (target.start_row - 1) as usize;
        let last_used = (first..sheet.cells.len())
            .rev()
            .find(|&r| sheet.row_used_from(r, target.start_col));
        let insert_at = match last_used {
            Some(r) => r + 1,
            None => first,
        };

        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                sheet.set((insert_at + i + 1) as u32, target.start_col + j, stored_value(value));
            }
        }
        Ok(())
    }

    fn batch_get(&self, ranges: &[String]) -> Result<Vec<Vec<Row>>> {
        let mut state = self.lock()?;
        state.journal.push(StoreRequest::BatchGet(ranges.to_vec()));
        state.check_failure()?;

        let mut results = Vec::with_capacity(ranges.len());
        for raw in ranges {
            let target = A1Range::parse(raw)?;
            let sheet = state.sheet(&target, raw)?;

            let rows: Vec<Row> = sheet
                .cells
                .iter()
                .enumerate()
                .filter(|(r, _)| target.contains_row(*r as u32 + 1))
                .map(|(_, cells)| {
                    let picked: Row = cells
                        .iter()
                        .enumerate()
                        .filter(|(c, _)| target.contains_col(*c))
                        .map(|(_, v)| v.clone())
                        .collect();
                    trim_row(picked)
                })
                .collect();

            results.push(trim_rows(rows));
        }
        Ok(results)
    }
}

/// Drop trailing blanks and render inner blanks as empty strings
fn trim_row(mut row: Row) -> Row {
    while row.last().is_some_and(JsonValue::is_null) {
        row.pop();
    }
    row.into_iter()
        .map(|v| if v.is_null() { JsonValue::from("") } else { v })
        .collect()
}

fn trim_rows(mut rows: Vec<Row>) -> Vec<Row> {
    while rows.last().is_some_and(Vec::is_empty) {
        rows.pop();
    }
    rows
}

/// Connector handing out a shared [`MemoryStore`]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    reject: Option<String>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            reject: None,
        }
    }

    /// A connector whose authentication always fails
    pub fn rejecting(store: Arc<MemoryStore>, reason: impl Into<String>) -> Self {
        Self {
            store,
            reject: Some(reason.into()),
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }
}

impl StoreConnector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    fn connect(&self) -> Result<Arc<dyn TabularStore>> {
        if let Some(reason) = &self.reject {
            return Err(Error::auth(reason.clone()));
        }
        let store: Arc<dyn TabularStore> = self.store.clone();
        Ok(store)
    }
}
