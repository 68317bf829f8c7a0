//! Spreadsheet formulas written into the ledger
//!
//! The adapter never sums anything itself. These builders produce the
//! formula strings the remote formula engine evaluates, with every cell
//! reference derived from the [`LedgerSchema`].

use super::result::Result;
use super::schema::{Field, LedgerSchema, FIRST_DATA_ROW};

/// Sum of every expense amount: `=SUM(Expenses!D2:D)`
pub fn total_expenses(schema: &LedgerSchema) -> Result<String> {
    Ok(format!(
        "=SUM({})",
        schema.expenses.column_span(Field::Amount)?
    ))
}

/// Overview remaining budget: total budget cell minus total expenses cell
/// of the same row, e.g. `=A2-C2`.
pub fn remaining_budget(schema: &LedgerSchema) -> Result<String> {
    let overview = &schema.overview;
    Ok(format!(
        "={}-{}",
        overview.cell(Field::TotalBudget, FIRST_DATA_ROW)?,
        overview.cell(Field::TotalExpenses, FIRST_DATA_ROW)?
    ))
}

/// Running total for an appended expense row.
///
/// Appends land on a row chosen by the store, so the formula resolves its
/// own row at evaluation time: `=SUM(INDIRECT("D2:D"&ROW()))`.
pub fn running_total(schema: &LedgerSchema) -> Result<String> {
    let span = schema.expenses.local_column_span(Field::Amount)?;
    Ok(format!("=SUM(INDIRECT({}&ROW()))", string_literal(&span)))
}

/// Amount spent in one category:
/// `=SUMIF(Expenses!B2:B,"equipment",Expenses!D2:D)`
pub fn category_total(schema: &LedgerSchema, category: &str) -> Result<String> {
    Ok(format!(
        "=SUMIF({},{},{})",
        schema.expenses.column_span(Field::Category)?,
        string_literal(category),
        schema.expenses.column_span(Field::Amount)?
    ))
}

/// Formula string literal with embedded quotes doubled
fn string_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
