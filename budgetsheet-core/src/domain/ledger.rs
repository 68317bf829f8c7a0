//! Snapshot of the whole ledger as read back from the store

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::schema::{Field, TableSchema};
use super::Row;

/// Percent of the budget above which spending is flagged
pub const WARNING_UTILIZATION_PERCENT: i64 = 80;

/// Raw rows of all three tables.
///
/// Values are returned exactly as the store renders them; formula cells
/// hold whatever the remote formula engine produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerData {
    /// The single overview row
    pub overview: Row,
    /// Expense rows in entry order
    pub expenses: Vec<Row>,
    /// Category summary rows
    pub analysis: Vec<Row>,
    /// Budget health read from the overview row, when its cells hold numbers
    #[serde(default)]
    pub status: Option<BudgetStatus>,
}

impl LedgerData {
    /// Overview row used when the sheet has no data yet: `[0, "", 0, 0]`
    pub fn default_overview() -> Row {
        vec![
            JsonValue::from(0),
            JsonValue::from(""),
            JsonValue::from(0),
            JsonValue::from(0),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetHealth {
    /// No budget has been set
    Unset,
    Healthy,
    /// More than [`WARNING_UTILIZATION_PERCENT`] of the budget is spent
    Warning,
    OverBudget,
}

/// How much of the budget is used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub total_budget: Decimal,
    pub total_expenses: Decimal,
    pub remaining: Decimal,
    /// Percent of the budget spent, to one decimal place
    pub utilization: Option<Decimal>,
    pub health: BudgetHealth,
    /// Spending beyond the budget
    pub overspent: Option<Decimal>,
}

impl BudgetStatus {
    pub fn new(total_budget: Decimal, total_expenses: Decimal, remaining: Decimal) -> Self {
        if total_budget <= Decimal::ZERO {
            return Self {
                total_budget,
                total_expenses,
                remaining,
                utilization: None,
                health: BudgetHealth::Unset,
                overspent: None,
            };
        }

        let warning_threshold = total_budget
            .checked_mul(Decimal::new(WARNING_UTILIZATION_PERCENT, 2))
            .unwrap_or(total_budget);
        let health = if total_expenses > total_budget {
            BudgetHealth::OverBudget
        } else if total_expenses > warning_threshold {
            BudgetHealth::Warning
        } else {
            BudgetHealth::Healthy
        };

        Self {
            total_budget,
            total_expenses,
            remaining,
            utilization: utilization_percent(total_expenses, total_budget),
            health,
            overspent: (total_expenses > total_budget)
                .then(|| total_expenses.checked_sub(total_budget))
                .flatten(),
        }
    }

    /// Read the overview row as evaluated by the store.
    ///
    /// Totals come from the store's own formula results. Returns None when
    /// the budget or total-expenses cell is not a number, e.g. a formula the
    /// store has not evaluated.
    pub fn from_overview(table: &TableSchema, row: &Row) -> Option<Self> {
        let cell = |field: Field| {
            table
                .position(field)
                .ok()
                .and_then(|index| row.get(index))
                .and_then(parse_amount)
        };

        let total_budget = cell(Field::TotalBudget)?;
        let total_expenses = cell(Field::TotalExpenses)?;
        let remaining = cell(Field::RemainingBudget)
            .or_else(|| total_budget.checked_sub(total_expenses))?;
        Some(Self::new(total_budget, total_expenses, remaining))
    }
}

/// Percent of `budget` spent, to one decimal place.
///
/// None when the ratio does not fit in a `Decimal`.
fn utilization_percent(spent: Decimal, budget: Decimal) -> Option<Decimal> {
    let hundred = Decimal::ONE_HUNDRED;
    spent
        .checked_mul(hundred)
        .and_then(|scaled| scaled.checked_div(budget))
        .or_else(|| spent.checked_div(budget)?.checked_mul(hundred))
        .map(|percent| percent.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

/// Parse a number or a formatted amount such as `"$1,234.50"`
fn parse_amount(value: &JsonValue) -> Option<Decimal> {
    let text = match value {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Render a cell for display
pub fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
