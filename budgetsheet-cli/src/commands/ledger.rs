//! Ledger commands - initialize tables, set the budget, record expenses, show data

use anyhow::Result;
use chrono::{Local, NaiveDate};
use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;

use budgetsheet_core::domain::{cell_text, BudgetHealth, BudgetStatus, Row, TableSchema};
use budgetsheet_core::{EntryPoint, Expense, OperationResult};

use super::{get_context, get_logger, log_command};
use crate::output;

/// Print a JSON envelope for `result`, or hand the value to `render`
fn emit<T: Serialize>(
    json: bool,
    result: budgetsheet_core::domain::result::Result<T>,
    render: impl FnOnce(&T),
) -> Result<()> {
    if json {
        let failed = result.as_ref().err().map(|e| e.to_string());
        println!(
            "{}",
            serde_json::to_string_pretty(&OperationResult::from(result))?
        );
        return match failed {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        };
    }

    let value = result?;
    render(&value);
    Ok(())
}

pub fn run_init(json: bool) -> Result<()> {
    let logger = get_logger(EntryPoint::Cli);
    log_command(&logger, "init");
    let ctx = get_context(true, logger)?;

    emit(json, ctx.ledger.initialize(), |report| {
        for name in &report.created {
            output::info(&format!("Created sheet '{}'", name));
        }
        output::success(&format!(
            "Spreadsheet ready ({} sheets checked)",
            report.headers_written.len()
        ));
    })
}

pub fn run_budget(amount: Decimal, json: bool) -> Result<()> {
    let logger = get_logger(EntryPoint::Cli);
    log_command(&logger, "budget");
    let ctx = get_context(true, logger)?;

    emit(json, ctx.ledger.update_budget(amount), |_| {
        output::success(&format!("Budget set to {}", amount));
    })
}

pub fn run_expense(
    amount: Decimal,
    category: String,
    description: String,
    date: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let logger = get_logger(EntryPoint::Cli);
    log_command(&logger, "expense");
    let ctx = get_context(true, logger)?;

    let expense = Expense::new(
        date.unwrap_or_else(|| Local::now().date_naive()),
        category,
        description,
        amount,
    );
    emit(json, ctx.ledger.add_expense(&expense), |_| {
        output::success(&format!(
            "Recorded {} for {} on {}",
            expense.amount, expense.category, expense.date
        ));
    })
}

pub fn run_categories(json: bool) -> Result<()> {
    let logger = get_logger(EntryPoint::Cli);
    log_command(&logger, "categories");
    let ctx = get_context(true, logger)?;

    let categories = ctx.ledger.categories().to_vec();
    emit(json, ctx.ledger.update_category_totals(), |_| {
        output::success(&format!(
            "Category totals refreshed: {}",
            categories.join(", ")
        ));
    })
}

pub fn run_show(json: bool) -> Result<()> {
    let logger = get_logger(EntryPoint::Cli);
    log_command(&logger, "show");
    let ctx = get_context(true, logger)?;

    let schema = ctx.ledger.schema().clone();
    emit(json, ctx.ledger.get_all_data(), |data| {
        print_table(&schema.overview, std::slice::from_ref(&data.overview));
        println!();
        if data.expenses.is_empty() {
            println!("No expenses recorded yet.");
        } else {
            print_table(&schema.expenses, &data.expenses);
        }
        println!();
        print_table(&schema.categories, &data.analysis);
        if let Some(status) = &data.status {
            println!();
            print_status(status);
        }
    })
}

fn print_status(status: &BudgetStatus) {
    match status.health {
        BudgetHealth::Unset => output::info("No budget set yet. Run 'bsheet budget <amount>' to set one."),
        BudgetHealth::OverBudget => output::warning(&format!(
            "Over budget by {} ({}% of {} used)",
            status.overspent.unwrap_or_default(),
            status.utilization.unwrap_or_default(),
            status.total_budget
        )),
        BudgetHealth::Warning => output::warning(&format!(
            "{}% of the budget used, {} remaining",
            status.utilization.unwrap_or_default(),
            status.remaining
        )),
        BudgetHealth::Healthy => output::success(&format!(
            "{}% of the budget used, {} remaining",
            status.utilization.unwrap_or_default(),
            status.remaining
        )),
    }
}

fn print_table(table_schema: &TableSchema, rows: &[Row]) {
    println!("{}", table_schema.name.bold());

    let mut table = output::create_table();
    table.set_header(
        table_schema
            .header_row()
            .iter()
            .map(cell_text)
            .collect::<Vec<_>>(),
    );
    for row in rows {
        let mut cells: Vec<String> = row.iter().map(cell_text).collect();
        cells.resize(table_schema.width(), String::new());
        table.add_row(cells);
    }
    println!("{}", table);
}
