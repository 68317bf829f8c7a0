//! budgetsheet CLI - a budget ledger kept in Google Sheets

use std::process::ExitCode;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod commands;
mod output;

use commands::{auth, ledger, logs, serve, setup};

/// budgetsheet - track a budget and its expenses in a Google spreadsheet
#[derive(Parser)]
#[command(name = "bsheet", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the spreadsheet, credentials and categories
    Setup(setup::SetupArgs),

    /// Authorize access to Google Sheets in the browser
    Auth {
        /// Re-run the consent flow even if a valid token is cached
        #[arg(long)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create missing sheets and write their header rows
    Init {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set the total budget
    Budget {
        /// Budget amount
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record an expense
    Expense {
        /// Amount spent
        amount: Decimal,
        /// Expense category
        #[arg(short, long)]
        category: String,
        /// What the money was spent on
        #[arg(short, long)]
        description: String,
        /// Date of the expense (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite the per-category spending totals
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the overview, expenses and category totals
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the JSON web API
    Serve {
        /// Address to listen on (defaults to the configured bind address)
        #[arg(long)]
        addr: Option<String>,
    },

    /// View and manage the operation log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info,tower_http=info",
        _ => "warn",
    };
    init_tracing(default_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            if let Some(core_err) = e.downcast_ref::<budgetsheet_core::Error>() {
                match core_err {
                    budgetsheet_core::Error::Auth(_) => {
                        output::hint("Run 'bsheet auth' to authorize access to Google Sheets.")
                    }
                    budgetsheet_core::Error::Config(_) => {
                        output::hint("Run 'bsheet setup' to configure the spreadsheet.")
                    }
                    _ => {}
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Setup(args) => setup::run(args),
        Commands::Auth { force, json } => auth::run(force, json),
        Commands::Init { json } => ledger::run_init(json),
        Commands::Budget { amount, json } => ledger::run_budget(amount, json),
        Commands::Expense {
            amount,
            category,
            description,
            date,
            json,
        } => ledger::run_expense(amount, category, description, date, json),
        Commands::Categories { json } => ledger::run_categories(json),
        Commands::Show { json } => ledger::run_show(json),
        Commands::Serve { addr } => serve::run(addr),
        Commands::Logs { command } => logs::run(command),
    }
}
