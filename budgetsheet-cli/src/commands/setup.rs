//! Setup command - point budgetsheet at a spreadsheet

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use dialoguer::Input;

use budgetsheet_core::config::Config;
use budgetsheet_core::domain::normalize_category;
use budgetsheet_core::EntryPoint;

use super::{get_app_dir, get_logger, log_command};

#[derive(Args)]
pub struct SetupArgs {
    /// Spreadsheet ID (the long token in the sheet URL)
    #[arg(long)]
    pub sheet_id: Option<String>,
    /// Path to the OAuth client secrets JSON downloaded from Google Cloud
    #[arg(long)]
    pub credentials: Option<PathBuf>,
    /// Comma-separated expense categories
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,
    /// Address for `bsheet serve`
    #[arg(long)]
    pub bind: Option<String>,
    /// Turn demo mode on or off
    #[arg(long)]
    pub demo: Option<bool>,
}

pub fn run(args: SetupArgs) -> Result<()> {
    let logger = get_logger(EntryPoint::Cli);
    log_command(&logger, "setup");

    let app_dir = get_app_dir()?;
    let mut config = Config::load(&app_dir)?;

    match args.demo {
        Some(true) => config.enable_demo_mode(),
        Some(false) => config.disable_demo_mode(),
        None => {}
    }

    let nothing_given = args.sheet_id.is_none()
        && args.credentials.is_none()
        && args.categories.is_empty()
        && args.bind.is_none()
        && args.demo.is_none();

    let sheet_id = match args.sheet_id {
        Some(id) => Some(id),
        None if nothing_given && !config.demo_mode => {
            let mut input = Input::<String>::new().with_prompt("Spreadsheet ID");
            if let Some(current) = &config.spreadsheet_id {
                input = input.default(current.clone());
            }
            Some(input.interact_text()?)
        }
        None => None,
    };
    if let Some(id) = sheet_id {
        let id = id.trim().to_string();
        if id.is_empty() {
            bail!("Spreadsheet ID cannot be empty");
        }
        config.spreadsheet_id = Some(id);
    }

    if let Some(path) = args.credentials {
        if !path.exists() {
            bail!("Client secrets file not found: {}", path.display());
        }
        config.credentials_path = path;
    }

    if !args.categories.is_empty() {
        let mut categories: Vec<String> = Vec::new();
        for category in args.categories.iter().map(|c| normalize_category(c)) {
            if !category.is_empty() && !categories.contains(&category) {
                categories.push(category);
            }
        }
        if categories.is_empty() {
            bail!("At least one category is required");
        }
        config.categories = categories;
    }

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    config.save(&app_dir)?;

    println!("{} Settings saved to {}", "Success!".green(), app_dir.join("settings.json").display());
    if config.demo_mode {
        println!("Demo mode is on. Ledger data is kept in memory.");
    } else {
        println!(
            "Spreadsheet: {}",
            config.spreadsheet_id.as_deref().unwrap_or("(not set)")
        );
        if !config.credentials_path.exists() {
            println!(
                "Place your OAuth client secrets at {} or pass --credentials.",
                config.credentials_path.display()
            );
        }
        println!("Run 'bsheet auth' to authorize, then 'bsheet init' to create the sheets.");
    }
    Ok(())
}
