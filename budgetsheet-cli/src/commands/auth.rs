//! Auth command - authorize access to Google Sheets

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use budgetsheet_core::adapters::oauth::CredentialManager;
use budgetsheet_core::config::Config;
use budgetsheet_core::EntryPoint;

use super::{get_app_dir, get_logger, log_command};
use crate::output;

pub fn run(force: bool, json: bool) -> Result<()> {
    let logger = get_logger(EntryPoint::Cli);
    log_command(&logger, "auth");

    let app_dir = get_app_dir()?;
    let config = Config::load(&app_dir)?;
    if config.demo_mode {
        output::warning("Demo mode is on; the demo ledger needs no authorization.");
        return Ok(());
    }

    let manager = CredentialManager::new(&config.credentials_path, &config.token_path)?
        .with_prompt(|url| {
            println!("Open this URL in your browser to authorize budgetsheet:");
            println!();
            println!("  {}", url.cyan());
            println!();
            println!("Waiting for the authorization redirect...");
        });

    let user = if force {
        manager.authorize()?
    } else {
        manager.obtain()?
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "token_path": manager.token_file().path().to_string_lossy(),
                "scopes": user.scopes,
                "expires_at": user.expiry.map(|e| e.to_rfc3339()),
                "refreshable": user.can_refresh(),
            })
        );
        return Ok(());
    }

    output::success("Authorized");
    println!("  Token: {}", manager.token_file().path().display());
    if let Some(expiry) = user.expiry {
        let minutes = (expiry - Utc::now()).num_minutes().max(0);
        println!("  Access token expires in {} minutes", minutes);
    }
    if !user.can_refresh() {
        output::warning("No refresh token was issued; you will need to re-run `bsheet auth` when it expires.");
    }
    Ok(())
}
