//! The `state` command: show cursors and their ages from the ledger.

use anyhow::{Context, Result};
use chrono::Utc;

use chainwatch_ledger::{Ledger, SqliteLedger};

pub async fn run(config_path: &str) -> Result<()> {
    let cfg = chainwatch_config::load(config_path).context("load config")?;
    let ledger = SqliteLedger::open(&cfg.global.db_path)
        .await
        .context("open ledger")?;

    let cursors = ledger.list_cursors().await?;
    if cursors.is_empty() {
        println!("no cursors yet (nothing has been scanned)");
        return Ok(());
    }

    println!("{:<20} {:>12}  {:<24} {}", "SOURCE", "HEIGHT", "UPDATED", "HASH");
    let now = Utc::now();
    for cur in cursors {
        let age = now.signed_duration_since(cur.updated_at);
        let age = if age.num_seconds() < 120 {
            format!("{}s ago", age.num_seconds().max(0))
        } else if age.num_minutes() < 120 {
            format!("{}m ago", age.num_minutes())
        } else {
            format!("{}h ago", age.num_hours())
        };
        println!(
            "{:<20} {:>12}  {:<24} {}",
            cur.source_id, cur.height, age, cur.hash
        );
    }
    Ok(())
}
