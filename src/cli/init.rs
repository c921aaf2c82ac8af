use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crm_mcp::config::CrmConfig;
use crm_mcp::crm::new_id;
use crm_mcp::resolve::format_timestamp;

/// Create an account with an owner user.
pub fn init(
    config: &CrmConfig,
    account_name: &str,
    owner_email: &str,
    owner_name: &str,
    account_id: Option<String>,
) -> Result<()> {
    let db_path = config.resolved_db_path();
    let mut conn = crm_mcp::db::open_database(&db_path)?;

    let account_id = account_id.unwrap_or_else(new_id);
    let existing: Option<String> = conn
        .query_row("SELECT name FROM accounts WHERE id = ?1", params![account_id], |row| row.get(0))
        .optional()?;
    if let Some(name) = existing {
        anyhow::bail!("account {account_id} already exists ({name})");
    }

    let (first, last) = match owner_name.split_once(' ') {
        Some((first, last)) => (first, Some(last)),
        None => (owner_name, None),
    };
    let now = format_timestamp(chrono::Utc::now());
    let owner_id = new_id();

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO accounts (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![account_id, account_name, now],
    )
    .context("failed to create account")?;
    tx.execute(
        "INSERT INTO users (id, account_id, email, first_name, last_name, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'owner', ?6)",
        params![owner_id, account_id, owner_email, first, last, now],
    )
    .context("failed to create owner")?;
    tx.commit()?;

    println!("Account created");
    println!("  Account ID:  {account_id}");
    println!("  Owner ID:    {owner_id}");
    println!("  Database:    {}", db_path.display());
    if account_id != config.storage.default_account_id {
        println!();
        println!("Set CRM_ACCOUNT={account_id} (or storage.default_account_id) to make it the default.");
    }
    Ok(())
}
