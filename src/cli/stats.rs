use anyhow::Result;
use rusqlite::params;

use crm_mcp::config::CrmConfig;

const JOB_STATUSES: &[&str] = &[
    "lead",
    "scheduled",
    "en_route",
    "in_progress",
    "completed",
    "invoiced",
    "paid",
];

/// Display database and per-account statistics in the terminal.
pub fn stats(config: &CrmConfig, account: Option<&str>) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crm_mcp::db::open_database(&db_path)?;
    let health = crm_mcp::db::check_database_health(&conn)?;
    let account = account.unwrap_or(&config.storage.default_account_id);

    println!("Database");
    println!("{}", "=".repeat(40));
    println!("  Path:                {}", db_path.display());
    println!("  Integrity:           {}", if health.integrity_ok { "ok" } else { "FAILED" });
    println!("  Schema version:      {}", health.schema_version);
    println!("  Accounts:            {}", health.account_count);
    println!();

    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, params![account], |row| row.get(0))?) };

    println!("Account {account}");
    println!("{}", "=".repeat(40));
    println!("  Contacts:            {}", count("SELECT count(*) FROM contacts WHERE account_id = ?1")?);
    println!(
        "  Open conversations:  {}",
        count("SELECT count(*) FROM conversations WHERE account_id = ?1 AND status = 'open'")?
    );
    println!(
        "  Unpaid invoices:     {}",
        count("SELECT count(*) FROM invoices WHERE account_id = ?1 AND status IN ('draft', 'sent')")?
    );
    println!(
        "  Queued emails:       {}",
        count("SELECT count(*) FROM outbound_emails WHERE account_id = ?1")?
    );
    println!(
        "  AI analyses:         {}",
        count("SELECT count(*) FROM ai_analyses WHERE account_id = ?1")?
    );
    println!();

    println!("Jobs by status:");
    for status in JOB_STATUSES {
        let n: i64 = conn.query_row(
            "SELECT count(*) FROM jobs WHERE account_id = ?1 AND status = ?2",
            params![account, status],
            |row| row.get(0),
        )?;
        println!("  {:<12} {}", status, n);
    }

    Ok(())
}
