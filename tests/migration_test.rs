mod helpers;

use crm_mcp::db;
use crm_mcp::db::migrations::{get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION};

fn columns(conn: &rusqlite::Connection, table: &str) -> Vec<String> {
    conn.prepare(&format!("PRAGMA table_info({table})"))
        .unwrap()
        .query_map([], |row| row.get::<_, String>("name"))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert!(columns(&conn, "agent_memory").contains(&"current_context".to_string()));
}

#[test]
fn migrations_are_idempotent() {
    let conn = helpers::test_db();
    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn manual_v1_db_upgrades_correctly() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);
    assert!(!columns(&conn, "agent_memory").contains(&"current_context".to_string()));

    run_migrations(&conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert!(columns(&conn, "agent_memory").contains(&"current_context".to_string()));
}

#[test]
fn on_disk_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("crm.db");

    {
        let conn = db::open_database(&path).unwrap();
        helpers::seed_world(&conn);
    }

    let conn = db::open_database(&path).unwrap();
    let health = db::check_database_health(&conn).unwrap();
    assert!(health.integrity_ok);
    assert_eq!(health.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(health.account_count, 1);
    assert_eq!(health.job_count, 1);
    assert_eq!(health.contact_count, 1);
}

#[test]
fn status_constraints_reject_unknown_values() {
    let conn = helpers::test_db();
    helpers::seed_account(&conn, helpers::ACCOUNT);
    let result = conn.execute(
        "INSERT INTO jobs (id, account_id, description, status, created_at, updated_at)
         VALUES ('j-bad', ?1, 'x', 'teleported', ?2, ?2)",
        rusqlite::params![helpers::ACCOUNT, helpers::CREATED],
    );
    assert!(result.is_err());
}

#[test]
fn deleting_an_account_cascades() {
    let conn = helpers::test_db();
    helpers::seed_world(&conn);
    conn.execute("DELETE FROM accounts WHERE id = ?1", [helpers::ACCOUNT]).unwrap();
    let jobs: i64 = conn.query_row("SELECT count(*) FROM jobs", [], |r| r.get(0)).unwrap();
    let messages: i64 = conn.query_row("SELECT count(*) FROM messages", [], |r| r.get(0)).unwrap();
    assert_eq!(jobs, 0);
    assert_eq!(messages, 0);
}
