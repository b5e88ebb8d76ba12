use bulletbook_core::db::migrations::latest_version;
use bulletbook_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "bullets");
    assert_table_exists(&conn, "run_markers");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("bulletbook.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "bullets");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schema_rejects_duplicate_ids_within_a_bucket() {
    let conn = open_db_in_memory().unwrap();
    let insert = "INSERT INTO bullets (uid, ctx_id, context, bucket, bullet_type, is_task, description, created_at, updated_at)
                  VALUES (?1, 1, 'default', 'desk', 'task', 1, 'x', 0, 0);";

    conn.execute(insert, ["first"]).unwrap();
    assert!(conn.execute(insert, ["second"]).is_err());
}

#[test]
fn schema_rejects_unknown_bucket_and_zero_id() {
    let conn = open_db_in_memory().unwrap();

    let bad_bucket = conn.execute(
        "INSERT INTO bullets (uid, ctx_id, context, bucket, bullet_type, is_task, description, created_at, updated_at)
         VALUES ('a', 1, 'default', 'attic', 'task', 1, 'x', 0, 0);",
        [],
    );
    assert!(bad_bucket.is_err());

    let zero_id = conn.execute(
        "INSERT INTO bullets (uid, ctx_id, context, bucket, bullet_type, is_task, description, created_at, updated_at)
         VALUES ('b', 0, 'default', 'desk', 'task', 1, 'x', 0, 0);",
        [],
    );
    assert!(zero_id.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
