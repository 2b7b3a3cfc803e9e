#![cfg(feature = "sqlite")]
#![expect(clippy::unwrap_used, reason = "test code")]

use std::fs;
use std::path::Path;

use perftrack_storage::{
    Catalog, CatalogEntry, FileSource, LedgerStore, MigrationRunner, SqliteLedger,
};
use tempfile::tempdir;

fn catalog() -> Catalog {
    Catalog::new(vec![
        CatalogEntry::new("001_users", "Create users", "001_users.sql"),
        CatalogEntry::new("002_posts", "Create posts", "002_posts.sql"),
        CatalogEntry::new("003_index", "Index posts", "003_index.sql"),
    ])
    .unwrap()
}

fn write_sql(dir: &Path) {
    fs::write(dir.join("001_users.sql"), "CREATE TABLE users(id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    fs::write(
        dir.join("002_posts.sql"),
        "CREATE TABLE posts(id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id));\n\
         INSERT INTO users(name) VALUES ('seed');",
    )
    .unwrap();
}

fn ledger_ids(db: &Path) -> Vec<String> {
    let conn = rusqlite::Connection::open(db).unwrap();
    let mut stmt = conn.prepare("SELECT id FROM schema_migrations ORDER BY id").unwrap();
    let ids = stmt.query_map([], |row| row.get::<_, String>(0)).unwrap();
    ids.collect::<Result<_, _>>().unwrap()
}

#[tokio::test]
async fn applies_files_and_survives_reopen() {
    let dir = tempdir().unwrap();
    let sql_dir = dir.path().join("sql");
    fs::create_dir(&sql_dir).unwrap();
    write_sql(&sql_dir);
    let db = dir.path().join("app.db");

    let runner = MigrationRunner::new(
        FileSource::with_dirs(catalog(), [&sql_dir]),
        SqliteLedger::open(&db).unwrap(),
    );
    let report = runner.run().await.unwrap();
    assert_eq!(report.applied, vec!["001_users", "002_posts"]);
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].id, "003_index");
    drop(runner);

    // a separate connection sees the committed state
    assert_eq!(ledger_ids(&db), vec!["001_users", "002_posts"]);

    fs::write(sql_dir.join("003_index.sql"), "CREATE INDEX idx_posts_user ON posts(user_id);")
        .unwrap();
    let runner = MigrationRunner::new(
        FileSource::with_dirs(catalog(), [&sql_dir]),
        SqliteLedger::open(&db).unwrap(),
    );
    let report = runner.run().await.unwrap();
    assert_eq!(report.applied, vec!["003_index"]);
    assert_eq!(report.skipped, 2);
    assert!(report.missing.is_empty());

    let entries = runner.store().entries().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1].description, "Create posts");
}

#[tokio::test]
async fn failing_file_rolls_back_and_keeps_earlier_commits() {
    let dir = tempdir().unwrap();
    write_sql(dir.path());
    fs::write(dir.path().join("003_index.sql"), "CREATE INDEX idx ON no_such_table(id);").unwrap();
    let db = dir.path().join("app.db");

    let runner = MigrationRunner::new(
        FileSource::with_dirs(catalog(), [dir.path()]),
        SqliteLedger::open(&db).unwrap(),
    );
    let err = runner.run().await.unwrap_err();

    assert_eq!(err.migration_id(), Some("003_index"));
    assert_eq!(ledger_ids(&db), vec!["001_users", "002_posts"]);

    let conn = rusqlite::Connection::open(&db).unwrap();
    let seeded: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)).unwrap();
    assert_eq!(seeded, 1);
}
