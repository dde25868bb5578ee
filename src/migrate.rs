//! Versioned schema migrations for the sqlite backend, run once at startup.
//! Each entry applies inside one transaction together with the version bump,
//! so a crash mid-migration leaves the version untouched and the next start
//! re-runs it cleanly. Idempotence comes from the version ledger, not from
//! catching duplicate-column errors.

use sqlx::{Pool, Row, Sqlite};

const MIGRATIONS: &[&str] = &[
    // v1: full initial schema
    r#"
    CREATE TABLE users (
        handle      TEXT PRIMARY KEY,
        digest      TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );

    CREATE TABLE messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        sender      TEXT NOT NULL,
        target      TEXT NOT NULL,
        body        TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        theme       TEXT
    );
    CREATE INDEX idx_messages_pair ON messages(sender, target);
    CREATE INDEX idx_messages_target ON messages(target);

    CREATE TABLE threads (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        title       TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );

    CREATE TABLE friend_requests (
        from_handle TEXT NOT NULL,
        to_handle   TEXT NOT NULL,
        status      TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        UNIQUE(from_handle, to_handle)
    );

    CREATE TABLE friends (
        user        TEXT NOT NULL,
        friend      TEXT NOT NULL,
        PRIMARY KEY (user, friend)
    );

    -- seed the default board thread
    INSERT OR IGNORE INTO threads (id, title, created_at)
        VALUES (1, '雑談スレ', datetime('now'));
    "#,
];

pub async fn run(pool: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await?;
    let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM schema_version")
        .fetch_one(pool)
        .await?;
    let current: i64 = row.try_get("version")?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!("applied schema migration v{version}");
    }
    Ok(())
}
