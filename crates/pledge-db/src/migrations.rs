use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, campaigns, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT,
                profile_picture TEXT,
                google_id       TEXT,
                created_at      TEXT NOT NULL
            );

            -- donations is a JSON array embedded in the campaign row
            CREATE TABLE campaigns (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                goal        REAL NOT NULL,
                deadline    TEXT NOT NULL,
                poster      BLOB NOT NULL,
                created_at  TEXT NOT NULL,
                donations   TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                text        TEXT NOT NULL,
                sender      TEXT NOT NULL,
                user_id     TEXT,
                created_at  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
