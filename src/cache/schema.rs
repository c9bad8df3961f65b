use rusqlite::Connection;

/// Schema DDL run on open.
pub(super) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS mails (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    sender TEXT NOT NULL DEFAULT '',
    recipients TEXT NOT NULL DEFAULT '[]',
    draft INTEGER NOT NULL DEFAULT 0,
    labels TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_mails_position ON mails(position);

CREATE TABLE IF NOT EXISTS labels (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    is_attachable INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT
);
";

/// Meta key holding the filter the cached mail set was loaded with.
pub(super) const META_FILTER: &str = "mail_filter";

/// Create tables if needed. Idempotent.
pub(super) fn init(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(SCHEMA)
        .map_err(|e| format!("Failed to init cache schema: {e}"))
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::init;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init(&conn).expect("first init");
        conn.execute(
            "INSERT INTO mails (id, position, title) VALUES ('M1', 0, 'kept')",
            [],
        )
        .expect("insert mail");

        init(&conn).expect("second init");

        let title: String = conn
            .query_row("SELECT title FROM mails WHERE id = 'M1'", [], |row| row.get(0))
            .expect("mail survives re-init");
        assert_eq!(title, "kept");
    }
}
