use rusqlite::{Connection, OptionalExtension};

use super::schema::META_FILTER;
use super::CachedMails;
use crate::models::{Label, LabelIds, Mail};

fn to_json(values: &[String]) -> Result<String, String> {
    serde_json::to_string(values).map_err(|e| format!("Cache encode error: {e}"))
}

fn from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        log::warn!("Dropping undecodable cached list {raw:?}: {e}");
        Vec::new()
    })
}

/// Expects columns: 0: id, 1: title, 2: body, 3: sender, 4: recipients,
/// 5: draft, 6: labels.
fn row_to_mail(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mail> {
    let recipients: String = row.get(4)?;
    let labels: String = row.get(6)?;
    Ok(Mail {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        from: row.get(3)?,
        to: from_json(&recipients),
        draft: row.get::<_, i32>(5)? != 0,
        labels: from_json(&labels).into_iter().collect::<LabelIds>(),
    })
}

pub(super) fn do_replace_mails(
    conn: &Connection,
    filter: Option<&str>,
    mails: &[Mail],
) -> Result<(), String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("Cache tx error: {e}"))?;

    tx.execute("DELETE FROM mails", [])
        .map_err(|e| format!("Cache delete error: {e}"))?;

    let mut stmt = tx
        .prepare(
            "INSERT OR REPLACE INTO mails
             (id, position, title, body, sender, recipients, draft, labels)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(|e| format!("Cache prepare error: {e}"))?;

    for (position, m) in mails.iter().enumerate() {
        stmt.execute(rusqlite::params![
            m.id,
            position as i64,
            m.title,
            m.body,
            m.from,
            to_json(&m.to)?,
            m.draft as i32,
            to_json(&m.labels.to_vec())?,
        ])
        .map_err(|e| format!("Cache insert error: {e}"))?;
    }
    drop(stmt);

    tx.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![META_FILTER, filter],
    )
    .map_err(|e| format!("Cache meta error: {e}"))?;

    tx.commit()
        .map_err(|e| format!("Cache commit error: {e}"))?;
    Ok(())
}

pub(super) fn do_load_mails(conn: &Connection) -> Result<CachedMails, String> {
    let filter: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            [META_FILTER],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map_err(|e| format!("Cache meta error: {e}"))?
        .flatten();

    let mut stmt = conn
        .prepare(
            "SELECT id, title, body, sender, recipients, draft, labels
             FROM mails ORDER BY position",
        )
        .map_err(|e| format!("Cache prepare error: {e}"))?;

    let rows = stmt
        .query_map([], row_to_mail)
        .map_err(|e| format!("Cache query error: {e}"))?;

    let mut mails = Vec::new();
    for row in rows {
        mails.push(row.map_err(|e| format!("Cache row error: {e}"))?);
    }
    Ok(CachedMails { filter, mails })
}

pub(super) fn do_update_mail_labels(
    conn: &Connection,
    mail_id: &str,
    labels: &[String],
) -> Result<(), String> {
    conn.execute(
        "UPDATE mails SET labels = ?1 WHERE id = ?2",
        rusqlite::params![to_json(labels)?, mail_id],
    )
    .map_err(|e| format!("Cache update_labels error: {e}"))?;
    Ok(())
}

pub(super) fn do_remove_mail(conn: &Connection, mail_id: &str) -> Result<(), String> {
    conn.execute("DELETE FROM mails WHERE id = ?1", [mail_id])
        .map_err(|e| format!("Cache remove_mail error: {e}"))?;
    Ok(())
}

pub(super) fn do_replace_labels(conn: &Connection, labels: &[Label]) -> Result<(), String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("Cache tx error: {e}"))?;

    tx.execute("DELETE FROM labels", [])
        .map_err(|e| format!("Cache delete error: {e}"))?;

    let mut stmt = tx
        .prepare(
            "INSERT OR REPLACE INTO labels (id, position, name, is_default, is_attachable)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(|e| format!("Cache prepare error: {e}"))?;

    for (position, l) in labels.iter().enumerate() {
        stmt.execute(rusqlite::params![
            l.id,
            position as i64,
            l.name,
            l.is_default as i32,
            l.is_attachable as i32,
        ])
        .map_err(|e| format!("Cache insert error: {e}"))?;
    }
    drop(stmt);

    tx.commit()
        .map_err(|e| format!("Cache commit error: {e}"))?;
    Ok(())
}

pub(super) fn do_load_labels(conn: &Connection) -> Result<Vec<Label>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, is_default, is_attachable FROM labels ORDER BY position",
        )
        .map_err(|e| format!("Cache prepare error: {e}"))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(Label {
                id: row.get(0)?,
                name: row.get(1)?,
                is_default: row.get::<_, i32>(2)? != 0,
                is_attachable: row.get::<_, i32>(3)? != 0,
                mail_ids: None,
            })
        })
        .map_err(|e| format!("Cache query error: {e}"))?;

    let mut labels = Vec::new();
    for row in rows {
        labels.push(row.map_err(|e| format!("Cache row error: {e}"))?);
    }
    Ok(labels)
}

pub(super) fn do_clear(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "BEGIN;
         DELETE FROM mails;
         DELETE FROM labels;
         DELETE FROM meta;
         COMMIT;",
    )
    .map_err(|e| format!("Cache clear error: {e}"))
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::cache::schema::init;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init(&conn).expect("init schema");
        conn
    }

    fn mail(id: &str, labels: &[&str]) -> Mail {
        Mail {
            id: id.into(),
            title: format!("title {id}"),
            body: "body".into(),
            from: "alice".into(),
            to: vec!["bob".into(), "carol".into()],
            draft: false,
            labels: labels.iter().copied().collect(),
        }
    }

    #[test]
    fn replace_then_load_keeps_order_and_labels() {
        let conn = open();
        let mails = vec![mail("M2", &["5", "1"]), mail("M1", &[])];
        do_replace_mails(&conn, Some("inbox"), &mails).expect("replace");

        let cached = do_load_mails(&conn).expect("load");
        assert_eq!(cached.filter.as_deref(), Some("inbox"));
        assert_eq!(cached.mails, mails);
    }

    #[test]
    fn replace_drops_previous_set() {
        let conn = open();
        do_replace_mails(&conn, Some("inbox"), &[mail("M1", &[])]).expect("first");
        do_replace_mails(&conn, None, &[mail("M9", &[])]).expect("second");

        let cached = do_load_mails(&conn).expect("load");
        assert_eq!(cached.filter, None);
        assert_eq!(cached.mails.len(), 1);
        assert_eq!(cached.mails[0].id, "M9");
    }

    #[test]
    fn label_update_and_removal() {
        let conn = open();
        do_replace_mails(&conn, Some("inbox"), &[mail("M1", &["1"]), mail("M2", &[])])
            .expect("replace");

        do_update_mail_labels(&conn, "M1", &["1".into(), "2".into()]).expect("update");
        let cached = do_load_mails(&conn).expect("load");
        assert_eq!(cached.mails[0].labels.to_vec(), vec!["1", "2"]);

        do_remove_mail(&conn, "M2").expect("remove");
        let ids: Vec<_> = do_load_mails(&conn)
            .expect("load")
            .mails
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["M1"]);
    }

    #[test]
    fn labels_round_trip_and_clear() {
        let conn = open();
        let labels = vec![
            Label {
                id: "1".into(),
                name: "inbox".into(),
                is_default: true,
                is_attachable: true,
                mail_ids: None,
            },
            Label {
                id: "7".into(),
                name: "Work".into(),
                is_default: false,
                is_attachable: true,
                mail_ids: None,
            },
        ];
        do_replace_labels(&conn, &labels).expect("replace labels");
        assert_eq!(do_load_labels(&conn).expect("load labels"), labels);

        do_replace_mails(&conn, Some("inbox"), &[mail("M1", &["1"])]).expect("replace");
        do_clear(&conn).expect("clear");
        assert!(do_load_labels(&conn).expect("load labels").is_empty());
        assert_eq!(do_load_mails(&conn).expect("load"), CachedMails::default());
    }
}
