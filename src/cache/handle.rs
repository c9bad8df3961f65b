use std::path::Path;

use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

use super::commands::CacheCmd;
use super::queries;
use super::schema;
use super::CachedMails;
use crate::config;
use crate::error::{Error, Result};
use crate::models::{Label, Mail};

// ---------------------------------------------------------------------------
// CacheHandle: cloneable async facade over the cache thread
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CacheHandle {
    tx: mpsc::UnboundedSender<CacheCmd>,
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle").finish_non_exhaustive()
    }
}

impl CacheHandle {
    /// Open (or create) `<data_dir>/bmail/cache.db` and spawn the background thread.
    pub fn open() -> Result<Self> {
        let dir = config::data_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Cache(format!("Failed to create cache dir: {e}")))?;
        Self::open_at(&dir.join("cache.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Cache(format!("Failed to open cache db: {e}")))?;
        Self::spawn(conn)
    }

    /// Throwaway cache living only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Cache(format!("Failed to open cache db: {e}")))?;
        Self::spawn(conn)
    }

    fn spawn(conn: Connection) -> Result<Self> {
        schema::init(&conn).map_err(Error::Cache)?;

        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("bmail-cache".into())
            .spawn(move || run_loop(conn, rx))
            .map_err(|e| Error::Cache(format!("Failed to spawn cache thread: {e}")))?;

        Ok(CacheHandle { tx })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<std::result::Result<T, String>>) -> CacheCmd,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| Error::Cache("Cache unavailable".into()))?;
        rx.await
            .map_err(|_| Error::Cache("Cache unavailable".into()))?
            .map_err(Error::Cache)
    }

    // -- async methods -------------------------------------------------------

    /// Swap the cached mail set for `mails`, remembering the filter they came from.
    pub async fn replace_mails(&self, filter: Option<String>, mails: Vec<Mail>) -> Result<()> {
        self.request(|reply| CacheCmd::ReplaceMails {
            filter,
            mails,
            reply,
        })
        .await
    }

    pub async fn load_mails(&self) -> Result<CachedMails> {
        self.request(|reply| CacheCmd::LoadMails { reply }).await
    }

    pub async fn update_mail_labels(&self, mail_id: String, labels: Vec<String>) -> Result<()> {
        self.request(|reply| CacheCmd::UpdateMailLabels {
            mail_id,
            labels,
            reply,
        })
        .await
    }

    pub async fn remove_mail(&self, mail_id: String) -> Result<()> {
        self.request(|reply| CacheCmd::RemoveMail { mail_id, reply })
            .await
    }

    pub async fn replace_labels(&self, labels: Vec<Label>) -> Result<()> {
        self.request(|reply| CacheCmd::ReplaceLabels { labels, reply })
            .await
    }

    pub async fn load_labels(&self) -> Result<Vec<Label>> {
        self.request(|reply| CacheCmd::LoadLabels { reply }).await
    }

    /// Drop everything (logout).
    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| CacheCmd::Clear { reply }).await
    }
}

// -- background thread ---------------------------------------------------

fn run_loop(conn: Connection, mut rx: mpsc::UnboundedReceiver<CacheCmd>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            CacheCmd::ReplaceMails {
                filter,
                mails,
                reply,
            } => {
                let _ = reply.send(queries::do_replace_mails(&conn, filter.as_deref(), &mails));
            }
            CacheCmd::LoadMails { reply } => {
                let _ = reply.send(queries::do_load_mails(&conn));
            }
            CacheCmd::UpdateMailLabels {
                mail_id,
                labels,
                reply,
            } => {
                let _ = reply.send(queries::do_update_mail_labels(&conn, &mail_id, &labels));
            }
            CacheCmd::RemoveMail { mail_id, reply } => {
                let _ = reply.send(queries::do_remove_mail(&conn, &mail_id));
            }
            CacheCmd::ReplaceLabels { labels, reply } => {
                let _ = reply.send(queries::do_replace_labels(&conn, &labels));
            }
            CacheCmd::LoadLabels { reply } => {
                let _ = reply.send(queries::do_load_labels(&conn));
            }
            CacheCmd::Clear { reply } => {
                let _ = reply.send(queries::do_clear(&conn));
            }
        }
    }
    log::debug!("Cache thread exiting");
}
