//! SQLite copy of the resident mail set and the label list, so a client can
//! show the last known state before the server answers.

mod commands;
mod handle;
mod queries;
mod schema;

pub use handle::CacheHandle;

/// Snapshot of the resident mail set as last written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedMails {
    /// Filter the set was loaded with, `None` for search results.
    pub filter: Option<String>,
    pub mails: Vec<crate::models::Mail>,
}
