//! Contracts of the BMail web server as seen by the labeling core.
//!
//! Every call takes the raw auth token; callers fetch it from the
//! [`SessionStore`](crate::session::SessionStore) right before the request so a
//! re-login is picked up without rebuilding anything.

mod http;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Label, Mail, OutgoingMail};

pub use http::HttpBackend;
pub use memory::MemoryBackend;

#[async_trait]
pub trait LabelApi: Send + Sync {
    async fn list_labels(&self, token: &str) -> Result<Vec<Label>>;
    async fn create_label(&self, token: &str, name: &str) -> Result<()>;
    async fn delete_label(&self, token: &str, label_id: &str) -> Result<()>;
}

#[async_trait]
pub trait MailApi: Send + Sync {
    /// Mail carrying the label named `filter` (`inbox`, `drafts`, a custom name, ...).
    async fn list_mail_by_label(&self, token: &str, filter: &str) -> Result<Vec<Mail>>;
    async fn search_mail(&self, token: &str, query: &str) -> Result<Vec<Mail>>;
    async fn attach_label(&self, token: &str, mail_id: &str, label_id: &str) -> Result<()>;
    async fn detach_label(&self, token: &str, mail_id: &str, label_id: &str) -> Result<()>;
    async fn delete_mail(&self, token: &str, mail_id: &str) -> Result<()>;
    /// Send a mail, or store it as a new draft when `mail.draft` is set.
    async fn send_mail(&self, token: &str, mail: &OutgoingMail) -> Result<()>;
    /// Overwrite a draft; `mail.draft == false` sends it.
    async fn update_draft(&self, token: &str, mail_id: &str, mail: &OutgoingMail) -> Result<()>;
}
