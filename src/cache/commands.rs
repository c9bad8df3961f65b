use tokio::sync::oneshot;

use super::CachedMails;
use crate::models::{Label, Mail};

pub(super) enum CacheCmd {
    ReplaceMails {
        filter: Option<String>,
        mails: Vec<Mail>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    LoadMails {
        reply: oneshot::Sender<Result<CachedMails, String>>,
    },
    UpdateMailLabels {
        mail_id: String,
        labels: Vec<String>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    RemoveMail {
        mail_id: String,
        reply: oneshot::Sender<Result<(), String>>,
    },
    ReplaceLabels {
        labels: Vec<Label>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    LoadLabels {
        reply: oneshot::Sender<Result<Vec<Label>, String>>,
    },
    Clear {
        reply: oneshot::Sender<Result<(), String>>,
    },
}
