use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{LabelApi, MailApi};
use crate::error::{Error, Result};
use crate::models::{Label, LabelIds, Mail, OutgoingMail};

/// Labels every account is provisioned with, in server order.
const DEFAULT_LABELS: [&str; 6] = ["inbox", "starred", "sent", "drafts", "spam", "trash"];

#[derive(Debug, Default)]
struct State {
    labels: Vec<Label>,
    mails: Vec<Mail>,
    next_id: u64,
    offline: bool,
    calls: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn label_named(&self, name: &str) -> Option<&Label> {
        self.labels
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
    }

    fn mail_mut(&mut self, mail_id: &str) -> Result<&mut Mail> {
        self.mails
            .iter_mut()
            .find(|m| m.id == mail_id)
            .ok_or_else(|| Error::mail_not_found(mail_id))
    }

    fn build_label(&mut self, name: &str) -> Label {
        let lower = name.to_lowercase();
        Label {
            id: self.next_id(),
            name: name.to_string(),
            is_default: DEFAULT_LABELS.contains(&lower.as_str()),
            is_attachable: lower != "sent" && lower != "drafts",
            mail_ids: None,
        }
    }

    fn system_label_id(&self, name: &str) -> Option<String> {
        self.label_named(name)
            .filter(|l| l.is_default)
            .map(|l| l.id.clone())
    }
}

/// In-process stand-in for the BMail web server, for offline use and tests.
///
/// Label rules follow the server: default labels are provisioned up front,
/// `sent` and `drafts` cannot be attached by hand, any non-empty token is
/// accepted.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with the six default labels already provisioned.
    pub fn with_default_labels() -> Self {
        let backend = Self::new();
        {
            let mut state = backend.lock_state();
            for name in DEFAULT_LABELS {
                let label = state.build_label(name);
                state.labels.push(label);
            }
        }
        backend
    }

    pub fn insert_label(&self, label: Label) {
        self.lock_state().labels.push(label);
    }

    pub fn insert_mail(&self, mail: Mail) {
        self.lock_state().mails.push(mail);
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.lock_state().offline = offline;
    }

    pub fn labels(&self) -> Vec<Label> {
        self.lock_state().labels.clone()
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        self.lock_state().label_named(name).map(|l| l.id.clone())
    }

    pub fn mail(&self, mail_id: &str) -> Option<Mail> {
        self.lock_state()
            .mails
            .iter()
            .find(|m| m.id == mail_id)
            .cloned()
    }

    pub fn mails(&self) -> Vec<Mail> {
        self.lock_state().mails.clone()
    }

    /// Names of the calls received so far, in order (`list_mail_by_label:inbox`, ...).
    pub fn calls(&self) -> Vec<String> {
        self.lock_state().calls.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call and apply the auth / connectivity checks every route has.
    fn begin(&self, token: &str, call: String) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock_state();
        state.calls.push(call);
        if state.offline {
            return Err(Error::Network("backend offline".into()));
        }
        if token.trim().is_empty() {
            return Err(Error::Auth("You must be logged in".into()));
        }
        Ok(state)
    }
}

#[async_trait]
impl LabelApi for MemoryBackend {
    async fn list_labels(&self, token: &str) -> Result<Vec<Label>> {
        let state = self.begin(token, "list_labels".into())?;
        Ok(state.labels.clone())
    }

    async fn create_label(&self, token: &str, name: &str) -> Result<()> {
        let mut state = self.begin(token, format!("create_label:{name}"))?;
        if name.trim().is_empty() {
            return Err(Error::Validation("Label name is required".into()));
        }
        let label = state.build_label(name);
        state.labels.push(label);
        Ok(())
    }

    async fn delete_label(&self, token: &str, label_id: &str) -> Result<()> {
        let mut state = self.begin(token, format!("delete_label:{label_id}"))?;
        let before = state.labels.len();
        state.labels.retain(|l| l.id != label_id);
        if state.labels.len() == before {
            return Err(Error::label_not_found(label_id));
        }
        for mail in &mut state.mails {
            mail.labels.remove(label_id);
        }
        Ok(())
    }
}

#[async_trait]
impl MailApi for MemoryBackend {
    async fn list_mail_by_label(&self, token: &str, filter: &str) -> Result<Vec<Mail>> {
        let state = self.begin(token, format!("list_mail_by_label:{filter}"))?;
        let label_id = state
            .label_named(filter)
            .map(|l| l.id.clone())
            .ok_or_else(|| Error::label_not_found(filter))?;
        Ok(state
            .mails
            .iter()
            .filter(|m| m.has_label(&label_id))
            .cloned()
            .collect())
    }

    async fn search_mail(&self, token: &str, query: &str) -> Result<Vec<Mail>> {
        let state = self.begin(token, format!("search_mail:{query}"))?;
        let needle = query.to_lowercase();
        Ok(state
            .mails
            .iter()
            .filter(|m| {
                m.title.to_lowercase().contains(&needle)
                    || m.body.to_lowercase().contains(&needle)
                    || m.from.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn attach_label(&self, token: &str, mail_id: &str, label_id: &str) -> Result<()> {
        let mut state = self.begin(token, format!("attach_label:{mail_id}:{label_id}"))?;
        let label = state
            .labels
            .iter()
            .find(|l| l.id == label_id)
            .ok_or_else(|| Error::label_not_found(label_id))?;
        if !label.is_attachable {
            return Err(Error::Validation(format!(
                "Label {} cannot be attached",
                label.name
            )));
        }
        state.mail_mut(mail_id)?.labels.insert(label_id);
        Ok(())
    }

    async fn detach_label(&self, token: &str, mail_id: &str, label_id: &str) -> Result<()> {
        let mut state = self.begin(token, format!("detach_label:{mail_id}:{label_id}"))?;
        state.mail_mut(mail_id)?.labels.remove(label_id);
        Ok(())
    }

    async fn delete_mail(&self, token: &str, mail_id: &str) -> Result<()> {
        let mut state = self.begin(token, format!("delete_mail:{mail_id}"))?;
        let before = state.mails.len();
        state.mails.retain(|m| m.id != mail_id);
        if state.mails.len() == before {
            return Err(Error::mail_not_found(mail_id));
        }
        Ok(())
    }

    async fn send_mail(&self, token: &str, mail: &OutgoingMail) -> Result<()> {
        let mut state = self.begin(token, format!("send_mail:{}", mail.title))?;
        let folder = if mail.draft { "drafts" } else { "sent" };
        let labels: LabelIds = state.system_label_id(folder).into_iter().collect();
        let id = state.next_id();
        state.mails.push(Mail {
            id,
            title: mail.title.clone(),
            body: mail.body.clone(),
            from: mail.from.clone(),
            to: mail.to.clone(),
            draft: mail.draft,
            labels,
        });
        Ok(())
    }

    async fn update_draft(&self, token: &str, mail_id: &str, mail: &OutgoingMail) -> Result<()> {
        let mut state = self.begin(token, format!("update_draft:{mail_id}"))?;
        let drafts = state.system_label_id("drafts");
        let sent = state.system_label_id("sent");
        let stored = state.mail_mut(mail_id)?;
        if !stored.draft {
            return Err(Error::Validation("Only drafts can be edited".into()));
        }
        stored.title = mail.title.clone();
        stored.body = mail.body.clone();
        stored.to = mail.to.clone();
        stored.draft = mail.draft;
        if !mail.draft {
            if let Some(drafts) = drafts {
                stored.labels.remove(&drafts);
            }
            if let Some(sent) = sent {
                stored.labels.insert(sent);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_labels_follow_server_rules() {
        let backend = MemoryBackend::with_default_labels();
        let labels = backend.list_labels("1").await.unwrap();
        assert_eq!(labels.len(), 6);
        assert!(labels.iter().all(|l| l.is_default));
        let sent = labels.iter().find(|l| l.name == "sent").unwrap();
        assert!(!sent.is_attachable);
        let starred = labels.iter().find(|l| l.name == "starred").unwrap();
        assert!(starred.is_attachable);
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let backend = MemoryBackend::with_default_labels();
        assert!(matches!(
            backend.list_labels("").await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn offline_fails_every_call() {
        let backend = MemoryBackend::with_default_labels();
        backend.set_offline(true);
        assert!(matches!(
            backend.list_labels("1").await,
            Err(Error::Network(_))
        ));
        backend.set_offline(false);
        assert!(backend.list_labels("1").await.is_ok());
    }

    #[tokio::test]
    async fn list_by_label_matches_name_case_insensitively() {
        let backend = MemoryBackend::with_default_labels();
        let inbox = backend.label_id("inbox").unwrap();
        backend.insert_mail(Mail {
            id: "M1".into(),
            labels: [inbox.as_str()].into_iter().collect(),
            ..Mail::default()
        });
        backend.insert_mail(Mail {
            id: "M2".into(),
            ..Mail::default()
        });

        let mails = backend.list_mail_by_label("1", "INBOX").await.unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].id, "M1");
        assert!(backend.list_mail_by_label("1", "nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn non_attachable_labels_are_refused() {
        let backend = MemoryBackend::with_default_labels();
        backend.insert_mail(Mail {
            id: "M1".into(),
            ..Mail::default()
        });
        let sent = backend.label_id("sent").unwrap();
        assert!(matches!(
            backend.attach_label("1", "M1", &sent).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn sending_a_draft_moves_it_to_sent() {
        let backend = MemoryBackend::with_default_labels();
        let draft = OutgoingMail {
            title: "Plan".into(),
            body: "tbd".into(),
            from: "alice".into(),
            to: vec![],
            draft: true,
        };
        backend.send_mail("1", &draft).await.unwrap();
        let stored = backend.mails().pop().unwrap();
        assert!(stored.has_label(&backend.label_id("drafts").unwrap()));

        let final_mail = OutgoingMail {
            to: vec!["bob".into()],
            draft: false,
            ..draft
        };
        backend
            .update_draft("1", &stored.id, &final_mail)
            .await
            .unwrap();
        let sent = backend.mail(&stored.id).unwrap();
        assert!(!sent.draft);
        assert!(sent.has_label(&backend.label_id("sent").unwrap()));
        assert!(!sent.has_label(&backend.label_id("drafts").unwrap()));
    }
}
