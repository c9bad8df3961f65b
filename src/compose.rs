use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::OutgoingMail;
use crate::remote::MailApi;
use crate::session::SessionStore;

const NO_SUBJECT: &str = "(No Subject)";
const DEFAULT_SENDER: &str = "Me";

/// Split a comma separated recipient field, dropping blanks.
pub fn parse_recipients(to: &str) -> Vec<String> {
    to.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sends mail and saves drafts on behalf of the logged-in user.
pub struct Composer {
    api: Arc<dyn MailApi>,
    session: Arc<dyn SessionStore>,
    display_name: Option<String>,
}

impl Composer {
    pub fn new(
        api: Arc<dyn MailApi>,
        session: Arc<dyn SessionStore>,
        display_name: Option<String>,
    ) -> Self {
        Composer {
            api,
            session,
            display_name,
        }
    }

    fn sender(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SENDER)
            .to_string()
    }

    fn outgoing(&self, to: Vec<String>, subject: &str, body: &str, draft: bool) -> OutgoingMail {
        OutgoingMail {
            title: subject.to_string(),
            body: body.to_string(),
            from: self.sender(),
            to,
            draft,
        }
    }

    /// Send a new mail. A blank subject goes out as "(No Subject)".
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let recipients = parse_recipients(to);
        if recipients.is_empty() {
            return Err(Error::Validation("Recipient is required".into()));
        }
        let subject = if subject.trim().is_empty() {
            NO_SUBJECT
        } else {
            subject
        };
        let mail = self.outgoing(recipients, subject, body, false);
        log::debug!("Sending mail {:?} to {} recipients", mail.title, mail.to.len());

        let token = self.session.token()?;
        self.api.send_mail(&token, &mail).await.map_err(|e| {
            log::error!("Failed to send mail: {e}");
            e
        })
    }

    /// Save a new draft. Recipients may be left out.
    pub async fn create_draft(&self, to: Option<&str>, subject: &str, body: &str) -> Result<()> {
        let recipients = to.map(parse_recipients).unwrap_or_default();
        let mail = self.outgoing(recipients, subject, body, true);
        log::debug!("Creating draft {:?}", mail.title);

        let token = self.session.token()?;
        self.api.send_mail(&token, &mail).await.map_err(|e| {
            log::error!("Failed to create draft: {e}");
            e
        })
    }

    /// Overwrite draft `mail_id`; `draft = false` sends it.
    pub async fn update_draft(
        &self,
        mail_id: &str,
        to: Option<&str>,
        subject: &str,
        body: &str,
        draft: bool,
    ) -> Result<()> {
        let recipients = to.map(parse_recipients).unwrap_or_default();
        if !draft && recipients.is_empty() {
            return Err(Error::Validation("Recipient is required".into()));
        }
        let mail = self.outgoing(recipients, subject, body, draft);
        log::debug!("Updating draft {mail_id}");

        let token = self.session.token()?;
        self.api
            .update_draft(&token, mail_id, &mail)
            .await
            .map_err(|e| {
                log::error!("Failed to update draft {mail_id}: {e}");
                e
            })
    }
}
