//! The only path that changes which labels a mail carries.
//!
//! Every operation talks to the server first and touches the resident
//! [`MailStore`] only after the server confirmed, so the store never holds a
//! label set the server has not seen.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Label, LabelRole, Mail, ViewState};
use crate::projector;
use crate::registry::LabelRegistry;
use crate::remote::MailApi;
use crate::session::SessionStore;
use crate::store::MailStore;

/// What a mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The mail now projects to this state.
    Applied(ViewState),
    /// Nothing to do: the role id is unknown or the labels are not loaded yet.
    NoOp,
}

pub struct LabelMutationService {
    registry: Arc<LabelRegistry>,
    store: Arc<MailStore>,
    api: Arc<dyn MailApi>,
    session: Arc<dyn SessionStore>,
}

impl LabelMutationService {
    pub fn new(
        registry: Arc<LabelRegistry>,
        store: Arc<MailStore>,
        api: Arc<dyn MailApi>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        LabelMutationService {
            registry,
            store,
            api,
            session,
        }
    }

    pub fn registry(&self) -> &Arc<LabelRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<MailStore> {
        &self.store
    }

    /// Current projection of a resident mail.
    pub fn project(&self, mail_id: &str) -> Result<ViewState> {
        let mail = self.store.get_by_id(mail_id)?;
        Ok(self.project_mail(&mail))
    }

    fn project_mail(&self, mail: &Mail) -> ViewState {
        projector::project(mail, &self.registry.role_ids())
    }

    // -- single label --------------------------------------------------------

    /// Attach `label_id` on the server, then in the resident set.
    pub async fn attach(&self, mail_id: &str, label_id: &str) -> Result<()> {
        let token = self.session.token()?;
        match self.api.attach_label(&token, mail_id, label_id).await {
            Ok(()) => {
                log::info!("Label {label_id} added to mail {mail_id}");
                if self.store.attach_local(mail_id, label_id).await.is_none() {
                    log::debug!("Mail {mail_id} not resident, nothing to mirror");
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to add label {label_id} to mail {mail_id}: {e}");
                Err(e)
            }
        }
    }

    /// Detach `label_id` on the server, then in the resident set.
    pub async fn detach(&self, mail_id: &str, label_id: &str) -> Result<()> {
        let token = self.session.token()?;
        match self.api.detach_label(&token, mail_id, label_id).await {
            Ok(()) => {
                log::info!("Label {label_id} removed from mail {mail_id}");
                if self.store.detach_local(mail_id, label_id).await.is_none() {
                    log::debug!("Mail {mail_id} not resident, nothing to mirror");
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to remove label {label_id} from mail {mail_id}: {e}");
                Err(e)
            }
        }
    }

    // -- system roles --------------------------------------------------------

    /// Make the mail carry (`on`) or not carry the label backing `role`.
    ///
    /// Unknown role ids make this a no-op. A mail already in the wanted state
    /// costs no round trip.
    pub async fn set_role(&self, mail_id: &str, role: LabelRole, on: bool) -> Result<Outcome> {
        let mail = self.store.get_by_id(mail_id)?;
        let edited = self.set_role_on(&mail, role, on).await?;
        Ok(self.outcome(edited))
    }

    /// [`set_role`](Self::set_role) on a mail the caller already holds, resident
    /// or not. Returns the mail with the change applied, `None` for a no-op.
    pub async fn set_role_on(&self, mail: &Mail, role: LabelRole, on: bool) -> Result<Option<Mail>> {
        let Some(role_id) = self.registry.role_label_id(role) else {
            log::debug!("No {role} label known yet, ignoring change on mail {}", mail.id);
            return Ok(None);
        };
        let mut edited = mail.clone();
        if mail.has_label(&role_id) != on {
            if on {
                self.attach(&mail.id, &role_id).await?;
                edited.labels.insert(role_id);
            } else {
                self.detach(&mail.id, &role_id).await?;
                edited.labels.remove(&role_id);
            }
        }
        Ok(Some(edited))
    }

    fn outcome(&self, edited: Option<Mail>) -> Outcome {
        match edited {
            Some(mail) => Outcome::Applied(self.project_mail(&mail)),
            None => Outcome::NoOp,
        }
    }

    async fn toggle(&self, mail_id: &str, role: LabelRole) -> Result<Outcome> {
        let Some(role_id) = self.registry.role_label_id(role) else {
            log::debug!("No {role} label known yet, ignoring toggle on mail {mail_id}");
            return Ok(Outcome::NoOp);
        };
        let mail = self.store.get_by_id(mail_id)?;
        let on = !mail.has_label(&role_id);
        let edited = self.set_role_on(&mail, role, on).await?;
        Ok(self.outcome(edited))
    }

    pub async fn toggle_starred(&self, mail_id: &str) -> Result<Outcome> {
        self.toggle(mail_id, LabelRole::Starred).await
    }

    pub async fn toggle_spam(&self, mail_id: &str) -> Result<Outcome> {
        self.toggle(mail_id, LabelRole::Spam).await
    }

    pub async fn move_to_trash(&self, mail_id: &str) -> Result<Outcome> {
        self.set_role(mail_id, LabelRole::Trash, true).await
    }

    pub async fn restore_from_trash(&self, mail_id: &str) -> Result<Outcome> {
        self.set_role(mail_id, LabelRole::Trash, false).await
    }

    /// Delete the mail on the server and drop it from the resident set.
    pub async fn delete_permanently(&self, mail_id: &str) -> Result<()> {
        let token = self.session.token()?;
        self.api.delete_mail(&token, mail_id).await.map_err(|e| {
            log::error!("Failed to delete mail {mail_id}: {e}");
            e
        })?;
        log::info!("Mail {mail_id} deleted");
        self.store.remove_local(mail_id).await;
        Ok(())
    }

    // -- user labels ---------------------------------------------------------

    /// Bring the manageable labels of a mail in line with `selected`.
    ///
    /// System labels are never attached or detached here, whether selected or
    /// not. Stops at the first failing round trip; labels handled before it
    /// stay applied.
    pub async fn update_labels(&self, mail_id: &str, selected: &[String]) -> Result<Outcome> {
        if !self.registry.is_loaded() {
            log::debug!("Labels not loaded yet, ignoring label update on mail {mail_id}");
            return Ok(Outcome::NoOp);
        }
        let mail = self.store.get_by_id(mail_id)?;
        let edited = self.update_labels_on(&mail, selected).await?;
        Ok(self.outcome(edited))
    }

    /// [`update_labels`](Self::update_labels) on a mail the caller already
    /// holds. Returns the mail with the changes applied, `None` for a no-op.
    pub async fn update_labels_on(&self, mail: &Mail, selected: &[String]) -> Result<Option<Mail>> {
        if !self.registry.is_loaded() {
            log::debug!("Labels not loaded yet, ignoring label update on mail {}", mail.id);
            return Ok(None);
        }
        let roles = self.registry.role_ids();
        let manageable: HashSet<String> = self
            .registry
            .manageable_labels()
            .into_iter()
            .map(|l| l.id)
            .collect();

        let mut wanted = HashSet::new();
        for id in selected {
            if manageable.contains(id) {
                wanted.insert(id.as_str());
            } else if roles.is_role_id(id) {
                log::warn!("Skipping label {id}: system labels change through their own actions");
            } else {
                log::warn!("Skipping label {id}: not a user label");
            }
        }

        let to_detach: Vec<String> = mail
            .labels
            .iter()
            .filter(|id| manageable.contains(*id) && !wanted.contains(id))
            .map(str::to_string)
            .collect();
        let to_attach: Vec<&str> = selected
            .iter()
            .map(String::as_str)
            .filter(|id| wanted.contains(id) && !mail.has_label(id))
            .collect();

        let mut edited = mail.clone();
        for id in &to_detach {
            self.detach(&mail.id, id).await?;
            edited.labels.remove(id);
        }
        for id in to_attach {
            self.attach(&mail.id, id).await?;
            edited.labels.insert(id);
        }
        Ok(Some(edited))
    }

    /// Every manageable label with whether the mail carries it.
    pub fn label_selection(&self, mail_id: &str) -> Result<Vec<(Label, bool)>> {
        let mail = self.store.get_by_id(mail_id)?;
        Ok(self.label_selection_for(&mail))
    }

    pub fn label_selection_for(&self, mail: &Mail) -> Vec<(Label, bool)> {
        self.registry
            .manageable_labels()
            .into_iter()
            .map(|label| {
                let attached = mail.has_label(&label.id);
                (label, attached)
            })
            .collect()
    }
}
