//! Observable state of one opened mail, as a detail screen binds to it.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::models::{Label, LabelRole, Mail, ViewState};
use crate::mutation::{LabelMutationService, Outcome};
use crate::observe::{Observable, Subscription};
use crate::projector;

struct ViewInner {
    mutations: Arc<LabelMutationService>,
    mail: Observable<Option<Mail>>,
    starred: Observable<bool>,
    in_trash: Observable<bool>,
    in_spam: Observable<bool>,
    labels: Observable<Vec<Label>>,
}

impl ViewInner {
    fn flag(&self, role: LabelRole) -> &Observable<bool> {
        match role {
            LabelRole::Starred => &self.starred,
            LabelRole::Trash => &self.in_trash,
            LabelRole::Spam => &self.in_spam,
        }
    }

    fn show(&self, mail: Option<Mail>) -> ViewState {
        let state = match &mail {
            Some(mail) => projector::project(mail, &self.mutations.registry().role_ids()),
            None => ViewState::default(),
        };
        self.mail.publish(mail);
        for role in LabelRole::ALL {
            self.flag(role).publish(state.get(role));
        }
        state
    }

    /// Show the result of a mutation; `None` leaves the view as it is.
    fn applied(&self, edited: Option<Mail>) -> Outcome {
        match edited {
            Some(mail) => Outcome::Applied(self.show(Some(mail))),
            None => Outcome::NoOp,
        }
    }

    /// Re-read the open mail from the store. A mail that left the resident set
    /// stays on screen as last seen.
    fn sync(&self) {
        let Some(id) = self.mail.with(|m| m.as_ref().map(|m| m.id.clone())) else {
            return;
        };
        match self.mutations.store().get_by_id(&id) {
            Ok(mail) => {
                self.show(Some(mail));
            }
            Err(_) => {
                let kept = self.mail.get();
                self.show(kept);
            }
        }
    }

    fn sync_labels(&self) {
        self.labels
            .publish(self.mutations.registry().manageable_labels());
        self.sync();
    }
}

/// One opened mail: the record itself, its three projected flags and the user
/// labels on offer, each observable on its own.
///
/// While alive the view follows label-set reloads of the registry. Dropping it
/// (or [`close`](Self::close)) stops that.
pub struct MailContentView {
    inner: Arc<ViewInner>,
    watcher: Option<JoinHandle<()>>,
}

impl MailContentView {
    /// Must be called from within a Tokio runtime to follow registry reloads;
    /// outside one the view only updates on its own operations.
    pub fn new(mutations: Arc<LabelMutationService>) -> Self {
        let inner = Arc::new(ViewInner {
            labels: Observable::new(mutations.registry().manageable_labels()),
            mutations,
            mail: Observable::default(),
            starred: Observable::default(),
            in_trash: Observable::default(),
            in_spam: Observable::default(),
        });
        let watcher = spawn_watcher(&inner);
        MailContentView { inner, watcher }
    }

    /// Show mail `mail_id`. A mail missing from the resident set triggers one
    /// refresh of the store before giving up.
    pub async fn open(&self, mail_id: &str) -> Result<()> {
        let store = self.inner.mutations.store();
        let mail = match store.get_by_id(mail_id) {
            Ok(mail) => mail,
            Err(e) if e.is_not_found() => {
                log::debug!("Mail {mail_id} not resident, refreshing");
                store.refresh().await?;
                store.get_by_id(mail_id)?
            }
            Err(e) => return Err(e),
        };
        self.inner.show(Some(mail));
        Ok(())
    }

    /// The mail on screen. Mutations go through this copy, so they keep working
    /// after the store moved on to another filter or a search.
    fn open_mail(&self) -> Result<Mail> {
        self.inner
            .mail
            .get()
            .ok_or_else(|| Error::Validation("no mail open".into()))
    }

    /// Publish the wanted flag right away, then ask the server. A failed call
    /// leaves the flag as published.
    async fn set_role(&self, role: LabelRole, on: bool) -> Result<Outcome> {
        let mail = self.open_mail()?;
        if self.inner.mutations.registry().role_label_id(role).is_none() {
            return Ok(Outcome::NoOp);
        }
        self.inner.flag(role).publish(on);
        let edited = self.inner.mutations.set_role_on(&mail, role, on).await?;
        Ok(self.inner.applied(edited))
    }

    pub async fn toggle_starred(&self) -> Result<Outcome> {
        self.set_role(LabelRole::Starred, !self.starred()).await
    }

    pub async fn toggle_spam(&self) -> Result<Outcome> {
        self.set_role(LabelRole::Spam, !self.in_spam()).await
    }

    pub async fn move_to_trash(&self) -> Result<Outcome> {
        self.set_role(LabelRole::Trash, true).await
    }

    pub async fn restore_from_trash(&self) -> Result<Outcome> {
        self.set_role(LabelRole::Trash, false).await
    }

    /// Delete the open mail for good and empty the view.
    pub async fn delete_permanently(&self) -> Result<()> {
        let mail = self.open_mail()?;
        self.inner.mutations.delete_permanently(&mail.id).await?;
        self.inner.show(None);
        Ok(())
    }

    pub async fn update_labels(&self, selected: &[String]) -> Result<Outcome> {
        let mail = self.open_mail()?;
        let edited = self.inner.mutations.update_labels_on(&mail, selected).await?;
        Ok(self.inner.applied(edited))
    }

    pub fn label_selection(&self) -> Result<Vec<(Label, bool)>> {
        Ok(self.inner.mutations.label_selection_for(&self.open_mail()?))
    }

    /// Reload the store's active filter and re-read the open mail.
    pub async fn refresh(&self) -> Result<()> {
        self.inner.mutations.store().refresh().await?;
        self.inner.sync();
        Ok(())
    }

    pub fn mail(&self) -> Option<Mail> {
        self.inner.mail.get()
    }

    pub fn starred(&self) -> bool {
        self.inner.starred.get()
    }

    pub fn in_trash(&self) -> bool {
        self.inner.in_trash.get()
    }

    pub fn in_spam(&self) -> bool {
        self.inner.in_spam.get()
    }

    /// User labels on offer for the picker.
    pub fn labels(&self) -> Vec<Label> {
        self.inner.labels.get()
    }

    pub fn subscribe_mail(&self) -> Subscription<Option<Mail>> {
        self.inner.mail.subscribe()
    }

    pub fn subscribe_starred(&self) -> Subscription<bool> {
        self.inner.starred.subscribe()
    }

    pub fn subscribe_in_trash(&self) -> Subscription<bool> {
        self.inner.in_trash.subscribe()
    }

    pub fn subscribe_in_spam(&self) -> Subscription<bool> {
        self.inner.in_spam.subscribe()
    }

    pub fn subscribe_labels(&self) -> Subscription<Vec<Label>> {
        self.inner.labels.subscribe()
    }

    /// Stop following the registry.
    pub fn close(self) {}
}

impl Drop for MailContentView {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

fn spawn_watcher(inner: &Arc<ViewInner>) -> Option<JoinHandle<()>> {
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            log::warn!("No async runtime, mail view will not follow label reloads");
            return None;
        }
    };
    let mut labels = inner.mutations.registry().subscribe();
    let weak: Weak<ViewInner> = Arc::downgrade(inner);
    Some(runtime.spawn(async move {
        while labels.changed().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.sync_labels();
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::registry::LabelRegistry;
    use crate::remote::MemoryBackend;
    use crate::session::{MemorySessionStore, SessionStore};
    use crate::store::MailStore;

    fn label(id: &str, name: &str, is_default: bool) -> Label {
        Label {
            id: id.into(),
            name: name.into(),
            is_default,
            is_attachable: true,
            mail_ids: None,
        }
    }

    struct Fixture {
        backend: Arc<MemoryBackend>,
        mutations: Arc<LabelMutationService>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_label(label("L0", "inbox", true));
        backend.insert_label(label("L1", "starred", true));
        backend.insert_label(label("L2", "trash", true));
        backend.insert_label(label("L3", "spam", true));
        backend.insert_mail(Mail {
            id: "M1".into(),
            title: "Welcome".into(),
            labels: ["L0"].into_iter().collect(),
            ..Mail::default()
        });
        let session: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::logged_in("1", "1"));
        let registry = Arc::new(LabelRegistry::new(backend.clone(), session.clone()));
        let store = Arc::new(MailStore::new(backend.clone(), session.clone()));
        let mutations = Arc::new(LabelMutationService::new(
            registry,
            store,
            backend.clone(),
            session,
        ));
        Fixture { backend, mutations }
    }

    #[tokio::test]
    async fn open_refreshes_once_when_mail_is_not_resident() {
        let f = fixture();
        f.mutations.registry().load().await.unwrap();
        let view = MailContentView::new(f.mutations.clone());

        view.open("M1").await.unwrap();
        assert_eq!(view.mail().unwrap().title, "Welcome");
        assert_eq!(
            f.backend.calls().last().map(String::as_str),
            Some("list_mail_by_label:inbox")
        );

        assert!(view.open("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn toggles_publish_projection() {
        let f = fixture();
        f.mutations.registry().load().await.unwrap();
        let view = MailContentView::new(f.mutations.clone());
        view.open("M1").await.unwrap();

        view.toggle_starred().await.unwrap();
        assert!(view.starred());
        assert!(view.mail().unwrap().has_label("L1"));

        view.move_to_trash().await.unwrap();
        assert!(view.in_trash());
        view.restore_from_trash().await.unwrap();
        assert!(!view.in_trash());

        view.toggle_starred().await.unwrap();
        assert!(!view.starred());
        assert_eq!(view.mail().unwrap().labels.to_vec(), vec!["L0"]);
    }

    #[tokio::test]
    async fn failed_toggle_keeps_optimistic_flag() {
        let f = fixture();
        f.mutations.registry().load().await.unwrap();
        let view = MailContentView::new(f.mutations.clone());
        view.open("M1").await.unwrap();

        f.backend.set_offline(true);
        assert!(view.toggle_spam().await.is_err());
        assert!(view.in_spam());
        assert!(!view.mail().unwrap().has_label("L3"));
    }

    #[tokio::test]
    async fn toggles_are_no_ops_before_labels_load() {
        let f = fixture();
        let view = MailContentView::new(f.mutations.clone());
        f.mutations.store().refresh().await.unwrap();
        view.open("M1").await.unwrap();

        assert_eq!(view.toggle_starred().await.unwrap(), Outcome::NoOp);
        assert!(!view.starred());
    }

    #[tokio::test]
    async fn follows_registry_reloads() {
        let f = fixture();
        let view = MailContentView::new(f.mutations.clone());
        let mut labels = view.subscribe_labels();
        assert!(labels.current().is_empty());

        f.backend.insert_label(label("U1", "Work", false));
        f.mutations.registry().load().await.unwrap();

        let changed = tokio::time::timeout(Duration::from_secs(1), labels.changed())
            .await
            .expect("view saw the reload");
        assert!(changed);
        let offered = labels.current();
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].name, "Work");
    }

    #[tokio::test]
    async fn delete_permanently_empties_the_view() {
        let f = fixture();
        let view = MailContentView::new(f.mutations.clone());
        view.open("M1").await.unwrap();

        view.delete_permanently().await.unwrap();
        assert!(view.mail().is_none());
        assert!(matches!(
            view.toggle_starred().await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn toggles_reach_the_server_after_the_store_moves_on() {
        let f = fixture();
        f.mutations.registry().load().await.unwrap();
        let view = MailContentView::new(f.mutations.clone());
        view.open("M1").await.unwrap();

        f.mutations.store().search("nothing like it").await.unwrap();
        assert!(f.mutations.store().mails().is_empty());

        let outcome = view.toggle_starred().await.unwrap();
        assert!(matches!(outcome, Outcome::Applied(s) if s.starred));
        assert!(view.starred());
        assert!(view.mail().unwrap().has_label("L1"));
        assert!(f.backend.mail("M1").unwrap().has_label("L1"));
        assert!(f.backend.calls().contains(&"attach_label:M1:L1".to_string()));
    }
}
