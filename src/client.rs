//! Wiring: builds every component once and hands out shared references.

use std::sync::Arc;

use crate::cache::CacheHandle;
use crate::compose::Composer;
use crate::config::Config;
use crate::error::Result;
use crate::mutation::LabelMutationService;
use crate::notify::{self, NotificationListener};
use crate::registry::LabelRegistry;
use crate::remote::{HttpBackend, LabelApi, MailApi};
use crate::session::{KeyringSessionStore, SessionStore};
use crate::store::MailStore;
use crate::view::MailContentView;

pub struct BmailClient {
    config: Config,
    session: Arc<dyn SessionStore>,
    registry: Arc<LabelRegistry>,
    store: Arc<MailStore>,
    mutations: Arc<LabelMutationService>,
    composer: Arc<Composer>,
}

impl BmailClient {
    /// Resolve the config and keep the session in the OS keyring.
    pub fn open_default() -> Result<Self> {
        let config = Config::resolve()?;
        let session = Arc::new(KeyringSessionStore::new(config.api_host()));
        Self::new(config, session)
    }

    /// Talk to the server over HTTP. A cache that fails to open is logged and
    /// left out.
    pub fn new(config: Config, session: Arc<dyn SessionStore>) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        let cache = if config.cache {
            match CacheHandle::open() {
                Ok(cache) => Some(cache),
                Err(e) => {
                    log::warn!("Running without mail cache: {e}");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self::with_backend(config, session, backend, cache))
    }

    /// Build on any backend, e.g. [`MemoryBackend`](crate::remote::MemoryBackend).
    pub fn with_backend<B>(
        config: Config,
        session: Arc<dyn SessionStore>,
        backend: Arc<B>,
        cache: Option<CacheHandle>,
    ) -> Self
    where
        B: LabelApi + MailApi + 'static,
    {
        let mut registry = LabelRegistry::new(backend.clone(), session.clone());
        let mut store = MailStore::new(backend.clone(), session.clone());
        if let Some(cache) = cache {
            registry = registry.with_cache(cache.clone());
            store = store.with_cache(cache);
        }
        let registry = Arc::new(registry);
        let store = Arc::new(store);

        let mutations = Arc::new(LabelMutationService::new(
            registry.clone(),
            store.clone(),
            backend.clone(),
            session.clone(),
        ));
        let composer = Arc::new(Composer::new(
            backend,
            session.clone(),
            config.display_name.clone(),
        ));

        BmailClient {
            config,
            session,
            registry,
            store,
            mutations,
            composer,
        }
    }

    /// Show the cached state, then load labels and the active filter from the
    /// server.
    pub async fn start(&self) -> Result<()> {
        match self.registry.restore_from_cache().await {
            Ok(n) if n > 0 => log::info!("Showing {n} cached labels"),
            Ok(_) => {}
            Err(e) => log::warn!("Could not restore cached labels: {e}"),
        }
        match self.store.restore_from_cache().await {
            Ok(n) if n > 0 => log::info!("Showing {n} cached mails"),
            Ok(_) => {}
            Err(e) => log::warn!("Could not restore cached mails: {e}"),
        }
        self.registry.load().await?;
        self.store.refresh().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn registry(&self) -> &Arc<LabelRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<MailStore> {
        &self.store
    }

    pub fn mutations(&self) -> &Arc<LabelMutationService> {
        &self.mutations
    }

    pub fn composer(&self) -> &Arc<Composer> {
        &self.composer
    }

    pub fn mail_view(&self) -> MailContentView {
        MailContentView::new(self.mutations.clone())
    }

    pub fn notifications(&self) -> NotificationListener {
        NotificationListener::new(self.store.clone())
    }

    /// Frame to send once the notification socket connects; `None` when
    /// logged out.
    pub fn register_frame(&self) -> Result<Option<String>> {
        Ok(self
            .session
            .load()?
            .map(|s| notify::register_frame(&s.user_id)))
    }

    /// Drop the session, the labels, the resident mail and the cache.
    pub async fn logout(&self) -> Result<()> {
        self.session.clear()?;
        self.registry.clear();
        self.store.clear().await;
        log::info!("Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabelRole, Mail};
    use crate::remote::MemoryBackend;
    use crate::session::MemorySessionStore;

    fn seeded() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::with_default_labels());
        let inbox = backend.label_id("inbox").unwrap();
        backend.insert_mail(Mail {
            id: "M1".into(),
            title: "Welcome".into(),
            labels: [inbox.as_str()].into_iter().collect(),
            ..Mail::default()
        });
        backend
    }

    fn client(backend: Arc<MemoryBackend>, cache: Option<CacheHandle>) -> BmailClient {
        BmailClient::with_backend(
            Config::default(),
            Arc::new(MemorySessionStore::logged_in("1", "7")),
            backend,
            cache,
        )
    }

    #[tokio::test]
    async fn start_loads_labels_and_inbox() {
        let client = client(seeded(), None);
        client.start().await.unwrap();

        assert!(client.registry().is_loaded());
        assert!(client.registry().role_label_id(LabelRole::Spam).is_some());
        assert_eq!(client.store().active_filter().as_deref(), Some("inbox"));
        assert_eq!(client.store().mails().len(), 1);
    }

    #[tokio::test]
    async fn components_share_one_store() {
        let client = client(seeded(), None);
        client.start().await.unwrap();

        let view = client.mail_view();
        view.open("M1").await.unwrap();
        view.toggle_starred().await.unwrap();
        assert!(client.mutations().project("M1").unwrap().starred);
    }

    #[tokio::test]
    async fn cached_state_shows_while_offline() {
        let cache = CacheHandle::open_in_memory().unwrap();
        let backend = seeded();
        client(backend.clone(), Some(cache.clone()))
            .start()
            .await
            .unwrap();

        backend.set_offline(true);
        let offline = client(backend, Some(cache));
        assert!(offline.start().await.is_err());
        assert!(offline.registry().is_loaded());
        assert_eq!(offline.store().get_by_id("M1").unwrap().title, "Welcome");
    }

    #[tokio::test]
    async fn logout_forgets_everything() {
        let client = client(seeded(), None);
        client.start().await.unwrap();
        assert_eq!(
            client.register_frame().unwrap().as_deref(),
            Some(r#"42["register","7"]"#)
        );

        client.logout().await.unwrap();
        assert_eq!(client.register_frame().unwrap(), None);
        assert!(!client.registry().is_loaded());
        assert!(client.store().mails().is_empty());
        assert!(client.store().refresh().await.is_err());
    }
}
