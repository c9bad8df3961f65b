use std::sync::{Arc, Mutex};

use crate::cache::CacheHandle;
use crate::error::{Error, Result};
use crate::models::Mail;
use crate::observe::{Observable, Subscription};
use crate::remote::MailApi;
use crate::session::SessionStore;

/// Filter used when nothing has been loaded yet.
pub const INBOX: &str = "inbox";

/// The resident working set of mail: whatever the last `reload` or `search`
/// returned, kept current by local label bookkeeping.
pub struct MailStore {
    api: Arc<dyn MailApi>,
    session: Arc<dyn SessionStore>,
    cache: Option<CacheHandle>,
    mails: Observable<Vec<Mail>>,
    active_filter: Mutex<Option<String>>,
}

impl MailStore {
    pub fn new(api: Arc<dyn MailApi>, session: Arc<dyn SessionStore>) -> Self {
        MailStore {
            api,
            session,
            cache: None,
            mails: Observable::default(),
            active_filter: Mutex::new(None),
        }
    }

    /// Mirror every change of the resident set into `cache`.
    pub fn with_cache(mut self, cache: CacheHandle) -> Self {
        self.cache = Some(cache);
        self
    }

    // -- reads ----------------------------------------------------------------

    pub fn get_by_id(&self, mail_id: &str) -> Result<Mail> {
        self.mails
            .with(|mails| mails.iter().find(|m| m.id == mail_id).cloned())
            .ok_or_else(|| Error::mail_not_found(mail_id))
    }

    pub fn mails(&self) -> Vec<Mail> {
        self.mails.get()
    }

    pub fn subscribe(&self) -> Subscription<Vec<Mail>> {
        self.mails.subscribe()
    }

    /// Filter of the last `reload`; searches leave it unchanged.
    pub fn active_filter(&self) -> Option<String> {
        self.lock_filter().clone()
    }

    fn lock_filter(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.active_filter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- server round trips -------------------------------------------------

    /// Replace the resident set with the mail carrying label `filter`. The
    /// active filter only moves once the fetch succeeded.
    pub async fn reload(&self, filter: &str) -> Result<()> {
        let filter = filter.trim().to_lowercase();
        log::info!("Fetching mails for label: {filter}");

        let token = self.session.token()?;
        let mails = self
            .api
            .list_mail_by_label(&token, &filter)
            .await
            .map_err(|e| {
                log::error!("Failed to fetch mails for {filter}: {e}");
                e
            })?;
        log::info!("Number of mails fetched: {}", mails.len());
        *self.lock_filter() = Some(filter.clone());
        self.replace(Some(filter), mails).await;
        Ok(())
    }

    /// Reload the active filter, the inbox when nothing was loaded yet.
    pub async fn refresh(&self) -> Result<()> {
        let filter = self.active_filter().unwrap_or_else(|| INBOX.to_string());
        self.reload(&filter).await
    }

    /// Replace the resident set with server-side search results. A blank query
    /// goes back to the active filter.
    pub async fn search(&self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return self.refresh().await;
        }
        let token = self.session.token()?;
        let mails = self.api.search_mail(&token, query).await.map_err(|e| {
            log::error!("Search failed: {e}");
            e
        })?;
        log::info!("Search completed: {} results", mails.len());
        self.replace(None, mails).await;
        Ok(())
    }

    /// Seed the resident set from the cache. Returns how many mails were restored.
    pub async fn restore_from_cache(&self) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let cached = cache.load_mails().await?;
        let count = cached.mails.len();
        if let Some(filter) = cached.filter {
            self.lock_filter().get_or_insert(filter);
        }
        self.mails.publish(cached.mails);
        log::debug!("Restored {count} mails from cache");
        Ok(count)
    }

    async fn replace(&self, filter: Option<String>, mails: Vec<Mail>) {
        self.mails.publish(mails.clone());
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.replace_mails(filter, mails).await {
                log::warn!("Failed to cache mails: {e}");
            }
        }
    }

    // -- local bookkeeping after confirmed mutations -------------------------

    /// Record `label_id` on a resident mail. Returns the updated mail, `None`
    /// when the mail is not resident.
    pub async fn attach_local(&self, mail_id: &str, label_id: &str) -> Option<Mail> {
        self.edit_labels(mail_id, |mail| mail.labels.insert(label_id))
            .await
    }

    pub async fn detach_local(&self, mail_id: &str, label_id: &str) -> Option<Mail> {
        self.edit_labels(mail_id, |mail| mail.labels.remove(label_id))
            .await
    }

    async fn edit_labels(&self, mail_id: &str, edit: impl FnOnce(&mut Mail) -> bool) -> Option<Mail> {
        let mut updated = None;
        self.mails.update(|mails| {
            let Some(mail) = mails.iter_mut().find(|m| m.id == mail_id) else {
                return false;
            };
            let changed = edit(mail);
            updated = Some((mail.clone(), changed));
            changed
        });

        let (mail, changed) = updated?;
        if changed {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache
                    .update_mail_labels(mail.id.clone(), mail.labels.to_vec())
                    .await
                {
                    log::warn!("Failed to cache labels of mail {}: {e}", mail.id);
                }
            }
        }
        Some(mail)
    }

    /// Drop a mail from the resident set. Returns whether it was resident.
    pub async fn remove_local(&self, mail_id: &str) -> bool {
        let removed = self.mails.update(|mails| {
            let before = mails.len();
            mails.retain(|m| m.id != mail_id);
            mails.len() != before
        });
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove_mail(mail_id.to_string()).await {
                log::warn!("Failed to remove mail {mail_id} from cache: {e}");
            }
        }
        removed
    }

    /// Forget everything (logout).
    pub async fn clear(&self) {
        *self.lock_filter() = None;
        self.mails.publish(Vec::new());
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear().await {
                log::warn!("Failed to clear cache: {e}");
            }
        }
    }
}
