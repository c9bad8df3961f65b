use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::CacheHandle;
use crate::error::{Error, Result};
use crate::models::{Label, LabelRole};
use crate::observe::{Observable, Subscription};
use crate::remote::LabelApi;
use crate::session::SessionStore;

// ---------------------------------------------------------------------------
// Role lookup table
// ---------------------------------------------------------------------------

/// Ids of the system labels backing each [`LabelRole`]. `None` until a label set
/// containing the matching default label has been seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleIds {
    pub starred: Option<String>,
    pub trash: Option<String>,
    pub spam: Option<String>,
}

impl RoleIds {
    /// Match default labels to roles by case-insensitive name. The first match wins.
    pub fn from_labels(labels: &[Label]) -> Self {
        let mut ids = RoleIds::default();
        for label in labels.iter().filter(|l| l.is_default) {
            if let Some(role) = LabelRole::from_name(&label.name) {
                let slot = ids.slot_mut(role);
                if slot.is_none() {
                    *slot = Some(label.id.clone());
                }
            }
        }
        ids
    }

    pub fn get(&self, role: LabelRole) -> Option<&str> {
        match role {
            LabelRole::Starred => self.starred.as_deref(),
            LabelRole::Trash => self.trash.as_deref(),
            LabelRole::Spam => self.spam.as_deref(),
        }
    }

    /// Whether `label_id` backs one of the roles.
    pub fn is_role_id(&self, label_id: &str) -> bool {
        LabelRole::ALL
            .into_iter()
            .any(|role| self.get(role) == Some(label_id))
    }

    fn slot_mut(&mut self, role: LabelRole) -> &mut Option<String> {
        match role {
            LabelRole::Starred => &mut self.starred,
            LabelRole::Trash => &mut self.trash,
            LabelRole::Spam => &mut self.spam,
        }
    }
}

// ---------------------------------------------------------------------------
// LabelRegistry
// ---------------------------------------------------------------------------

/// Every label of the logged-in account. Owns the role → label id mapping.
pub struct LabelRegistry {
    api: Arc<dyn LabelApi>,
    session: Arc<dyn SessionStore>,
    cache: Option<CacheHandle>,
    labels: Observable<Vec<Label>>,
    loaded: AtomicBool,
}

impl LabelRegistry {
    pub fn new(api: Arc<dyn LabelApi>, session: Arc<dyn SessionStore>) -> Self {
        LabelRegistry {
            api,
            session,
            cache: None,
            labels: Observable::default(),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn with_cache(mut self, cache: CacheHandle) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetch all labels and swap them in. On failure the previous set stays.
    pub async fn load(&self) -> Result<()> {
        let token = self.session.token()?;
        let labels = self.api.list_labels(&token).await.map_err(|e| {
            log::error!("Failed to load labels: {e}");
            e
        })?;
        log::info!("Labels loaded successfully: {} labels found", labels.len());
        self.replace(labels.clone());

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.replace_labels(labels).await {
                log::warn!("Failed to cache labels: {e}");
            }
        }
        Ok(())
    }

    /// Seed the registry from the cache. Returns how many labels were restored.
    pub async fn restore_from_cache(&self) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let labels = cache.load_labels().await?;
        let count = labels.len();
        if count > 0 {
            log::debug!("Restored {count} labels from cache");
            self.replace(labels);
        }
        Ok(count)
    }

    fn replace(&self, labels: Vec<Label>) {
        self.labels.publish(labels);
        self.loaded.store(true, Ordering::Release);
    }

    /// Forget every label (logout). Role ids read as unknown until the next load.
    pub fn clear(&self) {
        self.loaded.store(false, Ordering::Release);
        self.labels.publish(Vec::new());
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn labels(&self) -> Vec<Label> {
        self.labels.get()
    }

    /// Id of the default label backing `role`; `None` while unknown.
    pub fn role_label_id(&self, role: LabelRole) -> Option<String> {
        self.role_ids().get(role).map(str::to_string)
    }

    pub fn role_ids(&self) -> RoleIds {
        self.labels.with(|labels| RoleIds::from_labels(labels))
    }

    /// Labels a user may attach and detach by hand.
    pub fn manageable_labels(&self) -> Vec<Label> {
        self.labels.with(|labels| {
            labels
                .iter()
                .filter(|l| l.is_manageable())
                .cloned()
                .collect()
        })
    }

    pub fn subscribe(&self) -> Subscription<Vec<Label>> {
        self.labels.subscribe()
    }

    /// Ask the server to create a label. Call [`load`](Self::load) to see it.
    pub async fn create(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Label name is required".into()));
        }
        let token = self.session.token()?;
        log::info!("Creating label {name:?}");
        self.api.create_label(&token, name).await
    }

    /// Ask the server to delete a label. Call [`load`](Self::load) to see it gone.
    pub async fn delete(&self, label_id: &str) -> Result<()> {
        let token = self.session.token()?;
        log::info!("Deleting label {label_id}");
        self.api.delete_label(&token, label_id).await
    }
}
