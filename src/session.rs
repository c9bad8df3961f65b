use std::sync::Mutex;

use crate::error::{Error, Result};

const SERVICE: &str = "bmail";
const TOKEN_KEY: &str = "auth_token";
const USER_ID_KEY: &str = "user_id";

/// Credentials of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

/// Where the auth token and user id live between runs. Login writes it, logout
/// clears it; every remote call reads the token.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>>;
    fn save(&self, session: &Session) -> Result<()>;
    fn clear(&self) -> Result<()>;

    /// Token for the `Authorization` header. No session is an auth failure.
    fn token(&self) -> Result<String> {
        self.load()?
            .map(|s| s.token)
            .ok_or_else(|| Error::Auth("not logged in".into()))
    }
}

// ---------------------------------------------------------------------------
// OS keyring
// ---------------------------------------------------------------------------

/// Session kept in the platform keyring, one entry per field.
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    account: String,
}

impl KeyringSessionStore {
    /// `account` scopes the entries, usually the API host.
    pub fn new(account: impl Into<String>) -> Self {
        KeyringSessionStore {
            account: account.into(),
        }
    }

    fn key_id(&self, field: &str) -> String {
        format!("{field}@{}", self.account)
    }

    fn entry(&self, field: &str) -> Result<keyring::Entry> {
        let key = self.key_id(field);
        keyring::Entry::new(SERVICE, &key).map_err(|e| {
            log::error!("keyring Entry::new failed for key={key:?}: {e}");
            Error::Session(format!("keyring error: {e}"))
        })
    }

    fn get(&self, field: &str) -> Result<Option<String>> {
        log::debug!("keyring GET: service={SERVICE:?} field={field:?}");
        match self.entry(field)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                log::warn!("keyring get_password failed for field={field:?}: {e}");
                Err(Error::Session(format!("keyring get: {e}")))
            }
        }
    }

    fn set(&self, field: &str, value: &str) -> Result<()> {
        log::debug!("keyring SET: service={SERVICE:?} field={field:?}");
        self.entry(field)?.set_password(value).map_err(|e| {
            log::error!("keyring set_password failed for field={field:?}: {e}");
            Error::Session(format!("keyring set: {e}"))
        })
    }

    fn delete(&self, field: &str) -> Result<()> {
        log::debug!("keyring DELETE: service={SERVICE:?} field={field:?}");
        match self.entry(field)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                log::warn!("keyring delete failed for field={field:?}: {e}");
                Err(Error::Session(format!("keyring delete: {e}")))
            }
        }
    }
}

impl SessionStore for KeyringSessionStore {
    fn load(&self) -> Result<Option<Session>> {
        let Some(token) = self.get(TOKEN_KEY)? else {
            return Ok(None);
        };
        let user_id = self.get(USER_ID_KEY)?.unwrap_or_default();
        Ok(Some(Session { token, user_id }))
    }

    fn save(&self, session: &Session) -> Result<()> {
        self.set(TOKEN_KEY, &session.token)?;
        self.set(USER_ID_KEY, &session.user_id)
    }

    fn clear(&self) -> Result<()> {
        self.delete(TOKEN_KEY)?;
        self.delete(USER_ID_KEY)
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// Session held in memory only; gone when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logged_in(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        MemorySessionStore {
            inner: Mutex::new(Some(Session {
                token: token.into(),
                user_id: user_id.into(),
            })),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Session>>> {
        self.inner
            .lock()
            .map_err(|_| Error::Session("session lock poisoned".into()))
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.lock()? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_and_clears() {
        let store = MemorySessionStore::new();
        assert_eq!(store.load().unwrap(), None);
        assert!(matches!(store.token(), Err(Error::Auth(_))));

        let session = Session {
            token: "42".into(),
            user_id: "42".into(),
        };
        store.save(&session).unwrap();
        assert_eq!(store.token().unwrap(), "42");
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn keyring_keys_are_scoped_by_account() {
        let store = KeyringSessionStore::new("mail.example.com");
        assert_eq!(store.key_id(TOKEN_KEY), "auth_token@mail.example.com");
        assert_eq!(store.key_id(USER_ID_KEY), "user_id@mail.example.com");
    }
}
