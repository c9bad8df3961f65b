use indexmap::IndexSet;
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// The server hands out numeric ids; older payloads and the cache use strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

pub(crate) fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(RawId::deserialize(d)?.into())
}

fn de_id_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    let raw: Option<Vec<RawId>> = Option::deserialize(d)?;
    Ok(raw.map(|ids| ids.into_iter().map(String::from).collect()))
}

/// `null` and a missing field both decode to the default.
fn de_null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// A label as known to the server: either provisioned (default) or user-created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub is_default: bool,
    #[serde(default, deserialize_with = "de_null_default")]
    pub is_attachable: bool,
    #[serde(
        default,
        deserialize_with = "de_id_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub mail_ids: Option<Vec<String>>,
}

impl Label {
    /// Labels a user may freely attach to and detach from a mail.
    pub fn is_manageable(&self) -> bool {
        self.is_attachable && !self.is_default
    }
}

/// System roles whose membership drives the projected view flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelRole {
    Starred,
    Trash,
    Spam,
}

impl LabelRole {
    pub const ALL: [LabelRole; 3] = [LabelRole::Starred, LabelRole::Trash, LabelRole::Spam];

    pub fn name(self) -> &'static str {
        match self {
            LabelRole::Starred => "starred",
            LabelRole::Trash => "trash",
            LabelRole::Spam => "spam",
        }
    }

    /// Case-insensitive role lookup by label name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for LabelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

/// Insertion-ordered set of label ids attached to a mail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelIds(IndexSet<String>);

impl LabelIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Returns `false` when the id was already attached.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    /// Returns `false` when the id was not attached. Keeps the order of the rest.
    pub fn remove(&mut self, id: &str) -> bool {
        self.0.shift_remove(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelIds {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        LabelIds(iter.into_iter().map(Into::into).collect())
    }
}

impl<'de> Deserialize<'de> for LabelIds {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(de_id_list(d)?.unwrap_or_default().into_iter().collect())
    }
}

/// A mail record as returned by the server and held in the resident set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub title: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub body: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub from: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub draft: bool,
    #[serde(default)]
    pub labels: LabelIds,
}

impl Mail {
    pub fn has_label(&self, label_id: &str) -> bool {
        self.labels.contains(label_id)
    }
}

/// Payload for sending a mail, creating a draft or editing one. Never carries an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub title: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
    pub draft: bool,
}

// ---------------------------------------------------------------------------
// Projected view state
// ---------------------------------------------------------------------------

/// Flags derived from system-label membership. Never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewState {
    pub starred: bool,
    pub in_trash: bool,
    pub in_spam: bool,
}

impl ViewState {
    pub fn get(&self, role: LabelRole) -> bool {
        match role {
            LabelRole::Starred => self.starred,
            LabelRole::Trash => self.in_trash,
            LabelRole::Spam => self.in_spam,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_accepts_numeric_id() {
        let label: Label = serde_json::from_str(
            r#"{"id": 4, "name": "Spam", "isDefault": true, "isAttachable": true}"#,
        )
        .unwrap();
        assert_eq!(label.id, "4");
        assert!(label.is_default);
        assert!(!label.is_manageable());
        assert_eq!(label.mail_ids, None);
    }

    #[test]
    fn label_missing_flags_default_to_false() {
        let label: Label = serde_json::from_str(r#"{"id": "L9", "name": "Work"}"#).unwrap();
        assert!(!label.is_default);
        assert!(!label.is_attachable);
    }

    #[test]
    fn label_mail_ids_accept_mixed_ids() {
        let label: Label = serde_json::from_str(
            r#"{"id": 7, "name": "Work", "isDefault": false, "isAttachable": true, "mailIds": [1, "2"]}"#,
        )
        .unwrap();
        assert_eq!(label.mail_ids, Some(vec!["1".to_string(), "2".to_string()]));
        assert!(label.is_manageable());
    }

    #[test]
    fn mail_decodes_server_shape() {
        let mail: Mail = serde_json::from_str(
            r#"{"id": 12, "title": "Hi", "body": "there", "from": "alice",
                "to": ["bob"], "draft": false, "labels": [1, 3, 1]}"#,
        )
        .unwrap();
        assert_eq!(mail.id, "12");
        assert_eq!(mail.labels.to_vec(), vec!["1", "3"]);
        assert!(mail.has_label("3"));
    }

    #[test]
    fn mail_tolerates_nulls_and_missing_fields() {
        let mail: Mail =
            serde_json::from_str(r#"{"id": "M1", "title": null, "to": null, "labels": null}"#)
                .unwrap();
        assert_eq!(mail.title, "");
        assert!(mail.to.is_empty());
        assert!(mail.labels.is_empty());
        assert!(!mail.draft);
    }

    #[test]
    fn label_ids_stay_a_set() {
        let mut ids = LabelIds::new();
        assert!(ids.insert("L1"));
        assert!(!ids.insert("L1"));
        assert!(ids.insert("L2"));
        assert_eq!(ids.len(), 2);
        assert!(ids.remove("L1"));
        assert!(!ids.remove("L1"));
        assert_eq!(ids.to_vec(), vec!["L2"]);
    }

    #[test]
    fn role_lookup_ignores_case() {
        assert_eq!(LabelRole::from_name("StarRed"), Some(LabelRole::Starred));
        assert_eq!(LabelRole::from_name("TRASH"), Some(LabelRole::Trash));
        assert_eq!(LabelRole::from_name("inbox"), None);
    }
}
