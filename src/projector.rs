//! Derive the starred / trash / spam flags of a mail from its label ids.

use crate::models::{LabelRole, Mail, ViewState};
use crate::registry::RoleIds;

/// Whether `mail` carries the label backing `role`. Unknown role ids read as false.
pub fn has_role(mail: &Mail, roles: &RoleIds, role: LabelRole) -> bool {
    roles.get(role).is_some_and(|id| mail.has_label(id))
}

pub fn project(mail: &Mail, roles: &RoleIds) -> ViewState {
    ViewState {
        starred: has_role(mail, roles, LabelRole::Starred),
        in_trash: has_role(mail, roles, LabelRole::Trash),
        in_spam: has_role(mail, roles, LabelRole::Spam),
    }
}
