// Typed capability set for the Custom role.
//
// The wire format is a camelCase JSON object of named booleans; unknown
// fields are rejected at deserialization rather than silently granted.

use serde::{Deserialize, Serialize};

/// Per-capability permission flags attached to Custom-role memberships.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CustomPermissions {
    pub manage_users: bool,
    pub manage_groups: bool,
    pub access_reports: bool,
    pub manage_policies: bool,
    pub manage_sso: bool,
    pub manage_scim: bool,
    pub access_event_logs: bool,
    pub access_import_export: bool,
    pub edit_any_collection: bool,
    pub delete_any_collection: bool,
    pub manage_reset_password: bool,
    pub create_new_collections: bool,
}

impl CustomPermissions {
    /// All capabilities granted; the effective set for owners and admins.
    pub fn all() -> Self {
        Self {
            manage_users: true,
            manage_groups: true,
            access_reports: true,
            manage_policies: true,
            manage_sso: true,
            manage_scim: true,
            access_event_logs: true,
            access_import_export: true,
            edit_any_collection: true,
            delete_any_collection: true,
            manage_reset_password: true,
            create_new_collections: true,
        }
    }

    fn as_flags(&self) -> [bool; 12] {
        [
            self.manage_users,
            self.manage_groups,
            self.access_reports,
            self.manage_policies,
            self.manage_sso,
            self.manage_scim,
            self.access_event_logs,
            self.access_import_export,
            self.edit_any_collection,
            self.delete_any_collection,
            self.manage_reset_password,
            self.create_new_collections,
        ]
    }

    /// True when every capability set on `requested` is also set on `self`.
    /// Custom inviters may only grant permissions they hold themselves.
    pub fn grants_all_of(&self, requested: &CustomPermissions) -> bool {
        self.as_flags()
            .iter()
            .zip(requested.as_flags())
            .all(|(held, wanted)| *held || !wanted)
    }
}
