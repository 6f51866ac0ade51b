// Request-scoped context: who is acting, with what standing in the target
// organization, under which feature-flag state.
//
// Resolved once at the top of each operation and threaded through, so a flag
// flip mid-request cannot produce inconsistent decisions.

use serde::{Deserialize, Serialize};

use crate::permissions::CustomPermissions;
use crate::repository::FeatureService;
use crate::types::{MembershipRole, Organization};

/// Feature flag names consulted by the core.
pub mod flags {
    pub const FLEXIBLE_COLLECTIONS: &str = "flexible-collections";
    pub const FLEXIBLE_COLLECTIONS_SIGNUP: &str = "flexible-collections-signup";
}

/// Who initiated an operation, for audit attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum Actor {
    User(String),
    /// A system integration (directory sync, SCIM, SSO provisioning).
    System(SystemActor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemActor {
    Scim,
    Sso,
    DomainVerification,
}

impl Actor {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::User(id) => Some(id),
            Actor::System(_) => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Actor::System(_))
    }
}

/// The feature-flag–dependent shape of an organization, resolved once per
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganizationCapabilities {
    pub flexible_collections: bool,
    pub use_custom_permissions: bool,
}

impl OrganizationCapabilities {
    pub fn resolve(org: &Organization, features: &dyn FeatureService) -> Self {
        Self {
            // The org-level migration flag only takes effect while the
            // rollout flag is on.
            flexible_collections: org.flexible_collections
                && features.is_enabled(flags::FLEXIBLE_COLLECTIONS),
            use_custom_permissions: org.use_custom_permissions,
        }
    }
}

/// The acting party's standing within the target organization.
///
/// System actors carry no membership role; they pass every role gate and are
/// attributed separately in the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub actor: Actor,
    /// The actor's role in the organization; `None` for system actors.
    pub role: Option<MembershipRole>,
    /// The actor's effective capabilities.
    pub permissions: CustomPermissions,
}

impl RequestContext {
    pub fn for_user(
        user_id: impl Into<String>,
        role: MembershipRole,
        permissions: Option<CustomPermissions>,
    ) -> Self {
        let permissions = match role {
            MembershipRole::Owner | MembershipRole::Admin => CustomPermissions::all(),
            _ => permissions.unwrap_or_default(),
        };
        Self {
            actor: Actor::User(user_id.into()),
            role: Some(role),
            permissions,
        }
    }

    pub fn for_system(actor: SystemActor) -> Self {
        Self {
            actor: Actor::System(actor),
            role: None,
            permissions: CustomPermissions::all(),
        }
    }

    pub fn is_owner(&self) -> bool {
        self.actor.is_system() || self.role == Some(MembershipRole::Owner)
    }

    pub fn can_manage_users(&self) -> bool {
        match (&self.actor, self.role) {
            (Actor::System(_), _) => true,
            (_, Some(MembershipRole::Owner) | Some(MembershipRole::Admin)) => true,
            (_, Some(MembershipRole::Custom)) => self.permissions.manage_users,
            _ => false,
        }
    }

    pub fn can_manage_reset_password(&self) -> bool {
        match (&self.actor, self.role) {
            (Actor::System(_), _) => true,
            (_, Some(MembershipRole::Owner) | Some(MembershipRole::Admin)) => true,
            (_, Some(MembershipRole::Custom)) => self.permissions.manage_reset_password,
            _ => false,
        }
    }
}
