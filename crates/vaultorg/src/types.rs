// Domain models: organizations, plans, memberships, access grants, invites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::permissions::CustomPermissions;

// ── Plans ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Teams,
    Enterprise,
    Custom,
}

/// Static plan capabilities, looked up per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub tier: PlanTier,
    pub name: &'static str,
    pub base_seats: u32,
    pub base_sm_seats: u32,
    pub base_service_accounts: u32,
    pub allows_additional_seats: bool,
    pub allows_additional_service_accounts: bool,
    pub allows_seat_autoscale: bool,
    pub has_secrets_manager: bool,
}

impl Plan {
    pub fn for_tier(tier: PlanTier) -> &'static Plan {
        match tier {
            PlanTier::Free => &FREE_PLAN,
            PlanTier::Teams => &TEAMS_PLAN,
            PlanTier::Enterprise => &ENTERPRISE_PLAN,
            PlanTier::Custom => &CUSTOM_PLAN,
        }
    }
}

const FREE_PLAN: Plan = Plan {
    tier: PlanTier::Free,
    name: "Free",
    base_seats: 2,
    base_sm_seats: 2,
    base_service_accounts: 3,
    allows_additional_seats: false,
    allows_additional_service_accounts: false,
    allows_seat_autoscale: false,
    has_secrets_manager: true,
};

const TEAMS_PLAN: Plan = Plan {
    tier: PlanTier::Teams,
    name: "Teams",
    base_seats: 0,
    base_sm_seats: 0,
    base_service_accounts: 20,
    allows_additional_seats: true,
    allows_additional_service_accounts: true,
    allows_seat_autoscale: true,
    has_secrets_manager: true,
};

const ENTERPRISE_PLAN: Plan = Plan {
    tier: PlanTier::Enterprise,
    name: "Enterprise",
    base_seats: 0,
    base_sm_seats: 0,
    base_service_accounts: 50,
    allows_additional_seats: true,
    allows_additional_service_accounts: true,
    allows_seat_autoscale: true,
    has_secrets_manager: true,
};

const CUSTOM_PLAN: Plan = Plan {
    tier: PlanTier::Custom,
    name: "Custom",
    base_seats: 0,
    base_sm_seats: 0,
    base_service_accounts: 50,
    allows_additional_seats: true,
    allows_additional_service_accounts: true,
    allows_seat_autoscale: true,
    has_secrets_manager: true,
};

// ── Organization ────────────────────────────────────────────────

/// Organization record. Seat counters of `None` mean unlimited or not
/// applicable for the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub plan: PlanTier,
    pub seats: Option<u32>,
    pub max_autoscale_seats: Option<u32>,
    pub use_secrets_manager: bool,
    pub sm_seats: Option<u32>,
    pub sm_service_accounts: Option<u32>,
    pub max_autoscale_sm_seats: Option<u32>,
    pub use_custom_permissions: bool,
    pub flexible_collections: bool,
    pub use_key_connector: bool,
    pub default_collection_id: Option<String>,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn plan(&self) -> &'static Plan {
        Plan::for_tier(self.plan)
    }

    pub fn is_free(&self) -> bool {
        self.plan == PlanTier::Free
    }
}

// ── Membership ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    Admin,
    User,
    /// Deprecated; rejected by the policy evaluator under flexible collections
    /// but still present in stored data.
    Manager,
    Custom,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::User => "user",
            Self::Manager => "manager",
            Self::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            "manager" => Some(Self::Manager),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn is_admin_or_owner(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Invited,
    Accepted,
    Confirmed,
    Revoked,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invited => "invited",
            Self::Accepted => "accepted",
            Self::Confirmed => "confirmed",
            Self::Revoked => "revoked",
        }
    }
}

/// An organization-user pairing. `user_id` is null until the invited person
/// accepts; `email` is retained for re-invite matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    /// Populated only when `role == Custom`.
    pub permissions: Option<CustomPermissions>,
    pub access_secrets_manager: bool,
    /// Legacy blanket grant; forbidden under flexible collections.
    pub access_all: bool,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Collection access ───────────────────────────────────────────

/// Per-collection access requested on an invite or signup, before the
/// membership row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionAccessSelection {
    pub collection_id: String,
    pub read_only: bool,
    pub hide_passwords: bool,
    pub manage: bool,
}

impl CollectionAccessSelection {
    pub fn into_grant(self, membership_id: &str) -> CollectionAccessGrant {
        CollectionAccessGrant {
            collection_id: self.collection_id,
            membership_id: membership_id.to_string(),
            read_only: self.read_only,
            hide_passwords: self.hide_passwords,
            manage: self.manage,
        }
    }
}

/// A materialized collection-access grant for a membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionAccessGrant {
    pub collection_id: String,
    pub membership_id: String,
    pub read_only: bool,
    pub hide_passwords: bool,
    pub manage: bool,
}

// ── Invites ─────────────────────────────────────────────────────

/// A single invite entry: one role/permission shape applied to one or more
/// email addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub emails: Vec<String>,
    pub role: MembershipRole,
    pub permissions: Option<CustomPermissions>,
    pub collections: Vec<CollectionAccessSelection>,
    pub access_secrets_manager: bool,
    pub access_all: bool,
    pub external_id: Option<String>,
}

/// Invite token lifetime in days.
pub const INVITE_TOKEN_LIFETIME_DAYS: i64 = 5;

/// A membership paired with its freshly minted invite token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipTokenPair {
    pub membership: Membership,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Payload for the batched invite email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationInviteInfo {
    pub token_pairs: Vec<MembershipTokenPair>,
    pub is_free_org: bool,
    pub organization_name: String,
}

// ── Signups ─────────────────────────────────────────────────────

/// Input for creating a new organization with its initial owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSignup {
    pub name: String,
    pub owner_user_id: String,
    pub owner_email: String,
    pub plan: PlanTier,
    pub additional_seats: u32,
    pub use_secrets_manager: bool,
    pub additional_sm_seats: i64,
    pub additional_service_accounts: i64,
    pub provider_managed: bool,
    pub payment_token: Option<String>,
}

// ── Events ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MembershipInvited,
    MembershipConfirmed,
    MembershipRemoved,
    MembershipRevoked,
    MembershipRestored,
}

/// Aggregate analytics event raised once per workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ReferenceEvent {
    Signup {
        organization_id: String,
        plan_name: String,
        seats: Option<u32>,
    },
    InvitedUsers {
        organization_id: String,
        users: u32,
    },
}

// ── Policies & providers ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    SingleOrganization,
    TwoFactorAuthentication,
}

/// An organization policy row as returned by the policy repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgPolicy {
    pub organization_id: String,
    pub policy_type: PolicyType,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Msp,
    Reseller,
}

/// A provider entity managing an organization's billing/ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub provider_type: ProviderType,
    pub enabled: bool,
}

/// Minimal user view needed by confirmation checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultUser {
    pub id: String,
    pub email: String,
    pub two_factor_enabled: bool,
}
