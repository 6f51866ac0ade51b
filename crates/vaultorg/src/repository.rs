// Collaborator boundaries: narrow async traits for storage, mail, events,
// billing, and feature flags.
//
// The core propagates collaborator failures unchanged and never retries.
// Every trait is object-safe so tests can install recording fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vaultorg_core::Result;

use crate::context::Actor;
use crate::types::{
    CollectionAccessGrant, EventType, Membership, MembershipRole, MembershipStatus, OrgPolicy,
    Organization, OrganizationInviteInfo, OrganizationSignup, Provider, ReferenceEvent,
    VaultUser,
};

// ── Storage ─────────────────────────────────────────────────────

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Organization>>;
    async fn create(&self, org: &Organization) -> Result<()>;
    async fn replace(&self, org: &Organization) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Membership>>;
    async fn get_many(&self, ids: &[String]) -> Result<Vec<Membership>>;
    async fn get_many_by_organization(
        &self,
        organization_id: &str,
        role: Option<MembershipRole>,
    ) -> Result<Vec<Membership>>;
    /// All memberships, in any organization, held by any of the given users.
    async fn get_many_by_many_users(&self, user_ids: &[String]) -> Result<Vec<Membership>>;
    /// Number of free organizations the user already administers.
    async fn count_by_free_organization_admin(&self, user_id: &str) -> Result<u32>;
    async fn create(
        &self,
        membership: &Membership,
        collections: &[CollectionAccessGrant],
    ) -> Result<String>;
    async fn create_many(
        &self,
        memberships: &[Membership],
        collections: &[CollectionAccessGrant],
    ) -> Result<Vec<String>>;
    async fn upsert_many(&self, memberships: &[Membership]) -> Result<()>;
    /// Replaces one membership row and its collection grants together; the
    /// given grants supersede any previously stored for the membership.
    async fn replace(
        &self,
        membership: &Membership,
        collections: &[CollectionAccessGrant],
    ) -> Result<()>;
    async fn replace_many(&self, memberships: &[Membership]) -> Result<()>;
    async fn delete_many(&self, ids: &[String]) -> Result<()>;
    async fn revoke(&self, id: &str) -> Result<()>;
    async fn restore(&self, id: &str, status: MembershipStatus) -> Result<()>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn get_many_by_organization_id(&self, organization_id: &str) -> Result<Vec<OrgPolicy>>;
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn get_by_organization_id(&self, organization_id: &str) -> Result<Option<Provider>>;
    /// Count of confirmed provider users attached to the organization; these
    /// satisfy the last-owner invariant for provider-managed organizations.
    async fn count_confirmed_users_by_organization(&self, organization_id: &str) -> Result<u32>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_many(&self, ids: &[String]) -> Result<Vec<VaultUser>>;
    /// Lookup by email for invites targeting people who already hold an
    /// account. Addresses are matched case-insensitively.
    async fn get_many_by_emails(&self, emails: &[String]) -> Result<Vec<VaultUser>>;
}

// ── Mail & events ───────────────────────────────────────────────

#[async_trait]
pub trait MailService: Send + Sync {
    async fn send_organization_invite_emails(&self, info: &OrganizationInviteInfo) -> Result<()>;
    async fn send_organization_confirmed_email(
        &self,
        organization_name: &str,
        email: &str,
    ) -> Result<()>;
}

/// One audit log entry for a membership lifecycle change.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipEvent {
    pub membership: Membership,
    pub event_type: EventType,
    pub actor: Actor,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait EventService: Send + Sync {
    async fn log_membership_events(&self, events: &[MembershipEvent]) -> Result<()>;

    async fn log_membership_event(&self, event: MembershipEvent) -> Result<()> {
        self.log_membership_events(std::slice::from_ref(&event)).await
    }
}

#[async_trait]
pub trait ReferenceEventService: Send + Sync {
    async fn raise_event(&self, event: &ReferenceEvent) -> Result<()>;
}

// ── Billing ─────────────────────────────────────────────────────

/// Target state for the organization's secrets-manager subscription, with
/// explicit "changed" flags so the provider only touches what moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsManagerSubscriptionUpdate {
    pub organization_id: String,
    pub sm_seats: Option<u32>,
    pub sm_seats_changed: bool,
    pub sm_service_accounts: Option<u32>,
    pub sm_service_accounts_changed: bool,
    pub max_autoscale_sm_seats_changed: bool,
}

#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn purchase_organization(
        &self,
        org: &Organization,
        signup: &OrganizationSignup,
    ) -> Result<()>;
    async fn update_secrets_manager_subscription(
        &self,
        update: &SecretsManagerSubscriptionUpdate,
    ) -> Result<()>;
}

/// How many additional secrets-manager seats an invite batch needs, given the
/// organization's current occupancy.
#[async_trait]
pub trait SmSeatsQuery: Send + Sync {
    async fn count_new_sm_seats_required(
        &self,
        organization_id: &str,
        new_sm_users: u32,
    ) -> Result<u32>;
}

// ── Feature flags ───────────────────────────────────────────────

/// Queried synchronously at decision points; resolve flags into an
/// `OrganizationCapabilities` once per request rather than re-querying.
pub trait FeatureService: Send + Sync {
    fn is_enabled(&self, flag: &str) -> bool;
}
