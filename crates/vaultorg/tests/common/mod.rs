//! In-memory collaborator fakes with call recording, shared by the
//! integration tests. Every fake is cheap to construct and records the calls
//! it receives through a shared [`CallRecorder`], so tests can assert exact
//! call sequences across collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use vaultorg::context::RequestContext;
use vaultorg::entitlements::{CoreSettings, EntitlementLedger};
use vaultorg::lifecycle::MembershipLifecycle;
use vaultorg::permissions::CustomPermissions;
use vaultorg::repository::{
    EventService, FeatureService, MailService, MembershipEvent, MembershipRepository,
    OrganizationRepository, PaymentService, PolicyRepository, ProviderRepository,
    ReferenceEventService, SecretsManagerSubscriptionUpdate, SmSeatsQuery, UserRepository,
};
use vaultorg::saga::OrganizationService;
use vaultorg::types::{
    CollectionAccessGrant, Membership, MembershipRole, MembershipStatus, OrgPolicy, Organization,
    OrganizationInviteInfo, OrganizationSignup, PlanTier, Provider, ReferenceEvent, VaultUser,
};
use vaultorg::{OrgError, Result};
use vaultorg_core::OrgLogger;

// ── Call recording ──────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallRecorder {
    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

// ── Storage fakes ───────────────────────────────────────────────

pub struct InMemoryOrgRepo {
    orgs: Mutex<HashMap<String, Organization>>,
    recorder: CallRecorder,
}

impl InMemoryOrgRepo {
    pub fn new(recorder: CallRecorder) -> Self {
        Self {
            orgs: Mutex::new(HashMap::new()),
            recorder,
        }
    }

    pub fn seed(&self, org: Organization) {
        self.orgs.lock().unwrap().insert(org.id.clone(), org);
    }

    pub fn get(&self, id: &str) -> Option<Organization> {
        self.orgs.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl OrganizationRepository for InMemoryOrgRepo {
    async fn get_by_id(&self, id: &str) -> Result<Option<Organization>> {
        Ok(self.orgs.lock().unwrap().get(id).cloned())
    }

    async fn create(&self, org: &Organization) -> Result<()> {
        self.recorder.record("create-organization");
        self.orgs.lock().unwrap().insert(org.id.clone(), org.clone());
        Ok(())
    }

    async fn replace(&self, org: &Organization) -> Result<()> {
        self.recorder.record("replace-organization");
        self.orgs.lock().unwrap().insert(org.id.clone(), org.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.recorder.record("delete-organization");
        self.orgs.lock().unwrap().remove(id);
        Ok(())
    }
}

pub struct InMemoryMembershipRepo {
    memberships: Mutex<HashMap<String, Membership>>,
    grants: Mutex<Vec<CollectionAccessGrant>>,
    free_admin_counts: Mutex<HashMap<String, u32>>,
    recorder: CallRecorder,
}

impl InMemoryMembershipRepo {
    pub fn new(recorder: CallRecorder) -> Self {
        Self {
            memberships: Mutex::new(HashMap::new()),
            grants: Mutex::new(Vec::new()),
            free_admin_counts: Mutex::new(HashMap::new()),
            recorder,
        }
    }

    pub fn seed(&self, membership: Membership) {
        self.memberships
            .lock()
            .unwrap()
            .insert(membership.id.clone(), membership);
    }

    pub fn set_free_admin_count(&self, user_id: &str, count: u32) {
        self.free_admin_counts
            .lock()
            .unwrap()
            .insert(user_id.to_string(), count);
    }

    pub fn get(&self, id: &str) -> Option<Membership> {
        self.memberships.lock().unwrap().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Membership> {
        self.memberships.lock().unwrap().values().cloned().collect()
    }

    pub fn stored_grants(&self) -> Vec<CollectionAccessGrant> {
        self.grants.lock().unwrap().clone()
    }
}

#[async_trait]
impl MembershipRepository for InMemoryMembershipRepo {
    async fn get_by_id(&self, id: &str) -> Result<Option<Membership>> {
        Ok(self.memberships.lock().unwrap().get(id).cloned())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Membership>> {
        let map = self.memberships.lock().unwrap();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn get_many_by_organization(
        &self,
        organization_id: &str,
        role: Option<MembershipRole>,
    ) -> Result<Vec<Membership>> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.organization_id == organization_id)
            .filter(|m| role.map_or(true, |r| m.role == r))
            .cloned()
            .collect())
    }

    async fn get_many_by_many_users(&self, user_ids: &[String]) -> Result<Vec<Membership>> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                m.user_id
                    .as_ref()
                    .map_or(false, |id| user_ids.contains(id))
            })
            .cloned()
            .collect())
    }

    async fn count_by_free_organization_admin(&self, user_id: &str) -> Result<u32> {
        Ok(*self
            .free_admin_counts
            .lock()
            .unwrap()
            .get(user_id)
            .unwrap_or(&0))
    }

    async fn create(
        &self,
        membership: &Membership,
        collections: &[CollectionAccessGrant],
    ) -> Result<String> {
        self.recorder.record("create-membership");
        self.memberships
            .lock()
            .unwrap()
            .insert(membership.id.clone(), membership.clone());
        self.grants.lock().unwrap().extend_from_slice(collections);
        Ok(membership.id.clone())
    }

    async fn create_many(
        &self,
        memberships: &[Membership],
        collections: &[CollectionAccessGrant],
    ) -> Result<Vec<String>> {
        self.recorder.record("create-memberships");
        let mut map = self.memberships.lock().unwrap();
        for m in memberships {
            map.insert(m.id.clone(), m.clone());
        }
        self.grants.lock().unwrap().extend_from_slice(collections);
        Ok(memberships.iter().map(|m| m.id.clone()).collect())
    }

    async fn upsert_many(&self, memberships: &[Membership]) -> Result<()> {
        self.recorder.record("upsert-memberships");
        let mut map = self.memberships.lock().unwrap();
        for m in memberships {
            map.insert(m.id.clone(), m.clone());
        }
        Ok(())
    }

    async fn replace(
        &self,
        membership: &Membership,
        collections: &[CollectionAccessGrant],
    ) -> Result<()> {
        self.recorder.record("replace-membership");
        self.memberships
            .lock()
            .unwrap()
            .insert(membership.id.clone(), membership.clone());
        let mut grants = self.grants.lock().unwrap();
        grants.retain(|g| g.membership_id != membership.id);
        grants.extend_from_slice(collections);
        Ok(())
    }

    async fn replace_many(&self, memberships: &[Membership]) -> Result<()> {
        self.recorder
            .record(format!("replace-memberships({})", memberships.len()));
        let mut map = self.memberships.lock().unwrap();
        for m in memberships {
            map.insert(m.id.clone(), m.clone());
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        self.recorder.record("delete-memberships");
        let mut map = self.memberships.lock().unwrap();
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn revoke(&self, id: &str) -> Result<()> {
        self.recorder.record("revoke-membership");
        if let Some(m) = self.memberships.lock().unwrap().get_mut(id) {
            m.status = MembershipStatus::Revoked;
        }
        Ok(())
    }

    async fn restore(&self, id: &str, status: MembershipStatus) -> Result<()> {
        self.recorder.record("restore-membership");
        if let Some(m) = self.memberships.lock().unwrap().get_mut(id) {
            m.status = status;
        }
        Ok(())
    }
}

pub struct StaticPolicyRepo {
    policies: Mutex<Vec<OrgPolicy>>,
}

impl StaticPolicyRepo {
    pub fn new() -> Self {
        Self {
            policies: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, policy: OrgPolicy) {
        self.policies.lock().unwrap().push(policy);
    }
}

#[async_trait]
impl PolicyRepository for StaticPolicyRepo {
    async fn get_many_by_organization_id(&self, organization_id: &str) -> Result<Vec<OrgPolicy>> {
        Ok(self
            .policies
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.organization_id == organization_id)
            .cloned()
            .collect())
    }
}

pub struct FakeProviderRepo {
    provider: Mutex<Option<Provider>>,
    confirmed_provider_users: Mutex<u32>,
}

impl FakeProviderRepo {
    pub fn new() -> Self {
        Self {
            provider: Mutex::new(None),
            confirmed_provider_users: Mutex::new(0),
        }
    }

    pub fn set_provider(&self, provider: Provider) {
        *self.provider.lock().unwrap() = Some(provider);
    }

    pub fn set_confirmed_provider_users(&self, count: u32) {
        *self.confirmed_provider_users.lock().unwrap() = count;
    }
}

#[async_trait]
impl ProviderRepository for FakeProviderRepo {
    async fn get_by_organization_id(&self, _organization_id: &str) -> Result<Option<Provider>> {
        Ok(self.provider.lock().unwrap().clone())
    }

    async fn count_confirmed_users_by_organization(&self, _organization_id: &str) -> Result<u32> {
        Ok(*self.confirmed_provider_users.lock().unwrap())
    }
}

pub struct FakeUserRepo {
    users: Mutex<Vec<VaultUser>>,
}

impl FakeUserRepo {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, user: VaultUser) {
        self.users.lock().unwrap().push(user);
    }
}

#[async_trait]
impl UserRepository for FakeUserRepo {
    async fn get_many(&self, ids: &[String]) -> Result<Vec<VaultUser>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn get_many_by_emails(&self, emails: &[String]) -> Result<Vec<VaultUser>> {
        let wanted: Vec<String> = emails.iter().map(|e| e.to_lowercase()).collect();
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| wanted.contains(&u.email.to_lowercase()))
            .cloned()
            .collect())
    }
}

// ── Mail / event fakes ──────────────────────────────────────────

pub struct RecordingMail {
    recorder: CallRecorder,
    fail_invites: Mutex<bool>,
    invites_sent: Mutex<Vec<OrganizationInviteInfo>>,
    confirmed_sent: Mutex<Vec<String>>,
}

impl RecordingMail {
    pub fn new(recorder: CallRecorder) -> Self {
        Self {
            recorder,
            fail_invites: Mutex::new(false),
            invites_sent: Mutex::new(Vec::new()),
            confirmed_sent: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_invites(&self) {
        *self.fail_invites.lock().unwrap() = true;
    }

    pub fn invites_sent(&self) -> Vec<OrganizationInviteInfo> {
        self.invites_sent.lock().unwrap().clone()
    }

    pub fn confirmed_emails(&self) -> Vec<String> {
        self.confirmed_sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailService for RecordingMail {
    async fn send_organization_invite_emails(&self, info: &OrganizationInviteInfo) -> Result<()> {
        self.recorder.record("send-invite-mail");
        if *self.fail_invites.lock().unwrap() {
            return Err(OrgError::Transport("mail send failed".into()));
        }
        self.invites_sent.lock().unwrap().push(info.clone());
        Ok(())
    }

    async fn send_organization_confirmed_email(
        &self,
        _organization_name: &str,
        email: &str,
    ) -> Result<()> {
        self.recorder.record("send-confirmed-mail");
        self.confirmed_sent.lock().unwrap().push(email.to_string());
        Ok(())
    }
}

pub struct RecordingEvents {
    recorder: CallRecorder,
    events: Mutex<Vec<MembershipEvent>>,
}

impl RecordingEvents {
    pub fn new(recorder: CallRecorder) -> Self {
        Self {
            recorder,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn logged(&self) -> Vec<MembershipEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventService for RecordingEvents {
    async fn log_membership_events(&self, events: &[MembershipEvent]) -> Result<()> {
        self.recorder.record(format!("log-events({})", events.len()));
        self.events.lock().unwrap().extend_from_slice(events);
        Ok(())
    }
}

pub struct RecordingReferenceEvents {
    recorder: CallRecorder,
    fail: Mutex<bool>,
    raised: Mutex<Vec<ReferenceEvent>>,
}

impl RecordingReferenceEvents {
    pub fn new(recorder: CallRecorder) -> Self {
        Self {
            recorder,
            fail: Mutex::new(false),
            raised: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn raised(&self) -> Vec<ReferenceEvent> {
        self.raised.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReferenceEventService for RecordingReferenceEvents {
    async fn raise_event(&self, event: &ReferenceEvent) -> Result<()> {
        self.recorder.record("reference-event");
        if *self.fail.lock().unwrap() {
            return Err(OrgError::Transport("reference event sink unavailable".into()));
        }
        self.raised.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct RecordingPayments {
    recorder: CallRecorder,
    updates: Mutex<Vec<SecretsManagerSubscriptionUpdate>>,
    purchases: Mutex<Vec<String>>,
}

impl RecordingPayments {
    pub fn new(recorder: CallRecorder) -> Self {
        Self {
            recorder,
            updates: Mutex::new(Vec::new()),
            purchases: Mutex::new(Vec::new()),
        }
    }

    pub fn updates(&self) -> Vec<SecretsManagerSubscriptionUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn purchases(&self) -> Vec<String> {
        self.purchases.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentService for RecordingPayments {
    async fn purchase_organization(
        &self,
        org: &Organization,
        _signup: &OrganizationSignup,
    ) -> Result<()> {
        self.recorder.record("purchase-organization");
        self.purchases.lock().unwrap().push(org.id.clone());
        Ok(())
    }

    async fn update_secrets_manager_subscription(
        &self,
        update: &SecretsManagerSubscriptionUpdate,
    ) -> Result<()> {
        self.recorder
            .record(format!("sm-subscription(smSeats={:?})", update.sm_seats));
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

// ── Feature flags & seat query ──────────────────────────────────

pub struct StaticFeatures {
    enabled: Mutex<HashSet<String>>,
}

impl StaticFeatures {
    pub fn new() -> Self {
        Self {
            enabled: Mutex::new(HashSet::new()),
        }
    }

    pub fn enable(&self, flag: &str) {
        self.enabled.lock().unwrap().insert(flag.to_string());
    }
}

impl FeatureService for StaticFeatures {
    fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.lock().unwrap().contains(flag)
    }
}

/// Returns one Secrets Manager seat per new sm-enabled invite.
pub struct FakeSmSeatsQuery;

#[async_trait]
impl SmSeatsQuery for FakeSmSeatsQuery {
    async fn count_new_sm_seats_required(
        &self,
        _organization_id: &str,
        new_sm_users: u32,
    ) -> Result<u32> {
        Ok(new_sm_users)
    }
}

// ── Harness ─────────────────────────────────────────────────────

pub struct Harness {
    pub recorder: CallRecorder,
    pub orgs: Arc<InMemoryOrgRepo>,
    pub memberships: Arc<InMemoryMembershipRepo>,
    pub policies: Arc<StaticPolicyRepo>,
    pub providers: Arc<FakeProviderRepo>,
    pub users: Arc<FakeUserRepo>,
    pub mail: Arc<RecordingMail>,
    pub events: Arc<RecordingEvents>,
    pub reference_events: Arc<RecordingReferenceEvents>,
    pub payments: Arc<RecordingPayments>,
    pub features: Arc<StaticFeatures>,
    pub ledger: Arc<EntitlementLedger>,
    pub lifecycle: Arc<MembershipLifecycle>,
    pub service: OrganizationService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(CoreSettings::default())
    }

    pub fn with_settings(settings: CoreSettings) -> Self {
        let recorder = CallRecorder::default();
        let orgs = Arc::new(InMemoryOrgRepo::new(recorder.clone()));
        let memberships = Arc::new(InMemoryMembershipRepo::new(recorder.clone()));
        let policies = Arc::new(StaticPolicyRepo::new());
        let providers = Arc::new(FakeProviderRepo::new());
        let users = Arc::new(FakeUserRepo::new());
        let mail = Arc::new(RecordingMail::new(recorder.clone()));
        let events = Arc::new(RecordingEvents::new(recorder.clone()));
        let reference_events = Arc::new(RecordingReferenceEvents::new(recorder.clone()));
        let payments = Arc::new(RecordingPayments::new(recorder.clone()));
        let features = Arc::new(StaticFeatures::new());

        let ledger = Arc::new(EntitlementLedger::new(
            orgs.clone(),
            payments.clone(),
            providers.clone(),
            settings,
            OrgLogger::disabled(),
        ));
        let lifecycle = Arc::new(MembershipLifecycle::new(
            orgs.clone(),
            memberships.clone(),
            policies.clone(),
            providers.clone(),
            users.clone(),
            mail.clone(),
            events.clone(),
            OrgLogger::disabled(),
        ));
        let service = OrganizationService::new(
            orgs.clone(),
            memberships.clone(),
            users.clone(),
            mail.clone(),
            events.clone(),
            reference_events.clone(),
            payments.clone(),
            features.clone(),
            Arc::new(FakeSmSeatsQuery),
            ledger.clone(),
            lifecycle.clone(),
            OrgLogger::disabled(),
        );

        Self {
            recorder,
            orgs,
            memberships,
            policies,
            providers,
            users,
            mail,
            events,
            reference_events,
            payments,
            features,
            ledger,
            lifecycle,
            service,
        }
    }
}

// ── Seed helpers ────────────────────────────────────────────────

pub fn organization(id: &str, plan: PlanTier) -> Organization {
    Organization {
        id: id.to_string(),
        name: format!("{id} org"),
        plan,
        seats: Some(10),
        max_autoscale_seats: None,
        use_secrets_manager: false,
        sm_seats: None,
        sm_service_accounts: None,
        max_autoscale_sm_seats: None,
        use_custom_permissions: plan == PlanTier::Enterprise,
        flexible_collections: false,
        use_key_connector: false,
        default_collection_id: None,
        public_key: None,
        private_key: None,
        created_at: Utc::now(),
    }
}

pub fn membership(
    id: &str,
    organization_id: &str,
    user_id: Option<&str>,
    role: MembershipRole,
    status: MembershipStatus,
) -> Membership {
    Membership {
        id: id.to_string(),
        organization_id: organization_id.to_string(),
        user_id: user_id.map(str::to_string),
        email: user_id
            .is_none()
            .then(|| format!("{id}@example.com")),
        role,
        status,
        permissions: None,
        access_secrets_manager: false,
        access_all: false,
        external_id: None,
        created_at: Utc::now(),
    }
}

pub fn user(id: &str, two_factor_enabled: bool) -> VaultUser {
    VaultUser {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        two_factor_enabled,
    }
}

pub fn owner_ctx(user_id: &str) -> RequestContext {
    RequestContext::for_user(user_id, MembershipRole::Owner, None)
}

pub fn admin_ctx(user_id: &str) -> RequestContext {
    RequestContext::for_user(user_id, MembershipRole::Admin, None)
}

pub fn custom_ctx(user_id: &str, permissions: CustomPermissions) -> RequestContext {
    RequestContext::for_user(user_id, MembershipRole::Custom, Some(permissions))
}
