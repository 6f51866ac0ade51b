// Invitation saga orchestrator and organization-level workflows.
//
// `invite_users` is the only multi-step write path in the core: it reserves
// and confirms seats before creating membership rows, and compensates (delete
// rows, revert seats) when a later step fails. The compensation pass runs
// before the error propagates, and the caller receives an aggregate error
// naming both the original failure and the compensation outcome.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};

use vaultorg_core::error::CompensationOutcome;
use vaultorg_core::{generate_id, id::generate_id_with_length, OrgError, OrgLogger, Result};

use crate::collections::{resolve_access, AccessSource, ResolvedAccess};
use crate::context::{flags, OrganizationCapabilities, RequestContext};
use crate::entitlements::{validate_secrets_manager_signup, EntitlementLedger, SeatReservation};
use crate::lifecycle::MembershipLifecycle;
use crate::permissions::CustomPermissions;
use crate::policy::{authorize_role_change, RoleAssignment};
use crate::repository::{
    EventService, FeatureService, MailService, MembershipEvent, MembershipRepository,
    OrganizationRepository, PaymentService, ReferenceEventService, SmSeatsQuery, UserRepository,
};
use crate::types::{
    CollectionAccessGrant, CollectionAccessSelection, EventType, InviteRequest, Membership,
    MembershipRole, MembershipStatus, MembershipTokenPair, Organization, OrganizationInviteInfo,
    OrganizationSignup, Plan, PlanTier, ReferenceEvent, INVITE_TOKEN_LIFETIME_DAYS,
};

pub struct OrganizationService {
    orgs: Arc<dyn OrganizationRepository>,
    memberships: Arc<dyn MembershipRepository>,
    users: Arc<dyn UserRepository>,
    mail: Arc<dyn MailService>,
    events: Arc<dyn EventService>,
    reference_events: Arc<dyn ReferenceEventService>,
    payments: Arc<dyn PaymentService>,
    features: Arc<dyn FeatureService>,
    sm_seats: Arc<dyn SmSeatsQuery>,
    ledger: Arc<EntitlementLedger>,
    lifecycle: Arc<MembershipLifecycle>,
    logger: OrgLogger,
}

/// One pending invite after validation: either a brand-new membership or a
/// refresh of an existing row matched by email.
struct PreparedInvite {
    membership: Membership,
    grants: Vec<CollectionAccessGrant>,
    is_reinvite: bool,
}

impl OrganizationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orgs: Arc<dyn OrganizationRepository>,
        memberships: Arc<dyn MembershipRepository>,
        users: Arc<dyn UserRepository>,
        mail: Arc<dyn MailService>,
        events: Arc<dyn EventService>,
        reference_events: Arc<dyn ReferenceEventService>,
        payments: Arc<dyn PaymentService>,
        features: Arc<dyn FeatureService>,
        sm_seats: Arc<dyn SmSeatsQuery>,
        ledger: Arc<EntitlementLedger>,
        lifecycle: Arc<MembershipLifecycle>,
        logger: OrgLogger,
    ) -> Self {
        Self {
            orgs,
            memberships,
            users,
            mail,
            events,
            reference_events,
            payments,
            features,
            sm_seats,
            ledger,
            lifecycle,
            logger,
        }
    }

    // ── Invitation saga ─────────────────────────────────────────

    /// Invites a batch of people. All authorization and seat math happens
    /// before any write; after seats are confirmed every subsequent failure
    /// triggers compensation.
    pub async fn invite_users(
        &self,
        organization_id: &str,
        ctx: &RequestContext,
        invites: &[InviteRequest],
    ) -> Result<Vec<Membership>> {
        if invites.iter().all(|i| i.emails.is_empty()) {
            return Err(OrgError::validation("No users to invite."));
        }

        let org = self.get_organization(organization_id).await?;
        let caps = OrganizationCapabilities::resolve(&org, self.features.as_ref());

        // Authorization pass over the whole batch; the first denial aborts
        // everything before any write.
        let mut accesses: Vec<ResolvedAccess> = Vec::with_capacity(invites.len());
        for invite in invites {
            authorize_role_change(
                ctx,
                caps,
                &RoleAssignment {
                    role: invite.role,
                    permissions: invite.permissions.as_ref(),
                    access_all: invite.access_all,
                },
            )?;
            accesses.push(resolve_access(caps, AccessSource::Invite(&invite.collections))?);
        }

        self.check_free_admin_invites(&org, invites).await?;

        let existing = self
            .memberships
            .get_many_by_organization(organization_id, None)
            .await?;
        let existing_by_email: HashMap<String, &Membership> = existing
            .iter()
            .filter_map(|m| m.email.as_ref().map(|e| (e.to_lowercase(), m)))
            .collect();

        let prepared = self.prepare_invites(&org, invites, &accesses, &existing_by_email);
        let new_count = prepared.iter().filter(|p| !p.is_reinvite).count() as u32;

        // Seat math: Password Manager autoscale for new rows beyond the
        // current seat count, Secrets Manager seats for sm-enabled invites.
        let seats_needed = match org.seats {
            Some(seats) => {
                // Revoked rows do not hold a seat.
                let occupied = existing
                    .iter()
                    .filter(|m| m.status != MembershipStatus::Revoked)
                    .count() as u32;
                (occupied + new_count).saturating_sub(seats)
            }
            None => 0,
        };
        if seats_needed > 0 {
            if let Err(reason) = self.ledger.can_scale(&org, seats_needed).await? {
                return Err(OrgError::PlanLimitExceeded(reason));
            }
        }

        let sm_invites = prepared
            .iter()
            .filter(|p| !p.is_reinvite && p.membership.access_secrets_manager)
            .count() as u32;
        let sm_seats_needed = if sm_invites > 0 {
            self.sm_seats
                .count_new_sm_seats_required(organization_id, sm_invites)
                .await?
        } else {
            0
        };

        let mut reservation =
            self.ledger
                .reserve_seats(&org, seats_needed as i64, sm_seats_needed as i64, 0)?;
        let mut org = org;
        self.ledger
            .confirm_reservation(&mut org, &mut reservation)
            .await?;

        let mut created_ids: Vec<String> = Vec::new();
        match self
            .commit_invites(&org, ctx, prepared, &mut created_ids)
            .await
        {
            Ok(memberships) => {
                self.logger.info(&format!(
                    "invited {} member(s) to organization {}",
                    memberships.len(),
                    org.id
                ));
                Ok(memberships)
            }
            Err(err) => {
                let seats_were_confirmed = reservation.is_committed();
                let compensation = self
                    .compensate(&mut org, &mut reservation, &created_ids)
                    .await;
                self.logger.error(&format!(
                    "invite batch for organization {} failed: {err} ({compensation})",
                    org.id
                ));
                if seats_were_confirmed || !created_ids.is_empty() {
                    Err(OrgError::Compensated {
                        source: Box::new(err),
                        compensation,
                    })
                } else {
                    Err(err)
                }
            }
        }
    }

    fn prepare_invites(
        &self,
        org: &Organization,
        invites: &[InviteRequest],
        accesses: &[ResolvedAccess],
        existing_by_email: &HashMap<String, &Membership>,
    ) -> Vec<PreparedInvite> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut prepared = Vec::new();
        for (invite, access) in invites.iter().zip(accesses) {
            for email in &invite.emails {
                let normalized = email.to_lowercase();
                if !seen.insert(normalized.clone()) {
                    continue;
                }
                if let Some(existing) = existing_by_email.get(&normalized) {
                    let mut membership = (*existing).clone();
                    membership.role = invite.role;
                    membership.permissions = invite.permissions.clone();
                    membership.access_secrets_manager = invite.access_secrets_manager;
                    membership.access_all = invite.access_all;
                    membership.external_id = invite.external_id.clone();
                    prepared.push(PreparedInvite {
                        membership,
                        grants: Vec::new(),
                        is_reinvite: true,
                    });
                } else {
                    let id = generate_id();
                    let grants = access.clone().into_grants(&id);
                    prepared.push(PreparedInvite {
                        membership: Membership {
                            id,
                            organization_id: org.id.clone(),
                            user_id: None,
                            email: Some(email.clone()),
                            role: invite.role,
                            status: MembershipStatus::Invited,
                            permissions: invite.permissions.clone(),
                            access_secrets_manager: invite.access_secrets_manager,
                            access_all: invite.access_all,
                            external_id: invite.external_id.clone(),
                            created_at: Utc::now(),
                        },
                        grants,
                        is_reinvite: false,
                    });
                }
            }
        }
        prepared
    }

    /// Free organizations allow a person to administer at most one of them;
    /// the check runs at invite time for addresses that already hold an
    /// account.
    async fn check_free_admin_invites(
        &self,
        org: &Organization,
        invites: &[InviteRequest],
    ) -> Result<()> {
        if !org.is_free() {
            return Ok(());
        }
        let admin_emails: Vec<String> = invites
            .iter()
            .filter(|i| i.role.is_admin_or_owner())
            .flat_map(|i| i.emails.iter().cloned())
            .collect();
        if admin_emails.is_empty() {
            return Ok(());
        }
        let matched = self.users.get_many_by_emails(&admin_emails).await?;
        for user in matched {
            let count = self
                .memberships
                .count_by_free_organization_admin(&user.id)
                .await?;
            if count > 0 {
                return Err(OrgError::PlanLimitExceeded(
                    "User can only be an admin of one free organization.".into(),
                ));
            }
        }
        Ok(())
    }

    /// The write phase of the saga. Ids of rows created here are pushed into
    /// `created_ids` as soon as they exist, so the caller knows exactly what
    /// to take back down when a later step fails.
    async fn commit_invites(
        &self,
        org: &Organization,
        ctx: &RequestContext,
        prepared: Vec<PreparedInvite>,
        created_ids: &mut Vec<String>,
    ) -> Result<Vec<Membership>> {
        let mut new_rows = Vec::new();
        let mut new_grants = Vec::new();
        let mut reinvite_rows = Vec::new();
        for p in prepared {
            if p.is_reinvite {
                reinvite_rows.push(p.membership);
            } else {
                new_rows.push(p.membership);
                new_grants.extend(p.grants);
            }
        }

        if !new_rows.is_empty() {
            let ids = self.memberships.create_many(&new_rows, &new_grants).await?;
            created_ids.extend(ids);
        }
        if !reinvite_rows.is_empty() {
            self.memberships.upsert_many(&reinvite_rows).await?;
        }

        let expires_at = Utc::now() + Duration::days(INVITE_TOKEN_LIFETIME_DAYS);
        let token_pairs: Vec<MembershipTokenPair> = new_rows
            .iter()
            .chain(reinvite_rows.iter())
            .map(|m| MembershipTokenPair {
                membership: m.clone(),
                token: generate_id_with_length(32),
                expires_at,
            })
            .collect();
        self.mail
            .send_organization_invite_emails(&OrganizationInviteInfo {
                token_pairs,
                is_free_org: org.is_free(),
                organization_name: org.name.clone(),
            })
            .await?;

        if !new_rows.is_empty() {
            let events: Vec<MembershipEvent> = new_rows
                .iter()
                .map(|m| MembershipEvent {
                    membership: m.clone(),
                    event_type: EventType::MembershipInvited,
                    actor: ctx.actor.clone(),
                    occurred_at: Some(Utc::now()),
                })
                .collect();
            self.events.log_membership_events(&events).await?;
            self.reference_events
                .raise_event(&ReferenceEvent::InvitedUsers {
                    organization_id: org.id.clone(),
                    users: new_rows.len() as u32,
                })
                .await?;
        }

        new_rows.extend(reinvite_rows);
        Ok(new_rows)
    }

    /// Takes down the rows the failed batch created, then reverts the seat
    /// reservation. Row deletion runs first so a revert failure never leaves
    /// orphaned invited rows behind.
    async fn compensate(
        &self,
        org: &mut Organization,
        reservation: &mut SeatReservation,
        created_ids: &[String],
    ) -> CompensationOutcome {
        if !created_ids.is_empty() {
            if let Err(err) = self.memberships.delete_many(created_ids).await {
                return CompensationOutcome::Failed(format!(
                    "failed to delete created memberships: {err}"
                ));
            }
        }
        match self.ledger.revert_reservation(org, reservation).await {
            Ok(()) => CompensationOutcome::Reverted,
            Err(err) => {
                CompensationOutcome::Failed(format!("failed to revert seat reservation: {err}"))
            }
        }
    }

    // ── Organization lifecycle ──────────────────────────────────

    /// Creates a new organization with its initial Confirmed Owner.
    pub async fn sign_up(
        &self,
        signup: &OrganizationSignup,
    ) -> Result<(Organization, Membership)> {
        let plan = Plan::for_tier(signup.plan);

        if signup.provider_managed && signup.use_secrets_manager {
            return Err(OrgError::validation(
                "Organizations with a Managed Service Provider do not support Secrets Manager.",
            ));
        }
        validate_secrets_manager_signup(plan, signup)?;
        if plan.tier == PlanTier::Free {
            let admin_count = self
                .memberships
                .count_by_free_organization_admin(&signup.owner_user_id)
                .await?;
            if admin_count > 0 {
                return Err(OrgError::PlanLimitExceeded(
                    "You can only be an admin of one free organization.".into(),
                ));
            }
        }

        let flexible = self.features.is_enabled(flags::FLEXIBLE_COLLECTIONS_SIGNUP);
        let org = Organization {
            id: generate_id(),
            name: signup.name.clone(),
            plan: signup.plan,
            seats: Some(plan.base_seats + signup.additional_seats),
            max_autoscale_seats: None,
            use_secrets_manager: signup.use_secrets_manager,
            sm_seats: signup
                .use_secrets_manager
                .then(|| plan.base_sm_seats + signup.additional_sm_seats as u32),
            sm_service_accounts: signup.use_secrets_manager.then(|| {
                plan.base_service_accounts + signup.additional_service_accounts as u32
            }),
            max_autoscale_sm_seats: None,
            use_custom_permissions: plan.tier == PlanTier::Enterprise,
            flexible_collections: flexible,
            use_key_connector: false,
            default_collection_id: flexible.then(generate_id),
            public_key: None,
            private_key: None,
            created_at: Utc::now(),
        };

        if !org.is_free() {
            self.payments.purchase_organization(&org, signup).await?;
        }
        self.orgs.create(&org).await?;

        let caps = OrganizationCapabilities::resolve(&org, self.features.as_ref());
        let access = resolve_access(
            caps,
            AccessSource::InitialOwnerSignup {
                default_collection_id: org.default_collection_id.as_deref(),
            },
        )?;
        let membership_id = generate_id();
        let grants = access.clone().into_grants(&membership_id);
        let owner = Membership {
            id: membership_id,
            organization_id: org.id.clone(),
            user_id: Some(signup.owner_user_id.clone()),
            email: None,
            role: MembershipRole::Owner,
            status: MembershipStatus::Confirmed,
            permissions: None,
            access_secrets_manager: signup.use_secrets_manager,
            access_all: access.access_all,
            external_id: None,
            created_at: Utc::now(),
        };
        self.memberships.create(&owner, &grants).await?;

        self.reference_events
            .raise_event(&ReferenceEvent::Signup {
                organization_id: org.id.clone(),
                plan_name: plan.name.to_string(),
                seats: org.seats,
            })
            .await?;
        self.logger.info(&format!(
            "organization {} signed up on the {} plan",
            org.id, plan.name
        ));
        Ok((org, owner))
    }

    pub async fn delete_organization(&self, organization_id: &str) -> Result<()> {
        let org = self.get_organization(organization_id).await?;
        if org.use_key_connector {
            return Err(OrgError::validation(
                "You cannot delete an Organization that is using Key Connector.",
            ));
        }
        self.orgs.delete(organization_id).await?;
        self.logger
            .warn(&format!("organization {organization_id} deleted"));
        Ok(())
    }

    /// Stores the organization key pair. Keys are write-once.
    pub async fn update_organization_keys(
        &self,
        organization_id: &str,
        ctx: &RequestContext,
        public_key: String,
        private_key: String,
    ) -> Result<Organization> {
        if !ctx.can_manage_reset_password() {
            return Err(OrgError::denied(
                "your account does not have permission to manage this organization's keys.",
            ));
        }
        let mut org = self.get_organization(organization_id).await?;
        if org.public_key.is_some() && org.private_key.is_some() {
            return Err(OrgError::validation("Organization Keys already exist"));
        }
        org.public_key = Some(public_key);
        org.private_key = Some(private_key);
        self.orgs.replace(&org).await?;
        Ok(org)
    }

    // ── Member edits ────────────────────────────────────────────

    /// Changes an existing member's role/permission shape. Demoting the last
    /// confirmed owner is refused.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_user(
        &self,
        organization_id: &str,
        membership_id: &str,
        ctx: &RequestContext,
        role: MembershipRole,
        permissions: Option<CustomPermissions>,
        access_all: bool,
        collections: &[CollectionAccessSelection],
    ) -> Result<Membership> {
        let org = self.get_organization(organization_id).await?;
        let caps = OrganizationCapabilities::resolve(&org, self.features.as_ref());
        let mut membership = self
            .memberships
            .get_by_id(membership_id)
            .await?
            .filter(|m| m.organization_id == organization_id)
            .ok_or_else(|| OrgError::validation("User not valid."))?;

        authorize_role_change(
            ctx,
            caps,
            &RoleAssignment {
                role,
                permissions: permissions.as_ref(),
                access_all,
            },
        )?;
        let access = resolve_access(caps, AccessSource::Invite(collections))?;

        let demoting_owner =
            membership.role == MembershipRole::Owner && role != MembershipRole::Owner;
        if demoting_owner
            && !self
                .lifecycle
                .has_confirmed_owners_except(organization_id, &[membership_id.to_string()])
                .await?
        {
            return Err(OrgError::invariant(
                "Organization must have at least one confirmed owner.",
            ));
        }

        membership.role = role;
        membership.permissions = permissions;
        membership.access_all = access_all;
        let grants = access.into_grants(membership_id);
        self.memberships.replace(&membership, &grants).await?;
        Ok(membership)
    }

    async fn get_organization(&self, organization_id: &str) -> Result<Organization> {
        self.orgs
            .get_by_id(organization_id)
            .await?
            .ok_or_else(|| OrgError::NotFound("organization".into()))
    }
}
