// Membership state machine: confirm, remove, revoke, and restore transitions
// with their guard rails (last confirmed owner, free-plan admin cap,
// single-organization and two-step-login policies).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use vaultorg_core::{OrgError, OrgLogger, Result};

use crate::context::RequestContext;
use crate::repository::{
    EventService, MailService, MembershipEvent, MembershipRepository, OrganizationRepository,
    PolicyRepository, ProviderRepository, UserRepository,
};
use crate::types::{
    EventType, Membership, MembershipRole, MembershipStatus, Organization, PolicyType,
};

/// Per-member outcome of a bulk transition. `error` is the user-facing
/// message for that member, `None` on success.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberOutcome {
    pub membership_id: String,
    pub error: Option<String>,
}

impl MemberOutcome {
    fn ok(id: &str) -> Self {
        Self {
            membership_id: id.to_string(),
            error: None,
        }
    }

    fn failed(id: &str, message: impl Into<String>) -> Self {
        Self {
            membership_id: id.to_string(),
            error: Some(message.into()),
        }
    }
}

pub struct MembershipLifecycle {
    orgs: Arc<dyn OrganizationRepository>,
    memberships: Arc<dyn MembershipRepository>,
    policies: Arc<dyn PolicyRepository>,
    providers: Arc<dyn ProviderRepository>,
    users: Arc<dyn UserRepository>,
    mail: Arc<dyn MailService>,
    events: Arc<dyn EventService>,
    logger: OrgLogger,
}

impl MembershipLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orgs: Arc<dyn OrganizationRepository>,
        memberships: Arc<dyn MembershipRepository>,
        policies: Arc<dyn PolicyRepository>,
        providers: Arc<dyn ProviderRepository>,
        users: Arc<dyn UserRepository>,
        mail: Arc<dyn MailService>,
        events: Arc<dyn EventService>,
        logger: OrgLogger,
    ) -> Self {
        Self {
            orgs,
            memberships,
            policies,
            providers,
            users,
            mail,
            events,
            logger,
        }
    }

    // ── Confirm ─────────────────────────────────────────────────

    /// Confirms a single accepted member. A failure here is the per-member
    /// message from the bulk path, surfaced as an error.
    pub async fn confirm_user(
        &self,
        organization_id: &str,
        membership_id: &str,
        ctx: &RequestContext,
    ) -> Result<Membership> {
        let outcomes = match self
            .confirm_users(organization_id, &[membership_id.to_string()], ctx)
            .await
        {
            Ok(outcomes) => outcomes,
            Err(OrgError::Validation(msg)) if msg == "Users invalid." => {
                return Err(OrgError::validation("User not valid."));
            }
            Err(err) => return Err(err),
        };
        match outcomes.into_iter().next() {
            Some((membership, None)) => Ok(membership),
            Some((_, Some(message))) => Err(OrgError::validation(message)),
            None => Err(OrgError::validation("User not valid.")),
        }
    }

    /// Confirms a batch of accepted members. Members that fail validation
    /// get a per-member message; the members that pass are persisted in one
    /// write, mailed, and logged. Errors out only when no id resolves to a
    /// confirmable member of this organization.
    pub async fn confirm_users(
        &self,
        organization_id: &str,
        membership_ids: &[String],
        ctx: &RequestContext,
    ) -> Result<Vec<(Membership, Option<String>)>> {
        let org = self.get_organization(organization_id).await?;
        let candidates: Vec<Membership> = self
            .memberships
            .get_many(membership_ids)
            .await?
            .into_iter()
            .filter(|m| {
                m.status == MembershipStatus::Accepted && m.organization_id == organization_id
            })
            .collect();
        if candidates.is_empty() {
            return Err(OrgError::validation("Users invalid."));
        }

        let org_policies = self
            .policies
            .get_many_by_organization_id(organization_id)
            .await?;
        let single_org_enabled = org_policies
            .iter()
            .any(|p| p.policy_type == PolicyType::SingleOrganization && p.enabled);
        let two_factor_required = org_policies
            .iter()
            .any(|p| p.policy_type == PolicyType::TwoFactorAuthentication && p.enabled);

        let user_ids: Vec<String> = candidates.iter().filter_map(|m| m.user_id.clone()).collect();
        let users = self.users.get_many(&user_ids).await?;
        let all_memberships = self.memberships.get_many_by_many_users(&user_ids).await?;

        let mut outcomes = Vec::with_capacity(candidates.len());
        let mut confirmed = Vec::new();
        for membership in candidates {
            match self
                .validate_confirmation(
                    &org,
                    &membership,
                    &users,
                    &all_memberships,
                    single_org_enabled,
                    two_factor_required,
                )
                .await
            {
                Ok(()) => {
                    let mut m = membership.clone();
                    m.status = MembershipStatus::Confirmed;
                    m.email = None;
                    confirmed.push(m.clone());
                    outcomes.push((m, None));
                }
                Err(err) => {
                    self.logger.debug(&format!(
                        "confirmation rejected for membership {}: {err}",
                        membership.id
                    ));
                    outcomes.push((membership, Some(err.user_message())));
                }
            }
        }

        if !confirmed.is_empty() {
            self.memberships.replace_many(&confirmed).await?;
            for m in &confirmed {
                if let Some(user) = users.iter().find(|u| Some(&u.id) == m.user_id.as_ref()) {
                    self.mail
                        .send_organization_confirmed_email(&org.name, &user.email)
                        .await?;
                }
            }
            let events: Vec<MembershipEvent> = confirmed
                .iter()
                .map(|m| MembershipEvent {
                    membership: m.clone(),
                    event_type: EventType::MembershipConfirmed,
                    actor: ctx.actor.clone(),
                    occurred_at: Some(Utc::now()),
                })
                .collect();
            self.events.log_membership_events(&events).await?;
        }

        Ok(outcomes)
    }

    async fn validate_confirmation(
        &self,
        org: &Organization,
        membership: &Membership,
        users: &[crate::types::VaultUser],
        all_memberships: &[Membership],
        single_org_enabled: bool,
        two_factor_required: bool,
    ) -> Result<()> {
        let user_id = membership
            .user_id
            .as_deref()
            .ok_or_else(|| OrgError::validation("User not valid."))?;

        if org.is_free() && membership.role.is_admin_or_owner() {
            let admin_count = self
                .memberships
                .count_by_free_organization_admin(user_id)
                .await?;
            if admin_count > 0 {
                return Err(OrgError::validation(
                    "User can only be an admin of one free organization.",
                ));
            }
        }

        if single_org_enabled {
            let elsewhere = all_memberships.iter().any(|m| {
                m.user_id.as_deref() == Some(user_id)
                    && m.organization_id != org.id
                    && m.status != MembershipStatus::Invited
            });
            if elsewhere {
                return Err(OrgError::validation(
                    "User is a member of another organization.",
                ));
            }
        }

        if two_factor_required {
            let has_two_factor = users
                .iter()
                .find(|u| u.id == user_id)
                .map(|u| u.two_factor_enabled)
                .unwrap_or(false);
            if !has_two_factor {
                return Err(OrgError::validation(
                    "User does not have two-step login enabled.",
                ));
            }
        }

        Ok(())
    }

    // ── Remove ──────────────────────────────────────────────────

    pub async fn delete_user(
        &self,
        organization_id: &str,
        membership_id: &str,
        ctx: &RequestContext,
    ) -> Result<()> {
        let membership = self.get_membership(organization_id, membership_id).await?;

        if membership.user_id.is_some() && membership.user_id.as_deref() == ctx.actor.user_id() {
            return Err(OrgError::validation("You cannot remove yourself."));
        }
        if membership.role == MembershipRole::Owner && !ctx.is_owner() {
            return Err(OrgError::denied("Only owners can delete other owners."));
        }
        if !self
            .has_confirmed_owners_except(organization_id, &[membership_id.to_string()])
            .await?
        {
            return Err(OrgError::invariant(
                "Organization must have at least one confirmed owner.",
            ));
        }

        self.memberships
            .delete_many(&[membership_id.to_string()])
            .await?;
        self.events
            .log_membership_event(MembershipEvent {
                membership,
                event_type: EventType::MembershipRemoved,
                actor: ctx.actor.clone(),
                occurred_at: Some(Utc::now()),
            })
            .await?;
        Ok(())
    }

    /// Removes a batch of members. The last-owner invariant is checked once
    /// against the whole batch before any per-member work.
    pub async fn delete_users(
        &self,
        organization_id: &str,
        membership_ids: &[String],
        ctx: &RequestContext,
    ) -> Result<Vec<MemberOutcome>> {
        let found = self.memberships.get_many(membership_ids).await?;
        let in_org: Vec<Membership> = found
            .into_iter()
            .filter(|m| m.organization_id == organization_id)
            .collect();
        if in_org.is_empty() {
            return Err(OrgError::validation("Users invalid."));
        }

        if !self
            .has_confirmed_owners_except(organization_id, membership_ids)
            .await?
        {
            return Err(OrgError::invariant(
                "Organization must have at least one confirmed owner.",
            ));
        }

        let known: HashSet<&str> = in_org.iter().map(|m| m.id.as_str()).collect();
        let mut outcomes = Vec::with_capacity(membership_ids.len());
        let mut deletable = Vec::new();
        for id in membership_ids {
            if !known.contains(id.as_str()) {
                outcomes.push(MemberOutcome::failed(id, "User not valid."));
                continue;
            }
            // known ids always resolve here
            let membership = match in_org.iter().find(|m| &m.id == id) {
                Some(m) => m.clone(),
                None => continue,
            };
            if membership.user_id.is_some()
                && membership.user_id.as_deref() == ctx.actor.user_id()
            {
                outcomes.push(MemberOutcome::failed(id, "You cannot remove yourself."));
                continue;
            }
            if membership.role == MembershipRole::Owner && !ctx.is_owner() {
                outcomes.push(MemberOutcome::failed(
                    id,
                    "Only owners can delete other owners.",
                ));
                continue;
            }
            deletable.push(membership);
            outcomes.push(MemberOutcome::ok(id));
        }

        if !deletable.is_empty() {
            let ids: Vec<String> = deletable.iter().map(|m| m.id.clone()).collect();
            self.memberships.delete_many(&ids).await?;
            let events: Vec<MembershipEvent> = deletable
                .into_iter()
                .map(|membership| MembershipEvent {
                    membership,
                    event_type: EventType::MembershipRemoved,
                    actor: ctx.actor.clone(),
                    occurred_at: Some(Utc::now()),
                })
                .collect();
            self.events.log_membership_events(&events).await?;
        }

        Ok(outcomes)
    }

    // ── Revoke & restore ────────────────────────────────────────

    pub async fn revoke_user(
        &self,
        organization_id: &str,
        membership_id: &str,
        ctx: &RequestContext,
    ) -> Result<()> {
        let mut membership = self.get_membership(organization_id, membership_id).await?;

        if membership.status == MembershipStatus::Revoked {
            return Err(OrgError::validation("Already revoked."));
        }
        if membership.user_id.is_some() && membership.user_id.as_deref() == ctx.actor.user_id() {
            return Err(OrgError::validation("You cannot revoke yourself."));
        }
        if membership.role == MembershipRole::Owner && !ctx.is_owner() {
            return Err(OrgError::denied("Only owners can revoke other owners."));
        }
        if !self
            .has_confirmed_owners_except(organization_id, &[membership_id.to_string()])
            .await?
        {
            return Err(OrgError::invariant(
                "Organization must have at least one confirmed owner.",
            ));
        }

        self.memberships.revoke(membership_id).await?;
        membership.status = MembershipStatus::Revoked;
        self.events
            .log_membership_event(MembershipEvent {
                membership,
                event_type: EventType::MembershipRevoked,
                actor: ctx.actor.clone(),
                occurred_at: Some(Utc::now()),
            })
            .await?;
        Ok(())
    }

    /// Restores a revoked member. Restore always re-enters at `Invited`;
    /// the person accepts again before they can be confirmed.
    pub async fn restore_user(
        &self,
        organization_id: &str,
        membership_id: &str,
        ctx: &RequestContext,
    ) -> Result<()> {
        let mut membership = self.get_membership(organization_id, membership_id).await?;

        if membership.status != MembershipStatus::Revoked {
            return Err(OrgError::validation("Already active."));
        }
        if membership.user_id.is_some() && membership.user_id.as_deref() == ctx.actor.user_id() {
            return Err(OrgError::validation("You cannot restore yourself."));
        }
        if membership.role == MembershipRole::Owner && !ctx.is_owner() {
            return Err(OrgError::denied("Only owners can restore other owners."));
        }

        self.memberships
            .restore(membership_id, MembershipStatus::Invited)
            .await?;
        membership.status = MembershipStatus::Invited;
        self.events
            .log_membership_event(MembershipEvent {
                membership,
                event_type: EventType::MembershipRestored,
                actor: ctx.actor.clone(),
                occurred_at: Some(Utc::now()),
            })
            .await?;
        Ok(())
    }

    // ── Shared guards ───────────────────────────────────────────

    /// True when the organization keeps at least one confirmed owner after
    /// excluding the given memberships. Confirmed provider users satisfy the
    /// invariant for provider-managed organizations.
    pub async fn has_confirmed_owners_except(
        &self,
        organization_id: &str,
        excluded_membership_ids: &[String],
    ) -> Result<bool> {
        let owners = self
            .memberships
            .get_many_by_organization(organization_id, Some(MembershipRole::Owner))
            .await?;
        let excluded: HashSet<&str> = excluded_membership_ids
            .iter()
            .map(String::as_str)
            .collect();
        let remaining = owners.iter().any(|m| {
            m.status == MembershipStatus::Confirmed && !excluded.contains(m.id.as_str())
        });
        if remaining {
            return Ok(true);
        }
        let provider_users = self
            .providers
            .count_confirmed_users_by_organization(organization_id)
            .await?;
        Ok(provider_users > 0)
    }

    async fn get_organization(&self, organization_id: &str) -> Result<Organization> {
        self.orgs
            .get_by_id(organization_id)
            .await?
            .ok_or_else(|| OrgError::NotFound("organization".into()))
    }

    async fn get_membership(
        &self,
        organization_id: &str,
        membership_id: &str,
    ) -> Result<Membership> {
        let membership = self
            .memberships
            .get_by_id(membership_id)
            .await?
            .filter(|m| m.organization_id == organization_id)
            .ok_or_else(|| OrgError::validation("User not valid."))?;
        Ok(membership)
    }
}
