// Entitlement ledger: seat and machine-account accounting against the
// organization's plan, with an explicit reserve/confirm/revert protocol so
// the invitation saga can compensate billing side effects.

use std::sync::Arc;

use vaultorg_core::{OrgError, OrgLogger, Result};

use crate::repository::{
    OrganizationRepository, PaymentService, ProviderRepository, SecretsManagerSubscriptionUpdate,
};
use crate::types::{Organization, OrganizationSignup, Plan, ProviderType};

/// Deployment-level knobs the ledger consults.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreSettings {
    pub self_hosted: bool,
}

/// A pending seat adjustment. Nothing is billed or persisted until
/// [`EntitlementLedger::confirm_reservation`] runs; after confirmation the
/// reservation remembers the pre-adjustment counters so
/// [`EntitlementLedger::revert_reservation`] can restore them.
#[derive(Debug, Clone, PartialEq)]
pub struct SeatReservation {
    pub organization_id: String,
    pub seats_delta: u32,
    pub sm_seats_delta: u32,
    pub service_accounts_delta: u32,
    previous_seats: Option<u32>,
    previous_sm_seats: Option<u32>,
    previous_sm_service_accounts: Option<u32>,
    committed: bool,
}

impl SeatReservation {
    pub fn is_noop(&self) -> bool {
        self.seats_delta == 0 && self.sm_seats_delta == 0 && self.service_accounts_delta == 0
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

/// Owns all seat math. Collaborators are injected so tests can record the
/// exact call order of reserve, confirm, and revert.
pub struct EntitlementLedger {
    orgs: Arc<dyn OrganizationRepository>,
    payments: Arc<dyn PaymentService>,
    providers: Arc<dyn ProviderRepository>,
    settings: CoreSettings,
    logger: OrgLogger,
}

impl EntitlementLedger {
    pub fn new(
        orgs: Arc<dyn OrganizationRepository>,
        payments: Arc<dyn PaymentService>,
        providers: Arc<dyn ProviderRepository>,
        settings: CoreSettings,
        logger: OrgLogger,
    ) -> Self {
        Self {
            orgs,
            payments,
            providers,
            settings,
            logger,
        }
    }

    // ── Secrets Manager seat protocol ───────────────────────────

    /// Validates a seat/machine-account adjustment against the plan without
    /// touching billing or storage. Seats can only grow through this path.
    pub fn reserve_seats(
        &self,
        org: &Organization,
        seats_delta: i64,
        sm_seats_delta: i64,
        service_accounts_delta: i64,
    ) -> Result<SeatReservation> {
        if seats_delta < 0 {
            return Err(OrgError::NegativeAdjustmentNotAllowed(
                "You can't subtract Password Manager seats!".into(),
            ));
        }
        if sm_seats_delta < 0 {
            return Err(OrgError::NegativeAdjustmentNotAllowed(
                "You can't subtract Secrets Manager seats!".into(),
            ));
        }
        if service_accounts_delta < 0 {
            return Err(OrgError::NegativeAdjustmentNotAllowed(
                "You can't subtract Machine Accounts!".into(),
            ));
        }
        if (sm_seats_delta > 0 || service_accounts_delta > 0) && !org.use_secrets_manager {
            return Err(OrgError::validation(
                "Organization has no access to Secrets Manager.",
            ));
        }

        let plan = org.plan();
        if seats_delta > 0 && !plan.allows_additional_seats {
            return Err(OrgError::PlanLimitExceeded(
                "Plan does not allow additional users.".into(),
            ));
        }
        if sm_seats_delta > 0 && !plan.allows_additional_seats {
            return Err(OrgError::PlanLimitExceeded(
                "Plan does not allow additional Secrets Manager seats.".into(),
            ));
        }
        if service_accounts_delta > 0 && !plan.allows_additional_service_accounts {
            return Err(OrgError::PlanLimitExceeded(
                "Plan does not allow additional Machine Accounts.".into(),
            ));
        }

        let seats_delta = seats_delta as u32;
        let sm_seats_delta = sm_seats_delta as u32;
        let service_accounts_delta = service_accounts_delta as u32;

        if let (Some(sm_seats), Some(pm_seats)) = (org.sm_seats, org.seats) {
            if sm_seats + sm_seats_delta > pm_seats + seats_delta {
                return Err(OrgError::SmSeatsExceedPasswordManagerSeats(
                    "You cannot have more Secrets Manager seats than Password Manager seats."
                        .into(),
                ));
            }
        }

        if let (Some(current), Some(max)) = (org.sm_seats, org.max_autoscale_sm_seats) {
            if current + sm_seats_delta > max {
                return Err(OrgError::PlanLimitExceeded(
                    "Secrets Manager seat limit has been reached.".into(),
                ));
            }
        }

        Ok(SeatReservation {
            organization_id: org.id.clone(),
            seats_delta,
            sm_seats_delta,
            service_accounts_delta,
            previous_seats: org.seats,
            previous_sm_seats: org.sm_seats,
            previous_sm_service_accounts: org.sm_service_accounts,
            committed: false,
        })
    }

    /// Applies a reservation: bills the new totals, then persists them on the
    /// organization. Idempotent; confirming twice is a single adjustment.
    pub async fn confirm_reservation(
        &self,
        org: &mut Organization,
        reservation: &mut SeatReservation,
    ) -> Result<()> {
        if reservation.committed || reservation.is_noop() {
            return Ok(());
        }
        if reservation.organization_id != org.id {
            return Err(OrgError::invariant(
                "Seat reservation does not belong to this organization.",
            ));
        }

        let target_seats = reservation.previous_seats.map(|s| s + reservation.seats_delta);
        let target_sm_seats = reservation
            .previous_sm_seats
            .map(|s| s + reservation.sm_seats_delta);
        let target_service_accounts = reservation
            .previous_sm_service_accounts
            .map(|s| s + reservation.service_accounts_delta);

        if reservation.sm_seats_delta > 0 || reservation.service_accounts_delta > 0 {
            self.payments
                .update_secrets_manager_subscription(&SecretsManagerSubscriptionUpdate {
                    organization_id: org.id.clone(),
                    sm_seats: target_sm_seats,
                    sm_seats_changed: reservation.sm_seats_delta > 0,
                    sm_service_accounts: target_service_accounts,
                    sm_service_accounts_changed: reservation.service_accounts_delta > 0,
                    max_autoscale_sm_seats_changed: false,
                })
                .await?;
        }

        org.seats = target_seats;
        org.sm_seats = target_sm_seats;
        org.sm_service_accounts = target_service_accounts;
        self.orgs.replace(org).await?;
        reservation.committed = true;

        self.logger.info(&format!(
            "confirmed seat reservation for organization {} (+{} seats, +{} sm seats, +{} machine accounts)",
            org.id,
            reservation.seats_delta,
            reservation.sm_seats_delta,
            reservation.service_accounts_delta
        ));
        Ok(())
    }

    /// Restores the pre-reservation counters. A reservation that was never
    /// confirmed left no side effects, so reverting it is a no-op.
    pub async fn revert_reservation(
        &self,
        org: &mut Organization,
        reservation: &mut SeatReservation,
    ) -> Result<()> {
        if !reservation.committed {
            return Ok(());
        }

        if reservation.sm_seats_delta > 0 || reservation.service_accounts_delta > 0 {
            self.payments
                .update_secrets_manager_subscription(&SecretsManagerSubscriptionUpdate {
                    organization_id: org.id.clone(),
                    sm_seats: reservation.previous_sm_seats,
                    sm_seats_changed: reservation.sm_seats_delta > 0,
                    sm_service_accounts: reservation.previous_sm_service_accounts,
                    sm_service_accounts_changed: reservation.service_accounts_delta > 0,
                    max_autoscale_sm_seats_changed: false,
                })
                .await?;
        }

        org.seats = reservation.previous_seats;
        org.sm_seats = reservation.previous_sm_seats;
        org.sm_service_accounts = reservation.previous_sm_service_accounts;
        self.orgs.replace(org).await?;
        reservation.committed = false;

        self.logger.warn(&format!(
            "reverted seat reservation for organization {}",
            org.id
        ));
        Ok(())
    }

    // ── Password Manager autoscaling ────────────────────────────

    /// Whether the organization can grow by `seats_to_add` Password Manager
    /// seats through autoscaling. Returns the failure reason instead of an
    /// error so callers can fall back to "invite fails with seat message".
    pub async fn can_scale(
        &self,
        org: &Organization,
        seats_to_add: u32,
    ) -> Result<std::result::Result<(), String>> {
        if seats_to_add == 0 {
            return Ok(Ok(()));
        }
        if self.settings.self_hosted {
            return Ok(Err(
                "Cannot autoscale on self-hosted instance.".to_string()
            ));
        }

        if let Some(provider) = self.providers.get_by_organization_id(&org.id).await? {
            if provider.provider_type == ProviderType::Reseller {
                return Ok(Err(
                    "Seat limit has been reached. Contact your provider to purchase additional seats."
                        .to_string(),
                ));
            }
        }

        if let (Some(seats), Some(max)) = (org.seats, org.max_autoscale_seats) {
            if seats + seats_to_add > max {
                return Ok(Err("Seat limit has been reached.".to_string()));
            }
        }

        Ok(Ok(()))
    }

    // ── Plan validation ─────────────────────────────────────────

    /// Validates a subscription edit: seats may not autoscale past the plan,
    /// and the autoscale ceiling may not drop below occupancy.
    pub fn validate_subscription_update(
        &self,
        org: &Organization,
        max_autoscale_seats: Option<u32>,
    ) -> Result<()> {
        let plan = org.plan();
        if let Some(max) = max_autoscale_seats {
            if !plan.allows_seat_autoscale {
                return Err(OrgError::PlanLimitExceeded(
                    "Your plan does not allow seat autoscaling.".into(),
                ));
            }
            if let Some(seats) = org.seats {
                if max < seats {
                    return Err(OrgError::validation(
                        "Cannot set max seat autoscaling below seat count.",
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> CoreSettings {
        self.settings
    }
}

/// Validates the Secrets Manager portion of a signup against the chosen plan.
pub fn validate_secrets_manager_signup(plan: &Plan, signup: &OrganizationSignup) -> Result<()> {
    if !signup.use_secrets_manager {
        return Ok(());
    }
    if !plan.has_secrets_manager {
        return Err(OrgError::PlanLimitExceeded(
            "Plan does not allow Secrets Manager.".into(),
        ));
    }
    if signup.additional_sm_seats < 0 {
        return Err(OrgError::NegativeAdjustmentNotAllowed(
            "You can't subtract Secrets Manager seats!".into(),
        ));
    }
    if signup.additional_service_accounts < 0 {
        return Err(OrgError::NegativeAdjustmentNotAllowed(
            "You can't subtract Machine Accounts!".into(),
        ));
    }
    if plan.base_sm_seats == 0 && signup.additional_sm_seats == 0 {
        return Err(OrgError::validation(
            "You do not have any Secrets Manager seats!",
        ));
    }
    if signup.additional_sm_seats > 0 && !plan.allows_additional_seats {
        return Err(OrgError::PlanLimitExceeded(
            "Plan does not allow additional Secrets Manager seats.".into(),
        ));
    }
    if signup.additional_service_accounts > 0 && !plan.allows_additional_service_accounts {
        return Err(OrgError::PlanLimitExceeded(
            "Plan does not allow additional Machine Accounts.".into(),
        ));
    }
    let pm_seats = plan.base_seats as i64 + signup.additional_seats as i64;
    let sm_seats = plan.base_sm_seats as i64 + signup.additional_sm_seats;
    if sm_seats > pm_seats {
        return Err(OrgError::SmSeatsExceedPasswordManagerSeats(
            "You cannot have more Secrets Manager seats than Password Manager seats.".into(),
        ));
    }
    Ok(())
}
