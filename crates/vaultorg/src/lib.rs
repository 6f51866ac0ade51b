//! # vaultorg
//!
//! Organization-membership and entitlement core for a multi-tenant secrets
//! vault: invitation orchestration with explicit compensation, seat and
//! machine-account accounting against the plan, role/permission authorization,
//! collection access resolution, and the membership lifecycle state machine.
//!
//! Storage, mail, events, billing, and feature flags are consumed through the
//! narrow async traits in [`repository`]; everything else in this crate is
//! deterministic given those collaborators.

pub mod collections;
pub mod context;
pub mod entitlements;
pub mod lifecycle;
pub mod permissions;
pub mod policy;
pub mod repository;
pub mod saga;
pub mod types;

pub use context::{Actor, OrganizationCapabilities, RequestContext, SystemActor};
pub use entitlements::{CoreSettings, EntitlementLedger, SeatReservation};
pub use lifecycle::{MemberOutcome, MembershipLifecycle};
pub use permissions::CustomPermissions;
pub use saga::OrganizationService;
pub use vaultorg_core::{OrgError, Result};
