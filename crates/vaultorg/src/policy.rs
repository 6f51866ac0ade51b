// Permission policy evaluator: pure rules deciding whether the acting party
// may assign a given role/permission shape to a target member.
//
// Rules are ordered; the first violation wins and is returned as an
// authorization denial. No I/O happens here.

use vaultorg_core::{OrgError, Result};

use crate::context::{OrganizationCapabilities, RequestContext};
use crate::permissions::CustomPermissions;
use crate::types::MembershipRole;

/// The role/permission shape being assigned to a target member, either on
/// invite or on a role edit.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignment<'a> {
    pub role: MembershipRole,
    pub permissions: Option<&'a CustomPermissions>,
    pub access_all: bool,
}

/// Checks whether `ctx` may grant `assignment` under `caps`.
///
/// Owners and admins hold every capability; custom users are bounded by their
/// own permission set; system actors pass every gate.
pub fn authorize_role_change(
    ctx: &RequestContext,
    caps: OrganizationCapabilities,
    assignment: &RoleAssignment<'_>,
) -> Result<()> {
    if !ctx.can_manage_users() {
        return Err(OrgError::denied(
            "your account does not have permission to manage users.",
        ));
    }

    if assignment.role == MembershipRole::Owner && !ctx.is_owner() {
        return Err(OrgError::denied(
            "only an owner can configure another owner's account.",
        ));
    }

    if assignment.role.is_admin_or_owner() && ctx.role == Some(MembershipRole::Custom) {
        return Err(OrgError::denied(
            "custom users can not manage admins or owners.",
        ));
    }

    if assignment.role == MembershipRole::Custom {
        if !caps.use_custom_permissions {
            return Err(OrgError::denied(
                "to enable custom permissions the organization must be on an enterprise plan.",
            ));
        }
        if ctx.role == Some(MembershipRole::Custom) {
            let target = assignment.permissions.cloned().unwrap_or_default();
            if !ctx.permissions.grants_all_of(&target) {
                return Err(OrgError::denied(
                    "custom users can only grant the same custom permissions that they have.",
                ));
            }
        }
    }

    if caps.flexible_collections {
        if assignment.role == MembershipRole::Manager {
            return Err(OrgError::validation(
                "manager role has been deprecated after collection enhancements. use the edit ability for collections instead.",
            ));
        }
        if assignment.access_all {
            return Err(OrgError::validation(
                "the accessall property has been deprecated by collection enhancements. assign the user to collections instead.",
            ));
        }
    }

    Ok(())
}
