// Collection access resolver: turns an access source into the concrete
// grants a membership should receive, honoring the flexible-collections
// migration state.

use vaultorg_core::{OrgError, Result};

use crate::context::OrganizationCapabilities;
use crate::types::{CollectionAccessGrant, CollectionAccessSelection};

/// Where a membership's collection access is coming from.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessSource<'a> {
    /// The founding owner of a brand-new organization. Under flexible
    /// collections they get a manage grant on the default collection;
    /// legacy organizations fall back to the blanket `access_all` flag.
    InitialOwnerSignup {
        default_collection_id: Option<&'a str>,
    },
    /// Explicit selections supplied on an invite or role edit.
    Invite(&'a [CollectionAccessSelection]),
}

/// The resolved access shape for one membership.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedAccess {
    pub access_all: bool,
    pub selections: Vec<CollectionAccessSelection>,
}

impl ResolvedAccess {
    pub fn into_grants(self, membership_id: &str) -> Vec<CollectionAccessGrant> {
        self.selections
            .into_iter()
            .map(|s| s.into_grant(membership_id))
            .collect()
    }
}

/// Resolves `source` under the organization's capability state.
///
/// Manage-level selections only exist in the flexible-collections world;
/// receiving one for a legacy organization is a caller bug surfaced as a
/// validation error.
pub fn resolve_access(
    caps: OrganizationCapabilities,
    source: AccessSource<'_>,
) -> Result<ResolvedAccess> {
    match source {
        AccessSource::InitialOwnerSignup {
            default_collection_id,
        } => {
            if caps.flexible_collections {
                let selections = default_collection_id
                    .map(|id| {
                        vec![CollectionAccessSelection {
                            collection_id: id.to_string(),
                            read_only: false,
                            hide_passwords: false,
                            manage: true,
                        }]
                    })
                    .unwrap_or_default();
                Ok(ResolvedAccess {
                    access_all: false,
                    selections,
                })
            } else {
                Ok(ResolvedAccess {
                    access_all: true,
                    selections: Vec::new(),
                })
            }
        }
        AccessSource::Invite(selections) => {
            if !caps.flexible_collections && selections.iter().any(|s| s.manage) {
                return Err(OrgError::validation(
                    "the manage property is not supported until collection enhancements are enabled for this organization.",
                ));
            }
            Ok(ResolvedAccess {
                access_all: false,
                selections: selections.to_vec(),
            })
        }
    }
}
