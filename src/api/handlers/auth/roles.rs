//! Role hierarchy and the user-management policy.
//!
//! Roles form a fixed total order (lower rank = more privileged). The policy
//! tables are static: superadmins manage every role below them, admins manage
//! only the clinical roles, and nobody manages their own tier or above.
//! Self-deletion is denied independently of the tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Admin,
    Medico,
    Enfermero,
    Recepcionista,
}

/// User-management action gated by the policy. `Assign` is checked separately
/// from `Edit` when an update changes the target's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageAction {
    Create,
    Edit,
    Delete,
    Assign,
}

impl Role {
    /// Position in the hierarchy; lower is more privileged.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Superadmin => 0,
            Self::Admin => 1,
            Self::Medico => 2,
            Self::Enfermero => 3,
            Self::Recepcionista => 4,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Superadmin => "superadmin",
            Self::Admin => "admin",
            Self::Medico => "medico",
            Self::Enfermero => "enfermero",
            Self::Recepcionista => "recepcionista",
        }
    }

    /// Roles whose accounts this role may create, edit or delete.
    #[must_use]
    pub const fn managed_roles(self) -> &'static [Self] {
        match self {
            Self::Superadmin => &[
                Self::Admin,
                Self::Medico,
                Self::Enfermero,
                Self::Recepcionista,
            ],
            Self::Admin => &[Self::Medico, Self::Enfermero, Self::Recepcionista],
            Self::Medico | Self::Enfermero | Self::Recepcionista => &[],
        }
    }

    /// Roles this role may assign to a managed account.
    #[must_use]
    pub const fn assignable_roles(self) -> &'static [Self] {
        // Same sets as management today; kept separate because the policy
        // checks them independently.
        self.managed_roles()
    }

    /// Whether this role may perform `action` on an account holding `target`.
    #[must_use]
    pub fn can_manage(self, target: Self, action: ManageAction) -> bool {
        let allowed = match action {
            ManageAction::Assign => self.assignable_roles(),
            ManageAction::Create | ManageAction::Edit | ManageAction::Delete => {
                self.managed_roles()
            }
        };

        allowed.contains(&target)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superadmin" => Ok(Self::Superadmin),
            "admin" => Ok(Self::Admin),
            "medico" => Ok(Self::Medico),
            "enfermero" => Ok(Self::Enfermero),
            "recepcionista" => Ok(Self::Recepcionista),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Role; 5] = [
        Role::Superadmin,
        Role::Admin,
        Role::Medico,
        Role::Enfermero,
        Role::Recepcionista,
    ];

    const ACTIONS: [ManageAction; 4] = [
        ManageAction::Create,
        ManageAction::Edit,
        ManageAction::Delete,
        ManageAction::Assign,
    ];

    #[test]
    fn test_rank_total_order() {
        for window in ALL.windows(2) {
            assert!(window[0].rank() < window[1].rank());
        }
    }

    #[test]
    fn test_superadmin_manages_all_but_superadmin() {
        for action in ACTIONS {
            assert!(!Role::Superadmin.can_manage(Role::Superadmin, action));
            for target in [
                Role::Admin,
                Role::Medico,
                Role::Enfermero,
                Role::Recepcionista,
            ] {
                assert!(Role::Superadmin.can_manage(target, action));
            }
        }
    }

    #[test]
    fn test_admin_never_touches_admin_or_superadmin() {
        for action in ACTIONS {
            assert!(!Role::Admin.can_manage(Role::Superadmin, action));
            assert!(!Role::Admin.can_manage(Role::Admin, action));
            for target in [Role::Medico, Role::Enfermero, Role::Recepcionista] {
                assert!(Role::Admin.can_manage(target, action));
            }
        }
    }

    #[test]
    fn test_clinical_roles_manage_nobody() {
        for caller in [Role::Medico, Role::Enfermero, Role::Recepcionista] {
            for target in ALL {
                for action in ACTIONS {
                    assert!(!caller.can_manage(target, action));
                }
            }
        }
    }

    #[test]
    fn test_policy_monotonic_with_rank() {
        // A higher-ranked role's sets are supersets of every lower-ranked set.
        for pair in ALL.windows(2) {
            let (higher, lower) = (pair[0], pair[1]);
            for target in lower.managed_roles() {
                assert!(higher.managed_roles().contains(target));
            }
            for target in lower.assignable_roles() {
                assert!(higher.assignable_roles().contains(target));
            }
        }
    }

    #[test]
    fn test_wire_names_round_trip() {
        for role in ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("doctor".parse::<Role>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Role::Recepcionista).unwrap();
        assert_eq!(json, "\"recepcionista\"");
        let role: Role = serde_json::from_str("\"superadmin\"").unwrap();
        assert_eq!(role, Role::Superadmin);
    }
}
