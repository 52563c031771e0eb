//! Permission gate: pure role checks over an explicit principal.
//!
//! Runs before any other validation so state is never leaked to
//! unauthorized callers.

use flowforge_core::{ForgeError, Principal, Result, Role};

/// Roles allowed to perform mutating template operations.
pub const MUTATOR_ROLES: &[Role] = &[Role::Administrator, Role::Manager];

/// Require an authenticated principal holding one of `required`.
pub fn authorize<'a>(
    principal: Option<&'a Principal>,
    required: &[Role],
) -> Result<&'a Principal> {
    let principal = principal.ok_or(ForgeError::Unauthorized)?;
    if required.contains(&principal.role) {
        Ok(principal)
    } else {
        Err(ForgeError::InsufficientPermissions {
            role: principal.role.to_string(),
        })
    }
}

/// Require any authenticated principal (read paths).
pub fn require_principal(principal: Option<&Principal>) -> Result<&Principal> {
    principal.ok_or(ForgeError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_core::ForgeId;

    #[test]
    fn test_missing_principal_is_unauthorized() {
        let err = authorize(None, MUTATOR_ROLES).unwrap_err();
        assert!(matches!(err, ForgeError::Unauthorized));
        assert!(matches!(
            require_principal(None).unwrap_err(),
            ForgeError::Unauthorized
        ));
    }

    #[test]
    fn test_wrong_role_is_insufficient() {
        let member = Principal::new(ForgeId::new(), Role::TeamMember);
        let err = authorize(Some(&member), MUTATOR_ROLES).unwrap_err();
        assert!(matches!(err, ForgeError::InsufficientPermissions { .. }));
        // Read paths still accept any authenticated principal
        assert!(require_principal(Some(&member)).is_ok());
    }

    #[test]
    fn test_mutator_roles_pass() {
        for role in [Role::Administrator, Role::Manager] {
            let p = Principal::new(ForgeId::new(), role);
            assert!(authorize(Some(&p), MUTATOR_ROLES).is_ok());
        }
    }
}
