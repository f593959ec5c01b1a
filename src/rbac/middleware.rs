use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::rbac::types::Role;

/// Reject the request with 403 unless the caller's role is in `group`.
pub fn require_role(auth: &AuthUser, group: &[Role]) -> Result<(), ApiError> {
    if auth.role.allowed(group) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %auth.user_id,
        role = %auth.role,
        "role not permitted"
    );
    Err(ApiError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::types::{ADMIN, CRM, STAFF};
    use uuid::Uuid;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            user_name: "Test User".into(),
            email: "test@example.com".into(),
            role,
            ip_addr: None,
        }
    }

    #[test]
    fn admin_passes_admin_group() {
        assert!(require_role(&user(Role::Admin), ADMIN).is_ok());
    }

    #[test]
    fn staff_rejected_from_admin_group() {
        let err = require_role(&user(Role::Staff), ADMIN).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[test]
    fn marketing_in_crm_not_staff() {
        let auth = user(Role::Marketing);
        assert!(require_role(&auth, CRM).is_ok());
        assert!(require_role(&auth, STAFF).is_err());
    }
}
