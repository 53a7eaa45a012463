use uuid::Uuid;

use crate::auth::repo_types::{Role, User};
use crate::error::AppError;

/// Fails with `Forbidden` unless `role` is one of `allowed`.
pub fn authorize(role: Role, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Resource mutation is open to its author and to admins.
pub fn ensure_owner_or_admin(user: &User, owner_id: Uuid) -> Result<(), AppError> {
    if user.id == owner_id {
        return Ok(());
    }
    authorize(user.role, &[Role::Admin])
}
