use tracing::{debug, warn};

use crate::auth::{jwt::TokenKeys, repo::UserRepo, repo_types::User};
use crate::error::AppError;

/// Resolves a bearer token to the current user.
///
/// Invalidation is lazy: a token whose embedded version no longer matches the
/// stored `token_version` is rejected here, at its next use, rather than
/// through a revocation list.
pub async fn verify_session(
    keys: &TokenKeys,
    users: &dyn UserRepo,
    token: &str,
) -> Result<User, AppError> {
    let claims = keys.decode(token).map_err(|e| {
        debug!(error = %e, "token rejected");
        AppError::Unauthenticated
    })?;

    let user = users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    if claims.ver != user.token_version {
        warn!(
            user_id = %user.id,
            token_ver = claims.ver,
            current_ver = user.token_version,
            "stale session token"
        );
        return Err(AppError::SessionInvalidated);
    }

    Ok(user)
}
