use axum::{extract::State, routing::put, Router};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::{
    auth::{dto::{required, PublicUser}, extractors::AuthUser},
    response::{ok, ApiResult, AppJson},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub last_name: String,
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/me", put(update_me))
}

/// Only the display name is editable here; email, role and password have their own flows.
#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> ApiResult<PublicUser> {
    let first_name = required("firstName", &payload.first_name)?;
    let last_name = required("lastName", &payload.last_name)?;
    let updated = state
        .users
        .update_profile(user.id, &first_name, &last_name)
        .await?;
    info!(user_id = %updated.id, "profile updated");
    Ok(ok("Profile updated", PublicUser::from(&updated)))
}
