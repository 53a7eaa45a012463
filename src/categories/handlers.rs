use axum::{extract::State, routing::get, Router};
use serde::Deserialize;
use tracing::{info, instrument};

use super::repo::{self, Category};
use crate::{
    auth::{dto::required, extractors::AuthUser, gate::authorize, repo_types::Role},
    error::AppError,
    response::{created, ok, ApiResult, AppJson, CreatedResult},
    state::AppState,
};

const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

pub fn category_routes() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories).post(create_category))
}

#[instrument(skip(state))]
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<Category>> {
    let categories = repo::list(&state.db).await?;
    Ok(ok("Categories", categories))
}

#[instrument(skip(state, user, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(payload): AppJson<CreateCategoryRequest>,
) -> CreatedResult<Category> {
    authorize(user.role, &[Role::Admin])?;
    let name = required("name", &payload.name)?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation("Category name is too long"));
    }
    let category = repo::create(&state.db, &name).await?;
    info!(category_id = %category.id, admin_id = %user.id, "category created");
    Ok(created("Category created", category))
}
