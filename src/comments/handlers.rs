use axum::{
    extract::State,
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo::{self, Comment};
use crate::{
    auth::{dto::required, extractors::AuthUser, gate::ensure_owner_or_admin},
    error::{violated_foreign_key, AppError},
    response::{created, ok, ok_message, ApiResult, AppJson, AppPath, CreatedResult},
    state::AppState,
};

const MAX_COMMENT_LEN: usize = 2_000;

#[derive(Debug, Deserialize)]
pub struct NewCommentRequest {
    pub content: String,
}

pub fn comment_routes() -> Router<AppState> {
    Router::new()
        .route("/posts/:id/comments", get(list_comments).post(add_comment))
        .route("/comments/:id", delete(delete_comment))
}

#[instrument(skip(state))]
pub async fn list_comments(
    State(state): State<AppState>,
    AppPath(post_id): AppPath<Uuid>,
) -> ApiResult<Vec<Comment>> {
    if state.posts.author_of(post_id).await?.is_none() {
        return Err(AppError::NotFound("Post"));
    }
    let comments = repo::list_for_post(&state.db, post_id).await?;
    Ok(ok("Comments", comments))
}

#[instrument(skip(state, user, payload))]
pub async fn add_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(post_id): AppPath<Uuid>,
    AppJson(payload): AppJson<NewCommentRequest>,
) -> CreatedResult<Comment> {
    let content = required("content", &payload.content)?;
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::validation("Comment is too long"));
    }
    let comment = repo::insert(&state.db, post_id, user.id, &content)
        .await
        .map_err(|e| match violated_foreign_key(&e) {
            Some("comments_post_id_fkey") => AppError::NotFound("Post"),
            Some("comments_author_id_fkey") => AppError::Unauthenticated,
            _ => e.into(),
        })?;
    info!(comment_id = %comment.id, %post_id, author_id = %user.id, "comment added");
    Ok(created("Comment added", comment))
}

#[instrument(skip(state, user))]
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<()> {
    let author_id = repo::author_of(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Comment"))?;
    ensure_owner_or_admin(&user, author_id)?;
    if !repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("Comment"));
    }
    info!(comment_id = %id, user_id = %user.id, "comment deleted");
    Ok(ok_message("Comment deleted"))
}
