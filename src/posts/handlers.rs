use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::get,
    Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{Pagination, PostForm, PostView, UpdatePostRequest};
use super::repo::{NewPost, PostChanges, PostRow};
use crate::{
    auth::{extractors::AuthUser, gate::ensure_owner_or_admin},
    error::AppError,
    images::services::{discard_image, presign_image, upload_post_image, UploadItem},
    response::{created, ok, ok_message, ApiResult, AppJson, AppPath, AppQuery, CreatedResult},
    state::AppState,
};

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).put(update_post).delete(delete_post),
        )
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
}

async fn to_view(state: &AppState, row: PostRow) -> PostView {
    let image_url = match row.image_key.as_deref() {
        Some(key) => presign_image(state.storage.as_ref(), key).await,
        None => None,
    };
    PostView::from_row(row, image_url)
}

async fn load_view(state: &AppState, id: Uuid) -> Result<PostView, AppError> {
    let row = state
        .posts
        .find(id)
        .await?
        .ok_or(AppError::NotFound("Post"))?;
    Ok(to_view(state, row).await)
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    AppQuery(p): AppQuery<Pagination>,
) -> ApiResult<Vec<PostView>> {
    let (limit, offset) = p.clamped();
    let rows = state.posts.list(p.category, limit, offset).await?;
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(to_view(&state, row).await);
    }
    Ok(ok("Posts", items))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<PostView> {
    Ok(ok("Post", load_view(&state, id).await?))
}

async fn read_form(mut mp: Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(e.body_text()))?;
                if !body.is_empty() {
                    form.image = Some(UploadItem { body, content_type });
                }
            }
            "title" | "content" | "categoryId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(e.body_text()))?;
                match name.as_str() {
                    "title" => form.title = Some(text),
                    "content" => form.content = Some(text),
                    _ => form.category_id = Some(text),
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

/// POST /posts (multipart: title, content, categoryId?, image?)
#[instrument(skip(state, user, mp))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> CreatedResult<PostView> {
    let post = read_form(mp?).await?.validate()?;

    let image_key = match post.image {
        Some(item) => Some(upload_post_image(state.storage.as_ref(), user.id, item).await?),
        None => None,
    };

    let inserted = state
        .posts
        .insert(NewPost {
            author_id: user.id,
            category_id: post.category_id,
            title: &post.title,
            content: &post.content,
            image_key: image_key.as_deref(),
        })
        .await;

    let id = match inserted {
        Ok(id) => id,
        Err(e) => {
            // The row never landed, so the uploaded image is orphaned
            if let Some(key) = &image_key {
                discard_image(state.storage.as_ref(), key).await;
            }
            return Err(e);
        }
    };

    info!(post_id = %id, author_id = %user.id, "post created");
    Ok(created("Post created", load_view(&state, id).await?))
}

#[instrument(skip(state, user, payload))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdatePostRequest>,
) -> ApiResult<PostView> {
    let author_id = state
        .posts
        .author_of(id)
        .await?
        .ok_or(AppError::NotFound("Post"))?;
    ensure_owner_or_admin(&user, author_id)?;

    let req = payload.normalized()?;
    state
        .posts
        .update(
            id,
            PostChanges {
                title: req.title.as_deref(),
                content: req.content.as_deref(),
                category: req.category_id,
            },
        )
        .await?;

    info!(post_id = %id, user_id = %user.id, "post updated");
    Ok(ok("Post updated", load_view(&state, id).await?))
}

#[instrument(skip(state, user))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<()> {
    let author_id = state
        .posts
        .author_of(id)
        .await?
        .ok_or(AppError::NotFound("Post"))?;
    ensure_owner_or_admin(&user, author_id)?;

    let image_key = state
        .posts
        .delete(id)
        .await?
        .ok_or(AppError::NotFound("Post"))?;
    if let Some(key) = image_key {
        discard_image(state.storage.as_ref(), &key).await;
    }

    info!(post_id = %id, user_id = %user.id, "post deleted");
    Ok(ok_message("Post deleted"))
}
