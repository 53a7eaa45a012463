use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::PostRow;
use crate::auth::dto::required;
use crate::error::AppError;
use crate::images::services::UploadItem;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl PostView {
    pub fn from_row(row: PostRow, image_url: Option<String>) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            author_username: row.author_username,
            category_id: row.category_id,
            category_name: row.category_name,
            title: row.title,
            content: row.content,
            image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub category: Option<Uuid>,
}
fn default_limit() -> i64 {
    20
}

impl Pagination {
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}

/// Partial update. For `categoryId`, a missing key keeps the category and an
/// explicit `null` clears it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub category_id: Option<Option<Uuid>>,
}

fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

impl UpdatePostRequest {
    pub fn normalized(self) -> Result<Self, AppError> {
        let title = self.title.map(|t| check_title(&t)).transpose()?;
        let content = self
            .content
            .map(|c| required("content", &c))
            .transpose()?;
        Ok(Self {
            title,
            content,
            category_id: self.category_id,
        })
    }
}

fn check_title(raw: &str) -> Result<String, AppError> {
    let title = required("title", raw)?;
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::validation("Title is too long"));
    }
    Ok(title)
}

/// Fields collected from the multipart body of `POST /posts`.
#[derive(Default)]
pub struct PostForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<String>,
    pub image: Option<UploadItem>,
}

pub struct ValidPost {
    pub title: String,
    pub content: String,
    pub category_id: Option<Uuid>,
    pub image: Option<UploadItem>,
}

impl PostForm {
    pub fn validate(self) -> Result<ValidPost, AppError> {
        let title = check_title(self.title.as_deref().unwrap_or_default())?;
        let content = required("content", self.content.as_deref().unwrap_or_default())?;
        let category_id = match self.category_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<Uuid>()
                    .map_err(|_| AppError::validation("categoryId must be a UUID"))?,
            ),
        };
        Ok(ValidPost {
            title,
            content,
            category_id,
            image: self.image,
        })
    }
}
