use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{is_unique_violation, AppError};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn list(db: &PgPool) -> Result<Vec<Category>, AppError> {
    let rows = sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, created_at
        FROM categories
        ORDER BY name ASC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Names are unique ignoring case.
pub async fn create(db: &PgPool, name: &str) -> Result<Category, AppError> {
    sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name)
        VALUES ($1)
        RETURNING id, name, created_at
        "#,
    )
    .bind(name)
    .fetch_one(db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::DuplicateCategory
        } else {
            e.into()
        }
    })
}
