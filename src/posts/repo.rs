use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{violated_foreign_key, AppError};

/// Post joined with its author's username and category name.
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub title: String,
    pub content: String,
    pub image_key: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub struct NewPost<'a> {
    pub author_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: &'a str,
    pub content: &'a str,
    pub image_key: Option<&'a str>,
}

/// `None` keeps the stored value. `category: Some(None)` clears the category.
#[derive(Default)]
pub struct PostChanges<'a> {
    pub title: Option<&'a str>,
    pub content: Option<&'a str>,
    pub category: Option<Option<Uuid>>,
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn list(
        &self,
        category_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostRow>, AppError>;

    async fn find(&self, id: Uuid) -> Result<Option<PostRow>, AppError>;

    async fn author_of(&self, id: Uuid) -> Result<Option<Uuid>, AppError>;

    /// An unknown category yields `NotFound("Category")`; a vanished author
    /// yields `Unauthenticated`.
    async fn insert(&self, post: NewPost<'_>) -> Result<Uuid, AppError>;

    async fn update(&self, id: Uuid, changes: PostChanges<'_>) -> Result<(), AppError>;

    /// Deletes the post and hands back its image key, if any.
    async fn delete(&self, id: Uuid) -> Result<Option<Option<String>>, AppError>;
}

#[derive(Clone)]
pub struct PgPostRepo {
    db: PgPool,
}

impl PgPostRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write(e: sqlx::Error) -> AppError {
    match violated_foreign_key(&e) {
        Some("posts_category_id_fkey") => AppError::NotFound("Category"),
        Some("posts_author_id_fkey") => AppError::Unauthenticated,
        _ => e.into(),
    }
}

const SELECT_POST: &str = r#"
    SELECT p.id, p.author_id, u.username AS author_username,
           p.category_id, c.name AS category_name,
           p.title, p.content, p.image_key, p.created_at, p.updated_at
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN categories c ON c.id = p.category_id
"#;

#[async_trait]
impl PostRepo for PgPostRepo {
    async fn list(
        &self,
        category_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostRow>, AppError> {
        let sql = format!(
            "{SELECT_POST}
            WHERE ($1::uuid IS NULL OR p.category_id = $1)
            ORDER BY p.created_at DESC
            LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(category_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn find(&self, id: Uuid) -> Result<Option<PostRow>, AppError> {
        let sql = format!("{SELECT_POST} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn author_of(&self, id: Uuid) -> Result<Option<Uuid>, AppError> {
        let row = sqlx::query_as::<_, (Uuid,)>("SELECT author_id FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn insert(&self, post: NewPost<'_>) -> Result<Uuid, AppError> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO posts (author_id, category_id, title, content, image_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(post.author_id)
        .bind(post.category_id)
        .bind(post.title)
        .bind(post.content)
        .bind(post.image_key)
        .fetch_one(&self.db)
        .await
        .map_err(map_write)?;
        Ok(row.0)
    }

    async fn update(&self, id: Uuid, changes: PostChanges<'_>) -> Result<(), AppError> {
        let done = sqlx::query(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                category_id = CASE WHEN $4 THEN $5 ELSE category_id END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.content)
        .bind(changes.category.is_some())
        .bind(changes.category.flatten())
        .execute(&self.db)
        .await
        .map_err(map_write)?;
        if done.rows_affected() == 0 {
            return Err(AppError::NotFound("Post"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Option<String>>, AppError> {
        let row = sqlx::query_as::<_, (Option<String>,)>(
            "DELETE FROM posts WHERE id = $1 RETURNING image_key",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|r| r.0))
    }
}
