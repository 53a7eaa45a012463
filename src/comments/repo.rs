use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn list_for_post(db: &PgPool, post_id: Uuid) -> Result<Vec<Comment>, sqlx::Error> {
    sqlx::query_as::<_, Comment>(
        r#"
        SELECT c.id, c.post_id, c.author_id, u.username AS author_username, c.content, c.created_at
        FROM comments c
        JOIN users u ON u.id = c.author_id
        WHERE c.post_id = $1
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(db)
    .await
}

pub async fn insert(
    db: &PgPool,
    post_id: Uuid,
    author_id: Uuid,
    content: &str,
) -> Result<Comment, sqlx::Error> {
    sqlx::query_as::<_, Comment>(
        r#"
        WITH inserted AS (
            INSERT INTO comments (post_id, author_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, post_id, author_id, content, created_at
        )
        SELECT i.id, i.post_id, i.author_id, u.username AS author_username, i.content, i.created_at
        FROM inserted i
        JOIN users u ON u.id = i.author_id
        "#,
    )
    .bind(post_id)
    .bind(author_id)
    .bind(content)
    .fetch_one(db)
    .await
}

pub async fn author_of(db: &PgPool, id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query_as::<_, (Uuid,)>("SELECT author_id FROM comments WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let done = sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(done.rows_affected() > 0)
}
