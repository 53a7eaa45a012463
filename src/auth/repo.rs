use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::otp::Otp;
use crate::auth::repo_types::{NewUser, User};
use crate::error::{is_unique_violation, AppError};

const USER_COLUMNS: &str = "id, email, username, first_name, last_name, password_hash, \
     is_verified, otp, otp_expiry, token_version, role, created_at, updated_at";

/// Credential store used by the auth flows.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Inserts an unverified user together with its first OTP. Either both land
    /// or neither does; a taken email or username yields `DuplicateUser`.
    async fn create_unverified(&self, new_user: NewUser, otp: &Otp) -> Result<User, AppError>;

    async fn set_otp(&self, id: Uuid, otp: &Otp) -> Result<(), AppError>;

    /// Consumes `code` and marks the account verified. The write only lands
    /// while `code` is still the stored, unexpired OTP; otherwise
    /// `InvalidOrExpired`.
    async fn mark_verified(&self, id: Uuid, code: &str) -> Result<User, AppError>;

    /// Consumes `code`, stores a new hash and bumps `token_version`. Same
    /// single-use guarantee as `mark_verified`. Returns the new version.
    async fn reset_password(
        &self,
        id: Uuid,
        code: &str,
        password_hash: &str,
    ) -> Result<i32, AppError>;

    /// Stores a new hash and bumps `token_version`. Returns the new version.
    async fn change_password(&self, id: Uuid, password_hash: &str) -> Result<i32, AppError>;

    async fn update_profile(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, AppError>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_duplicate(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::DuplicateUser
    } else {
        e.into()
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create_unverified(&self, new_user: NewUser, otp: &Otp) -> Result<User, AppError> {
        let mut tx = self.db.begin().await?;

        let taken = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT id
            FROM users
            WHERE email = $1 OR lower(username) = lower($2)
            LIMIT 1
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.username)
        .fetch_optional(&mut *tx)
        .await?;

        // Dropping `tx` without commit rolls it back
        if taken.is_some() {
            return Err(AppError::DuplicateUser);
        }

        let sql = format!(
            r#"
            INSERT INTO users (email, username, first_name, last_name, password_hash, otp, otp_expiry)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.email)
            .bind(&new_user.username)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(&new_user.password_hash)
            .bind(&otp.code)
            .bind(otp.expires_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_duplicate)?;

        tx.commit().await.map_err(map_duplicate)?;
        Ok(user)
    }

    async fn set_otp(&self, id: Uuid, otp: &Otp) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET otp = $2, otp_expiry = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&otp.code)
        .bind(otp.expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, code: &str) -> Result<User, AppError> {
        let sql = format!(
            r#"
            UPDATE users
            SET is_verified = TRUE, otp = NULL, otp_expiry = NULL, updated_at = now()
            WHERE id = $1 AND otp = $2 AND otp_expiry > now()
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(code)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::InvalidOrExpired)
    }

    async fn reset_password(
        &self,
        id: Uuid,
        code: &str,
        password_hash: &str,
    ) -> Result<i32, AppError> {
        let row = sqlx::query_as::<_, (i32,)>(
            r#"
            UPDATE users
            SET password_hash = $3,
                otp = NULL,
                otp_expiry = NULL,
                token_version = token_version + 1,
                updated_at = now()
            WHERE id = $1 AND otp = $2 AND otp_expiry > now()
            RETURNING token_version
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidOrExpired)?;
        Ok(row.0)
    }

    async fn change_password(&self, id: Uuid, password_hash: &str) -> Result<i32, AppError> {
        let row = sqlx::query_as::<_, (i32,)>(
            r#"
            UPDATE users
            SET password_hash = $2,
                token_version = token_version + 1,
                updated_at = now()
            WHERE id = $1
            RETURNING token_version
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound("User"))?;
        Ok(row.0)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, AppError> {
        let sql = format!(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(first_name)
            .bind(last_name)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound("User"))
    }
}
