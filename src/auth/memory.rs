//! In-process `UserRepo` for unit and router tests.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::otp::{self, Otp};
use crate::auth::repo::UserRepo;
use crate::auth::repo_types::{NewUser, Role, User};
use crate::error::AppError;

#[derive(Default)]
pub struct MemoryUserRepo {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserRepo {
    pub fn count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<User> {
        self.users.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    pub fn set_role(&self, id: Uuid, role: Role) {
        if let Some(u) = self.users.lock().unwrap().get_mut(&id) {
            u.role = role;
        }
    }

    pub fn set_otp_expiry(&self, id: Uuid, expiry: OffsetDateTime) {
        if let Some(u) = self.users.lock().unwrap().get_mut(&id) {
            u.otp_expiry = Some(expiry);
        }
    }

    fn try_update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut User) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(AppError::NotFound("User"))?;
        let out = f(user)?;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(out)
    }

    fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut User) -> T) -> Result<T, AppError> {
        self.try_update(id, |u| Ok(f(u)))
    }
}

/// Same predicate the Postgres `WHERE otp = $2 AND otp_expiry > now()` applies.
fn consume_otp(user: &mut User, code: &str) -> Result<(), AppError> {
    otp::verify(
        user.otp.as_deref(),
        user.otp_expiry,
        code,
        OffsetDateTime::now_utc(),
    )?;
    user.otp = None;
    user.otp_expiry = None;
    Ok(())
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.get(id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn create_unverified(&self, new_user: NewUser, otp: &Otp) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| {
                u.email == new_user.email
                    || u.username.eq_ignore_ascii_case(&new_user.username)
            })
        {
            return Err(AppError::DuplicateUser);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: new_user.username,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
            is_verified: false,
            otp: Some(otp.code.clone()),
            otp_expiry: Some(otp.expires_at),
            token_version: 1,
            role: Role::User,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_otp(&self, id: Uuid, otp: &Otp) -> Result<(), AppError> {
        self.update(id, |u| {
            u.otp = Some(otp.code.clone());
            u.otp_expiry = Some(otp.expires_at);
        })
    }

    async fn mark_verified(&self, id: Uuid, code: &str) -> Result<User, AppError> {
        self.try_update(id, |u| {
            consume_otp(u, code)?;
            u.is_verified = true;
            Ok(u.clone())
        })
    }

    async fn reset_password(
        &self,
        id: Uuid,
        code: &str,
        password_hash: &str,
    ) -> Result<i32, AppError> {
        self.try_update(id, |u| {
            consume_otp(u, code)?;
            u.password_hash = password_hash.to_string();
            u.token_version += 1;
            Ok(u.token_version)
        })
    }

    async fn change_password(&self, id: Uuid, password_hash: &str) -> Result<i32, AppError> {
        self.update(id, |u| {
            u.password_hash = password_hash.to_string();
            u.token_version += 1;
            u.token_version
        })
    }

    async fn update_profile(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, AppError> {
        self.update(id, |u| {
            u.first_name = first_name.to_string();
            u.last_name = last_name.to_string();
            u.clone()
        })
    }
}
