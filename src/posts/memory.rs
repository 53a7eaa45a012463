//! In-process `PostRepo` for handler tests. Authors are resolved against the
//! shared `MemoryUserRepo`, so the foreign keys behave like the real schema.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{NewPost, PostChanges, PostRepo, PostRow};
use crate::auth::memory::MemoryUserRepo;
use crate::error::AppError;

pub struct MemoryPostRepo {
    users: Arc<MemoryUserRepo>,
    posts: Mutex<HashMap<Uuid, PostRow>>,
    categories: Mutex<HashMap<Uuid, String>>,
}

impl MemoryPostRepo {
    pub fn new(users: Arc<MemoryUserRepo>) -> Self {
        Self {
            users,
            posts: Mutex::default(),
            categories: Mutex::default(),
        }
    }

    pub fn add_category(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.categories.lock().unwrap().insert(id, name.to_string());
        id
    }

    pub fn count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn get(&self, id: Uuid) -> Option<PostRow> {
        self.posts.lock().unwrap().get(&id).cloned()
    }

    fn category_name(&self, id: Option<Uuid>) -> Result<Option<String>, AppError> {
        match id {
            None => Ok(None),
            Some(id) => self
                .categories
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .map(Some)
                .ok_or(AppError::NotFound("Category")),
        }
    }
}

#[async_trait]
impl PostRepo for MemoryPostRepo {
    async fn list(
        &self,
        category_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostRow>, AppError> {
        let mut rows: Vec<PostRow> = self
            .posts
            .lock()
            .unwrap()
            .values()
            .filter(|p| category_id.is_none() || p.category_id == category_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn find(&self, id: Uuid) -> Result<Option<PostRow>, AppError> {
        Ok(self.get(id))
    }

    async fn author_of(&self, id: Uuid) -> Result<Option<Uuid>, AppError> {
        Ok(self.get(id).map(|p| p.author_id))
    }

    async fn insert(&self, post: NewPost<'_>) -> Result<Uuid, AppError> {
        let author = self.users.get(post.author_id).ok_or(AppError::Unauthenticated)?;
        let category_name = self.category_name(post.category_id)?;
        let now = OffsetDateTime::now_utc();
        let row = PostRow {
            id: Uuid::new_v4(),
            author_id: author.id,
            author_username: author.username,
            category_id: post.category_id,
            category_name,
            title: post.title.to_string(),
            content: post.content.to_string(),
            image_key: post.image_key.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        let id = row.id;
        self.posts.lock().unwrap().insert(id, row);
        Ok(id)
    }

    async fn update(&self, id: Uuid, changes: PostChanges<'_>) -> Result<(), AppError> {
        let category = match changes.category {
            Some(category_id) => Some((category_id, self.category_name(category_id)?)),
            None => None,
        };
        let mut posts = self.posts.lock().unwrap();
        let post = posts.get_mut(&id).ok_or(AppError::NotFound("Post"))?;
        if let Some(title) = changes.title {
            post.title = title.to_string();
        }
        if let Some(content) = changes.content {
            post.content = content.to_string();
        }
        if let Some((category_id, name)) = category {
            post.category_id = category_id;
            post.category_name = name;
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Option<String>>, AppError> {
        Ok(self.posts.lock().unwrap().remove(&id).map(|p| p.image_key))
    }
}
