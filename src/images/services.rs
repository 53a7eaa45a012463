use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::StorageClient;

const PRESIGN_TTL_SECS: u64 = 30 * 60;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Stores a post image and returns its object key.
pub async fn upload_post_image(
    storage: &dyn StorageClient,
    author_id: Uuid,
    item: UploadItem,
) -> Result<String, AppError> {
    let ext = ext_from_mime(&item.content_type)
        .ok_or_else(|| AppError::validation("Image must be JPEG, PNG, WebP or GIF"))?;
    if item.body.is_empty() {
        return Err(AppError::validation("Image is empty"));
    }
    if item.body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::validation("Image is larger than 5 MB"));
    }

    let key = format!("posts/{}/{}.{}", author_id, Uuid::new_v4(), ext);
    storage
        .put_object(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(key)
}

/// Best-effort delete; used to undo an upload when a later step fails.
pub async fn discard_image(storage: &dyn StorageClient, key: &str) {
    if let Err(e) = storage.delete_object(key).await {
        warn!(error = %e, key, "failed to delete image");
    }
}

pub async fn presign_image(storage: &dyn StorageClient, key: &str) -> Option<String> {
    match storage.presign_get(key, PRESIGN_TTL_SECS).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, key, "presign failed");
            None
        }
    }
}
