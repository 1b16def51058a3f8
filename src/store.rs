//! Seams between the lifecycle manager and the two backing stores.
//!
//! Both stores are shared with other processes, so implementations must not
//! cache anything across calls.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ObjectStorageError;
use crate::model::{BookDocument, Highlight};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), ObjectStorageError>;

    /// Fails with `ObjectStorageError::NotFound` when nothing is stored at `key`.
    async fn delete(&self, key: &str) -> Result<(), ObjectStorageError>;

    async fn exists(&self, key: &str) -> Result<bool, ObjectStorageError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_book(&self, owner_id: &str, book_id: &str) -> Result<Option<BookDocument>>;

    /// Positional update of one highlight's `imgUrl`. Returns whether a
    /// highlight matched.
    async fn set_image_url(
        &self,
        owner_id: &str,
        book_id: &str,
        highlight_id: &str,
        img_url: Option<&str>,
    ) -> Result<bool>;

    /// Appends to the book's highlights, creating the book document if needed.
    async fn push_highlight(&self, highlight: &Highlight) -> Result<()>;

    async fn pull_highlight(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Result<bool>;
}
