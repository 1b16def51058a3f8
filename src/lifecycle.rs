//! Highlight image lifecycle.
//!
//! Decides whether a highlight's image is generated, regenerated in place or
//! removed, and keeps the object store and the document store in step. There
//! is no transaction spanning both stores, so every mutation is two
//! sequential writes:
//!
//! - generate: object written first, then `imgUrl` recorded on the highlight;
//! - regenerate: object overwritten, document untouched (the key is stable);
//! - delete: object removed first, then `imgUrl` reset to null.
//!
//! A failure between the two writes leaves the stores out of step until the
//! same operation is retried. Operations on one key are serialized inside
//! this process; separate processes may still interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::model::{Highlight, ImageAction, ImageLocation, ImageOutcome, NewHighlight, image_key};
use crate::rate_limit::RateLimiter;
use crate::store::{DocumentStore, ObjectStore};
use crate::synthesis::ImageSynthesizer;

pub type Result<T> = std::result::Result<T, LifecycleError>;

#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        // must be dropped after `lock`, also when the wait below is cancelled
        let mut key_guard = KeyGuard {
            locks: self,
            key: key.to_string(),
            guard: None,
        };
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_string()).or_default().clone()
        };

        key_guard.guard = Some(lock.lock_owned().await);
        key_guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // only the table's own reference left: nobody holds or waits on it
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

pub struct HighlightLifecycle {
    objects: Arc<dyn ObjectStore>,
    documents: Arc<dyn DocumentStore>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    location: ImageLocation,
    limiter: Option<RateLimiter>,
    locks: KeyLocks,
}

impl HighlightLifecycle {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentStore>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        location: ImageLocation,
    ) -> Self {
        Self {
            objects,
            documents,
            synthesizer,
            location,
            limiter: None,
            locks: KeyLocks::default(),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Regenerates the image in place when one exists, otherwise generates
    /// it and records the new URL on the highlight.
    pub async fn ensure_image(
        &self,
        owner_id: &str,
        book_id: &str,
        highlight_id: &str,
        new_text: Option<&str>,
    ) -> Result<ImageOutcome> {
        let key = image_key(owner_id, book_id, highlight_id);
        let _guard = self.locks.acquire(&key).await;

        let highlight = self.load(owner_id, book_id, highlight_id).await?;
        let prompt = resolve_prompt(new_text, &highlight)?.to_string();
        let image_existed = highlight.has_image();

        self.check_rate(owner_id).await?;

        if image_existed {
            tracing::info!(owner_id, book_id, highlight_id, key, "overwriting existing image");
            self.synthesizer.overwrite(&prompt, &key).await?;

            return Ok(ImageOutcome {
                action: ImageAction::Regenerated,
                highlight_id: highlight_id.to_string(),
                img_url: self.location.url_for(&key),
                image_existed,
            });
        }

        tracing::info!(owner_id, book_id, highlight_id, key, "generating new image");
        let img_url = self.generate_and_record(&prompt, &highlight).await?;

        Ok(ImageOutcome {
            action: ImageAction::Generated,
            highlight_id: highlight_id.to_string(),
            img_url,
            image_existed,
        })
    }

    /// Generates from the stored text regardless of the current image state.
    pub async fn force_generate(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Result<ImageOutcome> {
        let key = image_key(owner_id, book_id, highlight_id);
        let _guard = self.locks.acquire(&key).await;

        let highlight = self.load(owner_id, book_id, highlight_id).await?;
        let prompt = resolve_prompt(None, &highlight)?.to_string();

        self.check_rate(owner_id).await?;

        tracing::info!(owner_id, book_id, highlight_id, key, "generating image");
        let img_url = self.generate_and_record(&prompt, &highlight).await?;

        Ok(ImageOutcome {
            action: ImageAction::Generated,
            highlight_id: highlight_id.to_string(),
            img_url,
            image_existed: highlight.has_image(),
        })
    }

    pub async fn delete_image(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Result<()> {
        let key = image_key(owner_id, book_id, highlight_id);
        let _guard = self.locks.acquire(&key).await;

        let highlight = self.load(owner_id, book_id, highlight_id).await?;
        if !highlight.has_image() {
            return Err(LifecycleError::ImageNotFound(highlight_id.to_string()));
        }

        tracing::info!(owner_id, book_id, highlight_id, key, "deleting image");
        self.objects.delete(&key).await?;

        let matched = self
            .documents
            .set_image_url(owner_id, book_id, highlight_id, None)
            .await?;
        if !matched {
            tracing::warn!(owner_id, book_id, highlight_id, "highlight vanished after image was deleted");
            return Err(LifecycleError::HighlightNotFound(highlight_id.to_string()));
        }

        Ok(())
    }

    /// Stores a new highlight. With `with_image` the image is rendered before
    /// the highlight is persisted, so the stored and returned record already
    /// carries its URL.
    pub async fn create_highlight(&self, input: NewHighlight, with_image: bool) -> Result<Highlight> {
        let mut highlight = Highlight {
            id: Uuid::new_v4().to_string(),
            book_id: input.book_id,
            owner_id: input.owner_id,
            text: input.text,
            location: input.location,
            img_url: None,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let key = highlight.image_key();
        let _guard = self.locks.acquire(&key).await;

        if with_image {
            if highlight.text.is_empty() {
                return Err(LifecycleError::MissingPrompt(highlight.id));
            }
            self.check_rate(&highlight.owner_id).await?;

            tracing::info!(
                owner_id = %highlight.owner_id,
                book_id = %highlight.book_id,
                highlight_id = %highlight.id,
                "generating image for new highlight"
            );
            let img_url = self
                .synthesizer
                .generate(&highlight.text, &highlight.owner_id, &highlight.id, &highlight.book_id)
                .await?;
            highlight.img_url = Some(img_url);
        }

        if let Err(e) = self.documents.push_highlight(&highlight).await {
            if highlight.img_url.is_some() {
                tracing::warn!(key, error = %e, "highlight not stored, image left orphaned");
            }
            return Err(e.into());
        }

        tracing::info!(
            owner_id = %highlight.owner_id,
            book_id = %highlight.book_id,
            highlight_id = %highlight.id,
            "highlight created"
        );
        Ok(highlight)
    }

    pub async fn list_highlights(&self, owner_id: &str, book_id: &str) -> Result<Vec<Highlight>> {
        let book = self
            .documents
            .find_book(owner_id, book_id)
            .await?
            .ok_or_else(|| LifecycleError::BookNotFound(book_id.to_string()))?;
        Ok(book.highlights)
    }

    pub async fn get_highlight(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Result<Highlight> {
        self.load(owner_id, book_id, highlight_id).await
    }

    /// Removes the highlight record only. Its image object, if any, stays in
    /// the object store.
    pub async fn delete_highlight(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Result<()> {
        let key = image_key(owner_id, book_id, highlight_id);
        let _guard = self.locks.acquire(&key).await;

        if self.documents.find_book(owner_id, book_id).await?.is_none() {
            return Err(LifecycleError::BookNotFound(book_id.to_string()));
        }

        if !self.documents.pull_highlight(owner_id, book_id, highlight_id).await? {
            return Err(LifecycleError::HighlightNotFound(highlight_id.to_string()));
        }

        tracing::info!(owner_id, book_id, highlight_id, "highlight deleted");
        Ok(())
    }

    async fn load(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Result<Highlight> {
        let book = self
            .documents
            .find_book(owner_id, book_id)
            .await?
            .ok_or_else(|| LifecycleError::BookNotFound(book_id.to_string()))?;

        book.highlight(highlight_id)
            .cloned()
            .ok_or_else(|| LifecycleError::HighlightNotFound(highlight_id.to_string()))
    }

    async fn check_rate(&self, owner_id: &str) -> Result<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        limiter
            .check(owner_id)
            .await
            .map_err(|retry_after| LifecycleError::RateLimited {
                owner_id: owner_id.to_string(),
                retry_after_secs: retry_after.as_secs(),
            })
    }

    async fn generate_and_record(&self, prompt: &str, highlight: &Highlight) -> Result<String> {
        let img_url = self
            .synthesizer
            .generate(prompt, &highlight.owner_id, &highlight.id, &highlight.book_id)
            .await?;

        let matched = self
            .documents
            .set_image_url(&highlight.owner_id, &highlight.book_id, &highlight.id, Some(&img_url))
            .await?;
        if !matched {
            tracing::warn!(
                highlight_id = %highlight.id,
                img_url,
                "highlight vanished before its image url was recorded"
            );
            return Err(LifecycleError::HighlightNotFound(highlight.id.clone()));
        }

        Ok(img_url)
    }
}

fn resolve_prompt<'a>(new_text: Option<&'a str>, highlight: &'a Highlight) -> Result<&'a str> {
    match new_text {
        Some(text) if !text.is_empty() => Ok(text),
        _ if !highlight.text.is_empty() => Ok(&highlight.text),
        _ => Err(LifecycleError::MissingPrompt(highlight.id.clone())),
    }
}
