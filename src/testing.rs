//! In-memory stand-ins for the external stores.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ObjectStorageError;
use crate::model::{BookDocument, Highlight, ImageLocation, image_key};
use crate::store::{DocumentStore, ObjectStore};
use crate::synthesis::{ImageSynthesizer, SynthesisError};

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryObjectStore {
    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<(), ObjectStorageError> {
        self.calls.lock().unwrap().push(format!("put {}", key));
        self.insert(key, data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStorageError> {
        self.calls.lock().unwrap().push(format!("delete {}", key));
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(ObjectStorageError::NotFound(key.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStorageError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    books: Mutex<HashMap<(String, String), Vec<Highlight>>>,
    writes: Mutex<usize>,
}

impl InMemoryDocumentStore {
    pub fn with_book(owner_id: &str, book_id: &str, highlights: Vec<Highlight>) -> Self {
        let store = Self::default();
        store
            .books
            .lock()
            .unwrap()
            .insert((owner_id.to_string(), book_id.to_string()), highlights);
        store
    }

    pub fn highlight(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Option<Highlight> {
        self.books
            .lock()
            .unwrap()
            .get(&(owner_id.to_string(), book_id.to_string()))
            .and_then(|hs| hs.iter().find(|h| h.id == highlight_id).cloned())
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_book(&self, owner_id: &str, book_id: &str) -> Result<Option<BookDocument>> {
        let books = self.books.lock().unwrap();
        Ok(books
            .get(&(owner_id.to_string(), book_id.to_string()))
            .map(|highlights| BookDocument {
                id: book_id.to_string(),
                owner_id: owner_id.to_string(),
                highlights: highlights.clone(),
            }))
    }

    async fn set_image_url(
        &self,
        owner_id: &str,
        book_id: &str,
        highlight_id: &str,
        img_url: Option<&str>,
    ) -> Result<bool> {
        *self.writes.lock().unwrap() += 1;
        let mut books = self.books.lock().unwrap();
        let target = books
            .get_mut(&(owner_id.to_string(), book_id.to_string()))
            .and_then(|hs| hs.iter_mut().find(|h| h.id == highlight_id));
        match target {
            Some(highlight) => {
                highlight.img_url = img_url.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn push_highlight(&self, highlight: &Highlight) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        self.books
            .lock()
            .unwrap()
            .entry((highlight.owner_id.clone(), highlight.book_id.clone()))
            .or_default()
            .push(highlight.clone());
        Ok(())
    }

    async fn pull_highlight(&self, owner_id: &str, book_id: &str, highlight_id: &str) -> Result<bool> {
        *self.writes.lock().unwrap() += 1;
        let mut books = self.books.lock().unwrap();
        let Some(highlights) = books.get_mut(&(owner_id.to_string(), book_id.to_string())) else {
            return Ok(false);
        };
        let before = highlights.len();
        highlights.retain(|h| h.id != highlight_id);
        Ok(highlights.len() < before)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisCall {
    Generate { prompt: String, key: String },
    Overwrite { prompt: String, key: String },
}

/// Writes the prompt bytes as the "image" so tests can tell renders apart.
pub struct RecordingSynthesizer {
    store: Arc<InMemoryObjectStore>,
    location: ImageLocation,
    calls: Mutex<Vec<SynthesisCall>>,
}

impl RecordingSynthesizer {
    pub fn new(store: Arc<InMemoryObjectStore>, location: ImageLocation) -> Self {
        Self {
            store,
            location,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SynthesisCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSynthesizer for RecordingSynthesizer {
    async fn generate(
        &self,
        prompt: &str,
        owner_id: &str,
        highlight_id: &str,
        book_id: &str,
    ) -> Result<String, SynthesisError> {
        let key = image_key(owner_id, book_id, highlight_id);
        tokio::task::yield_now().await;
        self.calls.lock().unwrap().push(SynthesisCall::Generate {
            prompt: prompt.to_string(),
            key: key.clone(),
        });
        self.store.put(&key, prompt.as_bytes().to_vec(), "image/png").await?;
        Ok(self.location.url_for(&key))
    }

    async fn overwrite(&self, prompt: &str, key: &str) -> Result<(), SynthesisError> {
        tokio::task::yield_now().await;
        self.calls.lock().unwrap().push(SynthesisCall::Overwrite {
            prompt: prompt.to_string(),
            key: key.to_string(),
        });
        self.store.put(key, prompt.as_bytes().to_vec(), "image/png").await?;
        Ok(())
    }
}

pub fn highlight(owner_id: &str, book_id: &str, id: &str, text: &str, img_url: Option<&str>) -> Highlight {
    Highlight {
        id: id.to_string(),
        book_id: book_id.to_string(),
        owner_id: owner_id.to_string(),
        text: text.to_string(),
        location: "epubcfi(/6/14!/4/2/1:0)".to_string(),
        img_url: img_url.map(str::to_string),
        created_at: "2024-05-01T10:00:00Z".to_string(),
    }
}
