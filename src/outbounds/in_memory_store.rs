use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::services::store::{Document, DocumentFilter, DocumentStore, StoreError};

/// Document store kept in process memory
#[derive(Debug)]
pub struct InMemoryDocumentStore<T: Document> {
    documents: RwLock<HashMap<String, T>>,
}

impl<T: Document> InMemoryDocumentStore<T> {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn matching(&self, filter: &DocumentFilter) -> Vec<T> {
        let mut matching: Vec<T> = self
            .documents
            .read()
            .values()
            .filter(|document| document.matches(filter))
            .cloned()
            .collect();

        // Newest first; ties broken by id so pages are stable.
        matching.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        matching
    }
}

impl<T: Document> Default for InMemoryDocumentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Document> DocumentStore<T> for InMemoryDocumentStore<T> {
    async fn save(&self, document: T) -> Result<(), StoreError> {
        self.documents
            .write()
            .insert(document.id().to_string(), document);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.documents.write().remove(id))
    }

    async fn find(
        &self,
        filter: &DocumentFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<T>, StoreError> {
        let skip = (page.max(1) as usize - 1) * limit as usize;
        Ok(self
            .matching(filter)
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, filter: &DocumentFilter) -> Result<usize, StoreError> {
        Ok(self
            .documents
            .read()
            .values()
            .filter(|document| document.matches(filter))
            .count())
    }
}
