use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::{
    domain::{Correspondent, CorrespondentId, Document, DocumentType, DocumentTypeId},
    error::SourceError,
    protocol::{DocumentPage, FilterState},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::DocumentStore;

/// Where pages of documents come from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// `page` is 1-based.
    async fn fetch_page(
        &self,
        filter: &FilterState,
        page: u32,
        page_size: u32,
    ) -> Result<DocumentPage>;
    async fn correspondents(&self) -> Result<Vec<Correspondent>>;
    async fn document_types(&self) -> Result<Vec<DocumentType>>;
}

#[derive(Default)]
struct StoreState {
    documents: Vec<Document>,
    filter: FilterState,
    /// Bumped whenever the list is replaced or cleared. Appended pages
    /// tagged with an older generation are dropped.
    generation: u64,
    /// Latest first-page request. Only its response may replace the list.
    clear_token: u64,
    next_page: Option<u32>,
    inflight_page: Option<(u64, u32)>,
    correspondents: HashMap<CorrespondentId, Correspondent>,
    document_types: HashMap<DocumentTypeId, DocumentType>,
}

/// Paginating `DocumentStore` over any `DocumentSource`.
pub struct PagedDocumentStore<S: DocumentSource> {
    source: S,
    page_size: u32,
    inner: Mutex<StoreState>,
}

impl<S: DocumentSource> PagedDocumentStore<S> {
    pub fn new(source: S, page_size: u32) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            inner: Mutex::new(StoreState::default()),
        }
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.inner.lock().await.documents.clone()
    }

    pub async fn has_more(&self) -> bool {
        self.inner.lock().await.next_page.is_some()
    }

    pub async fn correspondent(&self, id: CorrespondentId) -> Option<Correspondent> {
        self.inner.lock().await.correspondents.get(&id).cloned()
    }

    pub async fn document_type(&self, id: DocumentTypeId) -> Option<DocumentType> {
        self.inner.lock().await.document_types.get(&id).cloned()
    }

    pub async fn correspondent_count(&self) -> usize {
        self.inner.lock().await.correspondents.len()
    }

    pub async fn document_type_count(&self) -> usize {
        self.inner.lock().await.document_types.len()
    }

    /// Replaces the list with page 1. Until the response lands the current
    /// list, its cursor and its generation stay untouched.
    async fn fetch_first_page(&self) -> Result<bool> {
        let (token, filter) = {
            let mut guard = self.inner.lock().await;
            guard.clear_token += 1;
            (guard.clear_token, guard.filter.clone())
        };

        let result = self.source.fetch_page(&filter, 1, self.page_size).await;

        let mut guard = self.inner.lock().await;
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(err) => return Err(log_failure(err, 1)),
        };
        if guard.clear_token != token {
            debug!(
                "store: dropping superseded first page token={token} current={}",
                guard.clear_token
            );
            return Ok(false);
        }

        guard.generation += 1;
        guard.inflight_page = None;
        guard.documents = fetched.results;
        guard.next_page = fetched.next;
        info!(
            "store: list replaced total={} has_more={}",
            guard.documents.len(),
            guard.next_page.is_some()
        );
        Ok(true)
    }

    async fn fetch_next_page(&self) -> Result<bool> {
        let (generation, filter, page) = {
            let mut guard = self.inner.lock().await;
            let Some(page) = guard.next_page else {
                debug!("store: no further pages");
                return Ok(false);
            };
            let generation = guard.generation;
            if guard.inflight_page == Some((generation, page)) {
                debug!("store: page already in flight page={page} generation={generation}");
                return Ok(false);
            }
            guard.inflight_page = Some((generation, page));
            (generation, guard.filter.clone(), page)
        };

        let result = self
            .source
            .fetch_page(&filter, page, self.page_size)
            .await;

        let mut guard = self.inner.lock().await;
        if guard.inflight_page == Some((generation, page)) {
            guard.inflight_page = None;
        }
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(err) => return Err(log_failure(err, page)),
        };
        if guard.generation != generation {
            debug!(
                "store: dropping stale page page={page} generation={generation} current={}",
                guard.generation
            );
            return Ok(false);
        }

        let received = fetched.results.len();
        guard.documents.extend(fetched.results);
        guard.next_page = fetched.next;
        info!(
            "store: page appended page={page} received={received} total={} has_more={}",
            guard.documents.len(),
            guard.next_page.is_some()
        );
        Ok(true)
    }
}

#[async_trait]
impl<S: DocumentSource> DocumentStore for PagedDocumentStore<S> {
    async fn fetch_documents(&self, clear: bool) -> Result<bool> {
        if clear {
            self.fetch_first_page().await
        } else {
            self.fetch_next_page().await
        }
    }

    async fn fetch_all_correspondents(&self) -> Result<()> {
        let correspondents = self
            .source
            .correspondents()
            .await
            .context("failed to fetch correspondents")?;
        let mut guard = self.inner.lock().await;
        guard.correspondents = correspondents.into_iter().map(|c| (c.id, c)).collect();
        Ok(())
    }

    async fn fetch_all_document_types(&self) -> Result<()> {
        let document_types = self
            .source
            .document_types()
            .await
            .context("failed to fetch document types")?;
        let mut guard = self.inner.lock().await;
        guard.document_types = document_types.into_iter().map(|t| (t.id, t)).collect();
        Ok(())
    }

    async fn filter_state(&self) -> FilterState {
        self.inner.lock().await.filter.clone()
    }

    async fn set_filter_state(&self, filter: FilterState) {
        self.inner.lock().await.filter = filter;
    }

    async fn clear_documents(&self) {
        let mut guard = self.inner.lock().await;
        guard.documents.clear();
        guard.generation += 1;
        guard.clear_token += 1;
        guard.next_page = None;
        guard.inflight_page = None;
    }

    async fn document_count(&self) -> usize {
        self.inner.lock().await.documents.len()
    }
}

fn log_failure(err: anyhow::Error, page: u32) -> anyhow::Error {
    let transient = err
        .downcast_ref::<SourceError>()
        .is_some_and(SourceError::is_transient);
    warn!("store: page fetch failed page={page} transient={transient} error={err}");
    err.context(format!("failed to fetch document page {page}"))
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
