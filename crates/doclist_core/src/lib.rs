use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::FilterState;
use thiserror::Error;

mod controller;
pub mod debounce;
pub mod memory;
pub mod settings;
pub mod store;

pub use controller::{ControllerState, DocumentListController};
pub use debounce::Debouncer;
pub use settings::{load_settings, ControllerSettings, SettingsError};
pub use store::{DocumentSource, PagedDocumentStore};

/// Backing store for the document list. Owns the documents, the pagination
/// cursor and the committed filter; the controller only decides when to call it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `clear = true` replaces the list from the first page, `false` appends
    /// the next page. Safe to call while an earlier call is still pending.
    /// Returns whether the list changed: `false` when there was nothing to
    /// fetch, the page was already in flight, or the response was stale.
    /// On error the list and its cursor are left as they were.
    async fn fetch_documents(&self, clear: bool) -> Result<bool>;
    async fn fetch_all_correspondents(&self) -> Result<()>;
    async fn fetch_all_document_types(&self) -> Result<()>;
    async fn filter_state(&self) -> FilterState;
    async fn set_filter_state(&self, filter: FilterState);
    async fn clear_documents(&self);
    async fn document_count(&self) -> usize;
}

#[async_trait]
pub trait SearchCompletion: Send + Sync {
    async fn search_completion(&self, term: &str) -> Result<Vec<String>>;
}

pub struct MissingSearchCompletion;

#[async_trait]
impl SearchCompletion for MissingSearchCompletion {
    async fn search_completion(&self, term: &str) -> Result<Vec<String>> {
        Err(anyhow!("search completion unavailable for term '{term}'"))
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("document fetch failed (clear={clear}): {source}")]
    FetchFailed {
        clear: bool,
        source: anyhow::Error,
    },
    #[error("search completion failed for '{term}': {source}")]
    SuggestionFailed {
        term: String,
        source: anyhow::Error,
    },
}

/// What a load request did to the list, as far as the view is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Updated,
    /// The fetch failed; the list keeps its last known good contents.
    Unchanged,
    /// Nothing was applied: no fetch was needed, the store already had it
    /// in flight, or its response was superseded.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    LoadingChanged(bool),
    DocumentsCleared,
    DocumentsLoaded { count: usize },
    SuggestionsUpdated(Vec<String>),
    FilterChanged(FilterState),
    ScrollToTop,
    InitialLoadCompleted,
}
