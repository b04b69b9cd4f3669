use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use shared::protocol::FilterState;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    debounce::Debouncer, settings::ControllerSettings, ControllerError, ControllerEvent,
    DocumentStore, LoadOutcome, SearchCompletion,
};

/// Snapshot of what the list view renders from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub is_loading: bool,
    pub initial_load_done: bool,
    pub filter_state: FilterState,
    pub search_suggestions: Vec<String>,
    pub debounced_query: String,
    /// Raw search field contents, ahead of the debounced query.
    pub search_text: String,
}

impl ControllerState {
    /// The "no documents found" placeholder is only meaningful once the
    /// first load finished and nothing is loading.
    pub fn shows_empty_placeholder(&self, document_count: usize) -> bool {
        document_count == 0 && !self.is_loading && self.initial_load_done
    }
}

#[derive(Default)]
struct ListState {
    initial_load_started: bool,
    initial_load_done: bool,
    filter_state: FilterState,
    search_suggestions: Vec<String>,
    debounced_query: String,
    search_text: String,
    suggestion_seq: u64,
    /// Bumped for every accepted filter change; a commit that is no longer
    /// the latest stops before touching the store's filter.
    filter_seq: u64,
    /// List length whose lookahead threshold already requested a page.
    lookahead_fired_for: Option<usize>,
}

/// Holds the spinner on for as long as any spinner-visible fetch is running.
struct LoadingGuard<'a> {
    active: &'a AtomicUsize,
    events: &'a broadcast::Sender<ControllerEvent>,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(
        active: &'a AtomicUsize,
        events: &'a broadcast::Sender<ControllerEvent>,
    ) -> Self {
        if active.fetch_add(1, Ordering::SeqCst) == 0 {
            let _ = events.send(ControllerEvent::LoadingChanged(true));
        }
        Self { active, events }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.events.send(ControllerEvent::LoadingChanged(false));
        }
    }
}

pub struct DocumentListController {
    store: Arc<dyn DocumentStore>,
    completion: Arc<dyn SearchCompletion>,
    lookahead: usize,
    debouncer: Debouncer,
    loading: AtomicUsize,
    inner: Mutex<ListState>,
    /// Serialises clear + set-filter on the store across concurrent commits.
    filter_commit: Mutex<()>,
    events: broadcast::Sender<ControllerEvent>,
}

impl DocumentListController {
    /// Builds a controller whose committed filter starts out as the store's.
    pub async fn new(
        store: Arc<dyn DocumentStore>,
        completion: Arc<dyn SearchCompletion>,
        settings: &ControllerSettings,
    ) -> Arc<Self> {
        let filter_state = store.filter_state().await;
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            store,
            completion,
            lookahead: settings.lookahead.max(1),
            debouncer: Debouncer::new(settings.debounce()),
            loading: AtomicUsize::new(0),
            inner: Mutex::new(ListState {
                filter_state,
                ..ListState::default()
            }),
            filter_commit: Mutex::new(()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    pub async fn state(&self) -> ControllerState {
        let guard = self.inner.lock().await;
        ControllerState {
            is_loading: self.is_loading(),
            initial_load_done: guard.initial_load_done,
            filter_state: guard.filter_state.clone(),
            search_suggestions: guard.search_suggestions.clone(),
            debounced_query: guard.debounced_query.clone(),
            search_text: guard.search_text.clone(),
        }
    }

    pub async fn shows_empty_placeholder(&self) -> bool {
        let count = self.store.document_count().await;
        self.state().await.shows_empty_placeholder(count)
    }

    /// Filter indicator for the toolbar.
    pub async fn is_filtering(&self) -> bool {
        self.inner.lock().await.filter_state.is_filtering()
    }

    /// First full load. Later calls do nothing.
    pub async fn initial_load(&self) -> LoadOutcome {
        {
            let mut guard = self.inner.lock().await;
            if guard.initial_load_started {
                debug!("doclist: initial load already issued");
                return LoadOutcome::Skipped;
            }
            guard.initial_load_started = true;
        }

        let outcome = self.load(true, true).await;

        self.inner.lock().await.initial_load_done = true;
        let _ = self.events.send(ControllerEvent::InitialLoadCompleted);
        outcome
    }

    /// Pull-to-refresh: replaces the list from the first page.
    pub async fn refresh(&self) -> LoadOutcome {
        self.load(true, true).await
    }

    /// Appends the next page without showing the spinner.
    pub async fn load_more(&self) -> LoadOutcome {
        self.load(false, false).await
    }

    /// Called as rows become visible. Requests the next page when the row at
    /// `total - lookahead` appears, at most once per list length.
    pub async fn on_item_appeared(&self, index: usize, total: usize) -> LoadOutcome {
        let Some(threshold) = total.checked_sub(self.lookahead) else {
            return LoadOutcome::Skipped;
        };
        if index != threshold {
            return LoadOutcome::Skipped;
        }

        {
            let mut guard = self.inner.lock().await;
            if guard.lookahead_fired_for == Some(total) {
                return LoadOutcome::Skipped;
            }
            guard.lookahead_fired_for = Some(total);
        }

        debug!("doclist: lookahead reached index={index} total={total}");
        self.load_more().await
    }

    pub async fn on_filter_changed(&self, filter: FilterState) -> LoadOutcome {
        let seq = {
            let mut guard = self.inner.lock().await;
            if guard.filter_state == filter {
                debug!("doclist: filter unchanged");
                return LoadOutcome::Skipped;
            }
            guard.filter_state = filter.clone();
            guard.lookahead_fired_for = None;
            guard.filter_seq += 1;
            guard.filter_seq
        };

        {
            let _commit = self.filter_commit.lock().await;
            if !self.is_current_filter(seq).await {
                debug!("doclist: filter change superseded seq={seq}");
                return LoadOutcome::Skipped;
            }
            self.store.clear_documents().await;
            if !self.is_current_filter(seq).await {
                debug!("doclist: filter change superseded seq={seq}");
                return LoadOutcome::Skipped;
            }
            self.store.set_filter_state(filter.clone()).await;
        }

        info!(
            "doclist: filter changed filtering={} search={:?}",
            filter.is_filtering(),
            filter.search_text
        );
        let _ = self.events.send(ControllerEvent::DocumentsCleared);
        let _ = self.events.send(ControllerEvent::FilterChanged(filter));
        self.refresh().await
    }

    async fn is_current_filter(&self, seq: u64) -> bool {
        self.inner.lock().await.filter_seq == seq
    }

    /// Picks up a filter edited directly on the store, e.g. by a filter sheet.
    pub async fn sync_filter_from_store(&self) -> LoadOutcome {
        let filter = self.store.filter_state().await;
        self.on_filter_changed(filter).await
    }

    /// Records the live search text and schedules a debounced commit.
    pub async fn on_search_text_changed(self: &Arc<Self>, raw: &str) {
        self.inner.lock().await.search_text = raw.to_string();

        let controller = Arc::clone(self);
        let text = raw.to_string();
        self.debouncer
            .schedule(async move {
                controller.commit_search_text(text).await;
            })
            .await;
    }

    pub async fn on_search_submit(&self, query: &str) -> LoadOutcome {
        let current = self.inner.lock().await.filter_state.clone();
        let next = current.with_search_text(Some(query));
        if next == current {
            debug!("doclist: search already applied query={query}");
            return LoadOutcome::Skipped;
        }
        self.on_filter_changed(next).await
    }

    /// Submits whatever is currently in the search field.
    pub async fn submit_current_search(&self) -> LoadOutcome {
        let text = self.inner.lock().await.search_text.clone();
        self.on_search_submit(&text).await
    }

    async fn commit_search_text(&self, text: String) {
        let seq = {
            let mut guard = self.inner.lock().await;
            if guard.debounced_query == text {
                return;
            }
            guard.debounced_query = text.clone();
            guard.suggestion_seq += 1;
            if text.is_empty() {
                guard.search_suggestions.clear();
            }
            guard.suggestion_seq
        };

        if text.is_empty() {
            // Only reachable as a non-empty -> empty transition.
            let _ = self
                .events
                .send(ControllerEvent::SuggestionsUpdated(Vec::new()));
            let _ = self.events.send(ControllerEvent::ScrollToTop);

            let current = self.inner.lock().await.filter_state.clone();
            let cleared = current.with_search_text(None);
            if cleared == current {
                self.refresh().await;
            } else {
                self.on_filter_changed(cleared).await;
            }
            return;
        }

        let suggestions = match self.completion.search_completion(&text).await {
            Ok(suggestions) => suggestions,
            Err(source) => {
                let err = ControllerError::SuggestionFailed { term: text, source };
                warn!("doclist: {err}");
                return;
            }
        };

        let mut guard = self.inner.lock().await;
        if guard.suggestion_seq != seq {
            debug!(
                "doclist: discarding stale suggestions seq={seq} latest={}",
                guard.suggestion_seq
            );
            return;
        }
        guard.search_suggestions = suggestions.clone();
        drop(guard);
        let _ = self
            .events
            .send(ControllerEvent::SuggestionsUpdated(suggestions));
    }

    async fn load(&self, clear: bool, show_loading: bool) -> LoadOutcome {
        let _loading =
            show_loading.then(|| LoadingGuard::acquire(&self.loading, &self.events));

        let (documents, correspondents, document_types) = futures::join!(
            self.store.fetch_documents(clear),
            self.store.fetch_all_correspondents(),
            self.store.fetch_all_document_types(),
        );
        if let Err(err) = correspondents {
            warn!("doclist: correspondent side-load failed: {err:#}");
        }
        if let Err(err) = document_types {
            warn!("doclist: document type side-load failed: {err:#}");
        }

        match documents {
            Ok(true) => {
                if clear {
                    self.inner.lock().await.lookahead_fired_for = None;
                }
                let count = self.store.document_count().await;
                debug!("doclist: load complete clear={clear} count={count}");
                let _ = self.events.send(ControllerEvent::DocumentsLoaded { count });
                LoadOutcome::Updated
            }
            Ok(false) => {
                debug!("doclist: store applied nothing clear={clear}");
                LoadOutcome::Skipped
            }
            Err(source) => {
                if !clear {
                    self.inner.lock().await.lookahead_fired_for = None;
                }
                let err = ControllerError::FetchFailed { clear, source };
                warn!("doclist: {err:#}");
                LoadOutcome::Unchanged
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
