use super::*;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::anyhow;
use shared::{domain::DocumentId, error::ErrorCode};
use tokio::sync::oneshot;

use crate::memory::InMemoryDocumentSource;

struct GatedSource {
    inner: InMemoryDocumentSource,
    calls: Mutex<Vec<(u32, Option<String>)>>,
    gates: Mutex<HashMap<u32, oneshot::Receiver<()>>>,
    fail: AtomicBool,
}

impl GatedSource {
    fn synthetic(count: usize) -> Self {
        Self {
            inner: InMemoryDocumentSource::synthetic(count),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    async fn gate(&self, page: u32) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().await.insert(page, rx);
        tx
    }
}

#[async_trait]
impl DocumentSource for GatedSource {
    async fn fetch_page(
        &self,
        filter: &FilterState,
        page: u32,
        page_size: u32,
    ) -> Result<DocumentPage> {
        self.calls
            .lock()
            .await
            .push((page, filter.search_text.clone()));
        let gate = self.gates.lock().await.remove(&page);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::new(ErrorCode::Unavailable, "source offline").into());
        }
        self.inner.fetch_page(filter, page, page_size).await
    }

    async fn correspondents(&self) -> Result<Vec<Correspondent>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("source offline"));
        }
        self.inner.correspondents().await
    }

    async fn document_types(&self) -> Result<Vec<DocumentType>> {
        self.inner.document_types().await
    }
}

async fn calls(store: &PagedDocumentStore<GatedSource>) -> Vec<(u32, Option<String>)> {
    store.source.calls.lock().await.clone()
}

async fn wait_for_calls(store: &PagedDocumentStore<GatedSource>, count: usize) {
    for _ in 0..100 {
        if calls(store).await.len() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("source never saw {count} page requests");
}

#[tokio::test]
async fn pages_append_in_server_order_until_exhausted() {
    let store = PagedDocumentStore::new(GatedSource::synthetic(60), 25);

    assert!(store.fetch_documents(true).await.expect("page 1"));
    assert_eq!(store.document_count().await, 25);
    assert!(store.has_more().await);

    assert!(store.fetch_documents(false).await.expect("page 2"));
    assert!(store.fetch_documents(false).await.expect("page 3"));
    assert_eq!(store.document_count().await, 60);
    assert!(!store.has_more().await);

    assert!(!store.fetch_documents(false).await.expect("no-op"));
    assert_eq!(calls(&store).await.len(), 3);

    let ids = store
        .documents()
        .await
        .into_iter()
        .map(|d| d.id)
        .collect::<Vec<_>>();
    let expected = (1..=60).rev().map(DocumentId).collect::<Vec<_>>();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn concurrent_appends_for_same_page_issue_one_request() {
    let store = Arc::new(PagedDocumentStore::new(GatedSource::synthetic(60), 25));
    store.fetch_documents(true).await.expect("page 1");

    let release = store.source.gate(2).await;
    let first = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_documents(false).await }
    });
    wait_for_calls(&store, 2).await;

    assert!(!store.fetch_documents(false).await.expect("deduplicated append"));
    release.send(()).expect("release page 2");
    assert!(first.await.expect("join").expect("page 2"));

    assert_eq!(
        calls(&store).await.iter().map(|c| c.0).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(store.document_count().await, 50);
}

#[tokio::test]
async fn page_from_superseded_list_is_dropped() {
    let store = Arc::new(PagedDocumentStore::new(GatedSource::synthetic(60), 25));
    store.fetch_documents(true).await.expect("page 1");

    let release = store.source.gate(2).await;
    let stale = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_documents(false).await }
    });
    wait_for_calls(&store, 2).await;

    store.clear_documents().await;
    assert_eq!(store.document_count().await, 0);
    store
        .set_filter_state(FilterState::default().with_search_text(Some("invoice")))
        .await;
    store.fetch_documents(true).await.expect("filtered page 1");

    release.send(()).expect("release stale page");
    assert!(!stale.await.expect("join").expect("stale page"));

    let documents = store.documents().await;
    assert!(!documents.is_empty());
    assert!(documents.iter().all(|d| d.title.starts_with("invoice")));
    assert!(!store.has_more().await);
}

#[tokio::test]
async fn request_uses_filter_committed_at_issue_time() {
    let store = Arc::new(PagedDocumentStore::new(GatedSource::synthetic(40), 25));
    store
        .set_filter_state(FilterState::default().with_search_text(Some("tax")))
        .await;

    let release = store.source.gate(1).await;
    let pending = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_documents(true).await }
    });
    wait_for_calls(&store, 1).await;

    store
        .set_filter_state(FilterState::default().with_search_text(Some("receipt")))
        .await;
    release.send(()).expect("release page 1");
    pending.await.expect("join").expect("page 1");

    assert_eq!(calls(&store).await, vec![(1, Some("tax".to_string()))]);
    assert!(store
        .documents()
        .await
        .iter()
        .all(|d| d.title.starts_with("tax")));
}

#[tokio::test]
async fn failed_fetch_leaves_list_untouched() {
    let store = PagedDocumentStore::new(GatedSource::synthetic(60), 25);
    store.fetch_documents(true).await.expect("page 1");
    let before = store.documents().await;

    store.source.fail.store(true, Ordering::SeqCst);
    let err = store.fetch_documents(false).await.expect_err("offline");
    let source_err = err.downcast_ref::<SourceError>().expect("source error");
    assert!(source_err.is_transient());
    assert_eq!(store.documents().await, before);

    // The failed page can be requested again.
    store.source.fail.store(false, Ordering::SeqCst);
    store.fetch_documents(false).await.expect("retry page 2");
    assert_eq!(store.document_count().await, 50);
}

#[tokio::test]
async fn failed_refresh_keeps_paging_from_current_list() {
    let store = PagedDocumentStore::new(GatedSource::synthetic(60), 25);
    store.fetch_documents(true).await.expect("page 1");

    store.source.fail.store(true, Ordering::SeqCst);
    store.fetch_documents(true).await.expect_err("offline refresh");
    assert_eq!(store.document_count().await, 25);
    assert!(store.has_more().await);

    store.source.fail.store(false, Ordering::SeqCst);
    assert!(store.fetch_documents(false).await.expect("page 2"));
    assert_eq!(store.document_count().await, 50);
    assert_eq!(
        calls(&store).await.iter().map(|c| c.0).collect::<Vec<_>>(),
        vec![1, 1, 2]
    );
}

#[tokio::test]
async fn append_in_flight_survives_failed_refresh() {
    let store = Arc::new(PagedDocumentStore::new(GatedSource::synthetic(60), 25));
    store.fetch_documents(true).await.expect("page 1");

    let release = store.source.gate(2).await;
    let append = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_documents(false).await }
    });
    wait_for_calls(&store, 2).await;

    store.source.fail.store(true, Ordering::SeqCst);
    store.fetch_documents(true).await.expect_err("offline refresh");
    store.source.fail.store(false, Ordering::SeqCst);

    release.send(()).expect("release page 2");
    assert!(append.await.expect("join").expect("page 2"));
    assert_eq!(store.document_count().await, 50);
}

#[tokio::test]
async fn older_refresh_response_is_dropped() {
    let store = Arc::new(PagedDocumentStore::new(GatedSource::synthetic(60), 25));

    let release = store.source.gate(1).await;
    let older = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_documents(true).await }
    });
    wait_for_calls(&store, 1).await;

    store
        .set_filter_state(FilterState::default().with_search_text(Some("invoice")))
        .await;
    assert!(store.fetch_documents(true).await.expect("newer page 1"));
    let newer = store.documents().await;

    release.send(()).expect("release older page 1");
    assert!(!older.await.expect("join").expect("older page 1"));

    assert_eq!(store.documents().await, newer);
    assert!(newer.iter().all(|d| d.title.starts_with("invoice")));
}

#[tokio::test]
async fn side_loads_fill_reference_lookups() {
    let store = PagedDocumentStore::new(GatedSource::synthetic(3), 25);

    store
        .fetch_all_correspondents()
        .await
        .expect("correspondents");
    store
        .fetch_all_document_types()
        .await
        .expect("document types");

    assert_eq!(store.correspondent_count().await, 3);
    assert_eq!(store.document_type_count().await, 3);
    assert_eq!(
        store
            .correspondent(CorrespondentId(1))
            .await
            .map(|c| c.name),
        Some("Acme Corp".to_string())
    );
    assert_eq!(
        store
            .document_type(DocumentTypeId(2))
            .await
            .map(|t| t.name),
        Some("Letter".to_string())
    );

    store.source.fail.store(true, Ordering::SeqCst);
    assert!(store.fetch_all_correspondents().await.is_err());
    assert_eq!(store.correspondent_count().await, 3);
}
