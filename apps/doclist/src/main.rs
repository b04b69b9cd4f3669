use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use doclist_core::{
    load_settings,
    memory::{CorpusCompletion, InMemoryDocumentSource},
    settings::DEFAULT_SETTINGS_FILE,
    ControllerEvent, DocumentListController, DocumentStore, PagedDocumentStore,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Drives a scripted browsing session against a synthetic document corpus.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long, default_value_t = 120)]
    documents: usize,
    #[arg(long, default_value = "invoice")]
    query: String,
    /// How many times to scroll to the end of the list.
    #[arg(long, default_value_t = 2)]
    pages: usize,
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let settings = load_settings(&args.config)
        .with_context(|| format!("failed to load settings from {}", args.config.display()))?;
    info!(
        "doclist: settings debounce_ms={} lookahead={} page_size={}",
        settings.debounce_ms, settings.lookahead, settings.page_size
    );

    let mut source = InMemoryDocumentSource::synthetic(args.documents);
    if args.latency_ms > 0 {
        source = source.with_latency(Duration::from_millis(args.latency_ms));
    }
    let completion = Arc::new(CorpusCompletion::from_documents(
        source.documents(),
        settings.suggestion_limit,
    ));
    let store = Arc::new(PagedDocumentStore::new(source, settings.page_size));
    let controller =
        DocumentListController::new(store.clone(), completion, &settings).await;

    let mut events = controller.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ControllerEvent::SuggestionsUpdated(suggestions) => {
                    println!("suggestions: {}", suggestions.join(", "));
                }
                ControllerEvent::ScrollToTop => println!("-- scroll to top --"),
                other => debug!("doclist: event {other:?}"),
            }
        }
    });

    controller.initial_load().await;
    println!("loaded {} documents", store.document_count().await);

    let settle = settings.debounce() * 2 + Duration::from_millis(args.latency_ms);
    let mut typed = String::new();
    for ch in args.query.chars() {
        typed.push(ch);
        controller.on_search_text_changed(&typed).await;
        tokio::time::sleep(settings.debounce() / 4).await;
    }
    tokio::time::sleep(settle).await;

    controller.submit_current_search().await;
    println!(
        "search '{}' matched {} documents (filtering={})",
        args.query,
        store.document_count().await,
        controller.is_filtering().await
    );

    controller.on_search_text_changed("").await;
    tokio::time::sleep(settle).await;

    for _ in 0..args.pages {
        let total = store.document_count().await;
        for index in 0..total {
            controller.on_item_appeared(index, total).await;
        }
    }
    println!(
        "after scrolling: {} documents, more available: {}",
        store.document_count().await,
        store.has_more().await
    );

    let documents = store.documents().await;
    for doc in documents.iter().take(3) {
        let correspondent = match doc.correspondent {
            Some(id) => store.correspondent(id).await.map(|c| c.name),
            None => None,
        };
        println!(
            "{} {} [{}] {}",
            doc.created.format("%Y-%m-%d"),
            doc.title,
            correspondent.as_deref().unwrap_or("-"),
            serde_json::to_string(&doc.tags)?
        );
    }

    let state = controller.state().await;
    println!(
        "state: loading={} initial_load_done={} query='{}' empty_placeholder={}",
        state.is_loading,
        state.initial_load_done,
        state.debounced_query,
        controller.shows_empty_placeholder().await
    );

    drop(controller);
    printer.abort();
    Ok(())
}
