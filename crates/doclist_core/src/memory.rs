//! In-memory collaborators: a fixed document corpus served in pages and a
//! word-frequency completion index built from the same corpus.

use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use shared::{
    domain::{
        Correspondent, CorrespondentId, Document, DocumentId, DocumentType, DocumentTypeId,
        SearchMode, TagId,
    },
    error::{ErrorCode, SourceError},
    protocol::{DocumentPage, FilterState},
};

use crate::{store::DocumentSource, SearchCompletion};

const SYNTHETIC_TOPICS: &[&str] = &[
    "invoice", "receipt", "contract", "statement", "insurance", "tax", "payslip", "warranty",
];
const SYNTHETIC_CORRESPONDENTS: &[&str] = &["Acme Corp", "City Utilities", "Northwind Bank"];
const SYNTHETIC_TYPES: &[&str] = &["Invoice", "Letter", "Receipt"];

pub struct InMemoryDocumentSource {
    documents: Vec<Document>,
    correspondents: Vec<Correspondent>,
    document_types: Vec<DocumentType>,
    latency: Option<Duration>,
}

impl InMemoryDocumentSource {
    pub fn new(
        documents: Vec<Document>,
        correspondents: Vec<Correspondent>,
        document_types: Vec<DocumentType>,
    ) -> Self {
        Self {
            documents,
            correspondents,
            document_types,
            latency: None,
        }
    }

    /// Deterministic corpus of `count` documents spread across a few topics,
    /// correspondents and document types.
    pub fn synthetic(count: usize) -> Self {
        let correspondents = SYNTHETIC_CORRESPONDENTS
            .iter()
            .enumerate()
            .map(|(i, name)| Correspondent {
                id: CorrespondentId(i as i64 + 1),
                name: name.to_string(),
            })
            .collect::<Vec<_>>();
        let document_types = SYNTHETIC_TYPES
            .iter()
            .enumerate()
            .map(|(i, name)| DocumentType {
                id: DocumentTypeId(i as i64 + 1),
                name: name.to_string(),
            })
            .collect::<Vec<_>>();

        let base = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(19_358);
        let documents = (0..count)
            .map(|i| {
                let topic = SYNTHETIC_TOPICS[i % SYNTHETIC_TOPICS.len()];
                let correspondent = &correspondents[i % correspondents.len()];
                Document {
                    id: DocumentId(i as i64 + 1),
                    title: format!("{topic} {:04}", i + 1),
                    content: format!("{topic} from {} number {}", correspondent.name, i + 1),
                    correspondent: Some(correspondent.id),
                    document_type: Some(document_types[i % document_types.len()].id),
                    tags: vec![TagId((i % 4) as i64 + 1)],
                    created: base + TimeDelta::days(i as i64),
                }
            })
            .collect();

        Self::new(documents, correspondents, document_types)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn matching(&self, filter: &FilterState) -> Vec<&Document> {
        let needle = filter.search_text.as_deref().map(str::to_lowercase);
        let mut matched = self
            .documents
            .iter()
            .filter(|doc| {
                let text_ok = match &needle {
                    None => true,
                    Some(needle) => {
                        doc.title.to_lowercase().contains(needle)
                            || (filter.search_mode == SearchMode::TitleContent
                                && doc.content.to_lowercase().contains(needle))
                    }
                };
                text_ok
                    && filter
                        .correspondent
                        .map_or(true, |c| doc.correspondent == Some(c))
                    && filter
                        .document_type
                        .map_or(true, |t| doc.document_type == Some(t))
                    && filter.tags.iter().all(|tag| doc.tags.contains(tag))
            })
            .collect::<Vec<_>>();
        // Newest first, like the document API's default ordering.
        matched.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        matched
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn fetch_page(
        &self,
        filter: &FilterState,
        page: u32,
        page_size: u32,
    ) -> Result<DocumentPage> {
        self.simulate_latency().await;
        if page == 0 {
            return Err(SourceError::new(ErrorCode::Validation, "pages are 1-based").into());
        }

        let matched = self.matching(filter);
        let page_size = page_size.max(1) as usize;
        let start = (page as usize - 1) * page_size;
        if start >= matched.len() && page > 1 {
            return Err(SourceError::new(ErrorCode::NotFound, format!("invalid page {page}")).into());
        }
        let end = (start + page_size).min(matched.len());

        Ok(DocumentPage {
            count: matched.len(),
            results: matched[start..end].iter().map(|doc| (*doc).clone()).collect(),
            next: (end < matched.len()).then_some(page + 1),
        })
    }

    async fn correspondents(&self) -> Result<Vec<Correspondent>> {
        self.simulate_latency().await;
        Ok(self.correspondents.clone())
    }

    async fn document_types(&self) -> Result<Vec<DocumentType>> {
        self.simulate_latency().await;
        Ok(self.document_types.clone())
    }
}

/// Completes the last word of a term against corpus vocabulary, most
/// frequent words first.
pub struct CorpusCompletion {
    frequencies: HashMap<String, usize>,
    limit: usize,
}

impl CorpusCompletion {
    pub fn from_documents(documents: &[Document], limit: usize) -> Self {
        let mut frequencies = HashMap::new();
        for doc in documents {
            for word in doc
                .title
                .split_whitespace()
                .chain(doc.content.split_whitespace())
            {
                let word = word
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase();
                if word.len() > 1 {
                    *frequencies.entry(word).or_insert(0) += 1;
                }
            }
        }
        Self { frequencies, limit }
    }

    pub fn complete(&self, term: &str) -> Vec<String> {
        let lowered = term.to_lowercase();
        let (prefix, last) = match lowered.rsplit_once(char::is_whitespace) {
            Some((head, last)) => (Some(head.trim_end()), last),
            None => (None, lowered.as_str()),
        };
        if last.is_empty() {
            return Vec::new();
        }

        let mut candidates = self
            .frequencies
            .iter()
            .filter(|(word, _)| word.starts_with(last))
            .collect::<Vec<_>>();
        candidates.sort_by(|(a_word, a_count), (b_word, b_count)| {
            b_count.cmp(a_count).then_with(|| a_word.cmp(b_word))
        });

        candidates
            .into_iter()
            .take(self.limit)
            .map(|(word, _)| match prefix {
                Some(prefix) if !prefix.is_empty() => format!("{prefix} {word}"),
                _ => word.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl SearchCompletion for CorpusCompletion {
    async fn search_completion(&self, term: &str) -> Result<Vec<String>> {
        Ok(self.complete(term))
    }
}
