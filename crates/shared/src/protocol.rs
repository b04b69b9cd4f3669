use serde::{Deserialize, Serialize};

use crate::domain::{CorrespondentId, Document, DocumentTypeId, SearchMode, TagId};

/// Filter and search predicates applied to the document list.
///
/// Compared by value: two filters with the same predicates are the same
/// filter, regardless of where they were built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correspondent: Option<CorrespondentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentTypeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagId>,
}

impl FilterState {
    /// Returns a copy with the search term replaced. An empty term clears it.
    pub fn with_search_text(&self, text: Option<&str>) -> Self {
        let mut next = self.clone();
        next.search_text = text.filter(|t| !t.is_empty()).map(str::to_string);
        next
    }

    /// True when any predicate narrows the list.
    pub fn is_filtering(&self) -> bool {
        self.search_text.is_some()
            || self.correspondent.is_some()
            || self.document_type.is_some()
            || !self.tags.is_empty()
    }
}

/// One page of results, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub count: usize,
    pub results: Vec<Document>,
    /// Page number to request next, `None` once the last page was returned.
    pub next: Option<u32>,
}
