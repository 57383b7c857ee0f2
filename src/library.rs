//! The currently loaded document and its atomic replacement.
//!
//! Ingestion (bytes → text → sections) is the only shared mutable state.
//! A finished [`LoadedDocument`] is published as a whole through a
//! `tokio::sync::watch` channel; readers clone the `Arc` and keep a frozen
//! snapshot for as long as they need it.
//!
//! Each ingestion reserves a ticket before extraction starts. On completion
//! it is committed only if its ticket is newer than the committed one, so an
//! older upload that finishes late can never overwrite a newer one. Failed
//! ingestions commit nothing.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::extract::{extract_text, ExtractError};
use crate::heading::HeadingRules;
use crate::models::{Language, LoadedDocument, RawDocument};
use crate::segment::segment_with;

/// Published library state.
#[derive(Debug, Clone, Default)]
pub struct LibraryState {
    /// Ticket of the ingestion that produced `document` (0 = none yet).
    pub ticket: u64,
    pub document: Option<Arc<LoadedDocument>>,
}

/// Ordering token drawn when an ingestion starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IngestTicket(u64);

/// What happened to a successfully extracted document.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The document is now current.
    Committed(Arc<LoadedDocument>),
    /// A newer ingestion was committed first; this result was discarded.
    Superseded(Arc<LoadedDocument>),
}

impl IngestOutcome {
    /// The extracted document, whether or not it was committed.
    pub fn document(&self) -> &Arc<LoadedDocument> {
        match self {
            IngestOutcome::Committed(doc) | IngestOutcome::Superseded(doc) => doc,
        }
    }

    /// True when this ingestion replaced the current document.
    pub fn is_committed(&self) -> bool {
        matches!(self, IngestOutcome::Committed(_))
    }
}

/// Holds the current document and replaces it atomically.
///
/// Readers take [`snapshot`](Library::snapshot)s and never observe a
/// half-built document. Concurrent ingestions commit in ticket order; an
/// ingestion finishing after a newer one has committed is superseded.
pub struct Library {
    state: watch::Sender<LibraryState>,
    next_ticket: AtomicU64,
    rules: Arc<HeadingRules>,
    max_upload_bytes: usize,
}

impl Library {
    /// Empty library segmenting with `rules`; inputs above
    /// `max_upload_bytes` are refused.
    pub fn new(rules: HeadingRules, max_upload_bytes: usize) -> Self {
        let (state, _) = watch::channel(LibraryState::default());
        Self {
            state,
            next_ticket: AtomicU64::new(0),
            rules: Arc::new(rules),
            max_upload_bytes,
        }
    }

    /// Frozen view of the current document, if any.
    pub fn snapshot(&self) -> Option<Arc<LoadedDocument>> {
        self.state.borrow().document.clone()
    }

    /// Id of the current document.
    pub fn current_id(&self) -> Option<Uuid> {
        self.state.borrow().document.as_ref().map(|d| d.id)
    }

    /// Whether `id` names the current document.
    pub fn is_current(&self, id: Uuid) -> bool {
        self.current_id() == Some(id)
    }

    /// Receiver notified on every committed replacement.
    pub fn subscribe(&self) -> watch::Receiver<LibraryState> {
        self.state.subscribe()
    }

    /// Extracts and segments `raw` off the async runtime, then commits it.
    pub async fn ingest(
        &self,
        raw: RawDocument,
        language: Language,
    ) -> Result<IngestOutcome, ExtractError> {
        if raw.bytes.len() > self.max_upload_bytes {
            return Err(ExtractError::TooLarge {
                size: raw.bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        let ticket = self.reserve_ticket();
        let rules = self.rules.clone();
        let title = raw.title.clone();
        let built = tokio::task::spawn_blocking(move || build_document(&raw, language, &rules))
            .await
            .map_err(|e| ExtractError::CorruptDocument(format!("extraction aborted: {}", e)))?;

        match built {
            Ok(document) => Ok(self.commit(ticket, Arc::new(document))),
            Err(e) => {
                tracing::warn!(title = %title, error = %e, "ingestion failed; keeping current document");
                Err(e)
            }
        }
    }

    /// Draws the next ticket. Later calls always get larger tickets.
    pub fn reserve_ticket(&self) -> IngestTicket {
        IngestTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Publishes `document` unless a newer ticket is already committed.
    pub fn commit(&self, ticket: IngestTicket, document: Arc<LoadedDocument>) -> IngestOutcome {
        let committed = self.state.send_if_modified(|state| {
            if ticket.0 > state.ticket {
                state.ticket = ticket.0;
                state.document = Some(document.clone());
                true
            } else {
                false
            }
        });

        if committed {
            tracing::info!(
                id = %document.id,
                title = %document.title,
                format = %document.format,
                sections = document.sections.len(),
                "document loaded"
            );
            IngestOutcome::Committed(document)
        } else {
            tracing::warn!(
                id = %document.id,
                title = %document.title,
                "ingestion superseded by a newer upload; result discarded"
            );
            IngestOutcome::Superseded(document)
        }
    }
}

/// Runs the extraction and segmentation pipeline for one upload.
pub fn build_document(
    raw: &RawDocument,
    language: Language,
    rules: &HeadingRules,
) -> Result<LoadedDocument, ExtractError> {
    let text = extract_text(raw)?;
    let sections = segment_with(&text, language, rules);
    Ok(LoadedDocument {
        id: Uuid::new_v4(),
        title: raw.title.clone(),
        format: raw.format,
        fingerprint: raw.fingerprint(),
        language,
        text,
        sections,
        loaded_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentFormat;

    fn library() -> Library {
        Library::new(HeadingRules::standard(), 1024)
    }

    fn text_doc(title: &str, body: &str) -> RawDocument {
        RawDocument::new(title, DocumentFormat::PlainText, body.as_bytes())
    }

    #[tokio::test]
    async fn ingest_commits_and_snapshots() {
        let lib = library();
        assert!(lib.snapshot().is_none());
        let outcome = lib
            .ingest(text_doc("Walden", "Chapter 1\nEconomy"), Language::En)
            .await
            .unwrap();
        assert!(outcome.is_committed());
        let snap = lib.snapshot().unwrap();
        assert_eq!(snap.title, "Walden");
        assert_eq!(snap.sections.len(), 1);
        assert!(lib.is_current(snap.id));
    }

    #[tokio::test]
    async fn failed_ingestion_keeps_previous_document() {
        let lib = library();
        lib.ingest(text_doc("Good", "body"), Language::En).await.unwrap();
        let before = lib.current_id().unwrap();

        let bad = RawDocument::new("Bad", DocumentFormat::Pdf, &b"not a pdf"[..]);
        assert!(lib.ingest(bad, Language::En).await.is_err());
        assert_eq!(lib.current_id(), Some(before));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let lib = library();
        let big = text_doc("Big", &"x".repeat(2048));
        assert!(matches!(
            lib.ingest(big, Language::En).await,
            Err(ExtractError::TooLarge { size: 2048, limit: 1024 })
        ));
        assert!(lib.snapshot().is_none());
    }

    #[test]
    fn older_ticket_cannot_overwrite_newer_commit() {
        let lib = library();
        let rules = HeadingRules::standard();
        let first = lib.reserve_ticket();
        let second = lib.reserve_ticket();
        assert!(second > first);

        let newer = Arc::new(build_document(&text_doc("B", "b"), Language::En, &rules).unwrap());
        let older = Arc::new(build_document(&text_doc("A", "a"), Language::En, &rules).unwrap());

        assert!(lib.commit(second, newer.clone()).is_committed());
        assert!(!lib.commit(first, older).is_committed());
        assert_eq!(lib.current_id(), Some(newer.id));
    }

    #[test]
    fn in_order_completion_takes_the_latest() {
        let lib = library();
        let rules = HeadingRules::standard();
        let first = lib.reserve_ticket();
        let second = lib.reserve_ticket();
        let a = Arc::new(build_document(&text_doc("A", "a"), Language::En, &rules).unwrap());
        let b = Arc::new(build_document(&text_doc("B", "b"), Language::En, &rules).unwrap());
        assert!(lib.commit(first, a).is_committed());
        assert!(lib.commit(second, b.clone()).is_committed());
        assert_eq!(lib.snapshot().unwrap().title, "B");
    }

    #[tokio::test]
    async fn subscribers_see_replacements() {
        let lib = library();
        let mut rx = lib.subscribe();
        lib.ingest(text_doc("Walden", "x"), Language::En).await.unwrap();
        rx.changed().await.unwrap();
        let state = rx.borrow().clone();
        assert_eq!(state.ticket, 1);
        assert_eq!(state.document.unwrap().title, "Walden");
    }
}
