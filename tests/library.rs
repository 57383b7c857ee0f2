//! Concurrency tests for document replacement and result attribution.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use readmate::gateway::{QueryGateway, QueryParameters, StructuredResponse};
use readmate::heading::HeadingRules;
use readmate::library::Library;
use readmate::models::{DocumentFormat, Language, RawDocument};
use readmate::provider::{Provider, ProviderError, ProviderRequest};
use readmate::session::ReaderSession;

/// Blocks every call until released, recording the prompt it was given.
struct GatedProvider {
    entered: Notify,
    release: Notify,
    prompts: Mutex<Vec<String>>,
}

impl GatedProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Provider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.entered.notify_one();
        self.release.notified().await;
        Ok("A slow answer.".to_string())
    }
}

fn session(provider: Arc<GatedProvider>) -> ReaderSession {
    let library = Arc::new(Library::new(HeadingRules::standard(), 1024 * 1024));
    ReaderSession::new(library, QueryGateway::new(provider, "m"), Language::En)
}

fn book(title: &str, body: &str) -> RawDocument {
    RawDocument::new(title, DocumentFormat::PlainText, body.as_bytes())
}

#[tokio::test]
async fn slow_query_keeps_attribution_to_the_old_document() {
    let provider = GatedProvider::new();
    let session = session(provider.clone());

    let old = session
        .load(book("Walden", "Chapter 1 Economy\nbody"), None)
        .await
        .unwrap();
    let old_id = old.document().id;

    let in_flight = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .query(
                    QueryParameters::AssistReading {
                        target_text: "Simplify".into(),
                        action: "explain".into(),
                    },
                    None,
                    None,
                )
                .await
        })
    };

    provider.entered.notified().await;

    let new = session
        .load(book("Leviathan", "Part 1 Of Man\nbody"), None)
        .await
        .unwrap();
    assert!(new.is_committed());
    let new_id = new.document().id;

    provider.release.notify_one();
    let result = in_flight.await.unwrap().unwrap();

    assert_eq!(result.document_id, Some(old_id));
    assert_ne!(result.document_id, Some(new_id));
    assert!(!result.is_current(session.library()));
    assert!(session.library().is_current(new_id));
    assert_eq!(
        result.value,
        StructuredResponse::AssistReading("A slow answer.".into())
    );

    let prompts = provider.prompts.lock().unwrap();
    assert!(prompts[0].contains("Book: \"Walden\""));
    assert!(!prompts[0].contains("Leviathan"));
}

#[tokio::test]
async fn query_without_document_is_unattributed() {
    let provider = GatedProvider::new();
    let session = session(provider.clone());

    let handle = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .query(
                    QueryParameters::RefineInsight {
                        author_view: "a".into(),
                        my_understanding: "mine".into(),
                    },
                    None,
                    None,
                )
                .await
        })
    };
    provider.entered.notified().await;
    provider.release.notify_one();

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.document_id, None);
    assert!(result.is_current(session.library()));
    // "A slow answer." is not a Refinement, so the note comes back unchanged.
    assert_eq!(
        result.value,
        StructuredResponse::RefineInsight(readmate::schema::Refinement {
            refined: "mine".into()
        })
    );
    let prompts = provider.prompts.lock().unwrap();
    assert!(!prompts[0].contains("Book:"));
}

#[tokio::test]
async fn failed_reingestion_keeps_current_document() {
    let session = session(GatedProvider::new());
    let first = session
        .load(book("Walden", "Chapter 1\nbody"), None)
        .await
        .unwrap();

    let broken = RawDocument::new("Broken", DocumentFormat::EpubArchive, &b"not a zip"[..]);
    assert!(session.load(broken, None).await.is_err());

    let current = session.current().unwrap();
    assert_eq!(current.id, first.document().id);
    assert_eq!(current.title, "Walden");
}

#[tokio::test]
async fn late_completion_of_an_older_ingestion_is_superseded() {
    let library = Library::new(HeadingRules::standard(), 1024);
    let rules = HeadingRules::standard();

    let older = library.reserve_ticket();
    let newer = library.reserve_ticket();

    let b = readmate::library::build_document(&book("B", "b"), Language::En, &rules).unwrap();
    let a = readmate::library::build_document(&book("A", "a"), Language::En, &rules).unwrap();

    assert!(library.commit(newer, Arc::new(b)).is_committed());
    let outcome = library.commit(older, Arc::new(a));
    assert!(!outcome.is_committed());
    assert_eq!(library.snapshot().unwrap().title, "B");
}

#[tokio::test]
async fn concurrent_ingestions_settle_on_one_complete_document() {
    let library = Arc::new(Library::new(HeadingRules::standard(), 1024 * 1024));
    let mut handles = Vec::new();
    for n in 0..8 {
        let library = library.clone();
        handles.push(tokio::spawn(async move {
            let body = format!("Chapter 1\nbook {}\nChapter 2\nmore {}", n, n);
            library
                .ingest(book(&format!("Book {}", n), &body), Language::En)
                .await
                .unwrap()
        }));
    }

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().is_committed() {
            committed += 1;
        }
    }
    assert!(committed >= 1);

    let current = library.snapshot().unwrap();
    let n = current.title.trim_start_matches("Book ");
    assert_eq!(current.sections.len(), 2);
    assert_eq!(current.sections[0].content, format!("book {}", n));
    assert_eq!(current.sections[1].content, format!("more {}", n));
}
