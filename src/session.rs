//! A reading session: the shared [`Library`] plus a [`QueryGateway`].
//!
//! Every query captures a snapshot of the current document before it is
//! dispatched. The reply is tagged with that document's id, so a caller can
//! tell whether a result still belongs to what is on screen after the
//! document was replaced mid-flight.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::extract::ExtractError;
use crate::gateway::{QueryGateway, QueryParameters, StructuredQuery, StructuredResponse};
use crate::library::{IngestOutcome, Library};
use crate::models::{Language, LoadedDocument, RawDocument};
use crate::provider::{Provider, ProviderError};

/// A value tagged with the document it was computed against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attributed<T> {
    /// `None` when no document was loaded at dispatch time.
    pub document_id: Option<Uuid>,
    #[serde(flatten)]
    pub value: T,
}

impl<T> Attributed<T> {
    /// True if the result was computed against the library's current document.
    pub fn is_current(&self, library: &Library) -> bool {
        library.current_id() == self.document_id
    }
}

/// Shared handle used by the CLI and the HTTP server to load documents
/// and run attributed queries. Cheap to clone.
#[derive(Clone)]
pub struct ReaderSession {
    library: Arc<Library>,
    gateway: QueryGateway,
    language: Language,
}

impl ReaderSession {
    pub fn new(library: Arc<Library>, gateway: QueryGateway, language: Language) -> Self {
        Self {
            library,
            gateway,
            language,
        }
    }

    /// Wires a session from configuration around an already-built provider.
    pub fn from_config(config: &Config, provider: Arc<dyn Provider>) -> anyhow::Result<Self> {
        let library = Library::new(config.reader.heading_rules()?, config.reader.max_upload_bytes);
        let gateway = QueryGateway::new(provider, config.provider.model.clone())
            .with_system_instruction(config.provider.system_instruction.clone());
        Ok(Self::new(Arc::new(library), gateway, config.reader.language))
    }

    /// The underlying document library.
    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// The gateway queries are sent through.
    pub fn gateway(&self) -> &QueryGateway {
        &self.gateway
    }

    /// Default language for ingestion and replies.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Ingests `raw`, falling back to the session language when none is given.
    pub async fn load(
        &self,
        raw: RawDocument,
        language: Option<Language>,
    ) -> Result<IngestOutcome, ExtractError> {
        self.library
            .ingest(raw, language.unwrap_or(self.language))
            .await
    }

    /// The current document, if one has been committed.
    pub fn current(&self) -> Option<Arc<LoadedDocument>> {
        self.library.snapshot()
    }

    /// Dispatches `parameters` against a snapshot of the current document.
    pub async fn query(
        &self,
        parameters: QueryParameters,
        language: Option<Language>,
        model: Option<String>,
    ) -> Result<Attributed<StructuredResponse>, ProviderError> {
        let snapshot = self.library.snapshot();
        let query = StructuredQuery::new(
            parameters,
            language.unwrap_or(self.language),
            self.gateway.model_or_default(model),
        )
        .with_digest(snapshot.as_ref().and_then(|doc| doc.digest()));

        let value = self.gateway.execute(&query).await?;
        Ok(Attributed {
            document_id: snapshot.map(|doc| doc.id),
            value,
        })
    }
}
