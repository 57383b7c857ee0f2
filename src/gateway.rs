//! Schema-constrained query gateway.
//!
//! Builds prompts for the four request contracts, sends each as exactly one
//! provider call, and applies the contract's fallback when the reply does not
//! parse:
//!
//! | Contract | Reply | Fallback |
//! |----------|-------|----------|
//! | AnalyzeBook | [`BookAnalysis`] | `None` |
//! | DiscoveryRecommendations | `Vec<`[`Recommendation`]`>` | empty list |
//! | RefineInsight | [`Refinement`] | the reader's own understanding, unchanged |
//! | AssistReading | free text | none, text is passed through |
//!
//! Display-only results fall back to "nothing to show"; results that replace
//! user-entered text fall back to a no-op. Parse failures are logged and
//! never reach the caller. Provider failures are returned once, unretried.

use serde::Serialize;
use std::sync::Arc;

use crate::models::{DocumentDigest, Language};
use crate::provider::{Provider, ProviderError, ProviderRequest};
use crate::schema::{BookAnalysis, Contract, Recommendation, Refinement};
use crate::validate::parse_reply;

/// Number of books the discovery prompt asks for.
const DISCOVERY_COUNT: usize = 3;

/// The request contract a query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    AnalyzeBook,
    DiscoveryRecommendations,
    RefineInsight,
    AssistReading,
}

/// Contract-specific inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParameters {
    AnalyzeBook { title: String, intent: String },
    DiscoveryRecommendations { tags: Vec<String>, goal: String },
    RefineInsight { author_view: String, my_understanding: String },
    AssistReading { target_text: String, action: String },
}

impl QueryParameters {
    /// Contract these parameters belong to.
    pub fn contract(&self) -> ContractKind {
        match self {
            QueryParameters::AnalyzeBook { .. } => ContractKind::AnalyzeBook,
            QueryParameters::DiscoveryRecommendations { .. } => {
                ContractKind::DiscoveryRecommendations
            }
            QueryParameters::RefineInsight { .. } => ContractKind::RefineInsight,
            QueryParameters::AssistReading { .. } => ContractKind::AssistReading,
        }
    }
}

/// One user-initiated request to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    pub language: Language,
    pub model: String,
    pub parameters: QueryParameters,
    pub digest: Option<DocumentDigest>,
}

impl StructuredQuery {
    /// Query without a document digest.
    pub fn new(parameters: QueryParameters, language: Language, model: impl Into<String>) -> Self {
        Self {
            language,
            model: model.into(),
            parameters,
            digest: None,
        }
    }

    /// Attaches the digest of the document the query concerns.
    pub fn with_digest(mut self, digest: Option<DocumentDigest>) -> Self {
        self.digest = digest;
        self
    }

    pub fn contract(&self) -> ContractKind {
        self.parameters.contract()
    }
}

/// Result of a query: a validated value or the contract's fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "contract", content = "result", rename_all = "snake_case")]
pub enum StructuredResponse {
    AnalyzeBook(Option<BookAnalysis>),
    DiscoveryRecommendations(Vec<Recommendation>),
    RefineInsight(Refinement),
    AssistReading(String),
}

/// Dispatches queries to an injected [`Provider`].
#[derive(Clone)]
pub struct QueryGateway {
    provider: Arc<dyn Provider>,
    default_model: String,
    system_instruction: Option<String>,
}

impl QueryGateway {
    /// Gateway over `provider`, using `default_model` unless a query overrides it.
    pub fn new(provider: Arc<dyn Provider>, default_model: impl Into<String>) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
            system_instruction: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Resolves an optional caller-chosen model against the default.
    pub fn model_or_default(&self, model: Option<String>) -> String {
        model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.default_model.clone())
    }

    /// Runs one query. Only provider failures are errors.
    pub async fn execute(&self, query: &StructuredQuery) -> Result<StructuredResponse, ProviderError> {
        let raw = self.send(query).await?;

        Ok(match &query.parameters {
            QueryParameters::AnalyzeBook { .. } => {
                StructuredResponse::AnalyzeBook(parse_or_log::<BookAnalysis>(&raw))
            }
            QueryParameters::DiscoveryRecommendations { .. } => {
                StructuredResponse::DiscoveryRecommendations(
                    parse_or_log::<Vec<Recommendation>>(&raw).unwrap_or_default(),
                )
            }
            QueryParameters::RefineInsight {
                my_understanding, ..
            } => StructuredResponse::RefineInsight(
                parse_or_log::<Refinement>(&raw).unwrap_or_else(|| Refinement {
                    refined: my_understanding.clone(),
                }),
            ),
            QueryParameters::AssistReading { .. } => StructuredResponse::AssistReading(raw),
        })
    }

    /// Pre-reading analysis, or `None` when the reply does not match.
    pub async fn analyze_book(
        &self,
        title: &str,
        intent: &str,
        language: Language,
        model: Option<String>,
        digest: Option<DocumentDigest>,
    ) -> Result<Option<BookAnalysis>, ProviderError> {
        let query = StructuredQuery::new(
            QueryParameters::AnalyzeBook {
                title: title.to_string(),
                intent: intent.to_string(),
            },
            language,
            self.model_or_default(model),
        )
        .with_digest(digest);
        let raw = self.send(&query).await?;
        Ok(parse_or_log::<BookAnalysis>(&raw))
    }

    /// Book recommendations; empty when the reply does not match.
    pub async fn discover(
        &self,
        tags: &[String],
        goal: &str,
        language: Language,
        model: Option<String>,
        digest: Option<DocumentDigest>,
    ) -> Result<Vec<Recommendation>, ProviderError> {
        let query = StructuredQuery::new(
            QueryParameters::DiscoveryRecommendations {
                tags: tags.to_vec(),
                goal: goal.to_string(),
            },
            language,
            self.model_or_default(model),
        )
        .with_digest(digest);
        let raw = self.send(&query).await?;
        Ok(parse_or_log::<Vec<Recommendation>>(&raw).unwrap_or_default())
    }

    /// Refined note; the reader's own understanding when the reply does not match.
    pub async fn refine_insight(
        &self,
        author_view: &str,
        my_understanding: &str,
        language: Language,
        model: Option<String>,
        digest: Option<DocumentDigest>,
    ) -> Result<Refinement, ProviderError> {
        let query = StructuredQuery::new(
            QueryParameters::RefineInsight {
                author_view: author_view.to_string(),
                my_understanding: my_understanding.to_string(),
            },
            language,
            self.model_or_default(model),
        )
        .with_digest(digest);
        let raw = self.send(&query).await?;
        Ok(parse_or_log::<Refinement>(&raw).unwrap_or_else(|| Refinement {
            refined: my_understanding.to_string(),
        }))
    }

    /// Free-form help on a passage, passed through as returned.
    pub async fn assist_reading(
        &self,
        target_text: &str,
        action: &str,
        language: Language,
        model: Option<String>,
        digest: Option<DocumentDigest>,
    ) -> Result<String, ProviderError> {
        let query = StructuredQuery::new(
            QueryParameters::AssistReading {
                target_text: target_text.to_string(),
                action: action.to_string(),
            },
            language,
            self.model_or_default(model),
        )
        .with_digest(digest);
        self.send(&query).await
    }

    /// Sends the query as exactly one provider call and returns the raw reply.
    async fn send(&self, query: &StructuredQuery) -> Result<String, ProviderError> {
        let request = self.build_request(query);
        tracing::debug!(
            provider = self.provider.name(),
            model = %request.model,
            contract = ?query.contract(),
            digest = query.digest.is_some(),
            "dispatching query"
        );
        self.provider.generate(&request).await
    }

    /// Provider request for a query: prompt, schema, and system instruction.
    pub fn build_request(&self, query: &StructuredQuery) -> ProviderRequest {
        let (prompt, schema) = match &query.parameters {
            QueryParameters::AnalyzeBook { title, intent } => (
                format!(
                    "Analyze the book \"{}\" for a reader with this intent: \"{}\".",
                    title, intent
                ),
                Some(BookAnalysis::schema()),
            ),
            QueryParameters::DiscoveryRecommendations { tags, goal } => (
                format!(
                    "Based on interests: {} and the reader's specific goal: \"{}\". \
                     Suggest {} highly relevant books.",
                    tags.join(", "),
                    goal,
                    DISCOVERY_COUNT
                ),
                Some(<Vec<Recommendation>>::schema()),
            ),
            QueryParameters::RefineInsight {
                author_view,
                my_understanding,
            } => (
                format!(
                    "Author's viewpoint: \"{}\". My understanding: \"{}\". \
                     Refine my understanding by integrating the author's viewpoint \
                     while keeping it personal and actionable.",
                    author_view, my_understanding
                ),
                Some(Refinement::schema()),
            ),
            QueryParameters::AssistReading {
                target_text,
                action,
            } => (
                format!(
                    "Action: {}. Target text: \"{}\". Provide a concise, insightful response.",
                    action, target_text
                ),
                None,
            ),
        };

        let mut full_prompt = String::new();
        if let Some(digest) = &query.digest {
            full_prompt.push_str(&format!(
                "The following request concerns the book described here: {}\n\n",
                digest
            ));
        }
        full_prompt.push_str(&prompt);
        full_prompt.push_str(&format!("\nOutput in {}.", query.language.prompt_name()));

        ProviderRequest {
            model: query.model.clone(),
            prompt: full_prompt,
            system_instruction: self.system_instruction.clone(),
            schema,
        }
    }
}

/// Parses a reply, logging and discarding it when it does not match.
fn parse_or_log<T: Contract>(raw: &str) -> Option<T> {
    match parse_reply::<T>(raw) {
        Ok(value) => Some(value),
        Err(failure) => {
            tracing::warn!(
                kind = ?failure.kind,
                reason = %failure.reason,
                "provider reply rejected, using fallback"
            );
            None
        }
    }
}
