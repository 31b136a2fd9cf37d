//! Conversational orchestration
//!
//! One chat turn resolves the question, runs the structured lookup and the
//! semantic search it calls for, assembles both into a prompt and hands it to
//! the generator. Only the user's original words and the reply are written to
//! the session history; the assembled context never is.

pub mod context;
mod generation;

pub use generation::{GenerationError, OpenAiCompatibleGenerator, TextGenerator};

use crate::config::{LlmConfig, RetrievalConfig};
use crate::embedding::CollectionKind;
use crate::intent::{Intent, IntentResolver};
use crate::market::{LookupDispatcher, LookupOutcome};
use crate::retrieval::{HybridSearcher, RetrievalHit, SearchQuery};
use crate::session::{ChatMessage, ChatSession};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sources returned alongside a reply
const MAX_SOURCES: usize = 3;

/// Per-turn knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    pub collections: Vec<CollectionKind>,
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            collections: vec![CollectionKind::News, CollectionKind::Analysis],
            top_k: 5,
            temperature: 0.3,
            max_tokens: 4096,
        }
    }
}

impl ChatOptions {
    pub fn from_config(retrieval: &RetrievalConfig, llm: &LlmConfig) -> Self {
        Self {
            collections: retrieval.default_collections.clone(),
            top_k: retrieval.top_k,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        }
    }
}

/// Outcome of one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub intent: Intent,
    /// Best reranked hits, at most three
    pub sources: Vec<RetrievalHit>,
    pub lookup: Option<LookupOutcome>,
    pub has_structured_data: bool,
    pub has_vector_data: bool,
    /// The generator failed; `text` is an apology and history is untouched
    pub failed: bool,
}

pub struct Assistant {
    resolver: IntentResolver,
    dispatcher: Arc<LookupDispatcher>,
    searcher: HybridSearcher,
    generator: Arc<dyn TextGenerator>,
    history_window: usize,
}

impl Assistant {
    pub fn new(
        resolver: IntentResolver,
        dispatcher: Arc<LookupDispatcher>,
        searcher: HybridSearcher,
        generator: Arc<dyn TextGenerator>,
        history_window: usize,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            searcher,
            generator,
            history_window,
        }
    }

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    pub async fn chat(
        &self,
        session: &mut ChatSession,
        message: &str,
        options: &ChatOptions,
    ) -> ChatResponse {
        self.chat_at(session, message, options, Utc::now()).await
    }

    /// [`Assistant::chat`] against an explicit clock
    pub async fn chat_at(
        &self,
        session: &mut ChatSession,
        message: &str,
        options: &ChatOptions,
        now: DateTime<Utc>,
    ) -> ChatResponse {
        let intent = self.resolver.resolve_at(message, now.naive_utc());
        tracing::info!(
            ticker = %intent.ticker,
            category = %intent.category,
            reference = ?intent.time_reference,
            "Resolved intent"
        );

        let lookup = if intent.needs_structured_lookup {
            Some(self.structured_lookup(&intent).await)
        } else {
            None
        };

        let hits = if intent.needs_semantic_search {
            self.semantic_search(message, &intent, options).await
        } else {
            Vec::new()
        };

        let structured = context::structured_section(lookup.as_ref());
        let unstructured = context::unstructured_section(&hits);
        let assembled = context::build_context(&structured, &unstructured);

        let mut messages = Vec::with_capacity(self.history_window + 2);
        messages.push(ChatMessage::system(context::system_prompt(
            now,
            intent.category,
        )));
        messages.extend_from_slice(session.history.window(self.history_window));
        messages.push(ChatMessage::user(context::user_turn(&assembled, message)));

        let has_structured_data = !structured.is_empty();
        let has_vector_data = !unstructured.is_empty();

        match self
            .generator
            .complete(&messages, options.max_tokens, options.temperature)
            .await
        {
            Ok(text) => {
                session.record_turn(message, text.clone());
                let mut sources = hits;
                sources.truncate(MAX_SOURCES);
                ChatResponse {
                    text,
                    intent,
                    sources,
                    lookup,
                    has_structured_data,
                    has_vector_data,
                    failed: false,
                }
            }
            Err(e) => {
                tracing::error!(model = self.generator.model_name(), "Generation failed: {}", e);
                ChatResponse {
                    text: format!("Xin lỗi, tôi gặp lỗi: {}", e),
                    intent,
                    sources: Vec::new(),
                    lookup,
                    has_structured_data,
                    has_vector_data,
                    failed: true,
                }
            }
        }
    }

    pub async fn analyze_price_trend(
        &self,
        session: &mut ChatSession,
        ticker: &str,
        timeframe: &str,
    ) -> ChatResponse {
        let message = format!("Analyze price trend for {} ({})", ticker, timeframe);
        self.chat(session, &message, &ChatOptions::default()).await
    }

    pub async fn analyze_news_sentiment(
        &self,
        session: &mut ChatSession,
        ticker: &str,
        days: u32,
    ) -> ChatResponse {
        let message = format!("Analyze news sentiment for {} last {} days", ticker, days);
        self.chat(session, &message, &ChatOptions::default()).await
    }

    pub fn clear_history(&self, session: &mut ChatSession) {
        session.history.clear();
        tracing::info!(id = %session.id, "Conversation history cleared");
    }

    async fn structured_lookup(&self, intent: &Intent) -> LookupOutcome {
        let dispatcher = Arc::clone(&self.dispatcher);
        let ticker = intent.ticker.clone();
        let reference = intent.time_reference;

        let outcome =
            tokio::task::spawn_blocking(move || dispatcher.lookup(&ticker, reference.as_ref()))
                .await
                .unwrap_or_else(|e| LookupOutcome::Error {
                    message: e.to_string(),
                });
        tracing::debug!("Structured lookup: {}", outcome.headline());
        outcome
    }

    async fn semantic_search(
        &self,
        message: &str,
        intent: &Intent,
        options: &ChatOptions,
    ) -> Vec<RetrievalHit> {
        let query = SearchQuery::new(message, options.collections.clone(), options.top_k)
            .with_time_window(intent.time_window());

        match self.searcher.search(&query).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("Semantic search failed, continuing without it: {}", e);
                Vec::new()
            }
        }
    }
}
