//! Chat turns through the assistant with a scripted generator

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use cryptorag::assistant::{Assistant, ChatOptions, GenerationError, TextGenerator};
use cryptorag::config::{MarketConfig, ResolverConfig, RetrievalConfig};
use cryptorag::embedding::{CollectionSet, EmbeddingError, EmbeddingProvider, EncodeMode};
use cryptorag::intent::{IntentResolver, QueryCategory};
use cryptorag::market::{Candle, Interval, LookupDispatcher, LookupStatus};
use cryptorag::retrieval::HybridSearcher;
use cryptorag::session::{ChatMessage, ChatSession, Role};
use cryptorag::storage::StorageManager;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct FlatEmbedder;

impl EmbeddingProvider for FlatEmbedder {
    fn encode(&self, texts: &[String], _mode: EncodeMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_name(&self) -> &str {
        "flat"
    }
}

/// Replies "reply N" and keeps every message list it was sent
#[derive(Default)]
struct ScriptedGenerator {
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    fn call(&self, n: usize) -> Vec<ChatMessage> {
        self.calls.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, GenerationError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(messages.to_vec());
        Ok(format!("reply {}", calls.len()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct BrokenGenerator;

#[async_trait]
impl TextGenerator for BrokenGenerator {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "broken"
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap()
}

fn assistant(temp: &TempDir, generator: Arc<dyn TextGenerator>, window: usize) -> Assistant {
    let storage = StorageManager::new(temp.path().to_path_buf()).unwrap();
    let store = storage.candle_store();
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let candles: Vec<Candle> = (0..12)
        .map(|i| Candle {
            open_time: start + TimeDelta::hours(2 * i),
            open: 42_000.0,
            high: 42_500.0,
            low: 41_500.0,
            close: 42_100.0,
            volume: 10.0,
        })
        .collect();
    store
        .insert_candles("BTCUSDT", Interval::FiveMinutes, &candles)
        .unwrap();

    let resolver = IntentResolver::new(&ResolverConfig::default()).unwrap();
    let dispatcher = Arc::new(LookupDispatcher::new(
        Arc::new(store),
        &MarketConfig::default(),
    ));
    // No collections are enabled, so every search comes back empty
    let searcher = HybridSearcher::new(
        Arc::new(FlatEmbedder),
        CollectionSet::new(),
        RetrievalConfig::default(),
    );
    Assistant::new(resolver, dispatcher, searcher, generator, window)
}

#[tokio::test]
async fn test_price_turn_carries_lookup_into_prompt() {
    let temp = TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::default());
    let assistant = assistant(&temp, generator.clone(), 10);
    let mut session = ChatSession::new("test");

    let question = "giá BTC ngày 2024-01-15";
    let response = assistant
        .chat_at(&mut session, question, &ChatOptions::default(), now())
        .await;

    assert!(!response.failed);
    assert_eq!(response.text, "reply 1");
    assert_eq!(response.intent.category, QueryCategory::PriceQuery);
    assert_eq!(
        response.lookup.as_ref().map(|l| l.status()),
        Some(LookupStatus::Success)
    );
    assert!(response.has_structured_data);
    assert!(!response.has_vector_data);
    assert!(response.sources.is_empty());

    let sent = generator.call(0);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].role, Role::System);
    assert!(sent[0].content.contains("12/06/2024 09:00"));
    assert!(sent[0].content.ends_with("PRICE_QUERY"));
    assert!(sent[1].content.contains("STRUCTURED DATA"));
    assert!(sent[1].content.contains("Không có phân tích/tin tức liên quan."));
    assert!(sent[1].content.ends_with(&format!("**Câu hỏi:** {}", question)));

    // Only the original words go into history
    let history = session.history.messages();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], ChatMessage::user(question));
    assert_eq!(history[1], ChatMessage::assistant("reply 1"));
    assert!(session.updated_at.is_some());
}

#[tokio::test]
async fn test_missing_day_is_reported_as_no_data() {
    let temp = TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::default());
    let assistant = assistant(&temp, generator.clone(), 10);
    let mut session = ChatSession::new("test");

    let response = assistant
        .chat_at(&mut session, "giá ETH ngày 2024-01-15", &ChatOptions::default(), now())
        .await;

    assert_eq!(
        response.lookup.as_ref().map(|l| l.status()),
        Some(LookupStatus::NoData)
    );
    assert!(response.has_structured_data);
    assert!(generator.call(0)[1]
        .content
        .contains("**KHÔNG CÓ DỮ LIỆU TRONG DATABASE**"));
}

#[tokio::test]
async fn test_general_question_skips_lookup() {
    let temp = TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::default());
    let assistant = assistant(&temp, generator.clone(), 10);
    let mut session = ChatSession::new("test");

    let response = assistant
        .chat_at(&mut session, "what is a blockchain", &ChatOptions::default(), now())
        .await;

    assert!(response.lookup.is_none());
    assert!(!response.has_structured_data);
    assert!(generator.call(0)[1]
        .content
        .contains("Không có dữ liệu số học cụ thể."));
}

#[tokio::test]
async fn test_generation_failure_leaves_history_untouched() {
    let temp = TempDir::new().unwrap();
    let assistant = assistant(&temp, Arc::new(BrokenGenerator), 10);
    let mut session = ChatSession::new("test");

    let response = assistant
        .chat_at(&mut session, "giá BTC ngày 2024-01-15", &ChatOptions::default(), now())
        .await;

    assert!(response.failed);
    assert!(response.text.starts_with("Xin lỗi, tôi gặp lỗi:"));
    assert!(response.text.contains("503"));
    assert!(session.history.is_empty());
    assert!(session.updated_at.is_none());
}

#[tokio::test]
async fn test_history_window_limits_replayed_messages() {
    let temp = TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::default());
    let assistant = assistant(&temp, generator.clone(), 4);
    let mut session = ChatSession::new("test");
    let options = ChatOptions::default();

    for question in ["first question", "second question", "third question"] {
        assistant.chat_at(&mut session, question, &options, now()).await;
    }

    // Storage keeps everything
    assert_eq!(session.history.len(), 6);

    // system + last four stored messages + current turn
    let third = generator.call(2);
    assert_eq!(third.len(), 6);
    assert_eq!(third[1], ChatMessage::user("first question"));
    assert_eq!(third[4], ChatMessage::assistant("reply 2"));
    assert_eq!(third[5].role, Role::User);

    assistant.clear_history(&mut session);
    assert!(session.history.is_empty());
}
