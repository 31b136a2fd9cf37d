/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

/// Models the provider accepts, with their output dimension
pub const SUPPORTED_MODELS: &[(&str, usize)] = &[
    ("multilingual-e5-small", 384),
    ("multilingual-e5-base", 768),
    ("multilingual-e5-large", 1024),
];

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Which side of an asymmetric search a text is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    Query,
    Document,
}

impl EncodeMode {
    /// Prefix expected by the E5 model family
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Query => "query: ",
            Self::Document => "passage: ",
        }
    }
}

/// Trait for embedding providers
///
/// Vectors are L2-normalised and all share [`dimension`](Self::dimension).
pub trait EmbeddingProvider: Send + Sync {
    fn encode(&self, texts: &[String], mode: EncodeMode) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Encode one search query
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.encode(&[text.to_string()], EncodeMode::Query)?
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Scale `v` to unit length in place; zero vectors are left alone
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Local multilingual E5 embeddings through FastEmbed
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Models are downloaded on first use to the FastEmbed cache directory
    /// (small ~470MB, base ~1.1GB, large ~2.2GB).
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let embedding_model = match model_name {
            "multilingual-e5-small" => EmbeddingModel::MultilingualE5Small,
            "multilingual-e5-base" => EmbeddingModel::MultilingualE5Base,
            "multilingual-e5-large" => EmbeddingModel::MultilingualE5Large,
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: {}",
                    model_name,
                    SUPPORTED_MODELS
                        .iter()
                        .map(|(name, _)| *name)
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        };

        let dimension = SUPPORTED_MODELS
            .iter()
            .find(|(name, _)| *name == model_name)
            .map(|(_, dim)| *dim)
            .unwrap_or(768);

        tracing::info!("Initializing embedding model: {} ({}D)", model_name, dimension);

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn encode(&self, texts: &[String], mode: EncodeMode) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| format!("{}{}", mode.prefix(), t))
            .collect();

        let mut embeddings = self
            .model
            .embed(prefixed, None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &mut embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
            normalize(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_differ() {
        assert_ne!(EncodeMode::Query.prefix(), EncodeMode::Document.prefix());
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(matches!(
            FastEmbedProvider::new("all-MiniLM-L6-v2"),
            Err(EmbeddingError::InitializationError(_))
        ));
    }

    #[test]
    #[ignore] // Requires model download - run with: cargo test -- --ignored
    fn test_query_and_passage_vectors() {
        let provider = FastEmbedProvider::new("multilingual-e5-small").unwrap();
        let texts = vec!["Bitcoin tăng mạnh sau tin ETF".to_string()];

        let query = provider.encode(&texts, EncodeMode::Query).unwrap();
        let passage = provider.encode(&texts, EncodeMode::Document).unwrap();
        assert_eq!(query[0].len(), 384);
        assert_ne!(query[0], passage[0]);

        let magnitude: f32 = query[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-3);
    }

    #[test]
    #[ignore] // Requires model download - run with: cargo test -- --ignored
    fn test_empty_text() {
        let provider = FastEmbedProvider::new("multilingual-e5-small").unwrap();
        assert!(provider.embed_query("   ").is_err());
    }
}
