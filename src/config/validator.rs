use crate::config::{Config, SCHEMA_VERSION};
use crate::embedding::SUPPORTED_MODELS;
use crate::error::{RagError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_resolver(config, &mut errors);
        Self::validate_market(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_resolver(config: &Config, errors: &mut Vec<ValidationError>) {
        let resolver = &config.resolver;

        if resolver.known_symbols.iter().all(|s| s.trim().is_empty()) {
            errors.push(ValidationError::new(
                "resolver.known_symbols",
                "At least one symbol is required",
            ));
        }

        if resolver.quote_currency.is_empty() {
            errors.push(ValidationError::new(
                "resolver.quote_currency",
                "Quote currency cannot be empty",
            ));
        } else if !resolver
            .default_ticker
            .ends_with(&resolver.quote_currency.to_uppercase())
        {
            errors.push(ValidationError::new(
                "resolver.default_ticker",
                format!(
                    "Default ticker '{}' must end with quote currency '{}'",
                    resolver.default_ticker, resolver.quote_currency
                ),
            ));
        }

        for (path, keywords) in [
            ("resolver.price_keywords", &resolver.price_keywords),
            ("resolver.trend_keywords", &resolver.trend_keywords),
            ("resolver.news_keywords", &resolver.news_keywords),
        ] {
            if keywords.is_empty() {
                errors.push(ValidationError::new(path, "Keyword list cannot be empty"));
            }
        }

        if resolver.trend_default_days == 0 {
            errors.push(ValidationError::new(
                "resolver.trend_default_days",
                "Default trend range must span at least one day",
            ));
        }
    }

    fn validate_market(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.market.overview_window == 0 {
            errors.push(ValidationError::new(
                "market.overview_window",
                "Overview window must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        let model = &config.embedding.model;
        match SUPPORTED_MODELS.iter().find(|(name, _)| name == model) {
            Some((_, dim)) if *dim != config.indexing.vector_dim => {
                errors.push(ValidationError::new(
                    "indexing.vector_dim",
                    format!(
                        "Model {} produces {}-dimensional vectors, index expects {}",
                        model, dim, config.indexing.vector_dim
                    ),
                ));
            }
            Some(_) => {}
            None => {
                let supported: Vec<&str> = SUPPORTED_MODELS.iter().map(|(n, _)| *n).collect();
                errors.push(ValidationError::new(
                    "embedding.model",
                    format!("Unsupported model '{}', expected one of {:?}", model, supported),
                ));
            }
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let indexing = &config.indexing;

        if indexing.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if indexing.max_elements == 0 {
            errors.push(ValidationError::new(
                "indexing.max_elements",
                "Index capacity must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        if retrieval.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_multiplier",
                "Candidate multiplier must be at least 1",
            ));
        }

        if retrieval.keyword_weight < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.keyword_weight",
                "Keyword weight cannot be negative",
            ));
        }

        for (path, boost) in [
            ("retrieval.news_boost", retrieval.news_boost),
            ("retrieval.price_boost", retrieval.price_boost),
        ] {
            if boost < 1.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Boost factors must be >= 1.0, got {}", boost),
                ));
            }
        }

        for kind in &retrieval.default_collections {
            if !config.indexing.enabled_collections.contains(kind) {
                errors.push(ValidationError::new(
                    "retrieval.default_collections",
                    format!("Collection '{}' is not enabled in indexing", kind),
                ));
            }
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let llm = &config.llm;

        if llm.enabled {
            let env_var = &llm.api_key_env;
            match std::env::var(env_var) {
                Ok(key) if key.is_empty() => errors.push(ValidationError::new(
                    "llm.api_key_env",
                    format!("Environment variable {} is empty", env_var),
                )),
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::new(
                    "llm.api_key_env",
                    format!("Environment variable {} is not set", env_var),
                )),
            }
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    llm.temperature
                ),
            ));
        }

        if llm.max_tokens == 0 {
            errors.push(ValidationError::new(
                "llm.max_tokens",
                "max_tokens must be greater than 0",
            ));
        }

        if llm.history_window == 0 {
            errors.push(ValidationError::new(
                "llm.history_window",
                "History window must be greater than 0",
            ));
        }

        if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
            errors.push(ValidationError::new(
                "llm.base_url",
                format!("Base URL must be http(s), got '{}'", llm.base_url),
            ));
        }
    }
}
