use cryptorag::assistant::{Assistant, ChatOptions, OpenAiCompatibleGenerator};
use cryptorag::cli::{Cli, Commands, ConfigAction, SessionAction};
use cryptorag::config::Config;
use cryptorag::embedding::{
    open_collections, CollectionKind, CollectionSet, EmbeddingProvider, FastEmbedProvider,
    VectorCollection,
};
use cryptorag::error::{RagError, Result};
use cryptorag::ingest::{self, AnalysisNote, DocumentDraft, Indexer, NewsRecord, OpenInterestRecord};
use cryptorag::intent::IntentResolver;
use cryptorag::market::{Interval, LookupDispatcher};
use cryptorag::retrieval::{HybridSearcher, SearchQuery};
use cryptorag::session::SessionManager;
use cryptorag::storage::{StorageManager, StorageStats};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Resolve { text } => cmd_resolve(cli.config, &text)?,
        Commands::Lookup { text, json } => cmd_lookup(cli.config, &text, json).await?,
        Commands::Search {
            query,
            collections,
            top_k,
            json,
        } => cmd_search(cli.config, &query, collections, top_k, json).await?,
        Commands::Ask {
            question,
            session,
            collections,
            top_k,
        } => cmd_ask(cli.config, &question, session, collections, top_k).await?,
        Commands::ImportCandles {
            file,
            ticker,
            interval,
        } => cmd_import_candles(cli.config, &file, &ticker, interval)?,
        Commands::Index {
            collection,
            file,
            ticker,
            resample,
            reset,
        } => cmd_index(cli.config, collection, &file, ticker, resample, reset).await?,
        Commands::Reset { collection } => cmd_reset(cli.config, collection)?,
        Commands::Stats => cmd_stats(cli.config)?,
        Commands::Sessions { action } => cmd_sessions(cli.config, action)?,
        Commands::Config { action } => cmd_config(cli.config, action)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "cryptorag=debug" } else { "cryptorag=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn other<E>(e: E) -> RagError
where
    E: std::error::Error + Send + Sync + 'static,
{
    RagError::Other(anyhow::Error::new(e))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| RagError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'cryptorag config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn open_storage(config: &Config) -> Result<StorageManager> {
    StorageManager::new(config.data_dir()?)
}

fn dispatcher(config: &Config, storage: &StorageManager) -> Arc<LookupDispatcher> {
    Arc::new(LookupDispatcher::new(
        Arc::new(storage.candle_store()),
        &config.market,
    ))
}

fn embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    tracing::info!("Loading embedding model {}", config.embedding.model);
    let provider = FastEmbedProvider::new(&config.embedding.model).map_err(other)?;
    Ok(Arc::new(provider))
}

fn collections(config: &Config, storage: &StorageManager) -> Result<CollectionSet> {
    open_collections(&config.indexing, &storage.database).map_err(other)
}

fn searcher(config: &Config, storage: &StorageManager) -> Result<HybridSearcher> {
    Ok(HybridSearcher::new(
        embedder(config)?,
        collections(config, storage)?,
        config.retrieval.clone(),
    ))
}

fn cmd_resolve(config_path: Option<PathBuf>, text: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let resolver = IntentResolver::new(&config.resolver)?;
    println!("{}", to_json(&resolver.resolve(text))?);
    Ok(())
}

async fn cmd_lookup(config_path: Option<PathBuf>, text: &str, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let resolver = IntentResolver::new(&config.resolver)?;
    let storage = open_storage(&config)?;
    let dispatcher = dispatcher(&config, &storage);

    let intent = resolver.resolve(text);
    let ticker = intent.ticker.clone();
    let reference = intent.time_reference;
    let outcome =
        tokio::task::spawn_blocking(move || dispatcher.lookup(&ticker, reference.as_ref()))
            .await
            .map_err(other)?;

    if json {
        println!("{}", to_json(&outcome)?);
    } else {
        println!("{} · {}", intent.ticker, intent.category);
        println!("{}", outcome.render());
    }
    Ok(())
}

async fn cmd_search(
    config_path: Option<PathBuf>,
    query: &str,
    collections: Vec<CollectionKind>,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let resolver = IntentResolver::new(&config.resolver)?;
    let storage = open_storage(&config)?;
    let searcher = searcher(&config, &storage)?;

    let intent = resolver.resolve(query);
    let request = SearchQuery::new(query, collections, top_k.unwrap_or(config.retrieval.top_k))
        .with_time_window(intent.time_window());
    let hits = searcher.search(&request).await.map_err(other)?;

    if json {
        println!("{}", to_json(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{}] {} score={:.4} distance={:.4}",
            rank + 1,
            hit.collection,
            hit.id,
            hit.score(),
            hit.distance
        );
        if let Some(b) = hit.boosts {
            println!(
                "   base={:.3} keyword={:.3} recency={:.2} collection={:.2}",
                b.base, b.keyword, b.recency, b.collection
            );
        }
        let preview: String = hit.text.chars().take(160).collect();
        println!("   {}", preview.replace('\n', " "));
    }
    Ok(())
}

async fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    session_name: Option<String>,
    collections: Vec<CollectionKind>,
    top_k: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    let generator = OpenAiCompatibleGenerator::from_config(&config.llm).map_err(other)?;

    let assistant = Assistant::new(
        IntentResolver::new(&config.resolver)?,
        dispatcher(&config, &storage),
        searcher(&config, &storage)?,
        Arc::new(generator),
        config.llm.history_window,
    );

    let sessions = SessionManager::new(storage.sessions_dir());
    let mut session = match session_name {
        Some(name) => sessions.open_or_create(&name)?,
        None => sessions.create(None)?,
    };

    let mut options = ChatOptions::from_config(&config.retrieval, &config.llm);
    if !collections.is_empty() {
        options.collections = collections;
    }
    if let Some(k) = top_k {
        options.top_k = k;
    }

    let response = assistant.chat(&mut session, question, &options).await;
    sessions.save(&session)?;

    println!("{}", response.text);
    if !response.sources.is_empty() {
        println!("\nSources:");
        for hit in &response.sources {
            match hit.date() {
                Some(date) => println!("  - [{}] {} ({})", hit.collection, hit.id, date),
                None => println!("  - [{}] {}", hit.collection, hit.id),
            }
        }
    }
    println!("\nSession: {} ({})", session.name, session.id);

    if response.failed {
        return Err(RagError::Other(anyhow::anyhow!(
            "Generation failed; see the log for details"
        )));
    }
    Ok(())
}

fn cmd_import_candles(
    config_path: Option<PathBuf>,
    file: &Path,
    ticker: &str,
    interval: Interval,
) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;

    let candles = ingest::load_candles(file).map_err(other)?;
    let ticker = ticker.to_uppercase();
    let store = storage.candle_store();
    let written = store.insert_candles(&ticker, interval, &candles)?;

    println!(
        "✓ Imported {} {} candles for {} ({} stored)",
        written,
        interval,
        ticker,
        store.count(&ticker, interval)?
    );
    Ok(())
}

async fn cmd_index(
    config_path: Option<PathBuf>,
    kind: CollectionKind,
    file: &Path,
    ticker: Option<String>,
    resample: Interval,
    reset: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    let set = collections(&config, &storage)?;
    let collection = enabled_collection(&set, kind)?;
    if reset {
        let removed = collection.reset().map_err(other)?;
        println!("✓ Reset {} ({} documents removed)", kind, removed);
    }

    let drafts: Vec<DocumentDraft> = match kind {
        CollectionKind::Kline => {
            let ticker = ticker
                .ok_or_else(|| RagError::Config("--ticker is required for kline files".to_string()))?
                .to_uppercase();
            let candles = ingest::load_candles(file).map_err(other)?;
            let resampled = ingest::resample(&candles, resample);
            tracing::info!(
                "Resampled {} candles to {} ({})",
                candles.len(),
                resampled.len(),
                resample
            );
            ingest::kline_documents(&ticker, &resampled, resample)
        }
        CollectionKind::News => {
            let records: Vec<NewsRecord> = ingest::load_json(file).map_err(other)?;
            ingest::news_documents(&records)
        }
        CollectionKind::OpenInterest => {
            let records: Vec<OpenInterestRecord> = ingest::load_json(file).map_err(other)?;
            ingest::open_interest_documents(&records)
        }
        CollectionKind::Analysis => {
            let notes: Vec<AnalysisNote> = ingest::load_json(file).map_err(other)?;
            notes.iter().map(ingest::analysis_document).collect()
        }
    };

    let indexer = Indexer::new(embedder(&config)?, config.embedding.batch_size);
    let report = tokio::task::spawn_blocking(move || indexer.index(collection.as_ref(), drafts))
        .await
        .map_err(other)?
        .map_err(other)?;

    println!(
        "✓ Indexed {} {} documents in {} batches",
        report.written, kind, report.batches
    );
    Ok(())
}

fn enabled_collection(
    set: &CollectionSet,
    kind: CollectionKind,
) -> Result<Arc<dyn VectorCollection>> {
    set.get(kind).cloned().ok_or_else(|| {
        RagError::Config(format!(
            "Collection '{}' is not enabled in indexing.enabled_collections",
            kind
        ))
    })
}

fn cmd_reset(config_path: Option<PathBuf>, kind: Option<CollectionKind>) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    let set = collections(&config, &storage)?;

    let kinds: Vec<CollectionKind> = match kind {
        Some(kind) => vec![kind],
        None => set.kinds().collect(),
    };
    for kind in kinds {
        let removed = enabled_collection(&set, kind)?.reset().map_err(other)?;
        println!("✓ Reset {} ({} documents removed)", kind, removed);
    }
    Ok(())
}

fn cmd_stats(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    let stats = storage.stats()?;

    println!("cryptorag storage");
    println!("=================");
    println!("Data dir: {}", storage.base_path().display());
    println!("Size:     {}", StorageStats::format_size(stats.size_bytes));
    println!(
        "\nCandles:  {} across {} tickers",
        stats.db.candle_count, stats.db.ticker_count
    );

    println!("\nCollections:");
    for kind in &config.indexing.enabled_collections {
        let count = stats
            .db
            .documents
            .iter()
            .find(|(name, _)| name == kind.name())
            .map(|(_, n)| *n)
            .unwrap_or(0);
        println!("  {:<14} {}", kind.name(), count);
    }

    let sessions = SessionManager::new(storage.sessions_dir()).list()?;
    println!("\nSessions: {}", sessions.len());
    Ok(())
}

fn cmd_sessions(config_path: Option<PathBuf>, action: SessionAction) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    let manager = SessionManager::new(storage.sessions_dir());

    match action {
        SessionAction::List => {
            let sessions = manager.list()?;
            if sessions.is_empty() {
                println!("No sessions");
            }
            for session in sessions {
                println!(
                    "  {} - {} messages ({})",
                    session.name,
                    session.history.len(),
                    session.started_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        SessionAction::Clear { name } => {
            let mut session = find_session(&manager, &name)?;
            session.history.clear();
            manager.save(&session)?;
            println!("✓ Cleared history of {}", name);
        }
        SessionAction::Delete { name } => {
            let session = find_session(&manager, &name)?;
            manager.delete(&session.id)?;
            println!("✓ Deleted session {}", name);
        }
    }
    Ok(())
}

fn find_session(manager: &SessionManager, name: &str) -> Result<cryptorag::session::ChatSession> {
    manager
        .find_by_name(name)?
        .ok_or_else(|| RagError::SessionNotFound {
            id: name.to_string(),
        })
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path)?;
            let value = serde_json::to_value(&config).map_err(|e| RagError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            match section {
                Some(section) => {
                    let part = value.get(&section).ok_or_else(|| RagError::InvalidConfigValue {
                        path: section.clone(),
                        message: "No such section".to_string(),
                    })?;
                    println!("{}", to_json(part)?);
                }
                None => println!("{}", to_json(&value)?),
            }
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}
