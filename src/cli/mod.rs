//! CLI command definitions and parsing
use crate::embedding::CollectionKind;
use crate::market::Interval;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cryptorag",
    version,
    author = "neur0map",
    about = "Ask questions about crypto markets, answered from candles and indexed news",
    long_about = "cryptorag resolves a free-text question into a ticker, a question category and a \
                  time reference, looks up exact figures in the candle store, retrieves related \
                  documents from several vector collections and asks a language model to combine both."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/cryptorag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show how a question is interpreted
    Resolve {
        /// Question text
        text: String,
    },

    /// Run the structured price lookup a question calls for
    Lookup {
        /// Question text
        text: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Semantic search across the indexed collections
    Search {
        /// Search query text
        query: String,

        /// Collection to search (repeatable; defaults from config)
        #[arg(long = "collection")]
        collections: Vec<CollectionKind>,

        /// Maximum number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Ask a question and get a generated answer
    Ask {
        /// Question to ask
        question: String,

        /// Session name; the conversation is resumed if it exists
        #[arg(short, long)]
        session: Option<String>,

        /// Collection to search (repeatable; defaults from config)
        #[arg(long = "collection")]
        collections: Vec<CollectionKind>,

        /// Number of retrieved documents
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Load candles from a JSON array into the candle store
    ImportCandles {
        /// JSON file of {openTime, open, high, low, close, volume} rows
        file: PathBuf,

        /// Ticker the candles belong to (e.g. BTCUSDT)
        #[arg(short, long)]
        ticker: String,

        /// Candle interval of the file
        #[arg(short, long, default_value = "5m")]
        interval: Interval,
    },

    /// Build documents from a JSON file and index them
    Index {
        /// Target collection
        collection: CollectionKind,

        /// JSON file (candles, news, open interest or analysis notes)
        file: PathBuf,

        /// Ticker for kline files
        #[arg(short, long)]
        ticker: Option<String>,

        /// Interval kline documents are resampled to
        #[arg(long, default_value = "1h")]
        resample: Interval,

        /// Empty the collection before indexing
        #[arg(long)]
        reset: bool,
    },

    /// Remove every indexed document from a collection
    Reset {
        /// Collection to empty (all enabled collections when omitted)
        collection: Option<CollectionKind>,
    },

    /// Show store and collection statistics
    Stats,

    /// Manage saved chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List sessions, newest first
    List,

    /// Clear the history of a session
    Clear {
        /// Session name
        name: String,
    },

    /// Delete a session
    Delete {
        /// Session name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeated_collections() {
        let cli = Cli::try_parse_from([
            "cryptorag",
            "search",
            "etf",
            "--collection",
            "news",
            "--collection",
            "analysis",
            "-k",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                collections, top_k, ..
            } => {
                assert_eq!(collections, vec![CollectionKind::News, CollectionKind::Analysis]);
                assert_eq!(top_k, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_interval_argument() {
        let cli = Cli::try_parse_from([
            "cryptorag",
            "import-candles",
            "btc.json",
            "--ticker",
            "BTCUSDT",
            "--interval",
            "1h",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::ImportCandles {
                interval: Interval::OneHour,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["cryptorag", "index", "tweets", "x.json"]).is_err());
    }

    #[test]
    fn test_reset_arguments() {
        let cli =
            Cli::try_parse_from(["cryptorag", "index", "news", "news.json", "--reset"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Index {
                collection: CollectionKind::News,
                reset: true,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["cryptorag", "reset", "kline"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Reset {
                collection: Some(CollectionKind::Kline)
            }
        ));

        let cli = Cli::try_parse_from(["cryptorag", "reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Reset { collection: None }));
    }
}
