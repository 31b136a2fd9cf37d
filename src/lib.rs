//! cryptorag - hybrid question answering over crypto market data
//!
//! A question is resolved into a ticker, a category and a time reference,
//! answered with exact figures from the candle store where it asks for
//! numbers, enriched with documents retrieved from several vector collections,
//! and handed to a text generator together with the conversation so far.

pub mod assistant;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod intent;
pub mod market;
pub mod retrieval;
pub mod session;
pub mod storage;

pub use error::{RagError, Result};
