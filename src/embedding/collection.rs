use super::vector_index::VectorCollection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// The closed set of indexed document families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Kline,
    News,
    OpenInterest,
    Analysis,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 4] = [
        CollectionKind::Kline,
        CollectionKind::News,
        CollectionKind::OpenInterest,
        CollectionKind::Analysis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Kline => "kline",
            Self::News => "news",
            Self::OpenInterest => "open_interest",
            Self::Analysis => "analysis",
        }
    }

    /// Analysis notes are timeless; every other family carries a timestamp
    pub fn supports_time_filter(&self) -> bool {
        !matches!(self, Self::Analysis)
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s.to_lowercase())
            .ok_or_else(|| format!("unknown collection '{}'", s))
    }
}

/// Handles for every enabled collection, built once at start-up
#[derive(Clone, Default)]
pub struct CollectionSet {
    collections: BTreeMap<CollectionKind, Arc<dyn VectorCollection>>,
}

impl CollectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: Arc<dyn VectorCollection>) {
        self.collections.insert(collection.kind(), collection);
    }

    pub fn get(&self, kind: CollectionKind) -> Option<&Arc<dyn VectorCollection>> {
        self.collections.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = CollectionKind> + '_ {
        self.collections.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// (kind, document count) for every enabled collection
    pub fn stats(&self) -> Vec<(CollectionKind, usize)> {
        self.collections
            .iter()
            .map(|(kind, c)| (*kind, c.count()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("news".parse::<CollectionKind>().unwrap(), CollectionKind::News);
        assert_eq!(
            "OPEN_INTEREST".parse::<CollectionKind>().unwrap(),
            CollectionKind::OpenInterest
        );
        assert!("tweets".parse::<CollectionKind>().is_err());
    }

    #[test]
    fn test_serde_names_match_display() {
        for kind in CollectionKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_only_analysis_is_timeless() {
        let timeless: Vec<_> = CollectionKind::ALL
            .into_iter()
            .filter(|k| !k.supports_time_filter())
            .collect();
        assert_eq!(timeless, vec![CollectionKind::Analysis]);
    }
}
