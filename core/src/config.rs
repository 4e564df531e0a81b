//! Build/query profile, TOML round-trippable.
//!
//! Collects the knobs a corpus run needs — window radius, neighborhood
//! area, filter masks, sort order, output columns — so a pipeline setup can
//! live in a file instead of a shell history. The CLI loads a profile first
//! and lets individual flags override fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::lexicon::{SortOrder, EMIT_COUNT, EMIT_DOC_COUNT, EMIT_TFIDF};
use crate::tokenizer::{FILTER_DIGITS, FILTER_PUNCT, POS_FILTER_ALL};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window radius for co-occurrence counting.
    pub width: usize,
    /// Neighbors considered per row on output and in queries.
    pub area: usize,
    /// Character-class filter mask (`FILTER_DIGITS` | `FILTER_PUNCT`).
    pub filter: u32,
    /// UPOS filter mask for columnar corpora.
    pub conllu_filter: u32,
    /// Dictionary export columns (`EMIT_*` bits).
    pub emit: u32,
    /// Dictionary sort order on export.
    pub sort: SortOrder,
    /// Count bigram entries alongside unigrams.
    pub bigrams: bool,
    /// Weight window increments by proximity.
    pub distance_weighted: bool,
    /// Stop reading the corpus after this many documents.
    pub max_docs: Option<u64>,
    /// Stopword dictionary to load.
    pub stopwords: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 16,
            area: 64,
            filter: FILTER_DIGITS | FILTER_PUNCT,
            conllu_filter: POS_FILTER_ALL,
            emit: EMIT_COUNT | EMIT_DOC_COUNT | EMIT_TFIDF,
            sort: SortOrder::TfidfDesc,
            bigrams: false,
            distance_weighted: false,
            max_docs: None,
            stopwords: None,
        }
    }
}

impl Config {
    /// Load a profile from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save the profile to a TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Parse a profile from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_tool() {
        let c = Config::default();
        assert_eq!(c.width, 16);
        assert_eq!(c.area, 64);
        assert_eq!(c.filter, 3);
        assert_eq!(c.conllu_filter, 63);
        assert_eq!(c.emit, 7);
        assert_eq!(c.sort, SortOrder::TfidfDesc);
        assert!(!c.bigrams);
    }

    #[test]
    fn toml_roundtrip() {
        let mut c = Config::default();
        c.width = 8;
        c.bigrams = true;
        c.sort = SortOrder::Alpha;
        c.stopwords = Some(PathBuf::from("en.stop"));
        let text = toml::to_string_pretty(&c).unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.width, 8);
        assert!(back.bigrams);
        assert_eq!(back.sort, SortOrder::Alpha);
        assert_eq!(back.stopwords.as_deref(), Some(Path::new("en.stop")));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = Config::from_toml_str("width = 4\n").unwrap();
        assert_eq!(c.width, 4);
        assert_eq!(c.area, 64);
    }
}
