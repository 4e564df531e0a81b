//! word2neigh-core
//!
//! Builds a word co-occurrence model from text corpora and answers
//! similarity queries over it. A build run tokenizes the corpus (raw text
//! or CoNLL-U-like columns), maps tokens through an interning
//! [`Lexicon`] with per-document statistics and TF·IDF weights, and
//! accumulates windowed co-occurrence counts in a sparse tile-hashed
//! [`TileMatrix`]. Finalizing yields a read-only [`NeighborMatrix`] that
//! serves row queries and persists to a compact binary format; the
//! [`QueryEngine`] ranks nearest entries by vector distance or dot-product
//! share and intersects multi-word contexts.
//!
//! Public API:
//! - [`Lexicon`] — string→id dictionary, TF·IDF, text import/export
//! - [`TileMatrix`] / [`NeighborMatrix`] — sparse 2D counter and its
//!   finalized, queryable form
//! - [`pipeline::analyze`], [`pipeline::build_dictionary`],
//!   [`pipeline::build_neighborhood`] — corpus runs
//! - [`QueryEngine`] — similarity and context queries
//! - [`Config`] — TOML build profile
//!
//! Everything is single-threaded by design: a build is one pull loop over
//! a sequential byte stream, and update order is corpus order.

pub mod arena;
pub mod config;
pub mod error;
pub mod lexicon;
pub mod matrix;
pub mod pipeline;
pub mod query;
mod tile;
pub mod tokenizer;

pub use config::Config;
pub use error::{Error, Result};
pub use lexicon::{Lexicon, LexiconEntry, SortOrder};
pub use matrix::{NeighborMatrix, TileMatrix, DEFAULT_TILE_SIDE};
pub use pipeline::{AnalyzeOptions, AnalyzeReport, CorpusFormat};
pub use query::{Metric, QueryEngine, TOP_K};
pub use tokenizer::ColumnSelect;

/// Utility helpers.
pub mod util {
    /// Normalize interactive input (NFC) and trim whitespace. Corpus bytes
    /// are never normalized — entries are interned verbatim — so this is
    /// only for text typed at the query prompt.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn normalize_trims_and_composes() {
        // e + combining acute composes to é
        assert_eq!(super::util::normalize("  cafe\u{301} \n"), "café");
    }
}
