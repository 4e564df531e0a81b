//! Similarity queries over a finalized lexicon and neighborhood matrix.
//!
//! A word's neighborhood row (capped at `area` pairs, re-sorted by column
//! id) is compared against every other non-empty row under one of two
//! measures: a Euclidean-like distance where unmatched columns count their
//! full weight, or a dot-product share over matched columns where larger
//! means more similar. Candidates feed a fixed-size best list.
//!
//! Multi-word context queries intersect the rows of up to
//! [`MAX_CONTEXT_WORDS`] words: a column qualifies when every query word's
//! row holds it with a count above 1, and qualifying columns rank by their
//! summed counts.

use crate::lexicon::Lexicon;
use crate::matrix::NeighborMatrix;

/// Best-list length for single-word queries.
pub const TOP_K: usize = 16;
/// Upper bound on words in a context query.
pub const MAX_CONTEXT_WORDS: usize = 8;

/// Which end of the score scale wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefer {
    /// Smaller scores are better (distances).
    Smaller,
    /// Larger scores are better (shares).
    Larger,
}

/// Similarity measure for single-word queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// [`row_distance`], ranked ascending.
    Distance,
    /// [`row_share`], ranked descending.
    Share,
}

/// Euclidean-like distance between two rows sorted by column id: squared
/// differences over matched columns plus squared weights of everything
/// unmatched on either side.
pub fn row_distance(a: &[(u32, u32)], b: &[(u32, u32)]) -> f32 {
    let (mut i, mut j) = (0usize, 0usize);
    let mut dist = 0f32;
    while i < a.len() && j < b.len() {
        if a[i].0 < b[j].0 {
            let v = a[i].1 as f32;
            dist += v * v;
            i += 1;
        } else if b[j].0 < a[i].0 {
            let v = b[j].1 as f32;
            dist += v * v;
            j += 1;
        } else {
            let d = b[j].1 as f32 - a[i].1 as f32;
            dist += d * d;
            i += 1;
            j += 1;
        }
    }
    for &(_, v) in &a[i..] {
        dist += (v as f32) * (v as f32);
    }
    for &(_, v) in &b[j..] {
        dist += (v as f32) * (v as f32);
    }
    dist.sqrt()
}

/// Dot-product share between two rows sorted by column id: root of the sum
/// of products over matched columns. Zero when nothing matches.
pub fn row_share(a: &[(u32, u32)], b: &[(u32, u32)]) -> f32 {
    let (mut i, mut j) = (0usize, 0usize);
    let mut share = 0f32;
    while i < a.len() && j < b.len() {
        if a[i].0 < b[j].0 {
            i += 1;
        } else if b[j].0 < a[i].0 {
            j += 1;
        } else {
            share += a[i].1 as f32 * b[j].1 as f32;
            i += 1;
            j += 1;
        }
    }
    if share > 0.0 {
        share.sqrt()
    } else {
        share
    }
}

/// Fixed-size best list, kept sorted best-first.
///
/// Insertion scans from the worst slot toward the best and shifts the tail
/// right. When the list is full, a candidate that beats nobody still lands
/// in the worst slot, displacing its previous occupant — callers relying on
/// the tail must rank the head first, which is all the query loop reads.
#[derive(Debug, Clone)]
pub struct BestList {
    slots: Vec<(i32, f32)>,
    prefer: Prefer,
}

impl BestList {
    pub fn new(k: usize, prefer: Prefer) -> Self {
        Self {
            slots: vec![(-1, 0.0); k],
            prefer,
        }
    }

    pub fn reset(&mut self) {
        self.slots.fill((-1, 0.0));
    }

    /// True when `score` ranks strictly better than `other`.
    fn beats(&self, score: f32, other: f32) -> bool {
        match self.prefer {
            Prefer::Smaller => other > score,
            Prefer::Larger => other < score,
        }
    }

    pub fn add(&mut self, id: u32, score: f32) {
        let k = self.slots.len();
        let mut i = k;
        while i > 0 {
            i -= 1;
            if self.slots[i].0 == -1 {
                if i > 0 && (self.slots[i - 1].0 == -1 || self.beats(score, self.slots[i - 1].1)) {
                    continue;
                }
                self.slots[i] = (id as i32, score);
                return;
            }
            if i > 0 && self.beats(score, self.slots[i - 1].1) {
                continue;
            }
            for j in (i + 1..k).rev() {
                self.slots[j] = self.slots[j - 1];
            }
            self.slots[i] = (id as i32, score);
            return;
        }
    }

    /// Filled slots, best first.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.slots
            .iter()
            .take_while(|(id, _)| *id != -1)
            .map(|&(id, score)| (id as u32, score))
    }
}

/// Result of a multi-word context query.
#[derive(Debug, Default)]
pub struct ContextResult {
    /// Query words absent from the lexicon, in input order.
    pub missing: Vec<String>,
    /// Columns present in every query word's row, ranked by summed count.
    pub matches: Vec<(u32, u64)>,
}

/// Shared-read view over a finalized model.
pub struct QueryEngine<'a> {
    lexicon: &'a Lexicon,
    matrix: &'a NeighborMatrix,
    area: usize,
}

impl<'a> QueryEngine<'a> {
    pub fn new(lexicon: &'a Lexicon, matrix: &'a NeighborMatrix, area: usize) -> Self {
        Self {
            lexicon,
            matrix,
            area,
        }
    }

    /// The `k` lexicon entries most similar to `word` under `metric`, best
    /// first. `None` when the word is not in the dictionary.
    pub fn similar(&self, word: &str, k: usize, metric: Metric) -> Option<Vec<(String, f32)>> {
        let id = self.lexicon.find(word)?;
        let mut word_row = self.matrix.row(id, self.area);
        word_row.sort_unstable_by_key(|p| p.0);
        let prefer = match metric {
            Metric::Distance => Prefer::Smaller,
            Metric::Share => Prefer::Larger,
        };
        let mut best = BestList::new(k, prefer);
        let mut check = Vec::with_capacity(self.area);
        for y in 0..self.lexicon.len() as u32 {
            if y == id {
                continue;
            }
            if self.matrix.row_into(y, self.area, &mut check) == 0 {
                continue;
            }
            check.sort_unstable_by_key(|p| p.0);
            let score = match metric {
                Metric::Distance => row_distance(&word_row, &check),
                Metric::Share => row_share(&word_row, &check),
            };
            best.add(y, score);
        }
        Some(
            best.iter()
                .map(|(id, score)| (self.lexicon.text(id).to_string(), score))
                .collect(),
        )
    }

    /// Intersect the contexts of up to [`MAX_CONTEXT_WORDS`] words. Only
    /// row entries with count above 1 contribute; a column qualifies when
    /// every found query word contributed to it.
    pub fn context(&self, words: &[&str]) -> ContextResult {
        let mut result = ContextResult::default();
        let mut found = Vec::new();
        for &word in words {
            if found.len() >= MAX_CONTEXT_WORDS {
                break;
            }
            match self.lexicon.find(word) {
                Some(id) => found.push(id),
                None => result.missing.push(word.to_string()),
            }
        }
        let n = self.lexicon.len();
        let mut sum = vec![0u64; n];
        let mut mask = vec![0u8; n];
        let mut all = 0u8;
        let mut row = Vec::with_capacity(self.area);
        for (i, &id) in found.iter().enumerate() {
            let bit = 1u8 << i;
            self.matrix.row_into(id, self.area, &mut row);
            for &(x, count) in &row {
                if count > 1 {
                    sum[x as usize] += u64::from(count);
                    mask[x as usize] |= bit;
                }
            }
            all |= bit;
        }
        result.matches = (0..n)
            .filter(|&c| sum[c] != 0 && mask[c] == all)
            .map(|c| (c as u32, sum[c]))
            .collect();
        result.matches.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{TileMatrix, DEFAULT_TILE_SIDE};

    #[test]
    fn distance_counts_unmatched_columns() {
        let a = [(1u32, 3u32), (4, 2)];
        let b = [(1u32, 1u32), (5, 2)];
        // matched col 1: (1-3)^2 = 4; unmatched: 2^2 + 2^2 = 8
        assert!((row_distance(&a, &b) - 12f32.sqrt()).abs() < 1e-6);
        assert!((row_distance(&a, &[]) - 13f32.sqrt()).abs() < 1e-6);
        assert_eq!(row_distance(&[], &[]), 0.0);
    }

    #[test]
    fn share_ignores_unmatched_columns() {
        let a = [(1u32, 3u32), (4, 2)];
        let b = [(1u32, 2u32), (5, 9)];
        assert!((row_share(&a, &b) - 6f32.sqrt()).abs() < 1e-6);
        assert_eq!(row_share(&a, &[]), 0.0);
    }

    #[test]
    fn best_list_stays_sorted_descending() {
        let mut best = BestList::new(4, Prefer::Larger);
        for (id, score) in [(1, 0.5), (2, 2.0), (3, 1.0), (4, 3.0), (5, 1.5)] {
            best.add(id, score);
        }
        let scores: Vec<f32> = best.iter().map(|(_, s)| s).collect();
        assert_eq!(scores, vec![3.0, 2.0, 1.5, 1.0]);
        let ids: Vec<u32> = best.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![4, 2, 5, 3]);
    }

    #[test]
    fn best_list_stays_sorted_ascending() {
        let mut best = BestList::new(3, Prefer::Smaller);
        for (id, score) in [(1, 5.0), (2, 1.0), (3, 3.0)] {
            best.add(id, score);
        }
        let scores: Vec<f32> = best.iter().map(|(_, s)| s).collect();
        assert_eq!(scores, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn best_list_partial_fill_keeps_order() {
        let mut best = BestList::new(8, Prefer::Larger);
        best.add(7, 1.0);
        best.add(9, 4.0);
        let got: Vec<(u32, f32)> = best.iter().collect();
        assert_eq!(got, vec![(9, 4.0), (7, 1.0)]);
        best.reset();
        assert_eq!(best.iter().count(), 0);
    }

    #[test]
    fn full_best_list_displaces_the_worst() {
        let mut best = BestList::new(3, Prefer::Larger);
        best.add(1, 10.0);
        best.add(2, 8.0);
        best.add(3, 5.0);
        best.add(4, 1.0);
        let scores: Vec<f32> = best.iter().map(|(_, s)| s).collect();
        // Still monotonic; the old worst slot now holds the newcomer.
        assert_eq!(scores, vec![10.0, 8.0, 1.0]);
    }

    fn tiny_model() -> (Lexicon, NeighborMatrix) {
        // a b a c a b, width 2 (see the pipeline tests for the counts)
        let mut lex = Lexicon::new();
        for w in ["a", "b", "c"] {
            lex.add(w, 0, 1).unwrap();
        }
        let mut m = TileMatrix::new(DEFAULT_TILE_SIDE, 3, 3);
        for (x, y, n) in [
            (1, 0, 3),
            (2, 0, 2),
            (0, 1, 3),
            (2, 1, 1),
            (0, 2, 2),
            (1, 2, 1),
        ] {
            m.set(x, y, n).unwrap();
        }
        (lex, m.finalize())
    }

    #[test]
    fn share_query_ranks_by_matched_products() {
        let (lex, nm) = tiny_model();
        let engine = QueryEngine::new(&lex, &nm, 64);
        let got = engine.similar("a", TOP_K, Metric::Share).unwrap();
        // row(a) = {b:3, c:2}; share with row(c) = {a:2, b:1} matches on
        // column b: sqrt(3); share with row(b) = {a:3, c:1} matches on
        // column c: sqrt(2). c ranks first.
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, "c");
        assert!((got[0].1 - 3f32.sqrt()).abs() < 1e-6);
        assert_eq!(got[1].0, "b");
        assert!((got[1].1 - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn unknown_word_is_none() {
        let (lex, nm) = tiny_model();
        let engine = QueryEngine::new(&lex, &nm, 64);
        assert!(engine.similar("zebra", TOP_K, Metric::Share).is_none());
    }

    #[test]
    fn context_intersects_rows_above_count_one() {
        let mut lex = Lexicon::new();
        for w in ["a", "b", "p", "q", "r"] {
            lex.add(w, 0, 1).unwrap();
        }
        let (a, b) = (lex.find("a").unwrap(), lex.find("b").unwrap());
        let (p, q, r) = (
            lex.find("p").unwrap(),
            lex.find("q").unwrap(),
            lex.find("r").unwrap(),
        );
        let mut m = TileMatrix::new(DEFAULT_TILE_SIDE, 5, 5);
        // p sits in both contexts, q only under a, r under both but at
        // count 1 for b (below the floor).
        m.set(p, a, 4).unwrap();
        m.set(p, b, 3).unwrap();
        m.set(q, a, 9).unwrap();
        m.set(r, a, 2).unwrap();
        m.set(r, b, 1).unwrap();
        let nm = m.finalize();
        let engine = QueryEngine::new(&lex, &nm, 64);
        let result = engine.context(&["a", "b", "missing"]);
        assert_eq!(result.missing, vec!["missing".to_string()]);
        assert_eq!(result.matches, vec![(p, 7)]);
    }
}
