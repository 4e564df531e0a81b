//! String dictionary with per-document statistics and TF·IDF weights.
//!
//! Maps token text to a dense id (`0..len`) and keeps, per entry, the total
//! occurrence count, the number of distinct documents the token appeared in,
//! and a TF·IDF weight computed at the end of a build. Text is interned in
//! an [`Arena`], entries hold compact handles rather than references, so the
//! entry vector can grow and be re-sorted freely.
//!
//! Lookup goes through an open-addressed linear-probe index (DJB2 over the
//! raw bytes, table size `13·n − 17`, `u32::MAX` as the empty sentinel).
//! The index is resized and rebuilt whenever the load factor would pass one
//! half, and rebuilt again after every sort — ids are positions in the entry
//! vector, and sorting renumbers them.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::warn;

use crate::arena::{Arena, Span};
use crate::error::{Error, Result};

/// Empty slot marker in the hash index.
const EMPTY: u32 = u32::MAX;

/// Sentinel for "no document seen yet".
const NO_DOC: i32 = -1;

/// Emit-mask bit: total occurrence count column.
pub const EMIT_COUNT: u32 = 1;
/// Emit-mask bit: document count column.
pub const EMIT_DOC_COUNT: u32 = 2;
/// Emit-mask bit: TF·IDF column.
pub const EMIT_TFIDF: u32 = 4;

/// Sort orders accepted by [`Lexicon::sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Byte order of the entry text.
    Alpha,
    /// Descending TF·IDF weight.
    TfidfDesc,
}

/// One dictionary entry. The text lives in the lexicon's arena.
#[derive(Debug, Clone, Copy)]
pub struct LexiconEntry {
    text: Span,
    /// Most recent document id this entry was counted in.
    doc_last: i32,
    count: u64,
    doc_count: u64,
    tfidf: f32,
}

impl LexiconEntry {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    pub fn tfidf(&self) -> f32 {
        self.tfidf
    }
}

#[derive(Debug)]
pub struct Lexicon {
    arena: Arena,
    entries: Vec<LexiconEntry>,
    index: Vec<u32>,
    /// Document id seen by the most recent [`Lexicon::add`].
    last_doc: i32,
    /// Total token occurrences across the corpus.
    total_count: u64,
    /// Distinct documents seen so far.
    total_docs: u64,
}

fn djb2(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &b in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(b as u32);
    }
    hash
}

/// Index size for a given entry count. Keeps the table comfortably below
/// half load.
fn index_size(entries: usize) -> usize {
    (entries * 13).saturating_sub(17).max(61)
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexicon {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a lexicon pre-sized for roughly `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: Arena::new(),
            entries: Vec::with_capacity(capacity),
            index: vec![EMPTY; index_size(capacity.max(1))],
            last_doc: NO_DOC,
            total_count: 0,
            total_docs: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total token occurrences accumulated through [`Lexicon::add`].
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Distinct documents seen so far.
    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    pub fn entry(&self, id: u32) -> &LexiconEntry {
        &self.entries[id as usize]
    }

    pub fn text(&self, id: u32) -> &str {
        self.arena.get(self.entries[id as usize].text)
    }

    /// Look up an entry id by text.
    pub fn find(&self, text: &str) -> Option<u32> {
        let hsize = self.index.len();
        let mut i = djb2(text.as_bytes()) as usize % hsize;
        for _ in 0..hsize {
            let slot = self.index[i];
            if slot == EMPTY {
                return None;
            }
            if self.arena.get(self.entries[slot as usize].text) == text {
                return Some(slot);
            }
            i = (i + 1) % hsize;
        }
        None
    }

    /// Count one or more occurrences of `text` in document `doc_id`,
    /// inserting the entry on first sight. Returns the entry id.
    pub fn add(&mut self, text: &str, doc_id: i32, delta: u64) -> Result<u32> {
        let hsize = self.index.len();
        let mut i = djb2(text.as_bytes()) as usize % hsize;
        let mut probed = 0usize;
        while self.index[i] != EMPTY {
            let slot = self.index[i] as usize;
            if self.arena.get(self.entries[slot].text) == text {
                let entry = &mut self.entries[slot];
                if entry.doc_last != doc_id {
                    entry.doc_last = doc_id;
                    entry.doc_count += 1;
                }
                entry.count += delta;
                self.bump_global(doc_id, delta);
                return Ok(slot as u32);
            }
            i = (i + 1) % hsize;
            probed += 1;
            if probed >= hsize {
                return Err(Error::IndexFull);
            }
        }

        let id = self.entries.len() as u32;
        self.index[i] = id;
        let span = self.arena.intern(text);
        self.entries.push(LexiconEntry {
            text: span,
            doc_last: doc_id,
            count: delta,
            doc_count: 1,
            tfidf: 0.0,
        });
        if self.entries.len() > self.index.len() / 2 {
            self.index = vec![EMPTY; index_size(self.entries.len())];
            self.rebuild_index();
        }
        self.bump_global(doc_id, delta);
        Ok(id)
    }

    fn bump_global(&mut self, doc_id: i32, delta: u64) {
        if self.last_doc != doc_id {
            self.last_doc = doc_id;
            self.total_docs += 1;
        }
        self.total_count += delta;
    }

    fn rebuild_index(&mut self) {
        let hsize = self.index.len();
        self.index.fill(EMPTY);
        for (id, entry) in self.entries.iter().enumerate() {
            let mut i = djb2(self.arena.get(entry.text).as_bytes()) as usize % hsize;
            while self.index[i] != EMPTY {
                i = (i + 1) % hsize;
            }
            self.index[i] = id as u32;
        }
    }

    /// Compute TF·IDF for every entry:
    /// `(count / max_count) · ln(max_doc_count / (1 + doc_count))`.
    ///
    /// With a single document every entry has `doc_count == max_doc_count`
    /// and the weight collapses to a non-positive value; the export cut
    /// handles that case.
    pub fn set_tfidf(&mut self) {
        let Some(first) = self.entries.first() else {
            return;
        };
        let mut max_count = first.count;
        let mut max_doc_count = first.doc_count;
        for e in &self.entries[1..] {
            max_count = max_count.max(e.count);
            max_doc_count = max_doc_count.max(e.doc_count);
        }
        for e in &mut self.entries {
            let tf = e.count as f64 / max_count as f64;
            let idf = ((max_doc_count as f64 / (1.0 + e.doc_count as f64)) as f32).ln();
            e.tfidf = (tf * idf as f64) as f32;
        }
    }

    /// Sort entries and rebuild the hash index. Ids are renumbered: an id
    /// held across a sort is meaningless afterwards.
    pub fn sort(&mut self, order: SortOrder) {
        let arena = &self.arena;
        match order {
            SortOrder::Alpha => self
                .entries
                .sort_unstable_by(|a, b| arena.get(a.text).cmp(arena.get(b.text))),
            SortOrder::TfidfDesc => self.entries.sort_unstable_by(|a, b| {
                b.tfidf
                    .partial_cmp(&a.tfidf)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }
        self.rebuild_index();
    }

    /// Load entries from a dictionary text file: one entry per line, TAB
    /// separated (text, optional count, optional doc count), a leading
    /// `# lemma` header line skipped. Returns the entry total.
    pub fn import(&mut self, path: &Path) -> Result<usize> {
        let file = File::open(path).map_err(|e| Error::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let reader = BufReader::new(file);
        let mut saw_data = false;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if !saw_data && line.starts_with("# lemma") {
                continue;
            }
            let mut fields = line.split('\t');
            let text = fields.next().unwrap_or("");
            if text.is_empty() {
                continue;
            }
            saw_data = true;
            let count: u64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let doc_count: u64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let id = self.add(text, 1, 1)?;
            if count != 0 && doc_count != 0 {
                let entry = &mut self.entries[id as usize];
                entry.count = count;
                entry.doc_count = doc_count;
            }
        }
        Ok(self.entries.len())
    }

    /// Write the dictionary as text. `emit` selects the columns
    /// ([`EMIT_COUNT`] | [`EMIT_DOC_COUNT`] | [`EMIT_TFIDF`]). Entries with
    /// `count <= min_count` are skipped, as are entries with
    /// `doc_count <= min_doc_count` when `min_doc_count > 256` (the
    /// doc-count cut is gated; below that threshold it never applies), and
    /// non-positive TF·IDF entries when more than one document was seen.
    ///
    /// Returns the number of entries written. A write failure mid-file logs
    /// a warning and returns the partial count.
    pub fn export(
        &self,
        path: &Path,
        emit: u32,
        min_count: u64,
        min_doc_count: u64,
    ) -> Result<usize> {
        let file = File::create(path).map_err(|e| Error::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut out = BufWriter::new(file);

        let mut header = String::from("# lemma");
        if emit & EMIT_COUNT != 0 {
            let _ = write!(header, "\tcount({})", self.total_count);
        }
        if emit & EMIT_DOC_COUNT != 0 {
            let _ = write!(header, "\tdoccount({})", self.total_docs);
        }
        if emit & EMIT_TFIDF != 0 {
            header.push_str("\tTFxIDF");
        }
        header.push_str("\r\n");

        let mut written = 0usize;
        if let Err(e) = out.write_all(header.as_bytes()) {
            warn!(path = %path.display(), error = %e, "dictionary export stopped early");
            return Ok(written);
        }

        for entry in &self.entries {
            if entry.count <= min_count
                || (min_doc_count > 256 && entry.doc_count <= min_doc_count)
            {
                continue;
            }
            if self.total_docs > 1 && entry.tfidf <= 0.0 {
                continue;
            }
            let mut line = String::from(self.arena.get(entry.text));
            if emit & EMIT_COUNT != 0 {
                let _ = write!(line, "\t{}", entry.count);
            }
            if emit & EMIT_DOC_COUNT != 0 {
                let _ = write!(line, "\t{}", entry.doc_count);
            }
            if emit & EMIT_TFIDF != 0 {
                let _ = write!(line, "\t{:.4}", entry.tfidf);
            }
            line.push_str("\r\n");
            if let Err(e) = out.write_all(line.as_bytes()) {
                warn!(path = %path.display(), error = %e, "dictionary export stopped early");
                return Ok(written);
            }
            written += 1;
        }
        if let Err(e) = out.flush() {
            warn!(path = %path.display(), error = %e, "dictionary export flush failed");
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_find() {
        let mut lex = Lexicon::new();
        let id = lex.add("cat", 0, 1).unwrap();
        assert_eq!(lex.find("cat"), Some(id));
        assert_eq!(lex.find("dog"), None);
        assert_eq!(lex.text(id), "cat");
        assert_eq!(lex.entry(id).count(), 1);
    }

    #[test]
    fn doc_count_tracks_distinct_documents() {
        let mut lex = Lexicon::new();
        let id = lex.add("cat", 0, 1).unwrap();
        lex.add("cat", 0, 1).unwrap();
        lex.add("cat", 1, 1).unwrap();
        lex.add("cat", 1, 3).unwrap();
        let e = lex.entry(id);
        assert_eq!(e.count(), 6);
        assert_eq!(e.doc_count(), 2);
        assert_eq!(lex.total_docs(), 2);
        assert_eq!(lex.total_count(), 6);
    }

    #[test]
    fn index_survives_growth() {
        let mut lex = Lexicon::with_capacity(4);
        for i in 0..500 {
            lex.add(&format!("word{i}"), 0, 1).unwrap();
        }
        for i in 0..500 {
            let id = lex.find(&format!("word{i}")).expect("entry present");
            assert_eq!(lex.text(id), format!("word{i}"));
        }
        assert_eq!(lex.len(), 500);
    }

    #[test]
    fn tfidf_ranks_rare_above_saturating() {
        let mut lex = Lexicon::new();
        // "common" appears in both documents, "rare" in one.
        lex.add("common", 0, 1).unwrap();
        lex.add("rare", 0, 1).unwrap();
        lex.add("common", 1, 1).unwrap();
        lex.set_tfidf();
        let common = lex.entry(lex.find("common").unwrap());
        let rare = lex.entry(lex.find("rare").unwrap());
        assert!(rare.tfidf() > common.tfidf());
        // the entry present in every document weighs non-positive
        assert!(common.tfidf() <= 0.0);
    }

    #[test]
    fn sort_alpha_rebuilds_index() {
        let mut lex = Lexicon::new();
        lex.add("zebra", 0, 1).unwrap();
        lex.add("apple", 0, 2).unwrap();
        lex.add("mango", 0, 3).unwrap();
        lex.sort(SortOrder::Alpha);
        assert_eq!(lex.text(0), "apple");
        assert_eq!(lex.text(1), "mango");
        assert_eq!(lex.text(2), "zebra");
        // index-by-hash agrees with index-by-position
        for id in 0..lex.len() as u32 {
            let text = lex.text(id).to_string();
            assert_eq!(lex.find(&text), Some(id));
        }
    }

    #[test]
    fn sort_tfidf_descending() {
        let mut lex = Lexicon::new();
        lex.add("everywhere", 0, 10).unwrap();
        lex.add("rare", 0, 1).unwrap();
        lex.add("everywhere", 1, 10).unwrap();
        lex.set_tfidf();
        lex.sort(SortOrder::TfidfDesc);
        assert!(lex.entry(0).tfidf() >= lex.entry(1).tfidf());
        assert_eq!(lex.text(0), "rare");
    }

    #[test]
    fn export_import_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.lex");

        let mut lex = Lexicon::new();
        for (word, n) in [("alpha", 5), ("beta", 9), ("gamma", 4)] {
            for d in 0..n {
                lex.add(word, d, 1).unwrap();
            }
        }
        lex.set_tfidf();
        let written = lex
            .export(&path, EMIT_COUNT | EMIT_DOC_COUNT | EMIT_TFIDF, 0, 0)
            .unwrap();
        assert_eq!(written, 3);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("# lemma\tcount("));
        assert!(raw.contains("\r\n"));

        let mut back = Lexicon::new();
        let n = back.import(&path).unwrap();
        assert_eq!(n, 3);
        let alpha = back.entry(back.find("alpha").unwrap());
        assert_eq!(alpha.count(), 5);
        assert_eq!(alpha.doc_count(), 5);
    }

    #[test]
    fn export_honors_count_cut() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.lex");
        let mut lex = Lexicon::new();
        lex.add("once", 0, 1).unwrap();
        lex.add("thrice", 0, 3).unwrap();
        let written = lex.export(&path, EMIT_COUNT, 2, 0).unwrap();
        assert_eq!(written, 1);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("thrice"));
        assert!(!raw.contains("once"));
    }

    #[test]
    fn import_without_counts_defaults_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.lex");
        std::fs::write(&path, "the\r\ncat\r\n").unwrap();
        let mut lex = Lexicon::new();
        assert_eq!(lex.import(&path).unwrap(), 2);
        let the = lex.entry(lex.find("the").unwrap());
        assert_eq!(the.count(), 1);
        assert_eq!(the.doc_count(), 1);
    }
}
