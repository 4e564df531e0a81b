//! Corpus pipeline: stream tokens, resolve lexicon ids, feed the windowed
//! co-occurrence accumulator.
//!
//! Tokens flow into a rolling id buffer; stopwords, class-filtered words and
//! unknown words (in lookup mode) become the sentinel id −1 so they still
//! occupy a window position. The buffer is flushed into the matrix at
//! document boundaries, every [`AUTO_CUT`] tokens, and at end of input —
//! each auto-cut counts as a sub-document so document frequencies stay
//! meaningful on huge single-document corpora.
//!
//! For every anchor position `i` and neighbor `j ∈ [i−W, i+W)`, `j ≠ i`,
//! with distinct valid ids, the cell `(x = items[j], y = items[i])` is
//! incremented — the row axis is the anchor, so `row(id)` reads back the
//! neighborhood of `id`. Once cumulative window inserts pass
//! [`PRUNE_TRIGGER`], singleton cells are pruned at the next document
//! boundary.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lexicon::{Lexicon, SortOrder};
use crate::matrix::{NeighborMatrix, TileMatrix, DEFAULT_TILE_SIDE};
use crate::tokenizer::{
    filter_word, sniff_utf8, ColumnSelect, ConlluTokenizer, RawTokenizer, Record,
};

/// Rolling token-id buffer capacity.
pub const TOKEN_BUFFER: usize = 16 * 1024;
/// Buffer length that forces a window flush (one sub-document).
pub const AUTO_CUT: usize = 4 * 1024;
/// Cumulative window inserts after which singletons are pruned.
pub const PRUNE_TRIGGER: u64 = 50_000_000;
/// Logical matrix dimension used while the lexicon is still being built.
pub const GENERATING_DIM: u32 = 2 * 1024 * 1024;

/// Read-ahead for corpus files.
const CORPUS_BUFFER: usize = 16 * 1024 * 1024;

/// "No token" sentinel in the window buffer.
const NO_TOKEN: i32 = -1;

/// Corpus input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    /// Plain text, whitespace/punctuation tokenization.
    Raw,
    /// CoNLL-U-like column records.
    Conllu(ColumnSelect),
}

/// Knobs for one [`analyze`] run.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub format: CorpusFormat,
    /// Insert unseen words into the lexicon (build mode) instead of mapping
    /// them to the sentinel (lookup mode).
    pub generating: bool,
    /// Join adjacent tokens with `_` into bigram entries. In lookup mode a
    /// known bigram replaces the unigram id in the window buffer; in build
    /// mode the bigram is only counted in the lexicon.
    pub bigrams: bool,
    /// Weight window increments by `W − |j−i| + 1` instead of 1.
    pub distance_weighted: bool,
    /// Window radius W.
    pub width: usize,
    /// Character-class filter mask (tokenizer `FILTER_*` bits).
    pub char_filter: u32,
    /// UPOS filter mask for columnar input (`POS_FILTER_*` bits).
    pub pos_filter: u32,
    /// Stop after this many explicit documents.
    pub max_docs: Option<u64>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            format: CorpusFormat::Raw,
            generating: false,
            bigrams: false,
            distance_weighted: false,
            width: 16,
            char_filter: 0,
            pos_filter: 0,
            max_docs: None,
        }
    }
}

/// Counters reported by [`analyze`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AnalyzeReport {
    /// Explicit documents (boundary markers).
    pub docs: u64,
    /// Auto-cut sub-documents.
    pub subdocs: u64,
    /// Window increments issued to the matrix.
    pub window_inserts: u64,
    /// Cells removed by in-flight pruning.
    pub pruned: u64,
}

enum Source<R: std::io::BufRead> {
    Raw(RawTokenizer<R>),
    Conllu(ConlluTokenizer<R>),
}

/// One pipeline event.
enum Token {
    Meta(String),
    Word(String),
}

/// Run the pipeline over `corpus`, updating `lexicon` (and `matrix` when
/// building a neighborhood). The borrows end with the call.
pub fn analyze(
    corpus: &Path,
    opts: &AnalyzeOptions,
    lexicon: &mut Lexicon,
    stopwords: Option<&Lexicon>,
    mut matrix: Option<&mut TileMatrix>,
) -> Result<AnalyzeReport> {
    let mut file = File::open(corpus).map_err(|e| Error::Open {
        path: corpus.to_path_buf(),
        source: e,
    })?;
    let utf8 = sniff_utf8(&mut file)?;
    let reader = BufReader::with_capacity(CORPUS_BUFFER, file);
    let mut source = match opts.format {
        CorpusFormat::Raw => Source::Raw(RawTokenizer::new(reader, utf8)),
        CorpusFormat::Conllu(select) => {
            Source::Conllu(ConlluTokenizer::new(reader, select, opts.pos_filter))
        }
    };

    let mut report = AnalyzeReport::default();
    let mut items: Vec<i32> = Vec::with_capacity(TOKEN_BUFFER);
    // Window inserts since the last prune.
    let mut fresh_inserts = 0u64;

    loop {
        let token = match &mut source {
            Source::Raw(t) => t.next_word()?.map(Token::Word),
            Source::Conllu(t) => t.next_record()?.map(|r| match r {
                Record::Meta(m) => Token::Meta(m),
                Record::Word(w) => Token::Word(w),
                Record::Skip => Token::Word(String::new()),
            }),
        };
        let Some(token) = token else {
            break;
        };
        match token {
            Token::Meta(line) => {
                let new_doc = line.starts_with("# newdoc") || line.starts_with("<doc");
                if new_doc || line.starts_with("# newpar") {
                    fresh_inserts += flush(&mut items, matrix.as_deref_mut(), opts, &mut report)?;
                }
                if new_doc {
                    report.docs += 1;
                    if report.docs % 1024 == 0 {
                        debug!(
                            docs = report.docs,
                            words = lexicon.len(),
                            "analyzing corpus"
                        );
                    }
                    if let Some(m) = matrix.as_deref_mut() {
                        if fresh_inserts > PRUNE_TRIGGER {
                            report.pruned += m.prune(1);
                            fresh_inserts = 0;
                        }
                    }
                    if opts.max_docs.is_some_and(|max| report.docs >= max) {
                        break;
                    }
                }
            }
            Token::Word(word) => {
                let id = resolve(&word, opts, lexicon, stopwords, &items, &report)?;
                items.push(id);
                if items.len() >= AUTO_CUT {
                    fresh_inserts += flush(&mut items, matrix.as_deref_mut(), opts, &mut report)?;
                    report.subdocs += 1;
                }
            }
        }
    }
    // End of input closes the last document.
    flush(&mut items, matrix.as_deref_mut(), opts, &mut report)?;
    info!(
        docs = report.docs,
        subdocs = report.subdocs,
        words = lexicon.len(),
        inserts = report.window_inserts,
        "corpus analyzed"
    );
    Ok(report)
}

/// Map one token to a window id: sentinel for empties, stopwords and
/// filtered or unknown words, otherwise the lexicon id (possibly replaced
/// by a bigram id, see [`AnalyzeOptions::bigrams`]).
fn resolve(
    word: &str,
    opts: &AnalyzeOptions,
    lexicon: &mut Lexicon,
    stopwords: Option<&Lexicon>,
    items: &[i32],
    report: &AnalyzeReport,
) -> Result<i32> {
    if word.is_empty() {
        return Ok(NO_TOKEN);
    }
    if stopwords.is_some_and(|s| s.find(word).is_some()) {
        return Ok(NO_TOKEN);
    }
    if opts.char_filter != 0 && filter_word(word, opts.char_filter) {
        return Ok(NO_TOKEN);
    }
    let doc_id = (report.docs + report.subdocs) as i32;
    let unigram = if opts.generating {
        Some(lexicon.add(word, doc_id, 1)?)
    } else {
        lexicon.find(word)
    };
    let Some(unigram) = unigram else {
        return Ok(NO_TOKEN);
    };
    let mut id = unigram as i32;
    if opts.bigrams {
        if let Some(&prev) = items.last() {
            if prev != NO_TOKEN {
                let bigram = format!("{}_{}", lexicon.text(prev as u32), word);
                if opts.generating {
                    lexicon.add(&bigram, doc_id, 1)?;
                } else if let Some(bid) = lexicon.find(&bigram) {
                    id = bid as i32;
                }
            }
        }
    }
    Ok(id)
}

/// Feed the buffered window into the matrix and clear the buffer. Returns
/// the number of increments issued.
fn flush(
    items: &mut Vec<i32>,
    matrix: Option<&mut TileMatrix>,
    opts: &AnalyzeOptions,
    report: &mut AnalyzeReport,
) -> Result<u64> {
    let mut added = 0u64;
    if let Some(matrix) = matrix {
        added = accumulate_window(matrix, items, opts.width, opts.distance_weighted)?;
        report.window_inserts += added;
    }
    items.clear();
    Ok(added)
}

/// Issue the windowed increments for one buffer of ids.
fn accumulate_window(
    matrix: &mut TileMatrix,
    items: &[i32],
    width: usize,
    weighted: bool,
) -> Result<u64> {
    let mut added = 0u64;
    for (i, &anchor) in items.iter().enumerate() {
        if anchor == NO_TOKEN {
            continue;
        }
        let lo = i.saturating_sub(width);
        let hi = (i + width).min(items.len());
        for (j, &neighbor) in items.iter().enumerate().take(hi).skip(lo) {
            if j == i || neighbor == NO_TOKEN || neighbor == anchor {
                continue;
            }
            let delta = if weighted {
                (width - i.abs_diff(j) + 1) as u32
            } else {
                1
            };
            match matrix.set(neighbor as u32, anchor as u32, delta) {
                // Ids beyond the generating geometry are silently dropped.
                Ok(_) | Err(Error::OutOfRange { .. }) => added += 1,
                Err(e) => return Err(e),
            }
        }
    }
    Ok(added)
}

/// Load a stopword dictionary (one word per line, dictionary text format).
pub fn load_stopwords(path: &Path) -> Result<Lexicon> {
    let mut stop = Lexicon::with_capacity(8192);
    stop.import(path)?;
    Ok(stop)
}

/// Build a dictionary from a corpus and export it: analyze in generating
/// mode, weigh with TF·IDF, sort, write. Returns the number of exported
/// entries; only entries with `count > 2` make it to the file, and the
/// doc-count cut stays disabled at its default.
pub fn build_dictionary(
    corpus: &Path,
    dict: &Path,
    stopwords: Option<&Lexicon>,
    opts: &AnalyzeOptions,
    sort: SortOrder,
    emit: u32,
) -> Result<usize> {
    let mut lexicon = Lexicon::with_capacity(256 * 1024);
    let opts = AnalyzeOptions {
        generating: true,
        ..opts.clone()
    };
    analyze(corpus, &opts, &mut lexicon, stopwords, None)?;
    lexicon.set_tfidf();
    lexicon.sort(sort);
    lexicon.export(dict, emit, 2, 1)
}

/// Build a neighborhood matrix from a corpus. When `dict` imports at least
/// one entry the run is a lookup over that lexicon; otherwise the lexicon
/// is generated on the fly over a [`GENERATING_DIM`]-square geometry.
/// Returns the finalized matrix together with the lexicon that indexes it.
pub fn build_neighborhood(
    corpus: &Path,
    dict: &Path,
    stopwords: Option<&Lexicon>,
    opts: &AnalyzeOptions,
) -> Result<(Lexicon, NeighborMatrix)> {
    let mut lexicon = Lexicon::with_capacity(256 * 1024);
    let generating = match lexicon.import(dict) {
        Ok(n) => n == 0,
        Err(Error::Open { .. }) => true,
        Err(e) => return Err(e),
    };
    if generating {
        info!(dict = %dict.display(), "dictionary not found, generating on the fly");
    }
    let dim = if generating {
        GENERATING_DIM
    } else {
        lexicon.len() as u32
    };
    let mut matrix = TileMatrix::new(DEFAULT_TILE_SIDE, dim, dim);
    let opts = AnalyzeOptions {
        generating,
        ..opts.clone()
    };
    analyze(corpus, &opts, &mut lexicon, stopwords, Some(&mut matrix))?;
    Ok((lexicon, matrix.finalize()))
}
