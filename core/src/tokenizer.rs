//! Corpus tokenization: raw text and CoNLL-U-like column records.
//!
//! The raw tokenizer streams one word per call: a maximal run of
//! non-separator, non-punctuation scalars. A punctuation character ends the
//! current word and is buffered for the next call; standing alone it becomes
//! a single-character word. Instead of pushing bytes back into the stream,
//! the tokenizer buffers one decoded scalar of lookahead.
//!
//! Input is sniffed once over a 256-byte prefix: fully valid UTF-8 (BOM
//! consumed) selects UTF-8 decoding, anything else selects byte mode where
//! every byte is widened as Latin-1. A malformed sequence later in a UTF-8
//! file demotes the remainder to byte mode — tokenization never fails on
//! content.
//!
//! The columnar tokenizer reads one record per line. `#`/`<` lines pass
//! through as meta records (the pipeline watches them for document
//! boundaries); data lines yield one token picked by a [`ColumnSelect`],
//! optionally rejected by a UPOS filter over column 3.

use std::io::{self, BufRead, Read, Seek, SeekFrom};

/// Maximum token length in UTF-8 bytes; longer words are truncated,
/// the continuation silently dropped.
pub const MAX_WORD_LEN: usize = 60;

/// Character-class filter bit: tokens made of digits and `,` `.` `%` `'`.
pub const FILTER_DIGITS: u32 = 1;
/// Character-class filter bit: tokens made entirely of punctuation.
pub const FILTER_PUNCT: u32 = 2;

/// UPOS filter bits for columnar input (column 3).
pub const POS_FILTER_PUNCT: u32 = 1;
pub const POS_FILTER_DET: u32 = 2;
pub const POS_FILTER_ADP: u32 = 4;
pub const POS_FILTER_ADV: u32 = 8;
pub const POS_FILTER_CONJ: u32 = 16;
pub const POS_FILTER_AUX: u32 = 32;
pub const POS_FILTER_ALL: u32 = 63;

/// Word separators. Exactly these four; other Unicode whitespace is token
/// material like any letter.
fn is_separator(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

/// Punctuation test used for word splitting and the punct class filter.
/// ASCII plus the common Latin-1, general-punctuation, CJK and fullwidth
/// blocks.
pub fn is_punct(ch: char) -> bool {
    if ch.is_ascii() {
        return ch.is_ascii_punctuation();
    }
    matches!(ch,
        '\u{A1}' | '\u{A7}' | '\u{AB}' | '\u{B6}' | '\u{B7}' | '\u{BB}' | '\u{BF}'
        | '\u{2010}'..='\u{2027}'
        | '\u{2030}'..='\u{205E}'
        | '\u{3001}'..='\u{3003}'
        | '\u{3008}'..='\u{3011}'
        | '\u{3014}'..='\u{301F}'
        | '\u{FF01}'..='\u{FF0F}'
        | '\u{FF1A}'..='\u{FF20}'
        | '\u{FF3B}'..='\u{FF40}'
        | '\u{FF5B}'..='\u{FF65}')
}

/// True when the whole word falls to one of the character-class filters
/// ([`FILTER_DIGITS`] | [`FILTER_PUNCT`]).
pub fn filter_word(word: &str, filter: u32) -> bool {
    if word.is_empty() {
        return false;
    }
    if filter & FILTER_DIGITS != 0
        && word
            .chars()
            .all(|c| c.is_numeric() || matches!(c, ',' | '.' | '%' | '\''))
    {
        return true;
    }
    if filter & FILTER_PUNCT != 0 && word.chars().all(is_punct) {
        return true;
    }
    false
}

/// Classify the stream as UTF-8 or byte-oriented from a 256-byte prefix and
/// rewind, consuming a UTF-8 BOM when present. The whole prefix must be
/// valid — a multi-byte sequence cut by the prefix boundary demotes the
/// file to byte mode.
pub fn sniff_utf8<R: Read + Seek>(input: &mut R) -> io::Result<bool> {
    let mut buf = [0u8; 256];
    let mut filled = 0usize;
    loop {
        let n = input.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }
    let prefix = &buf[..filled];
    let utf8 = std::str::from_utf8(prefix).is_ok();
    let skip = if utf8 && prefix.starts_with(&[0xEF, 0xBB, 0xBF]) {
        3
    } else {
        0
    };
    input.seek(SeekFrom::Start(skip))?;
    Ok(utf8)
}

/// Streaming word reader over raw text.
pub struct RawTokenizer<R: BufRead> {
    input: R,
    utf8: bool,
    /// One scalar of lookahead (class-change push-back).
    pending: Option<char>,
    /// Raw bytes queued after a failed multi-byte decode.
    byte_stack: Vec<u8>,
}

impl<R: BufRead> RawTokenizer<R> {
    pub fn new(input: R, utf8: bool) -> Self {
        Self {
            input,
            utf8,
            pending: None,
            byte_stack: Vec::new(),
        }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.byte_stack.pop() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn next_scalar(&mut self) -> io::Result<Option<char>> {
        if let Some(ch) = self.pending.take() {
            return Ok(Some(ch));
        }
        let Some(b0) = self.next_byte()? else {
            return Ok(None);
        };
        if !self.utf8 || b0 < 0x80 {
            return Ok(Some(b0 as char));
        }
        let len = if b0 < 0xE0 {
            2
        } else if b0 < 0xF0 {
            3
        } else {
            4
        };
        let mut seq = [b0, 0, 0, 0];
        let mut got = 1;
        while got < len {
            match self.next_byte()? {
                Some(b) => {
                    seq[got] = b;
                    got += 1;
                }
                None => break,
            }
        }
        match std::str::from_utf8(&seq[..got]) {
            Ok(s) => Ok(s.chars().next()),
            Err(_) => {
                // Malformed sequence: the rest of the file is byte data.
                self.utf8 = false;
                for i in (1..got).rev() {
                    self.byte_stack.push(seq[i]);
                }
                Ok(Some(b0 as char))
            }
        }
    }

    /// Next word, or `None` at end of input.
    pub fn next_word(&mut self) -> io::Result<Option<String>> {
        loop {
            match self.next_scalar()? {
                None => return Ok(None),
                Some(ch) if is_separator(ch) => continue,
                Some(ch) => {
                    self.pending = Some(ch);
                    break;
                }
            }
        }
        let mut word = String::new();
        while let Some(ch) = self.next_scalar()? {
            if is_punct(ch) {
                if word.is_empty() {
                    word.push(ch);
                } else {
                    self.pending = Some(ch);
                }
                break;
            }
            if is_separator(ch) {
                break;
            }
            if word.len() + ch.len_utf8() <= MAX_WORD_LEN {
                word.push(ch);
            }
        }
        Ok(Some(word))
    }
}

/// Column picked out of a CoNLL-U-like record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSelect {
    /// Single column by index (1 = FORM, 2 = LEMMA).
    Column(u8),
    /// Lemma with column 9 and the surface form packed into one token.
    FormLemma,
    /// Column 9 tag joined to the lemma as `tag::lemma`.
    Sem,
}

impl ColumnSelect {
    pub const FORM: Self = Self::Column(1);
    pub const LEMMA: Self = Self::Column(2);
}

/// One record from the columnar reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A `#` or `<` line, passed through verbatim.
    Meta(String),
    /// The selected token of a data line.
    Word(String),
    /// A data line rejected by the UPOS filter or lacking the column.
    Skip,
}

/// Line-oriented reader for CoNLL-U-like corpora.
pub struct ConlluTokenizer<R: BufRead> {
    input: R,
    select: ColumnSelect,
    pos_filter: u32,
    line: Vec<u8>,
}

impl<R: BufRead> ConlluTokenizer<R> {
    pub fn new(input: R, select: ColumnSelect, pos_filter: u32) -> Self {
        Self {
            input,
            select,
            pos_filter,
            line: Vec::new(),
        }
    }

    pub fn next_record(&mut self) -> io::Result<Option<Record>> {
        let line = loop {
            self.line.clear();
            if self.input.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            let text = String::from_utf8_lossy(&self.line);
            let text = text.trim_end_matches(['\r', '\n']);
            if !text.is_empty() {
                break text.to_string();
            }
        };
        if line.starts_with('#') || line.starts_with('<') {
            return Ok(Some(Record::Meta(line)));
        }
        let cols: Vec<&str> = line.split('\t').collect();
        let record = match self.select {
            ColumnSelect::Column(t) => {
                // The UPOS filter never vetoes the selected column itself.
                if self.pos_filter != 0 && t != 3 {
                    if let Some(upos) = cols.get(3) {
                        if upos_rejected(upos, self.pos_filter) {
                            return Ok(Some(Record::Skip));
                        }
                    }
                }
                match cols.get(t as usize) {
                    Some(w) if !w.is_empty() => Record::Word((*w).to_string()),
                    _ => Record::Skip,
                }
            }
            ColumnSelect::FormLemma => {
                let form = cols.get(1).copied().unwrap_or("");
                let lemma = cols.get(2).copied().unwrap_or("");
                if lemma.is_empty() {
                    Record::Skip
                } else {
                    match cols.get(9) {
                        Some(&tag) if tag.is_empty() || tag == "#-1" => Record::Skip,
                        Some(&tag) => Record::Word(format!("{lemma}{tag}\t{form}")),
                        None => Record::Word(format!("{lemma}\t{form}")),
                    }
                }
            }
            ColumnSelect::Sem => {
                let lemma = cols.get(2).copied().unwrap_or("");
                if lemma.is_empty() {
                    Record::Skip
                } else {
                    match cols.get(9) {
                        Some(&tag) if tag.is_empty() || tag == "#-1" => Record::Skip,
                        Some(&tag) => Record::Word(format!("{tag}::{lemma}")),
                        None => Record::Word(lemma.to_string()),
                    }
                }
            }
        };
        Ok(Some(record))
    }
}

fn upos_rejected(upos: &str, filter: u32) -> bool {
    match upos {
        "PUNCT" => filter & POS_FILTER_PUNCT != 0,
        "DET" => filter & POS_FILTER_DET != 0,
        "ADP" => filter & POS_FILTER_ADP != 0,
        "ADV" => filter & POS_FILTER_ADV != 0,
        "CCONJ" | "SCONJ" => filter & POS_FILTER_CONJ != 0,
        "AUX" => filter & POS_FILTER_AUX != 0,
        _ => false,
    }
}
