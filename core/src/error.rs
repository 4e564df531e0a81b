//! Error kinds shared across the crate.
//!
//! Inserts into a finalized matrix cannot fail at runtime: the read-only
//! matrix is a separate type with no insert API, so that class of misuse is
//! ruled out at compile time. Token overflow is not an error either; the
//! tokenizer truncates silently.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file could not be opened or created.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Matrix file does not start with the expected magic bytes.
    #[error("{} is not a neighborhood matrix file (bad magic)", path.display())]
    CorruptMagic { path: PathBuf },

    /// Matrix file ended before the declared cell data.
    #[error("{} is truncated", path.display())]
    Truncated { path: PathBuf },

    /// A matrix coordinate lies outside the configured geometry.
    #[error("coordinate ({x},{y}) outside matrix bounds")]
    OutOfRange { x: u32, y: u32 },

    /// The lexicon probe chain was exhausted before a resize kicked in.
    /// The resize discipline in [`crate::Lexicon::add`] makes this
    /// unreachable; if it ever fires the dictionary is corrupt.
    #[error("lexicon hash index is full")]
    IndexFull,
}
