use std::io;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;

use thiserror::Error;

/// A type alias for `Result<T, MisaError>`.
pub type Result<T> = StdResult<T, MisaError>;

/// Failures raised while reading MISA outputs or writing the derived reports.
#[derive(Debug, Error)]
pub enum MisaError {
    /// A required input could not be opened.
    #[error("cannot open input {path:?}")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A section header was found but its content has the wrong shape.
    #[error("malformed '{section}' section at line {line} - {reason}")]
    MalformedSection {
        section: &'static str,
        line: usize,
        reason: String,
    },
    /// A section (or one of its totals) the analysis depends on is absent.
    #[error("required section '{0}' not found")]
    MissingSection(&'static str),
    /// A repeat-record row could not be read.
    #[error("malformed record at line {line} - {reason}")]
    MalformedRecord { line: u64, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
    #[error(transparent)]
    Fastx(#[from] needletail::errors::ParseError),
}

impl MisaError {
    pub(crate) fn missing_input<P: AsRef<Path>>(path: P, source: io::Error) -> MisaError {
        MisaError::MissingInput {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Open `path` for reading, mapping failure to `MissingInput`.
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<std::fs::File> {
    std::fs::File::open(path.as_ref()).map_err(|e| MisaError::missing_input(path, e))
}

/// Read `path` into memory, mapping an open failure to `MissingInput`.
pub fn read_input<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = open_input(path)?;
    let mut text = String::new();
    io::Read::read_to_string(&mut file, &mut text)?;
    Ok(text)
}
