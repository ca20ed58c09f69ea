use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a directory walk before it yields anything.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Not a traversable directory: {path}")]
    NotADirectory {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Failures that prevent an extraction from starting.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Failed to create output directory '{path}': {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to expand root archive '{path}': {source}")]
    RootArchive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Failure of a single archive expansion.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to open archive: {0}")]
    Open(#[source] std::io::Error),

    #[error("Invalid zip structure: {0}")]
    Corrupt(#[from] zip::result::ZipError),

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures that prevent a conversion batch from starting.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Scan(#[from] ScanError),
}
