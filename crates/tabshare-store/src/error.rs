use std::path::PathBuf;

use tabshare_schema::ParseError;
use thiserror::Error;

/// Failures while importing data or executing compiled queries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("'{path}' has no usable table name")]
    BadTableName { path: PathBuf },

    #[error("table/column name contains a double-quote, which is not allowed: '{0}'")]
    QuotedName(String),

    #[error("table '{0}' not found in the input data")]
    MissingTable(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Failures of the high-level extraction pipeline: either the schema did not
/// compile or the data store rejected it.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Schema(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
