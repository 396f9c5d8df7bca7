use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// One CSV input file and the table name it loads into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub table: String,
    pub path: PathBuf,
}

impl DataSource {
    /// Builds a source whose table name is the file stem, the convention for
    /// input files named after the table they hold (`samples.csv` loads the
    /// `samples` table).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| StoreError::BadTableName { path: path.clone() })?;
        Ok(Self { table, path })
    }

    pub fn with_table(table: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            table: table.into(),
            path: path.as_ref().to_path_buf(),
        }
    }
}
