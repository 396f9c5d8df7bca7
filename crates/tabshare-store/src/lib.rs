//! Data store and high-level extraction.
//!
//! Bridges compiled queries to actual data: CSV inputs are imported into an
//! in-memory SQLite database and each compiled [`TableQuery`] runs against
//! it. [`extract`] is the one-call pipeline: schema file plus data files in,
//! filtered per-organization per-table frames out.

mod conn;
mod error;
mod source;

use std::collections::BTreeMap;
use std::path::Path;

pub use conn::{Connection, Frame, connect};
pub use error::{ExtractError, Result, StoreError};
pub use source::DataSource;

/// Filtered output frames per organization per table.
pub type OrgTableData = BTreeMap<String, BTreeMap<String, Frame>>;

/// Compiles a schema file and runs every data query against the given
/// sources. `orgs` restricts the organizations (empty keeps all); only the
/// tables the compiled queries name are imported.
pub fn extract(
    schema_path: impl AsRef<Path>,
    sources: &[DataSource],
    orgs: &[String],
) -> Result<OrgTableData, ExtractError> {
    let queries = tabshare_query::compile_schema_file(schema_path, orgs)?;

    let tables: Vec<String> = queries
        .values()
        .flat_map(|tables| tables.keys().cloned())
        .collect();
    let conn = connect(sources, &tables)?;

    let mut result = OrgTableData::new();
    for (org, table_queries) in &queries {
        let org_entry: &mut BTreeMap<String, Frame> = result.entry(org.clone()).or_default();
        for (table, table_query) in table_queries {
            org_entry.insert(table.clone(), conn.get_data(table_query)?);
        }
        tracing::info!(org, tables = table_queries.len(), "extracted data");
    }
    Ok(result)
}
