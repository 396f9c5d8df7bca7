//! CSV-backed in-memory SQLite store.
//!
//! Each input CSV becomes one table of TEXT columns; compiled queries then
//! run against it with positionally bound arguments, never interpolated
//! values. Columns whose non-empty cells are all TRUE/FALSE are stored as
//! 1/0 and restored on the way out, so boolean filters compare against the
//! same normalized form the compiler emits.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rusqlite::params_from_iter;
use tabshare_query::{Query, SqlDialect, TableQuery};
use tabshare_schema::RuleId;

use crate::error::{Result, StoreError};
use crate::source::DataSource;

/// A query result: column names plus stringly-typed rows. NULL cells come
/// back as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// An open store: the SQLite connection plus which imported columns held
/// booleans, per table.
pub struct Connection {
    conn: rusqlite::Connection,
    bool_columns: BTreeMap<String, BTreeSet<String>>,
}

/// Wraps a table/column name as a quoted SQL identifier, mirroring the
/// compiler's rule for names it cannot parameterize.
fn ident(name: &str) -> Result<String> {
    if name.contains('"') {
        return Err(StoreError::QuotedName(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

fn is_bool_cell(cell: &str) -> bool {
    cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false")
}

/// Loads one CSV file into a fresh table, returning the names of its
/// boolean columns.
fn import_csv(
    conn: &mut rusqlite::Connection,
    table: &str,
    path: &Path,
) -> Result<BTreeSet<String>> {
    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }

    // a column is boolean when it has at least one value and every value is
    // TRUE/FALSE, whatever the case
    let bool_columns: BTreeSet<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let cells: Vec<&str> = rows
                .iter()
                .filter_map(|row| row.get(*i).map(String::as_str))
                .filter(|cell| !cell.is_empty())
                .collect();
            !cells.is_empty() && cells.iter().all(|cell| is_bool_cell(cell))
        })
        .map(|(_, name)| name.clone())
        .collect();

    let column_defs: Result<Vec<String>> = headers
        .iter()
        .map(|h| Ok(format!("{} TEXT", ident(h)?)))
        .collect();
    let create_sql = format!("CREATE TABLE {} ({})", ident(table)?, column_defs?.join(", "));
    let placeholders = vec!["?"; headers.len()].join(",");
    let insert_sql = format!("INSERT INTO {} VALUES ({placeholders})", ident(table)?);

    let tx = conn.transaction()?;
    tx.execute(&create_sql, ())?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for row in &rows {
            let values: Vec<Option<String>> = headers
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let cell = row.get(i).map(String::as_str).unwrap_or_default();
                    if cell.is_empty() {
                        None
                    } else if bool_columns.contains(name) {
                        Some(if cell.eq_ignore_ascii_case("true") { "1" } else { "0" }.to_string())
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect();
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    tracing::debug!(table, rows = rows.len(), path = %path.display(), "imported table");
    Ok(bool_columns)
}

/// Opens an in-memory store and imports the given sources. A non-empty
/// `table_whitelist` skips sources for other tables.
pub fn connect(sources: &[DataSource], table_whitelist: &[String]) -> Result<Connection> {
    let mut conn = rusqlite::Connection::open_in_memory()?;
    let mut bool_columns = BTreeMap::new();
    for source in sources {
        if !table_whitelist.is_empty() && !table_whitelist.contains(&source.table) {
            tracing::debug!(table = source.table, "skipping non-whitelisted table");
            continue;
        }
        let bools = import_csv(&mut conn, &source.table, &source.path)?;
        bool_columns.insert(source.table.clone(), bools);
    }
    Ok(Connection { conn, bool_columns })
}

impl Connection {
    /// Dialect name for the column-discovery probe.
    pub fn dialect_name(&self) -> &'static str {
        "sqlite"
    }

    pub fn tables(&self) -> Vec<String> {
        self.bool_columns.keys().cloned().collect()
    }

    fn ensure_table(&self, name: &str) -> Result<()> {
        if self.bool_columns.contains_key(name) {
            Ok(())
        } else {
            Err(StoreError::MissingTable(name.to_string()))
        }
    }

    /// Runs a compiled query, binding its arguments positionally.
    pub fn exec(&self, query: &Query) -> Result<Frame> {
        let mut stmt = self.conn.prepare(&query.sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let width = columns.len();
        let mut sql_rows = stmt.query(params_from_iter(query.args.iter()))?;
        let mut rows = Vec::new();
        while let Some(row) = sql_rows.next()? {
            let mut record = Vec::with_capacity(width);
            for i in 0..width {
                let cell: Option<String> = row.get(i)?;
                record.push(cell.unwrap_or_default());
            }
            rows.push(record);
        }
        Ok(Frame { columns, rows })
    }

    /// Runs a table's data query and restores boolean columns to TRUE/FALSE.
    pub fn get_data(&self, table_query: &TableQuery) -> Result<Frame> {
        self.ensure_table(&table_query.table_name)?;
        let mut frame = self.exec(&table_query.data_query)?;

        let bools = &self.bool_columns[&table_query.table_name];
        let bool_indexes: Vec<usize> = frame
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| bools.contains(*name))
            .map(|(i, _)| i)
            .collect();
        for row in &mut frame.rows {
            for &i in &bool_indexes {
                row[i] = match row[i].as_str() {
                    "1" => "TRUE".to_string(),
                    "0" => "FALSE".to_string(),
                    other => other.to_string(),
                };
            }
        }
        Ok(frame)
    }

    /// Runs every per-rule count query of a table.
    pub fn get_counts(&self, table_query: &TableQuery) -> Result<BTreeMap<RuleId, i64>> {
        self.ensure_table(&table_query.table_name)?;
        let mut counts = BTreeMap::new();
        for (rule_id, query) in &table_query.rule_count_queries {
            let count: i64 = self.conn.query_row(
                &query.sql,
                params_from_iter(query.args.iter()),
                |row| row.get(0),
            )?;
            counts.insert(*rule_id, count);
        }
        Ok(counts)
    }

    /// Returns the select rule's id and the columns it grants. Explicit
    /// columns are returned directly; whole-table selection issues the
    /// zero-row probe.
    pub fn get_columns(&self, table_query: &TableQuery) -> Result<(RuleId, Vec<String>)> {
        self.ensure_table(&table_query.table_name)?;
        if !table_query.columns.is_empty() {
            return Ok((table_query.select_rule_id, table_query.columns.clone()));
        }
        let probe = table_query.column_probe_sql(SqlDialect::from_name(self.dialect_name()));
        let stmt = self.conn.prepare(&probe)?;
        let columns = stmt.column_names().iter().map(ToString::to_string).collect();
        Ok((table_query.select_rule_id, columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_cells() {
        assert!(is_bool_cell("TRUE"));
        assert!(is_bool_cell("false"));
        assert!(is_bool_cell("True"));
        assert!(!is_bool_cell("1"));
        assert!(!is_bool_cell(""));
        assert!(!is_bool_cell("yes"));
    }

    #[test]
    fn ident_rejects_quotes() {
        assert_eq!(ident("samples").unwrap(), "\"samples\"");
        assert!(matches!(
            ident("a\"b").unwrap_err(),
            StoreError::QuotedName(_)
        ));
    }
}
