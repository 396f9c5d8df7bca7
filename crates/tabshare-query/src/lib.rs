//! Rule-tree builder and parameterized SQL compiler.
//!
//! Turns a loaded rule map into executable queries in two pure, synchronous
//! stages: [`tree::parse`] resolves rule-ID cross-references into a
//! per-organization, per-table AST, and [`sql::generate`] walks each table
//! subtree into a data query plus per-rule count queries. Both stages either
//! succeed completely or fail with a structured
//! [`ParseError`](tabshare_schema::ParseError); a compiled query map is
//! immutable and safe to cache or share across threads.

pub mod sql;
pub mod tree;

use std::path::Path;

use tabshare_schema::{Result, RuleMap};

pub use sql::{OrgTableQueries, Query, SqlDialect, TableQuery, column_probe_sql, generate};
pub use tree::{FilterOp, GroupOp, Node, NodeKind, RuleTree, Selection, parse};

/// Compiles a rule map into queries: tree building plus SQL generation.
pub fn compile(rules: &RuleMap, org_whitelist: &[String], filename: &str) -> Result<OrgTableQueries> {
    let tree = tree::parse(rules, org_whitelist, filename)?;
    sql::generate(&tree)
}

/// Loads a schema file and compiles it into queries.
pub fn compile_schema_file(
    path: impl AsRef<Path>,
    org_whitelist: &[String],
) -> Result<OrgTableQueries> {
    let path = path.as_ref();
    let rules = tabshare_schema::load(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    compile(&rules, org_whitelist, &filename)
}
