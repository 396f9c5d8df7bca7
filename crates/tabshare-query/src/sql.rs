//! Parameterized SQL generation.
//!
//! One depth-first pass per Table node emits the complete data query and, for
//! every rule visited along the way, a partial WHERE fragment with its slice
//! of the argument list. The partials become per-rule `SELECT COUNT(*)`
//! queries: the audit mechanism answering "how many rows would rule N keep,
//! alone or combined".
//!
//! Literal values never appear in SQL text; every literal is a `?`
//! placeholder with its value appended to the argument list in traversal
//! order. Identifiers cannot be parameterized, so they are double-quoted and
//! names containing the quote character are rejected outright.

use std::collections::BTreeMap;

use tabshare_schema::{ErrorEntry, ParseError, Result, RuleId};

use crate::tree::{FilterOp, Node, NodeKind, RuleTree, Selection};

/// SQL text plus its bound arguments, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub sql: String,
    pub args: Vec<String>,
}

/// SQL dialect hints for the column-discovery probe. The compiler is
/// otherwise dialect-agnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlDialect {
    #[default]
    Other,
    Mssql,
    Sybase,
}

impl SqlDialect {
    /// Parses a dialect name as reported by a data store, falling back to
    /// the default for anything unrecognized.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "mssql" => SqlDialect::Mssql,
            "sybase" => SqlDialect::Sybase,
            _ => SqlDialect::Other,
        }
    }
}

/// Compiled queries for one table within one share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub table_name: String,
    /// Columns from the select rule, empty when `all` was used. When
    /// non-empty, no column-discovery query is needed.
    pub columns: Vec<String>,
    /// The complete data-retrieval query.
    pub data_query: Query,
    /// One `SELECT COUNT(*)` per contributing rule, keyed by rule id; id 0
    /// is the synthesized share-level AND group.
    pub rule_count_queries: BTreeMap<RuleId, Query>,
    pub select_rule_id: RuleId,
    /// Bare select query the column probe is derived from.
    select_query: Query,
}

impl TableQuery {
    /// Zero-row probe returning the column names of the select, for when
    /// columns are not pre-specified. Generated on demand because it is the
    /// only dialect-dependent piece of SQL.
    pub fn column_probe_sql(&self, dialect: SqlDialect) -> String {
        column_probe_sql(&self.select_query.sql, dialect)
    }
}

/// Queries per table per organization.
pub type OrgTableQueries = BTreeMap<String, BTreeMap<String, TableQuery>>;

/// Wraps a table/column name as a quoted SQL identifier.
///
/// Identifiers cannot be bound as parameters, so a name containing the
/// delimiter itself is rejected rather than escaped.
fn ident(name: &str) -> Result<String> {
    if name.contains('"') {
        return Err(ParseError::single(ErrorEntry::message(format!(
            "table/column name contains a double-quote, which is not allowed: '{name}'"
        ))));
    }
    Ok(format!("\"{name}\""))
}

/// Normalizes a literal to its SQL argument form: booleans become 1/0, all
/// other values pass through unchanged.
fn convert_literal(value: &str) -> String {
    if value.eq_ignore_ascii_case("true") {
        "1".to_string()
    } else if value.eq_ignore_ascii_case("false") {
        "0".to_string()
    } else {
        value.to_string()
    }
}

/// Accumulates arguments and per-rule partial queries during one table walk.
#[derive(Default)]
struct Emitter {
    args: Vec<String>,
    partials: BTreeMap<RuleId, Query>,
}

impl Emitter {
    fn record(&mut self, rule_id: RuleId, sql: String, arg_start: usize) {
        self.partials.insert(
            rule_id,
            Query {
                sql,
                args: self.args[arg_start..].to_vec(),
            },
        );
    }

    fn walk(&mut self, node: &Node) -> Result<String> {
        match &node.kind {
            NodeKind::Table {
                name,
                select,
                filter,
            } => {
                let select_sql = format!("SELECT {} FROM {}", self.walk(select)?, ident(name)?);
                // the table node carries the select rule's id, so this
                // partial is the select rule's fragment
                self.record(node.rule_id, select_sql.clone(), self.args.len());
                match filter {
                    Some(filter) => {
                        let filter_sql = self.walk(filter)?;
                        Ok(format!("{select_sql} WHERE {filter_sql}"))
                    }
                    None => Ok(select_sql),
                }
            }
            NodeKind::Select { selection } => match selection {
                Selection::All => Ok("*".to_string()),
                Selection::Columns(columns) => {
                    let idents: Result<Vec<String>> = columns
                        .iter()
                        .map(|c| match &c.kind {
                            NodeKind::Literal { value } => ident(value),
                            _ => unreachable!("select children are literals"),
                        })
                        .collect();
                    Ok(idents?.join(","))
                }
            },
            NodeKind::Group { op, members } => {
                let arg_start = self.args.len();
                let mut sql = String::new();
                for (i, member) in members.iter().enumerate() {
                    let member_sql = self.walk(member)?;
                    if i == 0 {
                        sql = member_sql;
                    } else {
                        sql = format!("({sql} {} {member_sql})", op.sql());
                    }
                }
                self.record(node.rule_id, sql.clone(), arg_start);
                Ok(sql)
            }
            NodeKind::Filter {
                op,
                field,
                literals,
            } => {
                let field_sql = self.walk(field)?;
                let arg_start = self.args.len();
                let sql = match op {
                    FilterOp::In => {
                        let placeholders: Result<Vec<String>> =
                            literals.iter().map(|l| self.walk(l)).collect();
                        format!("({field_sql} IN ({}))", placeholders?.join(","))
                    }
                    FilterOp::Between => {
                        let low = self.walk(&literals[0])?;
                        let high = self.walk(&literals[1])?;
                        format!("({field_sql} BETWEEN {low} AND {high})")
                    }
                    _ => {
                        let value = self.walk(&literals[0])?;
                        format!("({field_sql} {} {value})", op.as_str())
                    }
                };
                self.record(node.rule_id, sql.clone(), arg_start);
                Ok(sql)
            }
            NodeKind::Field { name } => ident(name),
            NodeKind::Literal { value } => {
                self.args.push(convert_literal(value));
                Ok("?".to_string())
            }
            NodeKind::Root { .. } | NodeKind::Share { .. } => {
                unreachable!("walk starts at a table node")
            }
        }
    }
}

/// Returns the column names declared by a table's select rule (empty for
/// whole-table selection).
fn select_columns(select: &Node) -> Vec<String> {
    match &select.kind {
        NodeKind::Select {
            selection: Selection::Columns(columns),
        } => columns
            .iter()
            .filter_map(|c| match &c.kind {
                NodeKind::Literal { value } => Some(value.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Picks the strictest recorded fragment for the share rule's count query:
/// the synthesized rule-0 group if present, else the table's filter root,
/// else unconstrained.
fn share_partial(
    partials: &BTreeMap<RuleId, Query>,
    filter: Option<&Node>,
) -> Query {
    if let Some(zero) = partials.get(&0) {
        return zero.clone();
    }
    match filter {
        Some(filter) => partials.get(&filter.rule_id).cloned().unwrap_or_default(),
        None => Query::default(),
    }
}

/// Compiles one table node of a share into a [`TableQuery`].
fn gen_table_query(share_id: RuleId, table_node: &Node) -> Result<TableQuery> {
    let NodeKind::Table {
        name,
        select,
        filter,
    } = &table_node.kind
    else {
        unreachable!("share children are table nodes");
    };
    let select_rule_id = select.rule_id;

    let mut emitter = Emitter::default();
    let sql = emitter.walk(table_node)?;
    let data_query = Query {
        sql,
        args: emitter.args.clone(),
    };

    // keep the bare select query for the column probe, then clear its
    // partial so the select rule counts the unconstrained table
    let select_query = emitter
        .partials
        .insert(select_rule_id, Query::default())
        .unwrap_or_default();

    debug_assert!(!emitter.partials.contains_key(&share_id));
    let share_query = share_partial(&emitter.partials, filter.as_deref());
    emitter.partials.insert(share_id, share_query);

    let table_ident = ident(name)?;
    let rule_count_queries = emitter
        .partials
        .into_iter()
        .map(|(rule_id, partial)| {
            let sql = if partial.sql.is_empty() {
                format!("SELECT COUNT(*) FROM {table_ident}")
            } else {
                format!("SELECT COUNT(*) FROM {table_ident} WHERE {}", partial.sql)
            };
            (
                rule_id,
                Query {
                    sql,
                    args: partial.args,
                },
            )
        })
        .collect();

    Ok(TableQuery {
        table_name: name.clone(),
        columns: select_columns(select),
        data_query,
        rule_count_queries,
        select_rule_id,
        select_query,
    })
}

/// Generates queries for every (org, table) pair of the tree.
///
/// Share nodes with the same organization merge per-table under that org's
/// key.
pub fn generate(tree: &RuleTree) -> Result<OrgTableQueries> {
    let NodeKind::Root { shares } = &tree.kind else {
        unreachable!("tree is rooted at a root node");
    };
    let mut result = OrgTableQueries::new();
    for share in shares {
        let NodeKind::Share { org, tables } = &share.kind else {
            unreachable!("root children are share nodes");
        };
        let org_entry = result.entry(org.clone()).or_default();
        for table_node in tables {
            let table_query = gen_table_query(share.rule_id, table_node)?;
            org_entry.insert(table_query.table_name.clone(), table_query);
        }
    }
    tracing::debug!(orgs = result.len(), "generated queries");
    Ok(result)
}

/// Rewrites a select statement into a zero-row probe that still reports
/// column names: `LIMIT 0` by default, `TOP 0` for mssql/sybase.
pub fn column_probe_sql(select_sql: &str, dialect: SqlDialect) -> String {
    match dialect {
        SqlDialect::Mssql | SqlDialect::Sybase => {
            let rest = select_sql.strip_prefix("SELECT ").unwrap_or(select_sql);
            format!("SELECT TOP 0 {rest}")
        }
        SqlDialect::Other => format!("{select_sql} LIMIT 0"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_quotes_and_rejects() {
        assert_eq!(ident("measures").unwrap(), "\"measures\"");
        assert_eq!(ident("a b").unwrap(), "\"a b\"");
        let err = ident("x\" OR 1=1 --").unwrap_err();
        assert!(err.to_string().contains("double-quote"));
    }

    #[test]
    fn literal_conversion() {
        assert_eq!(convert_literal("true"), "1");
        assert_eq!(convert_literal("FALSE"), "0");
        assert_eq!(convert_literal("True"), "1");
        assert_eq!(convert_literal("truthy"), "truthy");
        assert_eq!(convert_literal("0"), "0");
    }

    #[test]
    fn dialect_parsing_falls_back() {
        assert_eq!(SqlDialect::from_name("MSSQL"), SqlDialect::Mssql);
        assert_eq!(SqlDialect::from_name("sybase"), SqlDialect::Sybase);
        assert_eq!(SqlDialect::from_name("sqlite"), SqlDialect::Other);
        assert_eq!(SqlDialect::from_name(""), SqlDialect::Other);
    }

    #[test]
    fn probe_rewrites_per_dialect() {
        let sql = "SELECT * FROM \"t\"";
        assert_eq!(
            column_probe_sql(sql, SqlDialect::Other),
            "SELECT * FROM \"t\" LIMIT 0"
        );
        assert_eq!(
            column_probe_sql(sql, SqlDialect::Mssql),
            "SELECT TOP 0 * FROM \"t\""
        );
        assert_eq!(
            column_probe_sql(sql, SqlDialect::Sybase),
            "SELECT TOP 0 * FROM \"t\""
        );
    }
}
