//! Rule-tree builder.
//!
//! Resolves rule-ID cross-references into a tree of typed nodes, one subtree
//! per organization per table:
//!
//! ```text
//! Root
//! └── Share (org)
//!     └── Table
//!         ├── Select ("all" or Literal columns)
//!         └── Filter / Group
//!             ├── Field
//!             └── Literal...
//! ```
//!
//! Rules are processed in ascending rule-ID order and every reference must
//! name a lower-numbered rule; forward references are rejected, not resolved.
//! This is a deliberate authoring convention of the rule language, not a
//! graph problem.

use std::collections::BTreeMap;
use std::fmt;

use tabshare_schema::{
    ALL_COLUMNS, ErrorEntry, ParseError, Result, Rule, RuleId, RuleMap, RuleMode, VALUE_SEPARATOR,
};

/// Filter comparison operator, including the two explicit range kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Lt,
    Le,
    Eq,
    Gt,
    Ge,
    /// Discrete two-value set, compiled to `IN (?,?)`.
    In,
    /// Inclusive interval, compiled to `BETWEEN ? AND ?`.
    Between,
}

impl FilterOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "<" => Some(FilterOp::Lt),
            "<=" => Some(FilterOp::Le),
            "=" => Some(FilterOp::Eq),
            ">" => Some(FilterOp::Gt),
            ">=" => Some(FilterOp::Ge),
            "in" => Some(FilterOp::In),
            "between" => Some(FilterOp::Between),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Eq => "=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::In => "in",
            FilterOp::Between => "between",
        }
    }

    /// True for operators taking two values instead of one.
    pub fn is_range(self) -> bool {
        matches!(self, FilterOp::In | FilterOp::Between)
    }
}

/// Boolean combinator of a group rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    And,
    Or,
}

impl GroupOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "and" => Some(GroupOp::And),
            "or" => Some(GroupOp::Or),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupOp::And => "and",
            GroupOp::Or => "or",
        }
    }

    /// SQL spelling.
    pub fn sql(self) -> &'static str {
        match self {
            GroupOp::And => "AND",
            GroupOp::Or => "OR",
        }
    }
}

/// The columns a select rule grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The `all` sentinel: whole-table selection, columns discovered later.
    All,
    /// Explicit columns as Literal nodes, in declared order.
    Columns(Vec<Node>),
}

/// A node of the rule tree. `rule_id` is the originating schema rule, or 0
/// for synthesized nodes (the root and implicit AND groups).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub rule_id: RuleId,
    pub kind: NodeKind,
}

/// Closed set of node kinds with their payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root {
        shares: Vec<Node>,
    },
    Share {
        org: String,
        tables: Vec<Node>,
    },
    Table {
        name: String,
        select: Box<Node>,
        /// Filter or Group root, absent when the table is unconstrained.
        filter: Option<Box<Node>>,
    },
    Select {
        selection: Selection,
    },
    Group {
        op: GroupOp,
        members: Vec<Node>,
    },
    Filter {
        op: FilterOp,
        field: Box<Node>,
        literals: Vec<Node>,
    },
    Field {
        name: String,
    },
    Literal {
        value: String,
    },
}

/// A complete tree, rooted at a synthetic Root node.
pub type RuleTree = Node;

impl Node {
    fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Root { .. } => "root",
            NodeKind::Share { .. } => "share",
            NodeKind::Table { .. } => "table",
            NodeKind::Select { .. } => "select",
            NodeKind::Group { .. } => "group",
            NodeKind::Filter { .. } => "filter",
            NodeKind::Field { .. } => "field",
            NodeKind::Literal { .. } => "literal",
        }
    }

    fn display_value(&self) -> &str {
        match &self.kind {
            NodeKind::Root { .. } => "",
            NodeKind::Share { org, .. } => org,
            NodeKind::Table { name, .. } => name,
            NodeKind::Select { selection } => match selection {
                Selection::All => ALL_COLUMNS,
                Selection::Columns(_) => "",
            },
            NodeKind::Group { op, .. } => op.as_str(),
            NodeKind::Filter { op, .. } => op.as_str(),
            NodeKind::Field { name } => name,
            NodeKind::Literal { value } => value,
        }
    }

    fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Root { shares } => shares.iter().collect(),
            NodeKind::Share { tables, .. } => tables.iter().collect(),
            NodeKind::Table { select, filter, .. } => {
                let mut out = vec![select.as_ref()];
                if let Some(filter) = filter {
                    out.push(filter.as_ref());
                }
                out
            }
            NodeKind::Select { selection } => match selection {
                Selection::All => Vec::new(),
                Selection::Columns(columns) => columns.iter().collect(),
            },
            NodeKind::Group { members, .. } => members.iter().collect(),
            NodeKind::Filter { field, literals, .. } => {
                let mut out = vec![field.as_ref()];
                out.extend(literals.iter());
                out
            }
            NodeKind::Field { .. } | NodeKind::Literal { .. } => Vec::new(),
        }
    }

    fn fmt_at_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(
            f,
            "{}({}, {}, '{}')",
            "    ".repeat(depth),
            self.rule_id,
            self.kind_name(),
            self.display_value()
        )?;
        for child in self.children() {
            child.fmt_at_depth(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Indented one-node-per-line rendering, used by the inspect report and by
/// tests asserting on tree shape.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at_depth(f, 0)
    }
}

/// Tracks the state of one tree-building pass.
struct Ctx<'a> {
    filename: &'a str,
    /// Tables each select/filter rule fans out to.
    rule_tables: BTreeMap<RuleId, Vec<String>>,
    /// Nodes built so far, by rule id.
    nodes: BTreeMap<RuleId, Node>,
    /// Share nodes accumulated across share rules.
    shares: Vec<Node>,
    /// Rule currently being processed, for error context.
    rule_id: RuleId,
}

impl<'a> Ctx<'a> {
    fn new(filename: &'a str) -> Self {
        Self {
            filename,
            rule_tables: BTreeMap::new(),
            nodes: BTreeMap::new(),
            shares: Vec::new(),
            rule_id: 0,
        }
    }

    fn fail(&self, message: impl Into<String>) -> ParseError {
        ParseError::single(ErrorEntry::at_rule(self.filename, self.rule_id, message))
    }

    fn node(&self, rule_id: RuleId) -> Result<&Node> {
        self.nodes.get(&rule_id).ok_or_else(|| {
            self.fail(format!(
                "missing rule {rule_id}. Hint: rules must be declared before they are referenced"
            ))
        })
    }
}

/// Splits a `;`-separated cell into trimmed, non-empty items and validates
/// the element count. `min`/`max` of 0 mean unconstrained.
fn parse_list(ctx: &Ctx<'_>, raw: &str, min: usize, max: usize) -> Result<Vec<String>> {
    let items: Vec<String> = raw
        .split(VALUE_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
    let n = items.len();

    if min > 0 || max > 0 {
        if min == max {
            if n != min {
                return Err(ctx.fail(format!("expected {min} values, got {n}")));
            }
        } else if max == 0 {
            if n < min {
                return Err(ctx.fail(format!("expected at least {min} values, got {n}")));
            }
        } else if n < min || n > max {
            return Err(ctx.fail(format!("expected {min}-{max} values, got {n}")));
        }
    }
    Ok(items)
}

/// Like [`parse_list`], for lists of rule ids.
fn parse_id_list(ctx: &Ctx<'_>, raw: &str, min: usize, max: usize) -> Result<Vec<RuleId>> {
    let items = parse_list(ctx, raw, min, max)?;
    items
        .iter()
        .map(|item| {
            item.parse::<RuleId>()
                .map_err(|_| ctx.fail(format!("invalid rule id '{item}' in value list")))
        })
        .collect()
}

fn literal_node(rule_id: RuleId, value: &str) -> Node {
    Node {
        rule_id,
        kind: NodeKind::Literal {
            value: value.trim().to_string(),
        },
    }
}

/// Checks whether a filter/group node constrains `table`. Groups are judged
/// by their first member, matching how mixed-table groups have always been
/// attributed.
fn constrains_table(ctx: &Ctx<'_>, table: &str, node: &Node) -> bool {
    match &node.kind {
        NodeKind::Filter { .. } => ctx
            .rule_tables
            .get(&node.rule_id)
            .is_some_and(|tables| tables.iter().any(|t| t == table)),
        NodeKind::Group { members, .. } => members
            .first()
            .is_some_and(|first| constrains_table(ctx, table, first)),
        _ => false,
    }
}

/// Maps each table reachable through a share's select rules to its select
/// rule id, rejecting a second select for the same table.
fn table_select_ids(ctx: &Ctx<'_>, select_nodes: &[&Node]) -> Result<Vec<(String, RuleId)>> {
    let mut result: Vec<(String, RuleId)> = Vec::new();
    for node in select_nodes {
        let id = node.rule_id;
        let Some(tables) = ctx.rule_tables.get(&id) else {
            continue;
        };
        for table in tables {
            if let Some((_, orig_id)) = result.iter().find(|(t, _)| t == table) {
                return Err(ctx.fail(format!(
                    "select-rule {id}'s table '{table}' is already used by select-rule {orig_id}"
                )));
            }
            result.push((table.clone(), id));
        }
    }
    Ok(result)
}

/// Combines the filter/group nodes constraining `table` into a single filter
/// root: one node is used directly, several are joined under a synthesized
/// AND group with rule id 0.
fn filter_root(ctx: &Ctx<'_>, table: &str, nodes: &[&Node]) -> Option<Node> {
    let matching: Vec<&&Node> = nodes
        .iter()
        .filter(|node| constrains_table(ctx, table, node))
        .collect();
    match matching.len() {
        0 => None,
        1 => Some((*matching[0]).clone()),
        _ => Some(Node {
            rule_id: 0,
            kind: NodeKind::Group {
                op: GroupOp::And,
                members: matching.into_iter().map(|n| (*n).clone()).collect(),
            },
        }),
    }
}

fn build_select(ctx: &Ctx<'_>, rule: &Rule) -> Result<Node> {
    let values = parse_list(ctx, &rule.value, 1, 0)?;
    let selection = if values.iter().any(|v| v == ALL_COLUMNS) {
        Selection::All
    } else {
        Selection::Columns(values.iter().map(|v| literal_node(rule.id, v)).collect())
    };
    Ok(Node {
        rule_id: rule.id,
        kind: NodeKind::Select { selection },
    })
}

fn build_filter(ctx: &Ctx<'_>, rule: &Rule) -> Result<Node> {
    let op = FilterOp::parse(&rule.operator)
        .ok_or_else(|| ctx.fail(format!("invalid operator '{}'", rule.operator)))?;
    // range operators split the value cell; single-value operators take the
    // cell as-is, separator and all
    let values = if op.is_range() {
        parse_list(ctx, &rule.value, 2, 2)?
    } else {
        vec![rule.value.clone()]
    };
    let field = Node {
        rule_id: rule.id,
        kind: NodeKind::Field {
            name: rule.key.clone(),
        },
    };
    Ok(Node {
        rule_id: rule.id,
        kind: NodeKind::Filter {
            op,
            field: Box::new(field),
            literals: values.iter().map(|v| literal_node(rule.id, v)).collect(),
        },
    })
}

fn build_group(ctx: &Ctx<'_>, rule: &Rule) -> Result<Node> {
    let op = GroupOp::parse(&rule.operator)
        .ok_or_else(|| ctx.fail(format!("invalid operator '{}'", rule.operator)))?;
    let ids = parse_id_list(ctx, &rule.value, 2, 0)?;
    let mut members = Vec::with_capacity(ids.len());
    for id in ids {
        let node = ctx.node(id)?;
        if !matches!(node.kind, NodeKind::Filter { .. } | NodeKind::Group { .. }) {
            return Err(ctx.fail("group-rules can only refer to other filter/group-rules"));
        }
        members.push(node.clone());
    }
    Ok(Node {
        rule_id: rule.id,
        kind: NodeKind::Group { op, members },
    })
}

/// Builds the Share nodes of one share rule: one Table node per table
/// reachable through the referenced selects, duplicated under one Share node
/// per organization.
fn build_shares(ctx: &Ctx<'_>, rule: &Rule, orgs: &[String]) -> Result<Vec<Node>> {
    let ids = parse_id_list(ctx, &rule.value, 1, 0)?;
    let mut value_nodes: Vec<&Node> = Vec::with_capacity(ids.len());
    for id in ids {
        value_nodes.push(ctx.node(id)?);
    }

    let select_nodes: Vec<&Node> = value_nodes
        .iter()
        .copied()
        .filter(|n| matches!(n.kind, NodeKind::Select { .. }))
        .collect();

    let mut table_nodes = Vec::new();
    for (table, select_id) in table_select_ids(ctx, &select_nodes)? {
        let select = ctx.node(select_id)?.clone();
        let filter = filter_root(ctx, &table, &value_nodes);
        table_nodes.push(Node {
            rule_id: select_id,
            kind: NodeKind::Table {
                name: table,
                select: Box::new(select),
                filter: filter.map(Box::new),
            },
        });
    }

    Ok(orgs
        .iter()
        .map(|org| Node {
            rule_id: rule.id,
            kind: NodeKind::Share {
                org: org.clone(),
                tables: table_nodes.clone(),
            },
        })
        .collect())
}

/// Checks that every whitelisted org is named by at least one share rule.
fn validate_whitelist(ctx: &Ctx<'_>, rules: &RuleMap, whitelist: &[String]) -> Result<()> {
    if whitelist.is_empty() {
        return Ok(());
    }
    let mut known: Vec<String> = Vec::new();
    for rule in rules.values().filter(|r| r.mode == RuleMode::Share) {
        known.extend(parse_list(ctx, &rule.key, 0, 0)?);
    }
    let unknown: Vec<&String> = whitelist.iter().filter(|org| !known.contains(org)).collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        let entries = unknown
            .into_iter()
            .map(|org| {
                ErrorEntry::at(
                    ctx.filename,
                    0,
                    "",
                    format!("org not in schema: '{org}'"),
                )
            })
            .collect();
        Err(ParseError::new(entries))
    }
}

/// Parses rules into an abstract syntax tree.
///
/// `org_whitelist` restricts which organizations are kept; empty means all.
/// `filename` is only used as context in error messages.
pub fn parse(rules: &RuleMap, org_whitelist: &[String], filename: &str) -> Result<RuleTree> {
    let mut ctx = Ctx::new(filename);

    if !rules.values().any(|r| r.mode == RuleMode::Share) {
        return Err(ParseError::single(ErrorEntry::at(
            filename,
            0,
            "",
            "no share-rules in schema",
        )));
    }
    if !rules.values().any(|r| r.mode == RuleMode::Select) {
        return Err(ParseError::single(ErrorEntry::at(
            filename,
            0,
            "",
            "no select-rules in schema",
        )));
    }
    validate_whitelist(&ctx, rules, org_whitelist)?;

    for rule in rules.values() {
        ctx.rule_id = rule.id;

        match rule.mode {
            RuleMode::Select | RuleMode::Filter => {
                let tables = parse_list(&ctx, &rule.table, 1, 0)?;
                for table in tables {
                    ctx.rule_tables
                        .entry(rule.id)
                        .or_default()
                        .push(table.clone());
                    let node = match rule.mode {
                        RuleMode::Select => build_select(&ctx, rule)?,
                        RuleMode::Filter => build_filter(&ctx, rule)?,
                        _ => unreachable!(),
                    };
                    // multi-table rules build one identical node per table;
                    // the map keeps the last
                    ctx.nodes.insert(rule.id, node);
                }
            }
            RuleMode::Group => {
                let node = build_group(&ctx, rule)?;
                ctx.nodes.insert(rule.id, node);
            }
            RuleMode::Share => {
                let mut orgs = parse_list(&ctx, &rule.key, 1, 0)?;
                if !org_whitelist.is_empty() {
                    orgs.retain(|org| org_whitelist.contains(org));
                    if orgs.is_empty() {
                        continue;
                    }
                }
                let shares = build_shares(&ctx, rule, &orgs)?;
                ctx.shares.extend(shares);
            }
        }
    }

    if ctx.shares.is_empty() {
        return Err(ParseError::single(ErrorEntry::at(
            filename,
            0,
            "",
            "no share-rules in schema",
        )));
    }
    Ok(Node {
        rule_id: 0,
        kind: NodeKind::Root { shares: ctx.shares },
    })
}
