//! Typed sharing rules.
//!
//! A rule is one row of the sharing schema. The `key`, `operator`, and
//! `value` cells stay raw strings here; their meaning is mode-dependent and
//! is only interpreted by the tree builder.

use std::fmt;
use std::str::FromStr;

/// Rule identifier (`ruleID` column). Always positive; 0 is reserved for
/// nodes synthesized during tree building.
pub type RuleId = u32;

/// The directive a schema row expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMode {
    Select,
    Filter,
    Group,
    Share,
}

impl RuleMode {
    pub const ALL: [RuleMode; 4] = [
        RuleMode::Select,
        RuleMode::Filter,
        RuleMode::Group,
        RuleMode::Share,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleMode::Select => "select",
            RuleMode::Filter => "filter",
            RuleMode::Group => "group",
            RuleMode::Share => "share",
        }
    }
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "select" => Ok(RuleMode::Select),
            "filter" => Ok(RuleMode::Filter),
            "group" => Ok(RuleMode::Group),
            "share" => Ok(RuleMode::Share),
            _ => Err(()),
        }
    }
}

/// One parsed schema row. Immutable once constructed by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    /// Zero or more `;`-separated table names (select/filter only).
    pub table: String,
    pub mode: RuleMode,
    pub key: String,
    pub operator: String,
    pub value: String,
}

/// The full fixed header set the schema file must carry.
pub const HEADERS: [&str; 7] = [
    "ruleID", "table", "mode", "key", "operator", "value", "notes",
];

/// Comparison and range operators accepted in filter rules.
///
/// `in` and `between` both take exactly two values; `in` is a discrete set,
/// `between` an inclusive interval. The distinction is explicit in the
/// grammar, never inferred from value cardinality.
pub const FILTER_OPERATORS: [&str; 7] = ["<", "<=", "=", ">", ">=", "in", "between"];

/// Boolean combinators accepted in group rules (matched case-insensitively).
pub const GROUP_OPERATORS: [&str; 2] = ["and", "or"];

/// The separator used in multi-value cells (tables, columns, orgs, rule ids).
pub const VALUE_SEPARATOR: char = ';';

/// The select-rule sentinel granting the whole table.
pub const ALL_COLUMNS: &str = "all";

/// Formats a set of alternatives for error messages: `{'a','b'}`.
pub fn fmt_set<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items: Vec<String> = values
        .into_iter()
        .map(|v| format!("'{}'", v.as_ref()))
        .collect();
    format!("{{{}}}", items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips() {
        for mode in RuleMode::ALL {
            assert_eq!(mode.as_str().parse::<RuleMode>(), Ok(mode));
        }
        assert!("merge".parse::<RuleMode>().is_err());
        assert!("Select".parse::<RuleMode>().is_err());
    }

    #[test]
    fn set_formatting() {
        assert_eq!(fmt_set(["and", "or"]), "{'and','or'}");
        assert_eq!(fmt_set(Vec::<&str>::new()), "{}");
    }
}
