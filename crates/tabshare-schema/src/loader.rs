//! Sharing-schema CSV loader.
//!
//! Loads a schema file into a map of typed [`Rule`]s, aggregating every
//! row-level problem across the whole file into one [`ParseError`]. Only a
//! header failure short-circuits: row parsing depends on the header, so
//! nothing else is attempted in that case.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{ErrorEntry, ParseError, Result};
use crate::rule::{
    FILTER_OPERATORS, GROUP_OPERATORS, HEADERS, Rule, RuleId, RuleMode, fmt_set,
};

/// Rules keyed by id. Iteration order (ascending id) is the canonical
/// declaration order for reference resolution.
pub type RuleMap = BTreeMap<RuleId, Rule>;

/// Loads a sharing schema from a CSV file.
pub fn load(path: impl AsRef<Path>) -> Result<RuleMap> {
    let path = path.as_ref();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::debug!(file = %filename, "loading sharing schema");
    let file = File::open(path).map_err(|e| {
        ParseError::single(ErrorEntry::message(format!(
            "cannot open schema file '{}': {}",
            path.display(),
            e
        )))
    })?;
    load_reader(file, &filename)
}

/// Loads a sharing schema from an arbitrary reader; `filename` is only used
/// as context in error messages.
pub fn load_reader(reader: impl Read, filename: &str) -> Result<RuleMap> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(|e| {
        ParseError::single(ErrorEntry::at(filename, 1, "", format!("invalid header row: {e}")))
    })?;
    let header_names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
    validate_headers(filename, &header_names)?;

    let column_index = |name: &str| -> usize {
        header_names
            .iter()
            .position(|h| h == name)
            .expect("validated header")
    };
    let indices: Vec<(&'static str, usize)> = FIELD_COLUMNS
        .iter()
        .map(|&name| (name, column_index(name)))
        .collect();

    let mut rules = RuleMap::new();
    let mut first_lines: BTreeMap<RuleId, usize> = BTreeMap::new();
    let mut errors: Vec<ErrorEntry> = Vec::new();

    for (i, record) in csv_reader.records().enumerate() {
        // header is line 1, first data row is line 2
        let line = i + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                errors.push(ErrorEntry::at(filename, line, "", format!("invalid row: {e}")));
                continue;
            }
        };

        let cell = |idx: usize| normalize_cell(record.get(idx).unwrap_or(""));
        let raw: RawRow = RawRow {
            id: cell(indices[0].1),
            table: cell(indices[1].1),
            mode: cell(indices[2].1),
            key: cell(indices[3].1),
            operator: cell(indices[4].1),
            value: cell(indices[5].1),
        };

        let rule = match coerce_rule(filename, line, &raw, &mut errors) {
            Some(rule) => rule,
            None => continue,
        };
        validate_rule(filename, line, &rule, &mut errors);

        if let Some(&first) = first_lines.get(&rule.id) {
            errors.push(ErrorEntry::at(
                filename,
                line,
                "ruleID",
                format!("duplicate rule id {}, first used on line {}", rule.id, first),
            ));
            continue;
        }
        first_lines.insert(rule.id, line);
        rules.insert(rule.id, rule);
    }

    if errors.is_empty() {
        Ok(rules)
    } else {
        Err(ParseError::new(errors))
    }
}

/// Trims a cell and normalizes empty/NA markers to the empty string.
fn normalize_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "NA" {
        String::new()
    } else {
        trimmed.to_string()
    }
}

fn validate_headers(filename: &str, actual: &[String]) -> Result<()> {
    let missing: Vec<&str> = HEADERS
        .iter()
        .copied()
        .filter(|expected| !actual.iter().any(|h| h == expected))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ParseError::single(ErrorEntry::at(
            filename,
            1,
            "",
            format!("missing headers: {}", missing.join(", ")),
        )))
    }
}

/// Rule columns in coercion order. `notes` is deliberately absent: it is
/// required in the header but never parsed.
const FIELD_COLUMNS: [&str; 6] = ["ruleID", "table", "mode", "key", "operator", "value"];

struct RawRow {
    id: String,
    table: String,
    mode: String,
    key: String,
    operator: String,
    value: String,
}

/// Coerces each cell of a row independently, so one bad cell doesn't hide
/// problems in the rest of the row. Returns None when the typed fields
/// (id, mode) could not be built.
fn coerce_rule(
    filename: &str,
    line: usize,
    raw: &RawRow,
    errors: &mut Vec<ErrorEntry>,
) -> Option<Rule> {
    let id = match coerce_id(&raw.id) {
        Ok(id) => Some(id),
        Err(message) => {
            errors.push(ErrorEntry::at(filename, line, "ruleID", message));
            None
        }
    };
    let mode = match raw.mode.parse::<RuleMode>() {
        Ok(mode) => Some(mode),
        Err(()) => {
            errors.push(ErrorEntry::at(
                filename,
                line,
                "mode",
                format!(
                    "got '{}', expected {}",
                    raw.mode,
                    fmt_set(RuleMode::ALL.iter().map(|m| m.as_str()))
                ),
            ));
            None
        }
    };
    Some(Rule {
        id: id?,
        table: raw.table.clone(),
        mode: mode?,
        key: raw.key.clone(),
        operator: raw.operator.clone(),
        value: raw.value.clone(),
    })
}

fn coerce_id(raw: &str) -> std::result::Result<RuleId, String> {
    match raw.parse::<RuleId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(format!("got '{raw}', expected positive integer")),
    }
}

/// Checks the mode contract of a coerced rule, appending one entry per
/// violated field.
fn validate_rule(filename: &str, line: usize, rule: &Rule, errors: &mut Vec<ErrorEntry>) {
    let mut required = |column: &str, value: &str, modes: &[RuleMode]| {
        if value.is_empty() && modes.contains(&rule.mode) {
            errors.push(ErrorEntry::at(
                filename,
                line,
                column,
                format!(
                    "{column} required for modes {}",
                    fmt_set(modes.iter().map(|m| m.as_str()))
                ),
            ));
        }
    };

    required("table", &rule.table, &[RuleMode::Select, RuleMode::Filter]);
    required("key", &rule.key, &[RuleMode::Filter, RuleMode::Share]);
    required("operator", &rule.operator, &[RuleMode::Filter, RuleMode::Group]);
    required("value", &rule.value, &RuleMode::ALL);

    if !rule.table.is_empty() && matches!(rule.mode, RuleMode::Group | RuleMode::Share) {
        errors.push(ErrorEntry::at(
            filename,
            line,
            "table",
            format!("table not allowed for mode '{}'", rule.mode),
        ));
    }

    if !rule.operator.is_empty() {
        match rule.mode {
            RuleMode::Filter => {
                if !FILTER_OPERATORS.contains(&rule.operator.as_str()) {
                    errors.push(ErrorEntry::at(
                        filename,
                        line,
                        "operator",
                        format!("got '{}', expected {}", rule.operator, fmt_set(FILTER_OPERATORS)),
                    ));
                }
            }
            RuleMode::Group => {
                let lowered = rule.operator.to_lowercase();
                if !GROUP_OPERATORS.contains(&lowered.as_str()) {
                    errors.push(ErrorEntry::at(
                        filename,
                        line,
                        "operator",
                        format!("got '{}', expected {}", rule.operator, fmt_set(GROUP_OPERATORS)),
                    ));
                }
            }
            RuleMode::Select | RuleMode::Share => {}
        }
    }
}
