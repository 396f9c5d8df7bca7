//! Sharing-schema rule model and loader.
//!
//! A sharing schema is a CSV file where each row is a rule telling the data
//! holder what a recipient organization may receive: `select` rules pick
//! columns, `filter` rules pick rows, `group` rules combine filters, and
//! `share` rules tie a set of rules to named organizations.
//!
//! This crate loads and validates that file into typed [`Rule`]s. Resolving
//! rule cross-references and compiling SQL happens downstream in
//! `tabshare-query`.

pub mod error;
pub mod loader;
pub mod rule;

pub use error::{ErrorEntry, ParseError, Result};
pub use loader::{RuleMap, load, load_reader};
pub use rule::{
    ALL_COLUMNS, FILTER_OPERATORS, GROUP_OPERATORS, HEADERS, Rule, RuleId, RuleMode,
    VALUE_SEPARATOR,
};
