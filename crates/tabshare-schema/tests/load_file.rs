//! File-based loader tests.

use std::io::Write;

use tabshare_schema::{RuleMode, load};

fn write_schema(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("create temp schema");
    file.write_all(contents.as_bytes()).expect("write schema");
    file
}

#[test]
fn loads_schema_from_disk() {
    let file = write_schema(
        "ruleID,table,mode,key,operator,value,notes\n\
         1,samples,select,,,saMaterial;reportable,keep these\n\
         2,samples,filter,saMaterial,in,rawWW;sweSed,\n\
         3,,share,PHAC,,1;2,\n",
    );
    let rules = load(file.path()).expect("valid schema");
    assert_eq!(rules.len(), 3);
    assert_eq!(rules[&1].mode, RuleMode::Select);
    assert_eq!(rules[&1].value, "saMaterial;reportable");
    assert_eq!(rules[&2].operator, "in");
    assert_eq!(rules[&3].mode, RuleMode::Share);
}

#[test]
fn error_entries_carry_the_schema_filename() {
    let file = write_schema(
        "ruleID,table,mode,key,operator,value,notes\n\
         x,samples,select,,,all,\n",
    );
    let err = load(file.path()).unwrap_err();
    let name = file
        .path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert_eq!(err.entries[0].file, name);
    assert_eq!(err.entries[0].line, 2);
}

#[test]
fn missing_file_is_a_parse_error() {
    let err = load("/nonexistent/schema.csv").unwrap_err();
    assert!(err.to_string().contains("cannot open schema file"));
}
