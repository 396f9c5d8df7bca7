//! Tree-builder tests: rule resolution, fan-out, share assembly, and the
//! org whitelist.

use tabshare_query::tree::parse;
use tabshare_schema::{Rule, RuleId, RuleMap, RuleMode};

fn rule(id: RuleId, table: &str, mode: RuleMode, key: &str, operator: &str, value: &str) -> Rule {
    Rule {
        id,
        table: table.to_string(),
        mode,
        key: key.to_string(),
        operator: operator.to_string(),
        value: value.to_string(),
    }
}

fn rule_map(rules: Vec<Rule>) -> RuleMap {
    rules.into_iter().map(|r| (r.id, r)).collect()
}

fn no_orgs() -> Vec<String> {
    Vec::new()
}

#[test]
fn simple_share_tree() {
    let rules = rule_map(vec![
        rule(1, "t", RuleMode::Select, "", "", "all"),
        rule(2, "t", RuleMode::Filter, "a", "=", "x"),
        rule(3, "", RuleMode::Share, "OHRI", "", "1;2"),
    ]);
    let tree = parse(&rules, &no_orgs(), "test").expect("valid tree");
    let expected = "\
(0, root, '')
    (3, share, 'OHRI')
        (1, table, 't')
            (1, select, 'all')
            (2, filter, '=')
                (2, field, 'a')
                (2, literal, 'x')
";
    assert_eq!(tree.to_string(), expected);
}

#[test]
fn explicit_columns_keep_declared_order() {
    let rules = rule_map(vec![
        rule(1, "measures", RuleMode::Select, "", "", "reportable;pooled"),
        rule(2, "", RuleMode::Share, "ohri", "", "1"),
    ]);
    let tree = parse(&rules, &no_orgs(), "test").expect("valid tree");
    let expected = "\
(0, root, '')
    (2, share, 'ohri')
        (1, table, 'measures')
            (1, select, '')
                (1, literal, 'reportable')
                (1, literal, 'pooled')
";
    assert_eq!(tree.to_string(), expected);
}

#[test]
fn multi_table_select_fans_out() {
    let rules = rule_map(vec![
        rule(1, "measures;samples", RuleMode::Select, "", "", "purposeID"),
        rule(2, "", RuleMode::Share, "ohri", "", "1"),
    ]);
    let tree = parse(&rules, &no_orgs(), "test").expect("valid tree");
    let expected = "\
(0, root, '')
    (2, share, 'ohri')
        (1, table, 'measures')
            (1, select, '')
                (1, literal, 'purposeID')
        (1, table, 'samples')
            (1, select, '')
                (1, literal, 'purposeID')
";
    assert_eq!(tree.to_string(), expected);
}

#[test]
fn several_filters_synthesize_an_and_group() {
    let rules = rule_map(vec![
        rule(1, "samples", RuleMode::Select, "", "", "all"),
        rule(2, "samples", RuleMode::Filter, "siteID", "=", "ottawa-1"),
        rule(3, "samples", RuleMode::Filter, "collPer", ">=", "5"),
        rule(4, "", RuleMode::Share, "ohri", "", "1;2;3"),
    ]);
    let tree = parse(&rules, &no_orgs(), "test").expect("valid tree");
    let expected = "\
(0, root, '')
    (4, share, 'ohri')
        (1, table, 'samples')
            (1, select, 'all')
            (0, group, 'and')
                (2, filter, '=')
                    (2, field, 'siteID')
                    (2, literal, 'ottawa-1')
                (3, filter, '>=')
                    (3, field, 'collPer')
                    (3, literal, '5')
";
    assert_eq!(tree.to_string(), expected);
}

#[test]
fn nested_groups_resolve_in_declaration_order() {
    let rules = rule_map(vec![
        rule(11, "measures", RuleMode::Select, "", "", "measure;value"),
        rule(12, "measures", RuleMode::Filter, "measure", "=", "mPox"),
        rule(13, "measures", RuleMode::Filter, "reportDate", "between", "2021-01-01;2021-12-31"),
        rule(14, "", RuleMode::Group, "", "and", "12;13"),
        rule(15, "measures", RuleMode::Filter, "measure", "=", "cov"),
        rule(16, "measures", RuleMode::Filter, "reportDate", ">=", "2020-01-01"),
        rule(17, "", RuleMode::Group, "", "and", "15;16"),
        rule(18, "", RuleMode::Group, "", "or", "14;17"),
        rule(19, "", RuleMode::Share, "ohri", "", "11;18"),
    ]);
    let tree = parse(&rules, &no_orgs(), "test").expect("valid tree");
    let expected = "\
(0, root, '')
    (19, share, 'ohri')
        (11, table, 'measures')
            (11, select, '')
                (11, literal, 'measure')
                (11, literal, 'value')
            (18, group, 'or')
                (14, group, 'and')
                    (12, filter, '=')
                        (12, field, 'measure')
                        (12, literal, 'mPox')
                    (13, filter, 'between')
                        (13, field, 'reportDate')
                        (13, literal, '2021-01-01')
                        (13, literal, '2021-12-31')
                (17, group, 'and')
                    (15, filter, '=')
                        (15, field, 'measure')
                        (15, literal, 'cov')
                    (16, filter, '>=')
                        (16, field, 'reportDate')
                        (16, literal, '2020-01-01')
";
    assert_eq!(tree.to_string(), expected);
}

#[test]
fn multi_org_share_rules_stay_separate() {
    let rules = rule_map(vec![
        rule(11, "measures", RuleMode::Select, "", "", "all"),
        rule(12, "measures", RuleMode::Filter, "aDateEnd", "=", "2022-02-01"),
        rule(15, "samples", RuleMode::Select, "", "", "all"),
        rule(31, "", RuleMode::Share, "OPH;PHAC", "", "11;12;15"),
        rule(32, "", RuleMode::Share, "LPH", "", "11;15"),
    ]);
    let tree = parse(&rules, &no_orgs(), "test").expect("valid tree");
    let rendered = tree.to_string();
    let share_lines: Vec<&str> = rendered
        .lines()
        .filter(|l| l.contains("share"))
        .map(str::trim)
        .collect();
    assert_eq!(
        share_lines,
        vec![
            "(31, share, 'OPH')",
            "(31, share, 'PHAC')",
            "(32, share, 'LPH')",
        ]
    );
}

#[test]
fn whitelist_keeps_only_matching_shares() {
    let rules = rule_map(vec![
        rule(1, "t", RuleMode::Select, "", "", "all"),
        rule(2, "", RuleMode::Share, "OPH;PHAC", "", "1"),
        rule(3, "", RuleMode::Share, "LPH", "", "1"),
    ]);
    let orgs = vec!["PHAC".to_string()];
    let tree = parse(&rules, &orgs, "test").expect("valid tree");
    let rendered = tree.to_string();
    assert!(rendered.contains("(2, share, 'PHAC')"));
    assert!(!rendered.contains("OPH"));
    assert!(!rendered.contains("LPH"));
}

#[test]
fn whitelisted_org_absent_from_schema_fails() {
    let rules = rule_map(vec![
        rule(1, "t", RuleMode::Select, "", "", "all"),
        rule(2, "", RuleMode::Share, "OPH", "", "1"),
    ]);
    let orgs = vec!["TOH".to_string()];
    let err = parse(&rules, &orgs, "test").unwrap_err();
    assert!(err.to_string().contains("org not in schema: 'TOH'"));
}

#[test]
fn forward_reference_fails_with_ordering_hint() {
    let rules = rule_map(vec![
        rule(1, "t", RuleMode::Select, "", "", "all"),
        // group 2 references filter 5, declared later
        rule(2, "", RuleMode::Group, "", "and", "5;6"),
        rule(5, "t", RuleMode::Filter, "a", "=", "x"),
        rule(6, "t", RuleMode::Filter, "b", "=", "y"),
        rule(7, "", RuleMode::Share, "ohri", "", "1;2"),
    ]);
    let err = parse(&rules, &no_orgs(), "test").unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("rule 2: missing rule 5"));
    assert!(rendered.contains("declared before they are referenced"));
}

#[test]
fn group_may_only_reference_filters_and_groups() {
    let rules = rule_map(vec![
        rule(1, "t", RuleMode::Select, "", "", "all"),
        rule(2, "t", RuleMode::Filter, "a", "=", "x"),
        rule(3, "", RuleMode::Group, "", "and", "1;2"),
        rule(4, "", RuleMode::Share, "ohri", "", "1;3"),
    ]);
    let err = parse(&rules, &no_orgs(), "test").unwrap_err();
    assert!(err
        .to_string()
        .contains("group-rules can only refer to other filter/group-rules"));
}

#[test]
fn group_needs_at_least_two_members() {
    let rules = rule_map(vec![
        rule(1, "t", RuleMode::Select, "", "", "all"),
        rule(2, "t", RuleMode::Filter, "a", "=", "x"),
        rule(3, "", RuleMode::Group, "", "and", "2"),
        rule(4, "", RuleMode::Share, "ohri", "", "1;3"),
    ]);
    let err = parse(&rules, &no_orgs(), "test").unwrap_err();
    assert!(err.to_string().contains("expected at least 2 values, got 1"));
}

#[test]
fn second_select_for_same_table_fails_naming_both() {
    let rules = rule_map(vec![
        rule(1, "t", RuleMode::Select, "", "", "all"),
        rule(2, "t", RuleMode::Select, "", "", "a;b"),
        rule(3, "", RuleMode::Share, "ohri", "", "1;2"),
    ]);
    let err = parse(&rules, &no_orgs(), "test").unwrap_err();
    assert!(err
        .to_string()
        .contains("select-rule 2's table 't' is already used by select-rule 1"));
}

#[test]
fn range_filters_need_exactly_two_values() {
    for (op, value) in [("in", "a"), ("in", "a;b;c"), ("between", "1")] {
        let rules = rule_map(vec![
            rule(1, "t", RuleMode::Select, "", "", "all"),
            rule(2, "t", RuleMode::Filter, "col", op, value),
            rule(3, "", RuleMode::Share, "ohri", "", "1;2"),
        ]);
        let err = parse(&rules, &no_orgs(), "test").unwrap_err();
        assert!(
            err.to_string().contains("expected 2 values"),
            "op {op} value {value}: {err}"
        );
    }
}

#[test]
fn schema_without_share_or_select_rules_fails() {
    let no_share = rule_map(vec![rule(1, "t", RuleMode::Select, "", "", "all")]);
    let err = parse(&no_share, &no_orgs(), "test").unwrap_err();
    assert!(err.to_string().contains("no share-rules in schema"));

    let no_select = rule_map(vec![
        rule(1, "t", RuleMode::Filter, "a", "=", "x"),
        rule(2, "", RuleMode::Share, "ohri", "", "1"),
    ]);
    let err = parse(&no_select, &no_orgs(), "test").unwrap_err();
    assert!(err.to_string().contains("no select-rules in schema"));
}

#[test]
fn empty_schema_fails() {
    let err = parse(&RuleMap::new(), &no_orgs(), "test").unwrap_err();
    assert!(err.to_string().contains("no share-rules in schema"));
}
