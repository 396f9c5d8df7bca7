//! Inspect-report rendering.

use std::collections::BTreeMap;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use tabshare_schema::{Rule, RuleId, RuleMap, RuleMode};

/// Prints what one organization receives from one table: the granted
/// columns plus a per-rule count table.
pub fn print_table_report(
    org: &str,
    table_name: &str,
    columns: &[String],
    counts: &BTreeMap<RuleId, i64>,
    rules: &RuleMap,
) {
    println!();
    println!("org: {org}, table: {table_name}");
    println!("columns: {}", columns.join(", "));
    println!("{}", count_table(counts, rules));
}

/// Builds the count table. The synthesized rule 0 is internal bookkeeping
/// and is left out of the report.
fn count_table(counts: &BTreeMap<RuleId, i64>, rules: &RuleMap) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Count"),
        header_cell("Rule"),
        header_cell("Mode"),
        header_cell("Filter"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    align_column(&mut table, 1, CellAlignment::Right);
    for (rule_id, count) in counts {
        if *rule_id == 0 {
            continue;
        }
        let (mode, filter) = rules
            .get(rule_id)
            .map(|rule| (rule.mode.to_string(), filter_expr(rule)))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(count),
            Cell::new(rule_id),
            Cell::new(mode),
            Cell::new(filter),
        ]);
    }
    table
}

fn filter_expr(rule: &Rule) -> String {
    match rule.mode {
        RuleMode::Filter => format!("{} {} {}", rule.key, rule.operator, rule.value),
        RuleMode::Group => format!("{}({})", rule.operator.to_lowercase(), rule.value),
        RuleMode::Select | RuleMode::Share => String::new(),
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}
