use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use tracing::info;

use tabshare_store::{DataSource, Frame};

use crate::cli::{ExtractArgs, InspectArgs};
use crate::report::print_table_report;

/// Extracts filtered data and writes one CSV per (org, table). Returns the
/// paths of the files written.
pub fn run_extract(args: &ExtractArgs) -> Result<Vec<PathBuf>> {
    let sources = data_sources(&args.inputs, &args.tables)?;
    let data = tabshare_store::extract(&args.schema, &sources, &args.orgs)?;

    fs::create_dir_all(&args.outdir)
        .with_context(|| format!("create output directory '{}'", args.outdir.display()))?;
    let stem = schema_stem(&args.schema);

    let mut written = Vec::new();
    for (org, tables) in &data {
        for (table, frame) in tables {
            let path = args.outdir.join(output_filename(&stem, org, table));
            write_frame(&path, frame)?;
            info!(org, table, rows = frame.rows.len(), path = %path.display(), "wrote output");
            written.push(path);
        }
    }
    Ok(written)
}

/// Prints the audit report: per (org, table), the granted columns and a
/// per-rule row-count table.
pub fn run_inspect(args: &InspectArgs) -> Result<()> {
    let rules = tabshare_schema::load(&args.schema)?;
    let filename = args
        .schema
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let queries = tabshare_query::compile(&rules, &args.orgs, &filename)?;

    let tables: Vec<String> = queries
        .values()
        .flat_map(|tables| tables.keys().cloned())
        .collect();
    let conn = tabshare_store::connect(&data_sources(&args.inputs, &args.tables)?, &tables)?;

    for (org, table_queries) in &queries {
        for (table, table_query) in table_queries {
            let (_, columns) = conn.get_columns(table_query)?;
            let counts = conn.get_counts(table_query)?;
            print_table_report(org, table, &columns, &counts, &rules);
        }
    }
    Ok(())
}

/// Pairs input files with table names by position; inputs without a name
/// (or with an empty one) use their file stem.
fn data_sources(inputs: &[PathBuf], tables: &[String]) -> Result<Vec<DataSource>> {
    ensure!(
        tables.len() <= inputs.len(),
        "got {} table names for {} input files",
        tables.len(),
        inputs.len()
    );
    inputs
        .iter()
        .enumerate()
        .map(|(i, path)| match tables.get(i).filter(|t| !t.is_empty()) {
            Some(table) => Ok(DataSource::with_table(table.as_str(), path)),
            None => Ok(DataSource::from_path(path)?),
        })
        .collect()
}

/// The schema file's stem, used as the prefix of every output filename.
fn schema_stem(schema: &Path) -> String {
    schema
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schema".to_string())
}

fn output_filename(stem: &str, org: &str, table: &str) -> String {
    format!("{stem}-{org}-{table}.csv")
}

fn write_frame(path: &Path, frame: &Frame) -> Result<()> {
    let context = || format!("write '{}'", path.display());
    let mut writer = csv::Writer::from_path(path).with_context(context)?;
    writer.write_record(&frame.columns).with_context(context)?;
    for row in &frame.rows {
        writer.write_record(row).with_context(context)?;
    }
    writer.flush().with_context(context)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_filenames_follow_the_schema_org_table_convention() {
        let stem = schema_stem(Path::new("/rules/ottawa-rules.csv"));
        assert_eq!(stem, "ottawa-rules");
        assert_eq!(
            output_filename(&stem, "OHRI", "samples"),
            "ottawa-rules-OHRI-samples.csv"
        );
    }

    #[test]
    fn table_names_pair_with_inputs_by_position() {
        let inputs = vec![
            PathBuf::from("/data/export-1.csv"),
            PathBuf::from("/data/export-2.csv"),
            PathBuf::from("/data/measures.csv"),
        ];
        let tables = vec!["samples".to_string(), String::new()];
        let sources = data_sources(&inputs, &tables).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.table.as_str()).collect();
        // explicit name, empty entry falls back to the stem, missing too
        assert_eq!(names, vec!["samples", "export-2", "measures"]);
    }

    #[test]
    fn more_table_names_than_inputs_is_an_error() {
        let inputs = vec![PathBuf::from("a.csv")];
        let tables = vec!["t1".to_string(), "t2".to_string()];
        let err = data_sources(&inputs, &tables).unwrap_err();
        assert_eq!(err.to_string(), "got 2 table names for 1 input files");
    }

    #[test]
    fn frames_round_trip_through_csv() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let frame = Frame {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: vec![
                vec!["1".to_string(), "x,y".to_string()],
                vec!["2".to_string(), String::new()],
            ],
        };
        write_frame(&path, &frame).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,b\n1,\"x,y\"\n2,\n");
    }
}
