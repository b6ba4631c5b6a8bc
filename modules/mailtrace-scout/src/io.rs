//! CSV in and out.
//!
//! Input: two columns (name, affiliation), no header, affiliation optional.
//! Output: `Name,Institution,E-Mail` header, then one row per input record in
//! input order.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use mailtrace_common::Person;

pub const OUTPUT_HEADER: [&str; 3] = ["Name", "Institution", "E-Mail"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub name: String,
    pub institution: String,
    /// Empty when unresolved.
    pub email: String,
}

pub fn read_people(path: &Path) -> Result<Vec<Person>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input {}", path.display()))?;
    parse_people(file).with_context(|| format!("Failed to read input {}", path.display()))
}

/// Rows with an empty name are skipped; extra columns are ignored.
pub fn parse_people<R: std::io::Read>(reader: R) -> Result<Vec<Person>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut people = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let name = record.get(0).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        people.push(Person::new(name, record.get(1).unwrap_or_default()));
    }
    Ok(people)
}

pub fn write_results(path: &Path, rows: &[ResultRow]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output {}", path.display()))?;
    write_results_to(file, rows).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_results_to<W: std::io::Write>(writer: W, rows: &[ResultRow]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv_writer.write_record(OUTPUT_HEADER)?;
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
