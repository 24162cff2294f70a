use std::io::Read;

use csv::{ReaderBuilder, StringRecord};

use crate::error::IngestError;
use crate::model::MovieRow;

/// Only the leading `id,title,tagline` columns are loaded.
const LOADED_FIELDS: usize = 3;

/// Parses a comma-delimited export into table rows.
///
/// The first line is a header and is skipped. Extra trailing columns are dropped. The
/// first line that cannot become a row aborts the whole parse (fail-fast), so a bad
/// file never reaches the database.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<MovieRow>, IngestError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| IngestError::MalformedRow {
            line: e.position().map(|p| p.line()).unwrap_or_default(),
            reason: e.to_string(),
        })?;
        rows.push(to_row(&record)?);
    }
    Ok(rows)
}

fn to_row(record: &StringRecord) -> Result<MovieRow, IngestError> {
    let line = record.position().map(|p| p.line()).unwrap_or_default();
    if record.len() < LOADED_FIELDS {
        return Err(IngestError::MalformedRow {
            line,
            reason: format!(
                "expected at least {LOADED_FIELDS} fields, found {}",
                record.len()
            ),
        });
    }

    let id = record[0]
        .trim()
        .parse::<i32>()
        .map_err(|e| IngestError::MalformedRow {
            line,
            reason: format!("id {:?} is not an integer: {e}", &record[0]),
        })?;

    Ok(MovieRow {
        id,
        title: record[1].to_string(),
        tagline: record[2].to_string(),
    })
}
