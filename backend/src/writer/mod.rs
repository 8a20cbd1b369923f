//! Table output: pretty JSON, CSV/TSV and text lines.

use std::io::Write;
use std::path::Path;

use crate::error::WriteError;
use crate::models::{field_names, Record, Value};
use crate::parser::FileFormat;

/// Pretty-printed JSON array.
pub fn to_json(table: &[Record]) -> Result<String, WriteError> {
    Ok(serde_json::to_string_pretty(table)?)
}

/// Delimited text over the union of fields, in first-seen order. Missing
/// and null cells are written empty. An empty table writes nothing.
pub fn to_delimited(table: &[Record], delimiter: char) -> Result<String, WriteError> {
    if table.is_empty() {
        return Ok(String::new());
    }
    let headers = field_names(table);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter as u8)
        .from_writer(Vec::new());
    writer.write_record(&headers)?;
    for record in table {
        writer.write_record(headers.iter().map(|h| cell(record.value(h))))?;
    }
    let bytes = writer.into_inner().map_err(|e| WriteError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One line per record from its `line` field.
pub fn to_text_lines(table: &[Record]) -> String {
    table
        .iter()
        .map(|r| format!("{}\n", cell(r.value("line"))))
        .collect()
}

/// Render a table in the given format.
pub fn render(table: &[Record], format: FileFormat) -> Result<String, WriteError> {
    match format {
        FileFormat::Json => to_json(table),
        FileFormat::Csv => to_delimited(table, ','),
        FileFormat::Tsv => to_delimited(table, '\t'),
        FileFormat::Text => Ok(to_text_lines(table)),
    }
}

/// Write to a file, picking the format from its extension. Parent
/// directories are created as needed.
pub fn write_file<P: AsRef<Path>>(table: &[Record], path: P) -> Result<FileFormat, WriteError> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path).map_err(|e| WriteError::UnsupportedFormat(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(render(table, format)?.as_bytes())?;
    Ok(format)
}
