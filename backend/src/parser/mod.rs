//! Table ingestion with encoding and delimiter auto-detection.
//!
//! Reads CSV, TSV, JSON and plain text into a [`Table`]. Numeric-looking CSV
//! cells become integers or reals; everything else stays a string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ReadError, ReadResult};
use crate::models::{field_names, Record, Table, Value};

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Json,
    Text,
}

impl FileFormat {
    /// Format for a file extension (without the dot), case-insensitive.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "tsv" => Some(FileFormat::Tsv),
            "json" => Some(FileFormat::Json),
            "txt" | "text" => Some(FileFormat::Text),
            _ => None,
        }
    }

    /// Format of a path, from its extension.
    pub fn from_path(path: &Path) -> ReadResult<Self> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        Self::from_extension(extension).ok_or_else(|| ReadError::UnsupportedFormat(format!(".{}", extension)))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
            FileFormat::Json => "json",
            FileFormat::Text => "text",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = ReadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| ReadError::UnsupportedFormat(s.to_string()))
    }
}

/// A parsed table with ingestion metadata.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub records: Table,
    pub format: FileFormat,
    /// Detected or used encoding
    pub encoding: String,
    /// Delimiter, for CSV and TSV
    pub delimiter: Option<char>,
    /// Column headers, or the union of record fields for JSON
    pub headers: Vec<String>,
}

// =============================================================================
// Detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes; unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let text = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");
    [',', ';', '\t', '|']
        .into_iter()
        .map(|sep| (sep, first_line.matches(sep).count()))
        .fold((',', 0), |best, (sep, count)| if count > best.1 { (sep, count) } else { best })
        .0
}

/// Integer, then real, else the original string.
pub fn coerce_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(raw.to_string());
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    match trimmed.parse::<f64>() {
        Ok(r) if r.is_finite() => Value::Real(r),
        _ => Value::String(raw.to_string()),
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse bytes in a known format.
pub fn parse_bytes(bytes: &[u8], format: FileFormat) -> ReadResult<ParsedTable> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ReadError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    match format {
        FileFormat::Csv => {
            let delimiter = detect_delimiter(&content);
            parse_delimited(&content, delimiter, format, encoding)
        }
        FileFormat::Tsv => parse_delimited(&content, '\t', format, encoding),
        FileFormat::Json => {
            let records = parse_json(&content)?;
            let headers = field_names(&records);
            Ok(ParsedTable { records, format, encoding, delimiter: None, headers })
        }
        FileFormat::Text => Ok(ParsedTable {
            records: parse_text(&content),
            format,
            encoding,
            delimiter: None,
            headers: vec!["line_number".to_string(), "line".to_string()],
        }),
    }
}

/// Read a file, picking the format from its extension.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> ReadResult<ParsedTable> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    let bytes = std::fs::read(path)?;
    parse_bytes(&bytes, format)
}

/// Parse delimited text with the csv crate. Short rows are padded with empty
/// strings; extra cells are ignored.
pub fn parse_delimited(content: &str, delimiter: char, format: FileFormat, encoding: String) -> ReadResult<ParsedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers().map_err(csv_error)?.iter().map(str::to_string).collect();
    if headers.iter().all(String::is_empty) {
        return Err(ReadError::Csv { line: 1, message: "No headers found".to_string() });
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(csv_error)?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), coerce_cell(row.get(i).unwrap_or(""))))
            .collect();
        records.push(record);
    }

    Ok(ParsedTable { records, format, encoding, delimiter: Some(delimiter), headers })
}

fn csv_error(e: csv::Error) -> ReadError {
    let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
    ReadError::Csv { line, message: e.to_string() }
}

/// An array of objects or a single object.
pub fn parse_json(content: &str) -> ReadResult<Table> {
    match serde_json::from_str::<serde_json::Value>(content)? {
        serde_json::Value::Object(object) => Ok(vec![Record::from_json_object(&object)]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| item.as_object().map(Record::from_json_object).ok_or(ReadError::NotRecords))
            .collect(),
        _ => Err(ReadError::NotRecords),
    }
}

/// One record per non-blank line: `{line_number, line}`.
pub fn parse_text(content: &str) -> Table {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            Record::new()
                .with("line_number", (i + 1) as i64)
                .with("line", line.trim_end_matches('\r'))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv(content: &str) -> ParsedTable {
        parse_bytes(content.as_bytes(), FileFormat::Csv).unwrap()
    }

    #[test]
    fn test_simple_csv_with_coercion() {
        let table = csv("name;age;score\nAlice;30;1.5\nBob;25;n/a");
        assert_eq!(table.delimiter, Some(';'));
        assert_eq!(table.headers, vec!["name", "age", "score"]);
        assert_eq!(table.records[0].value("age"), &Value::Integer(30));
        assert_eq!(table.records[0].value("score"), &Value::Real(1.5));
        assert_eq!(table.records[1].value("score"), &Value::from("n/a"));
    }

    #[test]
    fn test_quoted_values_keep_delimiters() {
        let table = csv("name,comment\n\"Smith, Jane\",\"said \"\"hi\"\"\"");
        assert_eq!(table.records[0].value("name"), &Value::from("Smith, Jane"));
        assert_eq!(table.records[0].value("comment"), &Value::from("said \"hi\""));
    }

    #[test]
    fn test_short_and_long_rows() {
        let table = csv("a;b;c\n1;;3\n4;5;6;7\n\n");
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].value("b"), &Value::from(""));
        assert_eq!(table.records[1].len(), 3);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(matches!(parse_bytes(b"", FileFormat::Csv), Err(ReadError::EmptyFile)));
        assert!(matches!(parse_bytes(b"  \n", FileFormat::Json), Err(ReadError::EmptyFile)));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_tsv() {
        let table = parse_bytes(b"id\tname\n1\tAda Lovelace", FileFormat::Tsv).unwrap();
        assert_eq!(table.records[0].value("name"), &Value::from("Ada Lovelace"));
        assert_eq!(table.records[0].value("id"), &Value::Integer(1));
    }

    #[test]
    fn test_json_array_and_object() {
        let table = parse_bytes(br#"[{"a": 1, "nested": {"x": 1}}, {"b": "two"}]"#, FileFormat::Json).unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.headers, vec!["a", "nested", "b"]);
        assert_eq!(table.records[0].value("nested"), &Value::from(r#"{"x":1}"#));

        let single = parse_bytes(br#"{"a": true}"#, FileFormat::Json).unwrap();
        assert_eq!(single.records[0].value("a"), &Value::Boolean(true));

        assert!(matches!(parse_bytes(b"[1, 2]", FileFormat::Json), Err(ReadError::NotRecords)));
        assert!(matches!(parse_bytes(b"{oops", FileFormat::Json), Err(ReadError::Json(_))));
    }

    #[test]
    fn test_text_lines_skip_blanks() {
        let table = parse_bytes(b"first\n\nthird\r\n", FileFormat::Text).unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[1].value("line_number"), &Value::Integer(3));
        assert_eq!(table.records[1].value("line"), &Value::from("third"));
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        assert_eq!(decode_content(bytes, "iso-8859-1"), "Société");
    }

    #[test]
    fn test_parse_file_auto_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "name,age\nAlice,30").unwrap();
        let table = parse_file_auto(&path).unwrap();
        assert_eq!(table.format, FileFormat::Csv);
        assert_eq!(table.records[0].value("age"), &Value::Integer(30));

        let other = dir.path().join("people.xlsx");
        std::fs::write(&other, b"x").unwrap();
        assert!(matches!(parse_file_auto(&other), Err(ReadError::UnsupportedFormat(ext)) if ext == ".xlsx"));
    }
}
