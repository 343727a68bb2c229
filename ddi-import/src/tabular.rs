//! Tabular and JSON import sources
//!
//! CSV files are read header-first into [`Row`]s. Before an importer sees
//! them, legacy column names are renamed to their canonical form and missing
//! columns can be augmented with a fixed value.

use crate::ImportError;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Legacy column names and their canonical replacements
pub const LEGACY_RENAMES: &[(&str, &str)] = &[
    ("study_name", "study"),
    ("dataset_name", "dataset"),
    ("variable_name", "variable"),
    ("concept_name", "concept"),
    ("period_name", "period"),
    ("analysis_unit_name", "analysis_unit"),
    ("conceptual_dataset_name", "conceptual_dataset"),
    ("instrument_name", "instrument"),
    ("question_name", "question"),
    ("topic_name", "topic"),
    ("parent_name", "parent"),
    ("origin_study_name", "origin_study"),
    ("origin_dataset_name", "origin_dataset"),
    ("origin_variable_name", "origin_variable"),
    ("target_study_name", "target_study"),
    ("target_dataset_name", "target_dataset"),
    ("target_variable_name", "target_variable"),
];

/// One record of a tabular source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: IndexMap<String, String>,
    line: u64,
}

impl Row {
    pub fn new(fields: IndexMap<String, String>, line: u64) -> Self {
        Self { fields, line }
    }

    /// Source line (1-based, header is line 1)
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Trimmed value; empty cells count as missing
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, column: &str, default: &'a str) -> &'a str {
        self.get(column).unwrap_or(default)
    }

    pub fn require(&self, entity: &str, column: &str) -> Result<&str, ImportError> {
        self.get(column)
            .ok_or_else(|| ImportError::missing_field(entity, column))
    }

    pub fn get_i64(&self, entity: &str, column: &str) -> Result<Option<i64>, ImportError> {
        self.get(column)
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    ImportError::row(entity, format!("'{}' is not an integer in column {}", v, column))
                })
            })
            .transpose()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// The raw record, for log context
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

/// Header-driven CSV contents
#[derive(Debug, Clone, Default)]
pub struct TabularDataset {
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl TabularDataset {
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        if !path.is_file() {
            return Err(ImportError::MissingSource(path.to_path_buf()));
        }
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let fields = headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();
            rows.push(Row::new(fields, line));
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rename column `from` to `to` unless `to` already exists
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if !self.headers.iter().any(|h| h == from) || self.headers.iter().any(|h| h == to) {
            return false;
        }

        for header in &mut self.headers {
            if header == from {
                *header = to.to_string();
            }
        }
        for row in &mut self.rows {
            if let Some(index) = row.fields.get_index_of(from) {
                let value = row.fields.shift_remove(from).unwrap_or_default();
                row.fields.shift_insert(index, to.to_string(), value);
            }
        }
        true
    }

    /// Apply [`LEGACY_RENAMES`]
    pub fn apply_legacy_renames(&mut self) {
        for (from, to) in LEGACY_RENAMES {
            self.rename(from, to);
        }
    }

    /// Set `column` to `value` on every row where it is missing or empty
    pub fn augment(&mut self, column: &str, value: &str) {
        if !self.headers.iter().any(|h| h == column) {
            self.headers.push(column.to_string());
        }
        for row in &mut self.rows {
            let cell = row.fields.entry(column.to_string()).or_default();
            if cell.trim().is_empty() {
                *cell = value.to_string();
            }
        }
    }
}

/// Apply [`LEGACY_RENAMES`] to the keys of a JSON record
pub fn rename_json_keys(record: &mut Map<String, Value>) {
    for (from, to) in LEGACY_RENAMES {
        if record.contains_key(*to) {
            continue;
        }
        if let Some(value) = record.remove(*from) {
            record.insert((*to).to_string(), value);
        }
    }
}

/// JSON records from a list of objects or a dict of objects
///
/// For a dict, the key becomes `name` unless the object has one.
pub fn read_json_records(path: &Path) -> Result<Vec<Map<String, Value>>, ImportError> {
    let value = read_json(path)?;
    json_records(value).ok_or_else(|| {
        ImportError::row(
            "json",
            format!("{} holds neither a list nor a dict of objects", path.display()),
        )
    })
}

/// Split a JSON document into records, keeping file order
pub fn json_records(value: Value) -> Option<Vec<Map<String, Value>>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, item)| match item {
                Value::Object(mut record) => {
                    record.entry("name").or_insert(Value::String(key));
                    Some(record)
                }
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// One JSON object
pub fn read_json_object(path: &Path) -> Result<Map<String, Value>, ImportError> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(ImportError::row(
            "json",
            format!("{} does not hold a JSON object", path.display()),
        )),
    }
}

fn read_json(path: &Path) -> Result<Value, ImportError> {
    if !path.is_file() {
        return Err(ImportError::MissingSource(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(text.trim_start_matches('\u{feff}'))?)
}

/// String field of a JSON record, trying each key in order
pub fn json_str<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| record.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
}

/// Scalar field rendered as text (answer values may be numbers)
pub fn json_text(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match record.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
