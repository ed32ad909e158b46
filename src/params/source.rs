//! Static sources of attach rules.
//!
//! A source produces a list of rows; every row becomes one Value record on
//! each flagged owner. Sources are independent of the model, so the rows of
//! all rules are generated up front and in parallel.

use log::debug;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::config::{yaml_to_string, Config, ParameterRule, SourceKind, ValueSource};
use crate::error::CompileError;

/// One generated record: field name -> value
pub type Row = BTreeMap<String, String>;

/// Field added to every row with its position
pub const INDEX_FIELD: &str = "index";
/// Field holding the scalar value of range, sequence and text rows
pub const VALUE_FIELD: &str = "value";

/// Row count of a sequence source without a positive span
const DEFAULT_SEQUENCE_COUNT: i64 = 10;

static FORMAT_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.?([A-Za-z0-9_]+)\s*\}\}").expect("Invalid format reference regex")
});

/// File formats of a `file` source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Text,
    Csv,
    Yaml,
    Json,
}

impl FileFormat {
    /// Explicit format, or the one implied by the file extension
    pub fn detect(path: &Path, explicit: Option<&str>) -> FileFormat {
        let name = match explicit {
            Some(format) if !format.is_empty() => format.to_lowercase(),
            _ => path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default(),
        };
        match name.as_str() {
            "yaml" | "yml" => FileFormat::Yaml,
            "json" => FileFormat::Json,
            "csv" => FileFormat::Csv,
            _ => FileFormat::Text,
        }
    }
}

fn indexed(index: usize, mut row: Row) -> Row {
    row.insert(INDEX_FIELD.to_string(), index.to_string());
    row
}

fn scalar_row(value: impl ToString, index: impl ToString) -> Row {
    let mut row = Row::new();
    row.insert(VALUE_FIELD.to_string(), value.to_string());
    row.insert(INDEX_FIELD.to_string(), index.to_string());
    row
}

/// Generate the rows of a static source.
pub fn source_rows(config: &Config, source: &ValueSource) -> Result<Vec<Row>, CompileError> {
    let rows = match source.kind {
        SourceKind::Range => (source.start..=source.end)
            .map(|i| scalar_row(i, i - source.start))
            .collect(),
        SourceKind::Sequence => {
            let mut count = source.end - source.start;
            if count <= 0 {
                count = DEFAULT_SEQUENCE_COUNT;
            }
            (0..count).map(|i| scalar_row(i, i)).collect()
        }
        SourceKind::List => source
            .values
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let row = item
                    .iter()
                    .map(|(k, v)| (k.clone(), yaml_to_string(v)))
                    .collect();
                indexed(i, row)
            })
            .collect(),
        SourceKind::File => {
            let file = source.file.as_deref().unwrap_or_default();
            let path = config.resolve_path(file);
            parse_file(&path, source.format.as_deref())?
        }
    };
    Ok(rows)
}

/// Parse a source file into rows.
pub fn parse_file(path: &Path, format: Option<&str>) -> Result<Vec<Row>, CompileError> {
    let content = fs::read_to_string(path).map_err(|source| CompileError::SourceFile {
        path: path.to_path_buf(),
        source,
    })?;
    let format = FileFormat::detect(path, format);
    debug!("Parsing {} as {:?}", path.display(), format);
    match format {
        FileFormat::Text => Ok(parse_text(&content)),
        FileFormat::Csv => parse_csv(&content).map_err(|reason| format_error(path, reason)),
        FileFormat::Yaml => parse_yaml(&content).map_err(|reason| format_error(path, reason)),
        FileFormat::Json => parse_json(&content).map_err(|reason| format_error(path, reason)),
    }
}

fn format_error(path: &Path, reason: String) -> CompileError {
    CompileError::SourceFormat {
        path: PathBuf::from(path),
        reason,
    }
}

/// One row per non-empty line
fn parse_text(content: &str) -> Vec<Row> {
    content
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, line)| scalar_row(line, i))
        .collect()
}

/// Split one CSV record, honoring double-quoted fields.
fn split_csv_record(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }
    if quoted {
        return Err(format!("unterminated quoted field in line '{}'", line));
    }
    fields.push(field);
    Ok(fields)
}

/// Header row names the fields of the following rows
fn parse_csv(content: &str) -> Result<Vec<Row>, String> {
    let mut lines = content
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty());
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers = split_csv_record(header)?;
    lines
        .enumerate()
        .map(|(i, line)| {
            let record = split_csv_record(line)?;
            if record.len() != headers.len() {
                return Err(format!(
                    "record {} has {} fields, header has {}",
                    i + 1,
                    record.len(),
                    headers.len()
                ));
            }
            let row = headers
                .iter()
                .zip(record)
                .map(|(h, v)| (h.clone(), v))
                .collect();
            Ok(indexed(i, row))
        })
        .collect()
}

fn parse_yaml(content: &str) -> Result<Vec<Row>, String> {
    let items: Vec<BTreeMap<String, serde_yaml::Value>> =
        serde_yaml::from_str(content).map_err(|e| format!("failed to parse YAML: {}", e))?;
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let row = item.iter().map(|(k, v)| (k.clone(), yaml_to_string(v))).collect();
            indexed(i, row)
        })
        .collect())
}

fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_json(content: &str) -> Result<Vec<Row>, String> {
    let items: Vec<BTreeMap<String, serde_json::Value>> =
        serde_json::from_str(content).map_err(|e| format!("failed to parse JSON: {}", e))?;
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let row = item.iter().map(|(k, v)| (k.clone(), json_to_string(v))).collect();
            indexed(i, row)
        })
        .collect())
}

/// Add the derived fields of `param_format` to every row.
///
/// References to unknown fields are replaced with an empty string.
pub fn apply_param_format(rows: &mut [Row], formats: &BTreeMap<String, String>) {
    if formats.is_empty() {
        return;
    }
    for row in rows.iter_mut() {
        let derived: Vec<(String, String)> = formats
            .iter()
            .map(|(key, template)| {
                let value = FORMAT_REF_REGEX.replace_all(template, |caps: &regex::Captures| {
                    row.get(&caps[1]).cloned().unwrap_or_default()
                });
                (key.clone(), value.into_owned())
            })
            .collect();
        row.extend(derived);
    }
}

/// Rows of one source rule, with `param_format` applied
pub fn rule_rows(config: &Config, rule: &ParameterRule) -> Result<Vec<Row>, CompileError> {
    let Some(source) = &rule.source else {
        return Ok(Vec::new());
    };
    let mut rows = source_rows(config, source)?;
    apply_param_format(&mut rows, &rule.param_format);
    Ok(rows)
}

/// Generate the rows of every source rule of the configuration.
///
/// Rules are processed in parallel; the first error in config order wins.
pub fn generate_source_rows(config: &Config) -> Result<BTreeMap<String, Vec<Row>>, CompileError> {
    let rules: Vec<&ParameterRule> = config
        .param_rules
        .iter()
        .filter(|r| r.source.is_some())
        .collect();

    let results: Vec<(String, Result<Vec<Row>, CompileError>)> = rules
        .par_iter()
        .map(|rule| (rule.name.clone(), rule_rows(config, rule)))
        .collect();

    let mut generated = BTreeMap::new();
    for (name, rows) in results {
        let rows = rows?;
        debug!("Source of {} produced {} rows", name, rows.len());
        generated.insert(name, rows);
    }
    Ok(generated)
}
