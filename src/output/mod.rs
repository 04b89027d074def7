//! # Output Deserialization
//!
//! Turns the raw stdout of an executed pipeline into structured rows.
//! Group-by pipelines emit delimited records whose columns follow the
//! declared output schema; each field parses greedily as integer, then
//! float, then string. jq pipelines emit one compact JSON value per
//! line.

use serde_json::Value as JsonValue;

use crate::error::SparkResult;

/// One deserialized field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    /// Column declared by the schema but absent from the line
    Null,
}

impl Value {
    /// Greedy numeric parse: integer first, then float, else string.
    pub fn parse(text: &str) -> Value {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(text.to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// One output row: column/value pairs in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split stdout into records against a declared column schema.
pub fn parse_records(stdout: &str, columns: &[String], delimiter: &str) -> Vec<Record> {
    let mut records = Vec::new();
    for line in stdout.lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delimiter).collect();
        let entries = columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = fields.get(i).map_or(Value::Null, |f| Value::parse(f));
                (name.clone(), value)
            })
            .collect();
        records.push(Record { entries });
    }
    records
}

/// Parse jq output: one JSON value per non-empty line.
pub fn parse_json_lines(stdout: &str) -> SparkResult<Vec<JsonValue>> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}
