//! Filters and sort instructions over records.
//!
//! Values are compared with a single total order shared by filtering and
//! sorting, so a continuation filter built from a sort position always
//! agrees with the order the records were returned in:
//!
//! `null < bool < number < string < array < object`
//!
//! A missing field behaves as `null`.

use crate::{FieldNames, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;

static NULL: Value = Value::Null;

/// How a filter compares a record field with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Not,
    Lt,
    Le,
    Gt,
    Ge,
    /// Field equals one of the listed values
    In,
    /// Field equals none of the listed values
    Exclude,
    /// Case-insensitive glob, `*` matches anything
    Like,
    /// Field is present (value `true`) or absent (value `false`)
    Has,
}

/// A single `(field, value, comparator)` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: Value,
    pub comparator: Comparator,
}

impl Filter {
    pub fn new(field: impl Into<String>, value: impl Into<Value>, comparator: Comparator) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            comparator,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, Comparator::Eq)
    }

    pub fn not(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, Comparator::Not)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, Comparator::Lt)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, Comparator::Le)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, Comparator::Gt)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, value, Comparator::Ge)
    }

    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Value::Array(values), Comparator::In)
    }

    pub fn exclude(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Value::Array(values), Comparator::Exclude)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, Value::String(pattern.into()), Comparator::Like)
    }

    pub fn has(field: impl Into<String>, present: bool) -> Self {
        Self::new(field, present, Comparator::Has)
    }

    /// Check whether a record satisfies this filter.
    pub fn matches(&self, record: &Record) -> bool {
        let left = record.get(&self.field).unwrap_or(&NULL);

        match self.comparator {
            Comparator::Eq => compare_values(left, &self.value) == Ordering::Equal,
            Comparator::Not => compare_values(left, &self.value) != Ordering::Equal,
            Comparator::Lt => compare_values(left, &self.value) == Ordering::Less,
            Comparator::Le => compare_values(left, &self.value) != Ordering::Greater,
            Comparator::Gt => compare_values(left, &self.value) == Ordering::Greater,
            Comparator::Ge => compare_values(left, &self.value) != Ordering::Less,
            Comparator::In => self.contains(left),
            Comparator::Exclude => !self.contains(left),
            Comparator::Like => like(left, &self.value),
            Comparator::Has => !left.is_null() == self.value.as_bool().unwrap_or(true),
        }
    }

    fn contains(&self, left: &Value) -> bool {
        let candidates = match &self.value {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        candidates.iter().any(|v| compare_values(left, v).is_eq())
    }

    /// Coerce numeric strings to integers when filtering on the modification
    /// field, so `"1234"` and `1234` select the same records.
    pub fn normalized(&self, names: &FieldNames) -> Filter {
        if self.field != names.modified {
            return self.clone();
        }
        let value = match &self.value {
            Value::Array(items) => Value::Array(items.iter().map(coerce_timestamp).collect()),
            other => coerce_timestamp(other),
        };
        Filter {
            value,
            ..self.clone()
        }
    }
}

fn coerce_timestamp(value: &Value) -> Value {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

/// Check that a record satisfies every filter (logical AND).
pub fn matches_all(filters: &[Filter], record: &Record) -> bool {
    filters.iter().all(|f| f.matches(record))
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ascending,
    Descending,
}

/// A `(field, direction)` sort instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Ascending)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Descending)
    }

    /// Compare two records on this key only.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let left = a.get(&self.field).unwrap_or(&NULL);
        let right = b.get(&self.field).unwrap_or(&NULL);
        match self.direction {
            Direction::Ascending => compare_values(left, right),
            Direction::Descending => compare_values(right, left),
        }
    }
}

/// Stable sort on cumulative keys. Records equal on every key keep their
/// relative order.
pub fn sort_records(records: &mut [Record], sorting: &[Sort]) {
    if sorting.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        sorting
            .iter()
            .map(|s| s.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    let a = x.as_f64().unwrap_or(f64::NAN);
    let b = y.as_f64().unwrap_or(f64::NAN);
    a.total_cmp(&b)
}

fn textual(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn like(left: &Value, pattern: &Value) -> bool {
    match (textual(left), textual(pattern)) {
        (Some(text), Some(pattern)) => glob_match(&pattern, &text),
        _ => false,
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return text.contains(pattern);
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, last) = (parts[0], parts[parts.len() - 1]);

    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
