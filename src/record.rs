use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::error::SchemaMismatchError;

/// One flat row: field name -> value. Field order is kept for column ordering
/// but is not part of equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn same_fields(&self, other: &Record) -> bool {
        self.fields.len() == other.fields.len()
            && other.fields.keys().all(|k| self.fields.contains_key(k))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Column-oriented view of a batch of records. Every column has `rows` values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: IndexMap<String, Vec<String>>,
    rows: usize,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Nothing worth persisting: no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Row `i` in column order.
    pub fn row(&self, i: usize) -> Option<Vec<&str>> {
        if i >= self.rows {
            return None;
        }
        Some(self.columns.values().map(|col| col[i].as_str()).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        (0..self.rows).filter_map(move |i| self.row(i))
    }

    /// Expand back into records, one per row, fields in column order.
    pub fn to_records(&self) -> Vec<Record> {
        (0..self.rows)
            .map(|i| {
                self.columns
                    .iter()
                    .map(|(name, col)| (name.clone(), col[i].clone()))
                    .collect()
            })
            .collect()
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.columns.serialize(serializer)
    }
}

/// Transpose records into a table.
///
/// Row order follows input order and column order follows the first record's
/// field order. Every record must carry exactly the first record's field set.
pub fn normalize(records: &[Record]) -> Result<Table, SchemaMismatchError> {
    let Some(first) = records.first() else {
        return Ok(Table::default());
    };

    let mut columns: IndexMap<String, Vec<String>> = first
        .field_names()
        .map(|name| (name.to_string(), Vec::with_capacity(records.len())))
        .collect();

    for (row, record) in records.iter().enumerate() {
        if !first.same_fields(record) {
            return Err(SchemaMismatchError {
                row,
                expected: first.field_names().map(str::to_string).collect(),
                found: record.field_names().map(str::to_string).collect(),
            });
        }
        for (name, col) in columns.iter_mut() {
            // same_fields guarantees presence
            col.push(record.get(name).unwrap_or_default().to_string());
        }
    }

    Ok(Table {
        columns,
        rows: records.len(),
    })
}
