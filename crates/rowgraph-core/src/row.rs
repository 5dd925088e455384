//! Flat result rows keyed by output label.
//!
//! Rows handed to the materializer are keyed by the labels the renderer put in
//! the SELECT list (`"path.fieldName"`). A row source may share one column index
//! across every row of a result set.

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::Value;

/// Column labels of a result set with an O(1) name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Build an index from labels in result order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, positions }
    }

    /// Position of a label.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Labels in result order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One flat result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnIndex>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row over a shared column index.
    ///
    /// Missing trailing values read as NULL.
    pub fn new(columns: Arc<ColumnIndex>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Build a standalone row from `(label, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self::new(Arc::new(ColumnIndex::new(names)), values)
    }

    /// Look up a value by label. Unknown labels return `None`.
    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.columns
            .position(name)
            .map(|i| self.values.get(i).unwrap_or(&Value::Null))
    }

    /// Look up a value by label, treating unknown labels as NULL.
    #[must_use]
    pub fn get_or_null(&self, name: &str) -> &Value {
        self.get_named(name).unwrap_or(&Value::Null)
    }

    /// The shared column index.
    #[must_use]
    pub fn columns(&self) -> &Arc<ColumnIndex> {
        &self.columns
    }

    /// Iterate `(label, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), self.values.get(i).unwrap_or(&Value::Null)))
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
