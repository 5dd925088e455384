//! Shared fixtures for the pipeline tests.

#![allow(dead_code)]

use rowgraph::prelude::*;

/// One statement seen by [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<Value>,
    pub fetch_size: Option<usize>,
}

/// A connection that records statements and replays canned rows.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    rows: Vec<Row>,
    pub executed: Vec<Executed>,
}

impl MemoryConnection {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            executed: Vec::new(),
        }
    }
}

impl Connection for MemoryConnection {
    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        fetch_size: Option<usize>,
    ) -> Result<RowStream<'_>> {
        self.executed.push(Executed {
            sql: sql.to_string(),
            params: params.to_vec(),
            fetch_size,
        });
        Ok(Box::new(self.rows.clone().into_iter().map(Ok)))
    }
}

/// Build a row from `(label, value)` pairs.
pub fn row(pairs: &[(&str, Value)]) -> Row {
    Row::from_pairs(pairs.iter().map(|(label, value)| (*label, value.clone())))
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
