//! The row source a compiled query runs against.

use rowgraph_core::{Result, Row, Value};

/// Rows produced by a connection, in result order.
pub type RowStream<'c> = Box<dyn Iterator<Item = Result<Row>> + 'c>;

/// A database connection able to run one parameterized SELECT.
///
/// Rows must be keyed by the labels of the statement's select list. Driver
/// failures are reported as `Error::Source`; they are never retried here.
pub trait Connection {
    /// Run `sql` with `params` bound in placeholder order.
    ///
    /// `fetch_size` is a batching hint: how many rows to buffer from the
    /// server at a time. `None` leaves it to the driver.
    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        fetch_size: Option<usize>,
    ) -> Result<RowStream<'_>>;
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        fetch_size: Option<usize>,
    ) -> Result<RowStream<'_>> {
        (**self).query(sql, params, fetch_size)
    }
}
