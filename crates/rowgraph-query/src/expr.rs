//! Immutable SQL text with its ordered parameters.

use std::fmt;

use rowgraph_core::Value;

/// SQL text plus the positional parameters it references, in textual order.
///
/// Every transformation returns a new expression; an existing one is never
/// mutated.
///
/// ```
/// use rowgraph_query::expr::SqlExpression;
///
/// let filter = SqlExpression::new("{article.score} > ?").bind(10);
/// let both = filter.and(&SqlExpression::new("{article.title} LIKE ?").bind("R%"));
/// assert_eq!(both.sql(), "({article.score} > ?) AND ({article.title} LIKE ?)");
/// assert_eq!(both.params().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlExpression {
    sql: String,
    params: Vec<Value>,
}

impl SqlExpression {
    /// Create an expression without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create an expression with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A copy with one more parameter appended.
    #[must_use]
    pub fn bind(&self, value: impl Into<Value>) -> Self {
        let mut params = self.params.clone();
        params.push(value.into());
        Self {
            sql: self.sql.clone(),
            params,
        }
    }

    /// The SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The parameters in textual order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// True if there is no SQL text.
    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    /// Split into text and parameters.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// Concatenate two expressions with no separator.
    #[must_use]
    pub fn concat(&self, other: &SqlExpression) -> Self {
        let mut params = self.params.clone();
        params.extend(other.params.iter().cloned());
        Self {
            sql: format!("{}{}", self.sql, other.sql),
            params,
        }
    }

    /// Join expressions with a separator, keeping parameter order.
    pub fn join<'a, I>(parts: I, separator: &str) -> Self
    where
        I: IntoIterator<Item = &'a SqlExpression>,
    {
        let mut sql = String::new();
        let mut params = Vec::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                sql.push_str(separator);
            }
            sql.push_str(&part.sql);
            params.extend(part.params.iter().cloned());
        }
        Self { sql, params }
    }

    /// Conjunction of two expressions, each parenthesized.
    #[must_use]
    pub fn and(&self, other: &SqlExpression) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        Self::join([&self.parenthesize(), &other.parenthesize()], " AND ")
    }

    /// The expression wrapped in parentheses.
    #[must_use]
    pub fn parenthesize(&self) -> Self {
        Self {
            sql: format!("({})", self.sql),
            params: self.params.clone(),
        }
    }

    /// A copy whose text is rewritten by `f`; parameters are kept.
    #[must_use]
    pub fn map_sql(&self, f: impl FnOnce(&str) -> String) -> Self {
        Self {
            sql: f(&self.sql),
            params: self.params.clone(),
        }
    }
}

impl fmt::Display for SqlExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl From<&str> for SqlExpression {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for SqlExpression {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}
