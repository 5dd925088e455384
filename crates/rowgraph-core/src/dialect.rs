//! SQL dialect policy.
//!
//! A [`Dialect`] decides how identifiers are quoted, whether tables are
//! schema-qualified and how positional parameters are spelled. It is always
//! passed explicitly; the pipeline never consults a global.

use serde::{Deserialize, Serialize};

use crate::field::TableName;

/// Whether physical table references carry their schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaQualification {
    /// `"schema"."table"` when a schema is declared.
    #[default]
    Qualified,
    /// Always the bare table name.
    Unqualified,
}

/// How positional parameters are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?` (MySQL, SQLite, JDBC style)
    Question,
    /// `$1`, `$2`, ... (PostgreSQL)
    #[default]
    Dollar,
}

/// Identifier quoting and parameter conventions of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    /// Identifier quote character.
    pub quote: char,
    /// Whether physical table and column names are quoted.
    pub quote_names: bool,
    /// Schema qualification of table references.
    pub schema: SchemaQualification,
    /// Positional parameter spelling.
    pub placeholder: PlaceholderStyle,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::postgres()
    }
}

impl Dialect {
    /// PostgreSQL: `"ident"`, `$n` parameters.
    pub const fn postgres() -> Self {
        Self {
            quote: '"',
            quote_names: true,
            schema: SchemaQualification::Qualified,
            placeholder: PlaceholderStyle::Dollar,
        }
    }

    /// MySQL: `` `ident` ``, `?` parameters.
    pub const fn mysql() -> Self {
        Self {
            quote: '`',
            quote_names: true,
            schema: SchemaQualification::Qualified,
            placeholder: PlaceholderStyle::Question,
        }
    }

    /// SQLite: `"ident"`, `?` parameters, no schemas.
    pub const fn sqlite() -> Self {
        Self {
            quote: '"',
            quote_names: true,
            schema: SchemaQualification::Unqualified,
            placeholder: PlaceholderStyle::Question,
        }
    }

    /// Plain ANSI SQL with unquoted object names.
    pub const fn ansi() -> Self {
        Self {
            quote: '"',
            quote_names: false,
            schema: SchemaQualification::Qualified,
            placeholder: PlaceholderStyle::Question,
        }
    }

    /// Set the positional parameter spelling.
    pub const fn with_placeholder(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder = style;
        self
    }

    /// Set whether object names are quoted.
    pub const fn with_quote_names(mut self, quote_names: bool) -> Self {
        self.quote_names = quote_names;
        self
    }

    /// Quote an identifier unconditionally, doubling embedded quote characters.
    pub fn quote_identifier(&self, name: &str) -> String {
        let q = self.quote;
        let mut out = String::with_capacity(name.len() + 2);
        out.push(q);
        for c in name.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    /// A physical table or column name, quoted only if the dialect quotes names.
    pub fn name(&self, name: &str) -> String {
        if self.quote_names {
            self.quote_identifier(name)
        } else {
            name.to_string()
        }
    }

    /// A table reference honoring the schema qualification rule.
    pub fn table(&self, table: &TableName) -> String {
        match (&table.schema, self.schema) {
            (Some(schema), SchemaQualification::Qualified) => {
                format!("{}.{}", self.name(schema), self.name(&table.name))
            }
            _ => self.name(&table.name),
        }
    }

    /// A query alias or output label. Always quoted since it may contain dots.
    pub fn alias(&self, alias: &str) -> String {
        self.quote_identifier(alias)
    }

    /// The `index`-th (1-based) positional parameter.
    pub fn placeholder(&self, index: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${index}"),
        }
    }
}
