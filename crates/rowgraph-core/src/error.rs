//! Error types for rowgraph.
//!
//! Every failure in the pipeline is structural: it comes from a mismatch between
//! the declared shape and either the type graph or the rows a database returned.
//! None of them are transient, so nothing here is retried.

use thiserror::Error;

/// The main error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The declared shape cannot be compiled.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raw SQL text could not be scanned.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A row value does not fit the declared field type.
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    /// The row source reported a failure.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of configuration problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The queried type has no table anywhere in its ancestry.
    MissingTable,
    /// A field or superclass names a type no metadata source knows.
    UnknownType,
    /// A relation targets a type that is neither table-mapped nor embeddable.
    UnmappedRelation,
    /// A `{path}` or `{path.field}` marker names no alias of the compiled tree.
    UnresolvedMarker,
    /// A subtype is not registered under its base's inheritance group.
    UnregisteredSubtype,
    /// A relation walk reached a type already on the current descent path.
    CyclicRelation,
    /// Two joins would share one alias path.
    DuplicateAlias,
    /// A join had to be inferred but the target has no usable primary key.
    MissingKey,
    /// Parameter markers and supplied values disagree.
    ParameterMismatch,
    /// Metadata that contradicts itself (inheritance loop, empty names, ...).
    InvalidDefinition,
}

impl ConfigErrorKind {
    /// Short description used in messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigErrorKind::MissingTable => "missing table mapping",
            ConfigErrorKind::UnknownType => "unknown type",
            ConfigErrorKind::UnmappedRelation => "unmapped relation target",
            ConfigErrorKind::UnresolvedMarker => "unresolved marker",
            ConfigErrorKind::UnregisteredSubtype => "unregistered subtype",
            ConfigErrorKind::CyclicRelation => "cyclic relation",
            ConfigErrorKind::DuplicateAlias => "duplicate alias",
            ConfigErrorKind::MissingKey => "missing primary key",
            ConfigErrorKind::ParameterMismatch => "parameter mismatch",
            ConfigErrorKind::InvalidDefinition => "invalid definition",
        }
    }
}

/// A build-time error in the declared shape or its metadata.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}{}", .kind.as_str(), type_suffix(.type_name))]
pub struct ConfigError {
    /// What went wrong.
    pub kind: ConfigErrorKind,
    /// Human readable detail.
    pub message: String,
    /// The type being processed, when known.
    pub type_name: Option<String>,
}

impl ConfigError {
    /// Create a configuration error without a type context.
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            type_name: None,
        }
    }

    /// Attach the type being processed.
    pub fn for_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }
}

/// The kind of parse problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// End of input reached inside a quoted string literal.
    UnterminatedLiteral,
}

/// A failure scanning raw SQL text.
#[derive(Debug, Clone, Error)]
#[error("parse error at byte {position}: {message}")]
pub struct ParseError {
    /// What went wrong.
    pub kind: ParseErrorKind,
    /// Byte offset where the offending token started.
    pub position: usize,
    /// Human readable detail.
    pub message: String,
}

impl ParseError {
    /// An unterminated `'...` literal opened at `position`.
    pub fn unterminated_literal(position: usize) -> Self {
        Self {
            kind: ParseErrorKind::UnterminatedLiteral,
            position,
            message: "unterminated quoted string literal".to_string(),
        }
    }
}

/// A row value that cannot be converted to its field's declared type.
#[derive(Debug, Clone, Error)]
#[error("cannot convert {found} to {expected} for {type_name}.{field} (alias {alias}): {message}")]
pub struct CoercionError {
    /// The type owning the field.
    pub type_name: String,
    /// The field being populated.
    pub field: String,
    /// Alias path of the instance being built.
    pub alias: String,
    /// Declared target type.
    pub expected: String,
    /// Description of the offending value.
    pub found: String,
    /// Additional detail.
    pub message: String,
}

/// A failure reported by the external row source or connection.
#[derive(Debug, Error)]
#[error("row source error: {message}")]
pub struct SourceError {
    /// Human readable detail.
    pub message: String,
    /// The underlying error, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SourceError {
    /// Create a source error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

fn type_suffix(type_name: &Option<String>) -> String {
    type_name
        .as_deref()
        .map(|t| format!(" (type {t})"))
        .unwrap_or_default()
}

/// Shorthand for a configuration error wrapped in [`Error`].
pub fn config_error(kind: ConfigErrorKind, message: impl Into<String>) -> Error {
    Error::Config(ConfigError::new(kind, message))
}
