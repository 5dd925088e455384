//! Parameter marker scanning.
//!
//! A single-pass tokenizer that finds positional (`?`) and named (`:name`)
//! parameter markers in raw SQL while stepping over single-quoted string
//! literals. It is not a SQL parser: anything outside literals that is not a
//! marker is ignored.

use std::ops::Range;

use rowgraph_core::{ParseError, Result};

/// A parameter marker found in SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamMarker {
    /// `?` at the given byte offset.
    Positional {
        /// Byte offset of the `?`.
        offset: usize,
    },
    /// `:name` spanning the given byte range (colon included).
    Named {
        /// Parameter name without the colon.
        name: String,
        /// Byte range of the whole token.
        span: Range<usize>,
    },
}

impl ParamMarker {
    /// Byte range covered by the marker.
    pub fn span(&self) -> Range<usize> {
        match self {
            ParamMarker::Positional { offset } => *offset..*offset + 1,
            ParamMarker::Named { span, .. } => span.clone(),
        }
    }
}

/// Result of scanning SQL text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Markers in textual order.
    pub markers: Vec<ParamMarker>,
    /// Byte ranges of string literals, quotes included. Adjacent literals
    /// (`'O''Brien'`) are merged into one range.
    pub literals: Vec<Range<usize>>,
}

impl ScanResult {
    /// Check whether a byte offset lies inside a string literal.
    pub fn in_literal(&self, offset: usize) -> bool {
        self.literals.iter().any(|r| r.contains(&offset))
    }

    /// Number of positional markers.
    pub fn positional_count(&self) -> usize {
        self.markers
            .iter()
            .filter(|m| matches!(m, ParamMarker::Positional { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Default,
    Quoted { start: usize },
    NamedParam { start: usize },
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Scan SQL text for parameter markers and string literals.
///
/// ```
/// use rowgraph_query::params::{scan, ParamMarker};
///
/// let sql = "SELECT * FROM t WHERE name = 'O''Brien' AND id = ?";
/// let scan = scan(sql).unwrap();
/// assert_eq!(scan.markers, vec![ParamMarker::Positional { offset: sql.len() - 1 }]);
/// ```
pub fn scan(sql: &str) -> Result<ScanResult> {
    let mut result = ScanResult::default();
    let mut state = State::Default;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match state {
            State::Default => match c {
                '\'' => state = State::Quoted { start: i },
                '?' => result.markers.push(ParamMarker::Positional { offset: i }),
                ':' => match chars.peek() {
                    // `::` is a cast operator
                    Some(&(_, ':')) => {
                        chars.next();
                    }
                    Some(&(_, next)) if is_ident_start(next) => {
                        state = State::NamedParam { start: i };
                    }
                    _ => {}
                },
                _ => {}
            },
            State::Quoted { start } => match c {
                '\\' => {
                    chars.next();
                }
                '\'' => {
                    push_literal(&mut result.literals, start..i + 1);
                    state = State::Default;
                }
                _ => {}
            },
            State::NamedParam { start } => {
                if !is_ident_char(c) {
                    result.markers.push(named(sql, start, i));
                    state = State::Default;
                    // The terminator is itself examined in the default state.
                    match c {
                        '\'' => state = State::Quoted { start: i },
                        '?' => result.markers.push(ParamMarker::Positional { offset: i }),
                        ':' => {
                            if let Some(&(_, next)) = chars.peek() {
                                if next == ':' {
                                    chars.next();
                                } else if is_ident_start(next) {
                                    state = State::NamedParam { start: i };
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    match state {
        State::Default => {}
        State::Quoted { start } => return Err(ParseError::unterminated_literal(start).into()),
        State::NamedParam { start } => result.markers.push(named(sql, start, sql.len())),
    }

    tracing::trace!(
        markers = result.markers.len(),
        literals = result.literals.len(),
        "Scanned SQL text"
    );
    Ok(result)
}

fn named(sql: &str, start: usize, end: usize) -> ParamMarker {
    ParamMarker::Named {
        name: sql[start + 1..end].to_string(),
        span: start..end,
    }
}

fn push_literal(literals: &mut Vec<Range<usize>>, range: Range<usize>) {
    if let Some(last) = literals.last_mut() {
        if last.end == range.start {
            last.end = range.end;
            return;
        }
    }
    literals.push(range);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{Error, ParseErrorKind};

    fn names(result: &ScanResult) -> Vec<&str> {
        result
            .markers
            .iter()
            .filter_map(|m| match m {
                ParamMarker::Named { name, .. } => Some(name.as_str()),
                ParamMarker::Positional { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_doubled_quote_literal_then_positional() {
        let sql = "SELECT * FROM person WHERE name = 'O''Brien' AND id = ?";
        let result = scan(sql).unwrap();

        assert_eq!(result.markers.len(), 1);
        let close = sql.rfind('\'').unwrap();
        let ParamMarker::Positional { offset } = result.markers[0] else {
            panic!("expected positional marker");
        };
        assert!(offset > close);
        assert_eq!(result.literals.len(), 1);
        assert_eq!(&sql[result.literals[0].clone()], "'O''Brien'");
    }

    #[test]
    fn test_markers_inside_literals_are_ignored() {
        let result = scan("SELECT '?', ':name', 'a\\'?' FROM t WHERE x = :x").unwrap();
        assert_eq!(result.positional_count(), 0);
        assert_eq!(names(&result), vec!["x"]);
    }

    #[test]
    fn test_named_param_ends_at_non_identifier() {
        let sql = "a = :first AND b IN (:second,:third)";
        let result = scan(sql).unwrap();
        assert_eq!(names(&result), vec!["first", "second", "third"]);
        let ParamMarker::Named { span, .. } = &result.markers[0] else {
            panic!("expected named marker");
        };
        assert_eq!(&sql[span.clone()], ":first");
    }

    #[test]
    fn test_named_param_at_end_of_input() {
        let result = scan("id = :id").unwrap();
        assert_eq!(names(&result), vec!["id"]);
        assert_eq!(result.markers[0].span(), 5..8);
    }

    #[test]
    fn test_cast_is_not_a_named_param() {
        let result = scan("SELECT created::date, :since::timestamp").unwrap();
        assert_eq!(names(&result), vec!["since"]);
    }

    #[test]
    fn test_colon_without_identifier_is_ignored() {
        let result = scan("SELECT ': ' || x, y : 1, z = :9").unwrap();
        assert!(result.markers.is_empty());
    }

    #[test]
    fn test_unterminated_literal_is_an_error() {
        let err = scan("SELECT * FROM t WHERE name = 'open").unwrap_err();
        match err {
            Error::Parse(e) => {
                assert_eq!(e.kind, ParseErrorKind::UnterminatedLiteral);
                assert_eq!(e.position, 29);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_positional_directly_after_named() {
        let result = scan(":a?").unwrap();
        assert_eq!(result.markers.len(), 2);
        assert!(matches!(result.markers[1], ParamMarker::Positional { offset: 2 }));
    }
}
