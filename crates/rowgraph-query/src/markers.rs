//! Symbolic `{path}` / `{path.field}` markers.
//!
//! Raw SQL supplied by callers and metadata names joins by alias path instead
//! of physical alias. Markers are resolved once, over the fully assembled
//! statement; markers inside string literals are left alone.

use std::sync::OnceLock;

use regex::Regex;

use rowgraph_core::error::config_error;
use rowgraph_core::{ConfigErrorKind, Dialect, Result};

use crate::alias::JoinGraph;
use crate::params;

const MARKER_PATTERN: &str = r"\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\}";

fn marker_regex() -> Result<&'static Regex> {
    static MARKER: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(MARKER_PATTERN))
        .as_ref()
        .map_err(|e| config_error(ConfigErrorKind::InvalidDefinition, e.to_string()))
}

/// Rewrite every marker outside string literals with `f`, which receives the
/// marker name and returns its replacement text.
fn rewrite<F>(text: &str, mut f: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let scan = params::scan(text)?;
    let regex = marker_regex()?;
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in regex.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if scan.in_literal(whole.start()) {
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        out.push_str(&f(name.as_str())?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Re-anchor local markers to global alias paths.
///
/// Each `(head, path)` pair rewrites `{head}` to `{path}` and `{head.x}` to
/// `{path.x}`. Markers with other heads are kept as written.
///
/// ```
/// use rowgraph_query::markers::rebase;
///
/// let text = rebase("{this.id} = {tags_link.article_id}", &[("this", "article")]).unwrap();
/// assert_eq!(text, "{article.id} = {tags_link.article_id}");
/// ```
pub fn rebase(text: &str, heads: &[(&str, &str)]) -> Result<String> {
    rewrite(text, |name| {
        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        let target = heads
            .iter()
            .find(|(h, _)| *h == head)
            .map_or(head, |(_, path)| *path);
        Ok(match rest {
            Some(rest) => format!("{{{target}.{rest}}}"),
            None => format!("{{{target}}}"),
        })
    })
}

/// Replace every marker with the quoted physical alias or column reference.
pub fn resolve(text: &str, graph: &JoinGraph, dialect: &Dialect) -> Result<String> {
    rewrite(text, |name| match graph.resolve_marker(name) {
        Some((alias, None)) => Ok(dialect.alias(&alias)),
        Some((alias, Some(column))) => {
            Ok(format!("{}.{}", dialect.alias(&alias), dialect.name(&column)))
        }
        None => Err(config_error(
            ConfigErrorKind::UnresolvedMarker,
            format!("{{{name}}} names no alias of the compiled query"),
        )),
    })
}

/// Marker names appearing outside string literals, in textual order.
pub fn names(text: &str) -> Result<Vec<String>> {
    let mut found = Vec::new();
    rewrite(text, |name| {
        found.push(name.to_string());
        Ok(String::new())
    })?;
    Ok(found)
}
