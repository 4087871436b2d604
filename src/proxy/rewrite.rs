//! Shallow, regex-based scanning of statement text for resource references.
//!
//! This is a syntactic best-effort check, not a parser: subqueries built at
//! runtime, CTE names shadowing tables, or identifiers hidden in string
//! concatenation are not understood. Implement [`StatementRewriter`] to plug
//! in something stricter.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::naming;

/// Maps a name found in statement text to the name to write back, or
/// rejects it.
pub type Resolve<'a> = &'a dyn Fn(&str) -> Result<String>;

pub trait StatementRewriter: Send + Sync {
    /// Table names referenced by `sql`, in order of appearance, excluding
    /// system catalogs and reserved words.
    fn table_references(&self, sql: &str) -> Vec<String>;

    /// Replaces every table reference with `resolve(name)`. Fails with the
    /// first error `resolve` returns.
    fn rewrite_tables(&self, sql: &str, resolve: Resolve<'_>) -> Result<String>;

    /// Replaces every topic declared in a streaming statement.
    fn rewrite_stream_topics(&self, statement: &str, resolve: Resolve<'_>) -> Result<String>;
}

const RESERVED: &[&str] = &[
    "all", "as", "by", "cross", "default", "distinct", "dual", "exists", "from", "full", "group",
    "having", "if", "inner", "join", "lateral", "left", "limit", "natural", "not", "null",
    "offset", "on", "only", "order", "outer", "returning", "right", "select", "set", "table",
    "union", "unnest", "using", "values", "where", "with",
];

fn table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(from|join|update|into|table)\s+(?:if\s+(?:not\s+)?exists\s+)?"?([a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)?)"?"#,
        )
        .expect("valid table reference regex")
    })
}

// Continuation of a comma separated FROM list: `[alias] , name`.
fn from_list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)^\s*(?:(?:as\s+)?[a-z_][a-z0-9_]*\s*)?,\s*"?([a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)?)"?"#,
        )
        .expect("valid from list regex")
    })
}

fn stream_topic_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bkafka_topic\s*=\s*'([^']*)'").expect("valid stream topic regex")
    })
}


fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name.to_ascii_lowercase().as_str())
}

/// Byte range of the bare table segment of a possibly schema-qualified
/// identifier at `start`, or `None` if it should be left alone.
fn table_segment(ident: &str, start: usize) -> Option<Range<usize>> {
    let (schema, table, offset) = match ident.rfind('.') {
        Some(dot) => (Some(&ident[..dot]), &ident[dot + 1..], dot + 1),
        None => (None, ident, 0),
    };
    if schema.is_some_and(naming::is_catalog_name) || naming::is_catalog_name(table) || is_reserved(table) {
        return None;
    }
    Some(start + offset..start + ident.len())
}

fn splice(text: &str, ranges: &[Range<usize>], resolve: Resolve<'_>) -> Result<String> {
    let mut out = String::with_capacity(text.len() + ranges.len() * 8);
    let mut last = 0;
    for range in ranges {
        out.push_str(&text[last..range.start]);
        out.push_str(&resolve(&text[range.clone()])?);
        last = range.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Default [`StatementRewriter`] backed by keyword regexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexRewriter;

impl RegexRewriter {
    pub fn new() -> Self {
        Self
    }

    fn table_ranges(&self, sql: &str) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        for caps in table_regex().captures_iter(sql) {
            let (Some(keyword), Some(ident)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(range) = table_segment(ident.as_str(), ident.start()) else {
                continue;
            };
            ranges.push(range);

            if !keyword.as_str().eq_ignore_ascii_case("from") {
                continue;
            }
            let mut pos = caps.get(0).map_or(ident.end(), |m| m.end());
            while let Some(next) = from_list_regex().captures(&sql[pos..]) {
                let (Some(whole), Some(ident)) = (next.get(0), next.get(1)) else {
                    break;
                };
                let Some(range) = table_segment(ident.as_str(), pos + ident.start()) else {
                    break;
                };
                ranges.push(range);
                pos += whole.end();
            }
        }

        ranges.sort_by_key(|r| r.start);
        ranges.dedup_by(|next, prev| next.start < prev.end);
        ranges
    }
}

impl StatementRewriter for RegexRewriter {
    fn table_references(&self, sql: &str) -> Vec<String> {
        self.table_ranges(sql)
            .into_iter()
            .map(|r| sql[r].to_string())
            .collect()
    }

    fn rewrite_tables(&self, sql: &str, resolve: Resolve<'_>) -> Result<String> {
        let ranges = self.table_ranges(sql);
        let rewritten = splice(sql, &ranges, resolve)?;
        if !ranges.is_empty() {
            tracing::debug!(original = sql, rewritten = %rewritten, "Rewrote table references");
        }
        Ok(rewritten)
    }

    fn rewrite_stream_topics(&self, statement: &str, resolve: Resolve<'_>) -> Result<String> {
        let ranges: Vec<Range<usize>> = stream_topic_regex()
            .captures_iter(statement)
            .filter_map(|caps| caps.get(1).map(|m| m.range()))
            .collect();
        let rewritten = splice(statement, &ranges, resolve)?;
        if !ranges.is_empty() {
            tracing::debug!(original = statement, rewritten = %rewritten, "Rewrote stream topics");
        }
        Ok(rewritten)
    }
}
