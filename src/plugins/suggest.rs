//! Completion candidates for the partially typed command line.
//!
//! Pure: the same input and schema always produce the same list. Contextual
//! matches (tables after a subject keyword, columns of tables already typed)
//! come first, then keywords matching the current word by prefix.

use crate::core::engine::{SchemaSnapshot, TableSchema};
use serde::Serialize;
use std::collections::HashSet;

pub const MAX_SUGGESTIONS: usize = 10;

pub static KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE", "JOIN",
    "ON", "AND", "OR", "NOT", "NULL", "ORDER", "BY", "GROUP", "HAVING", "LIMIT", "AS", "LIKE",
    "IN", "IS", "DISTINCT", "COUNT", "CREATE", "TABLE", "CONNECT", "DISCONNECT", "LOGIN",
];

/// Words after which a table name is expected.
const SUBJECT_KEYWORDS: &[&str] = &["from", "join", "into", "update", "table"];
/// Words after which a column is expected.
const COLUMN_KEYWORDS: &[&str] = &["select", "where", "set", "on", "and", "or", "by", "having"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuggestionKind {
    Table,
    Column { table: String },
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub text: String,
    #[serde(flatten)]
    pub kind: SuggestionKind,
}

fn clean(word: &str) -> &str {
    word.trim_matches(|c: char| matches!(c, ',' | ';' | '(' | ')'))
}

fn starts_with_ci(candidate: &str, prefix: &str) -> bool {
    candidate.len() >= prefix.len()
        && candidate.is_char_boundary(prefix.len())
        && candidate[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Table named directly by `qualifier`, or aliased to it (`Hints h`, `Hints AS h`).
fn resolve_qualifier<'s>(
    qualifier: &str,
    typed: &[&str],
    schema: &'s SchemaSnapshot,
) -> Option<&'s TableSchema> {
    if let Some(table) = schema.table(qualifier) {
        return Some(table);
    }
    let at = typed.iter().position(|w| w.eq_ignore_ascii_case(qualifier))?;
    let before = typed.get(at.checked_sub(1)?)?;
    if before.eq_ignore_ascii_case("as") {
        schema.table(typed.get(at.checked_sub(2)?)?)
    } else {
        schema.table(before)
    }
}

pub fn suggest(partial: &str, schema: &SchemaSnapshot) -> Vec<Suggestion> {
    let words: Vec<&str> = partial.split_whitespace().collect();
    let at_boundary = partial.is_empty() || partial.ends_with(char::is_whitespace);
    let (current_word, typed_words) = if at_boundary {
        ("", &words[..])
    } else {
        match words.split_last() {
            Some((last, before)) => (*last, before),
            None => ("", &words[..]),
        }
    };
    let current = current_word.rsplit([',', '(']).next().unwrap_or_default();
    let typed: Vec<&str> = typed_words
        .iter()
        .map(|w| clean(w))
        .filter(|w| !w.is_empty())
        .collect();
    let preceding = typed_words
        .last()
        .map(|w| clean(w).to_ascii_lowercase())
        .unwrap_or_default();

    let mut out: Vec<Suggestion> = Vec::new();

    if SUBJECT_KEYWORDS.contains(&preceding.as_str()) {
        for table in &schema.tables {
            if starts_with_ci(&table.name, current) {
                out.push(Suggestion {
                    text: table.name.clone(),
                    kind: SuggestionKind::Table,
                });
            }
        }
    } else if COLUMN_KEYWORDS.contains(&preceding.as_str())
        || typed.iter().any(|w| w.eq_ignore_ascii_case("select"))
    {
        let (qualifier, prefix) = match current.split_once('.') {
            Some((q, p)) => (Some(q), p),
            None => (None, current),
        };
        let mut tables: Vec<&TableSchema> = match qualifier {
            Some(q) => resolve_qualifier(q, &typed, schema).into_iter().collect(),
            None => typed.iter().filter_map(|w| schema.table(w)).collect(),
        };
        let mut seen_tables = HashSet::new();
        tables.retain(|t| seen_tables.insert(t.name.as_str()));

        for table in tables {
            for column in &table.columns {
                if !starts_with_ci(column, prefix) {
                    continue;
                }
                let text = match qualifier {
                    Some(q) => format!("{q}.{column}"),
                    None => column.clone(),
                };
                out.push(Suggestion {
                    text,
                    kind: SuggestionKind::Column {
                        table: table.name.clone(),
                    },
                });
            }
        }
    }

    for keyword in KEYWORDS {
        if starts_with_ci(keyword, current) {
            out.push(Suggestion {
                text: keyword.to_string(),
                kind: SuggestionKind::Keyword,
            });
        }
    }

    let mut seen = HashSet::new();
    out.retain(|s| {
        !s.text.eq_ignore_ascii_case(current) && seen.insert(s.text.to_ascii_lowercase())
    });
    out.truncate(MAX_SUGGESTIONS);
    out
}
