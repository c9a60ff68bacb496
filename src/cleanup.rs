//! Tidies clauses that untaken branches left behind.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// `WHERE AND x = ?` -> `WHERE x = ?`
static WHERE_CONJUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(WHERE\s+)(?:AND|OR)\s+").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

/// A `WHERE` followed by nothing, or by the end of a sub-query.
static WHERE_AT_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+WHERE\s*(\)|;|$)").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

/// A `WHERE` directly followed by the next clause.
static WHERE_BEFORE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+WHERE\s+((?:ORDER|GROUP)\s+BY|HAVING|LIMIT|UNION|FOR\s+UPDATE)\b")
        .unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

/// `SET , a = ?` -> `SET a = ?`
static SET_COMMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(SET\s+),\s*").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

/// Stands in for a string literal, quoted identifier or comment while the
/// patterns run, so their contents are never rewritten.
const MASK: char = '\u{1A}';

/// Replaces every opaque span of `sql` with [`MASK`], returning the masked
/// text and the spans in order. A stray [`MASK`] in the input is masked too.
fn mask_opaque(sql: &str) -> (String, Vec<&str>) {
    let mut masked = String::with_capacity(sql.len());
    let mut hidden = Vec::new();
    let mut rest = sql;
    while let Some(c) = rest.chars().next() {
        let len = if c == '\'' || c == '"' {
            rest.get(1..)
                .and_then(|after| after.find(c))
                .map_or(rest.len(), |end| end.saturating_add(2))
        } else if rest.starts_with("--") {
            rest.find('\n').unwrap_or(rest.len())
        } else if rest.starts_with("/*") {
            rest.get(2..)
                .and_then(|after| after.find("*/"))
                .map_or(rest.len(), |end| end.saturating_add(4))
        } else if c == MASK {
            c.len_utf8()
        } else {
            masked.push(c);
            rest = rest.get(c.len_utf8()..).unwrap_or_default();
            continue;
        };

        let (opaque, tail) = rest.split_at_checked(len).unwrap_or((rest, ""));
        hidden.push(opaque);
        masked.push(MASK);
        rest = tail;
    }
    (masked, hidden)
}

fn unmask(masked: &str, hidden: &[&str]) -> String {
    let mut hidden = hidden.iter();
    let mut sql = String::with_capacity(masked.len());
    for c in masked.chars() {
        match (c == MASK).then(|| hidden.next()).flatten() {
            Some(opaque) => sql.push_str(opaque),
            None => sql.push(c),
        }
    }
    sql
}

/// Runs the clause patterns over `sql`, leaving string literals, quoted
/// identifiers and comments untouched.
pub(crate) fn clean_clauses(sql: &str) -> Cow<'_, str> {
    let (masked, hidden) = mask_opaque(sql);
    if hidden.is_empty() {
        return apply_patterns(sql);
    }
    match apply_patterns(&masked) {
        Cow::Borrowed(_) => Cow::Borrowed(sql),
        Cow::Owned(cleaned) => Cow::Owned(unmask(&cleaned, &hidden)),
    }
}

fn apply_patterns(sql: &str) -> Cow<'_, str> {
    let mut sql = Cow::Borrowed(sql);
    for (pattern, replacement) in [
        (&*WHERE_CONJUNCTION, "${1}"),
        (&*WHERE_AT_END, "${1}"),
        (&*WHERE_BEFORE_CLAUSE, " ${1}"),
        (&*SET_COMMA, "${1}"),
    ] {
        let replaced = match pattern.replace_all(&sql, replacement) {
            Cow::Borrowed(_) => None,
            Cow::Owned(replaced) => Some(replaced),
        };
        if let Some(replaced) = replaced {
            sql = Cow::Owned(replaced);
        }
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(1000)]
    fn test_leading_conjunction_removed() {
        assert_eq!(
            clean_clauses("SELECT * FROM t WHERE\n  AND a = ? OR b = ?"),
            "SELECT * FROM t WHERE\n  a = ? OR b = ?"
        );
        assert_eq!(clean_clauses("where or a = ?"), "where a = ?");
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_empty_where_removed() {
        assert_eq!(clean_clauses("SELECT * FROM t WHERE  "), "SELECT * FROM t");
        assert_eq!(
            clean_clauses("SELECT * FROM (SELECT a FROM t WHERE ) x"),
            "SELECT * FROM (SELECT a FROM t) x"
        );
        assert_eq!(
            clean_clauses("SELECT * FROM t WHERE\nORDER BY id"),
            "SELECT * FROM t ORDER BY id"
        );
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_set_comma_removed() {
        assert_eq!(
            clean_clauses("UPDATE t SET , a = ?, b = ?"),
            "UPDATE t SET a = ?, b = ?"
        );
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_literals_and_comments_untouched() {
        assert_eq!(
            clean_clauses("SELECT 'WHERE AND x' AS s, c FROM t"),
            "SELECT 'WHERE AND x' AS s, c FROM t"
        );
        assert_eq!(
            clean_clauses("SELECT \"SET , a\" FROM t -- WHERE AND\n/* SET , b */"),
            "SELECT \"SET , a\" FROM t -- WHERE AND\n/* SET , b */"
        );
        assert_eq!(
            clean_clauses("SELECT 'it''s WHERE OR' FROM t WHERE AND s = 'WHERE AND' -- WHERE OR"),
            "SELECT 'it''s WHERE OR' FROM t WHERE s = 'WHERE AND' -- WHERE OR"
        );
        assert_eq!(
            clean_clauses("UPDATE t SET , a = '\u{1A}', b = ? WHERE\n"),
            "UPDATE t SET a = '\u{1A}', b = ?"
        );
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_untouched_sql_is_borrowed() {
        let sql = "SELECT * FROM t WHERE a = ?";
        assert!(matches!(clean_clauses(sql), Cow::Borrowed(_)));
        assert!(matches!(clean_clauses("SELECT 'WHERE AND' FROM t"), Cow::Borrowed(_)));
        // Words merely containing WHERE are left alone.
        assert_eq!(clean_clauses("SELECT somewhere FROM t"), "SELECT somewhere FROM t");
    }
}
