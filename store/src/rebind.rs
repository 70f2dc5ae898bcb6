/// Rewrites `?` placeholders into `$1, $2, ...` for PostgreSQL; SQLite keeps `?`
/// unchanged. This is the one piece of SQL text that differs between backends —
/// every query is otherwise written once and shared.
pub fn rebind(sql: &str, is_postgres: bool) -> String {
    if !is_postgres {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0u32;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

/// The date-cast expression for grouping `timestamp` (stored as ISO-8601 UTC
/// text on both backends) by calendar day.
pub fn date_expr(is_postgres: bool, column: &str) -> String {
    if is_postgres {
        format!("({column})::date")
    } else {
        format!("date({column})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebind_leaves_sqlite_unchanged() {
        assert_eq!(rebind("a = ? AND b = ?", false), "a = ? AND b = ?");
    }

    #[test]
    fn rebind_numbers_postgres_placeholders_in_order() {
        assert_eq!(rebind("a = ? AND b = ?", true), "a = $1 AND b = $2");
    }

    #[test]
    fn date_expr_differs_by_backend() {
        assert_eq!(date_expr(false, "timestamp"), "date(timestamp)");
        assert_eq!(date_expr(true, "timestamp"), "(timestamp)::date");
    }
}
