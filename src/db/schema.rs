pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Splits a SQL script on statement-terminating semicolons. Quoted strings,
/// quoted identifiers, `--` line comments, and `/* */` block comments are
/// passed over; comment text is dropped from the output.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut prev = '\0';
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
                current.push('\n');
            }
            prev = '\0';
            continue;
        }
        if in_block_comment {
            if prev == '*' && ch == '/' {
                in_block_comment = false;
                prev = '\0';
            } else {
                prev = ch;
            }
            continue;
        }

        match ch {
            '-' if !in_single_quote && !in_double_quote && chars.peek() == Some(&'-') => {
                chars.next();
                in_line_comment = true;
                prev = '\0';
                continue;
            }
            '/' if !in_single_quote && !in_double_quote && chars.peek() == Some(&'*') => {
                chars.next();
                in_block_comment = true;
                prev = '\0';
                continue;
            }
            '\'' if !in_double_quote && prev != '\\' => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ';' if !in_single_quote && !in_double_quote => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
                prev = ch;
                continue;
            }
            _ => {}
        }

        current.push(ch);
        prev = ch;
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}
