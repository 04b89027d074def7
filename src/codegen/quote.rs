//! Shell quoting and per-language escaping.
//!
//! Every user-supplied string that lands in the final command goes
//! through [`sh_quote`]; strings embedded inside awk scripts or regex
//! bodies get a second, language-specific escaping pass first.

/// Quote a string for a POSIX shell.
///
/// Always wraps in single quotes; an embedded single quote becomes
/// `'\''`. Single-quoted text is inert to the shell, so this is safe for
/// any byte sequence except NUL (which `sh -c` cannot carry anyway).
pub fn sh_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Escape a value for use inside an awk `"…"` string literal.
pub fn escape_awk_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value for use inside an awk `/…/` regex literal.
pub fn escape_awk_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '/' => out.push_str("\\/"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape ERE metacharacters so a literal value can be anchored inside a
/// grep extended regex.
pub fn escape_ere(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '\\' | '.' | '^' | '$' | '*' | '+' | '?' | '{' | '}' | '[' | ']' | '|' | '(' | ')'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a value for use inside a jq `"…"` string literal.
pub fn escape_jq_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
