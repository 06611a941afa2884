//! DOT format helpers for graph visualization.
//!
//! Used by [`crate::cfg::Cfg::to_dot`] to render control flow graphs with
//! Graphviz.

/// Escapes a string for use inside a quoted DOT label.
///
/// Quotes, backslashes, record braces and angle brackets are escaped; carriage
/// returns are dropped and newlines become left-aligned DOT line breaks.
///
/// # Examples
///
/// ```rust
/// use irscope::utils::escape_dot;
///
/// assert_eq!(escape_dot("%v_0 = \"hi\""), "%v_0 = \\\"hi\\\"");
/// ```
#[must_use]
pub fn escape_dot(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\l"),
            '\r' => {}
            '<' | '>' | '{' | '}' | '|' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
