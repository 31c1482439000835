//! String escaping for values interpolated into k6 script string literals.

/// Escapes `input` for use inside a single-quoted JavaScript string literal.
///
/// The result is also safe inside double-quoted and template literals: quotes,
/// backticks and `$` are escaped along with backslashes, line terminators and
/// every control character. The routine works in one pass over the input, so
/// an escape sequence it emits is never escaped a second time.
///
/// NUL and the remaining C0 controls are written as `\xHH`. A bare `\0`
/// followed by a digit would be a legacy octal escape, which k6 rejects in
/// module code.
pub fn escape_js_string(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + input.len() / 8 + 2);

    for c in input.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '`' => escaped.push_str("\\`"),
            '$' => escaped.push_str("\\$"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{0C}' => escaped.push_str("\\f"),
            '\u{0B}' => escaped.push_str("\\v"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c if c.is_ascii_control() => {
                escaped.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => escaped.push(c),
        }
    }

    escaped
}
