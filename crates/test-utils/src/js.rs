//! A small JavaScript string-literal parser.
//!
//! Tests use it to evaluate string literals in generated scripts the way a
//! JavaScript engine would, so escaping can be checked by round trip. It is
//! strict: a raw delimiter or line terminator inside the literal, an unknown
//! escape or a legacy octal escape is an error rather than being tolerated.

/// Parses `literal` (including its surrounding quotes) and returns its value.
///
/// The whole input must be exactly one literal.
pub fn parse_js_string_literal(literal: &str) -> Result<String, String> {
    let (value, consumed) = scan_literal(literal)?;
    if consumed != literal.len() {
        return Err(format!(
            "trailing input after literal: {:?}",
            &literal[consumed..]
        ));
    }
    Ok(value)
}

/// Strips `prefix` from `line` and parses the string literal that follows.
///
/// Anything after the closing quote is ignored, so this works on lines such
/// as `const X = '...';`.
pub fn extract_js_string_const(line: &str, prefix: &str) -> Result<String, String> {
    let rest = line
        .strip_prefix(prefix)
        .ok_or_else(|| format!("line does not start with {:?}: {:?}", prefix, line))?;
    scan_literal(rest).map(|(value, _)| value)
}

/// Scans one literal at the start of `input`, returning its value and length.
fn scan_literal(input: &str) -> Result<(String, usize), String> {
    let mut chars = input.char_indices().peekable();

    let quote = match chars.next() {
        Some((_, q @ ('\'' | '"' | '`'))) => q,
        other => return Err(format!("expected opening quote, found {:?}", other)),
    };

    let mut value = String::new();

    while let Some((index, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((value, index + c.len_utf8())),
            '\\' => {
                let (_, escaped) = chars.next().ok_or("unterminated escape")?;
                match escaped {
                    '\\' | '\'' | '"' | '`' | '$' => value.push(escaped),
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    'f' => value.push('\u{0C}'),
                    'v' => value.push('\u{0B}'),
                    'b' => value.push('\u{08}'),
                    '0' => {
                        if matches!(chars.peek(), Some((_, d)) if d.is_ascii_digit()) {
                            return Err("legacy octal escape".to_string());
                        }
                        value.push('\u{0}');
                    }
                    'x' => value.push(read_hex(&mut chars, 2)?),
                    'u' => value.push(read_hex(&mut chars, 4)?),
                    other => return Err(format!("unsupported escape \\{}", other)),
                }
            }
            '\n' | '\r' | '\u{2028}' | '\u{2029}' if quote != '`' => {
                return Err(format!("raw line terminator {:?} in literal", c));
            }
            '$' if quote == '`' && matches!(chars.peek(), Some((_, '{'))) => {
                return Err("unescaped interpolation in template literal".to_string());
            }
            c => value.push(c),
        }
    }

    Err("unterminated string literal".to_string())
}

fn read_hex(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    digits: usize,
) -> Result<char, String> {
    let mut code = 0u32;
    for _ in 0..digits {
        let (_, c) = chars.next().ok_or("truncated hex escape")?;
        let digit = c
            .to_digit(16)
            .ok_or_else(|| format!("invalid hex digit {:?}", c))?;
        code = code * 16 + digit;
    }
    char::from_u32(code).ok_or_else(|| format!("invalid code point {:#x}", code))
}
