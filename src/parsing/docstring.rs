//! Docstring extraction for Python class and function bodies
//!
//! A docstring is the first statement of a body when that statement is a
//! plain string literal. Byte strings and f-strings do not count. The value
//! is the evaluated literal, cleaned the way Python's `inspect.cleandoc`
//! does it so that indentation inside triple-quoted strings is removed.

use tree_sitter::Node;

use super::node_text;

/// Docstring of a `block` node, if its first statement is a string literal
pub fn of_block(block: &Node, source: &str) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")?;

    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let expr = first.named_child(0)?;
    let raw = match expr.kind() {
        "string" => literal_value(node_text(&expr, source))?,
        "concatenated_string" => {
            let mut parts_cursor = expr.walk();
            let mut joined = String::new();
            for part in expr.named_children(&mut parts_cursor) {
                if part.kind() == "comment" {
                    continue;
                }
                if part.kind() != "string" {
                    return None;
                }
                joined.push_str(&literal_value(node_text(&part, source))?);
            }
            joined
        }
        _ => return None,
    };
    Some(clean(&raw))
}

/// Evaluate the text of a single string literal (prefix and quotes included).
///
/// Returns `None` for bytes and f-strings, which are never docstrings.
pub fn literal_value(text: &str) -> Option<String> {
    let quote_at = text.find(['\'', '"'])?;
    let prefix = text[..quote_at].to_ascii_lowercase();
    if prefix.contains('b') || prefix.contains('f') {
        return None;
    }
    let raw = prefix.contains('r');

    let quoted = &text[quote_at..];
    let delimiter = ["\"\"\"", "'''", "\"", "'"]
        .into_iter()
        .find(|d| quoted.starts_with(d))?;
    let inner = quoted
        .strip_prefix(delimiter)?
        .strip_suffix(delimiter)
        .unwrap_or_else(|| &quoted[delimiter.len()..]);

    Some(if raw {
        inner.to_string()
    } else {
        unescape(inner)
    })
}

/// Process backslash escapes of a non-raw string literal
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            '0'..='7' => {
                let mut digits = String::from(next);
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(d @ '0'..='7') => {
                            digits.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = chars.clone().take(width).collect();
                let decoded = (hex.len() == width)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

/// Clean docstring indentation like `inspect.cleandoc`.
///
/// Tabs are expanded to 8-column stops, leading whitespace of the first line
/// is removed, the common indentation of the remaining lines is removed, and
/// leading/trailing empty lines are dropped. Indentation is counted in
/// characters, so wide whitespace such as U+3000 counts once.
pub fn clean(doc: &str) -> String {
    let expanded = expand_tabs(doc);
    let lines: Vec<&str> = expanded.split('\n').collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim_start().is_empty())
        .map(|l| indent_width(l))
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    if let Some(first) = lines.first() {
        cleaned.push(first.trim_start().to_string());
    }
    for line in lines.iter().skip(1) {
        let cut = margin.min(indent_width(line));
        let start = line.char_indices().nth(cut).map_or(line.len(), |(i, _)| i);
        cleaned.push(line[start..].to_string());
    }

    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    let leading = cleaned.iter().take_while(|l| l.is_empty()).count();
    cleaned.drain(..leading);

    cleaned.join("\n")
}

/// Leading whitespace of `line`, in characters
fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn expand_tabs(s: &str) -> String {
    if !s.contains('\t') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut column = 0;
    for c in s.chars() {
        match c {
            '\t' => {
                let spaces = 8 - (column % 8);
                out.extend(std::iter::repeat(' ').take(spaces));
                column += spaces;
            }
            '\n' | '\r' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}
