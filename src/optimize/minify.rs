//! Output minification
//!
//! The script minifier is a conservative token-level pass: it strips
//! comments, collapses whitespace while preserving line breaks so automatic
//! semicolon insertion keeps working, drops configured call expressions,
//! and renames long local bindings. Stylesheets go through lightningcss.

use std::collections::BTreeSet;

use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};

use crate::utils::scan::{comment_end, replace_words, string_end, word_end};

/// Punctuation that never needs an adjacent space
const TIGHT: &str = "{}();,=:";

/// Names the mangler must never touch
const RESERVED: &[&str] = &["do", "if", "in", "of", "as", "at", "to"];

/// Full production pass over one chunk of script output
pub fn minify_js(source: &str, drop: &[String], mangle: bool, protected: &BTreeSet<String>) -> String {
    let mut out = source.to_string();
    if !drop.is_empty() {
        out = drop_calls(&out, drop);
    }
    if mangle {
        out = mangle_locals(&out, protected);
    }
    strip_js(&out)
}

/// Strip comments and collapse whitespace. Line breaks survive unless both
/// neighbors make the join unambiguous.
pub fn strip_js(source: &str) -> String {
    let cs: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut pending: Option<char> = None;
    let mut i = 0;

    while i < cs.len() {
        let c = cs[i];

        if c == '"' || c == '\'' || c == '`' {
            let end = string_end(&cs, i);
            flush_ws(&mut out, &mut pending, c);
            out.extend(&cs[i..end]);
            i = end;
            continue;
        }

        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            let end = comment_end(&cs, i);
            // a dropped block comment still separates tokens
            if cs[i + 1] == '*' && pending.is_none() {
                pending = Some(' ');
            }
            i = end;
            continue;
        }

        if c.is_whitespace() {
            if c == '\n' {
                pending = Some('\n');
            } else if pending.is_none() {
                pending = Some(' ');
            }
            i += 1;
            continue;
        }

        flush_ws(&mut out, &mut pending, c);
        out.push(c);
        i += 1;
    }

    out
}

fn flush_ws(out: &mut String, pending: &mut Option<char>, next: char) {
    let Some(ws) = pending.take() else { return };
    let prev = out.chars().last();
    let drop = match ws {
        '\n' => {
            prev.is_none()
                || matches!(prev, Some('{') | Some('(') | Some(';') | Some(','))
                || matches!(next, '}' | ')')
        }
        _ => prev.map_or(true, |p| TIGHT.contains(p)) || TIGHT.contains(next),
    };
    if !drop {
        out.push(ws);
    }
}

/// Replace listed call expressions (e.g. `console.log`) with `void 0`.
/// The argument list is skipped with balanced parentheses so nested calls
/// and string arguments survive the scan.
pub fn drop_calls(source: &str, calls: &[String]) -> String {
    let cs: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    'outer: while i < cs.len() {
        let c = cs[i];

        if c == '"' || c == '\'' || c == '`' {
            let end = string_end(&cs, i);
            out.extend(&cs[i..end]);
            i = end;
            continue;
        }
        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            let end = comment_end(&cs, i);
            out.extend(&cs[i..end]);
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let boundary = i == 0 || (!cs[i - 1].is_alphanumeric() && cs[i - 1] != '_' && cs[i - 1] != '$' && cs[i - 1] != '.');
            if boundary {
                for call in calls {
                    if let Some(end) = match_call(&cs, i, call) {
                        out.push_str("void 0");
                        i = end;
                        continue 'outer;
                    }
                }
            }
            let end = word_end(&cs, i);
            out.extend(&cs[i..end]);
            i = end;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

/// If `name(...)` starts at `i`, the index one past the closing paren
fn match_call(cs: &[char], i: usize, name: &str) -> Option<usize> {
    let name_chars: Vec<char> = name.chars().collect();
    if i + name_chars.len() > cs.len() || cs[i..i + name_chars.len()] != name_chars[..] {
        return None;
    }
    let mut j = i + name_chars.len();
    // must be a full-name match, not a prefix
    if cs.get(j).map_or(false, |c| c.is_alphanumeric() || *c == '_' || *c == '$' || *c == '.') {
        return None;
    }
    while j < cs.len() && cs[j].is_whitespace() {
        j += 1;
    }
    if cs.get(j) != Some(&'(') {
        return None;
    }

    let mut depth = 0;
    while j < cs.len() {
        let c = cs[j];
        if c == '"' || c == '\'' || c == '`' {
            j = string_end(cs, j);
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j + 1);
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Rename declared bindings of four characters or more to short names.
/// Renaming is global and injective, so shadowing structure is preserved;
/// property accesses and string contents are never touched. A name that
/// also appears in key position (object-literal keys and shorthand
/// properties) is never renamed at all; the key and its dotted reads must
/// keep the same spelling.
pub fn mangle_locals(source: &str, protected: &BTreeSet<String>) -> String {
    let cs: Vec<char> = source.chars().collect();
    let mut all_idents: BTreeSet<String> = BTreeSet::new();
    let mut declared: Vec<String> = Vec::new();
    let mut key_like: BTreeSet<String> = BTreeSet::new();
    let mut prev_sig: Option<char> = None;
    let mut i = 0;

    while i < cs.len() {
        let c = cs[i];
        if c == '"' || c == '\'' || c == '`' {
            i = string_end(&cs, i);
            prev_sig = Some(c);
            continue;
        }
        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            i = comment_end(&cs, i);
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let end = word_end(&cs, i);
            let word: String = cs[i..end].iter().collect();
            let after_dot = prev_sig == Some('.');
            all_idents.insert(word.clone());

            let mut j = end;
            while j < cs.len() && cs[j].is_whitespace() {
                j += 1;
            }
            let next = cs.get(j).copied();

            if !after_dot
                && (next == Some(':')
                    || (matches!(prev_sig, Some('{') | Some(','))
                        && matches!(next, Some(',') | Some('}'))))
            {
                key_like.insert(word.clone());
            }

            if !after_dot && matches!(word.as_str(), "var" | "let" | "const" | "function" | "class") {
                // destructuring patterns and anonymous functions are skipped
                if j < cs.len() && (cs[j].is_alphabetic() || cs[j] == '_' || cs[j] == '$') {
                    let n_end = word_end(&cs, j);
                    let name: String = cs[j..n_end].iter().collect();
                    if name.len() >= 4
                        && !name.starts_with("__")
                        && !protected.contains(&name)
                        && !declared.contains(&name)
                    {
                        declared.push(name);
                    }
                }
            }
            prev_sig = Some(cs[end - 1]);
            i = end;
            continue;
        }
        if !c.is_whitespace() {
            prev_sig = Some(c);
        }
        i += 1;
    }

    declared.retain(|name| !key_like.contains(name));
    if declared.is_empty() {
        return source.to_string();
    }

    let mut table: Vec<(String, String)> = Vec::new();
    let mut counter = 0usize;
    for name in &declared {
        let short = loop {
            let candidate = short_name(counter);
            counter += 1;
            if !all_idents.contains(&candidate) && !RESERVED.contains(&candidate.as_str()) {
                break candidate;
            }
        };
        table.push((name.clone(), short));
    }

    let refs: Vec<(&str, &str)> = table.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    replace_words(source, &refs)
}

fn short_name(mut n: usize) -> String {
    let mut s = String::new();
    loop {
        s.insert(0, (b'a' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            break;
        }
        n -= 1;
    }
    s
}

/// Minify a stylesheet with lightningcss
pub fn minify_css(source: &str) -> Result<String, String> {
    let sheet = StyleSheet::parse(source, ParserOptions::default()).map_err(|e| e.to_string())?;
    let out = sheet
        .to_css(PrinterOptions { minify: true, ..Default::default() })
        .map_err(|e| e.to_string())?;
    Ok(out.code)
}
