//! Built-in transform stages
//!
//! Every stage is a pure `content -> content` function. Options tables are
//! opaque to the executor; a stage reads the keys it understands and
//! ignores the rest.

use crate::utils::scan::{comment_end, replace_words, string_end, word_end};

/// Primitive type names recognized by the annotation heuristic
const PRIMITIVES: &[&str] = &[
    "string", "number", "boolean", "any", "void", "never", "unknown", "null", "undefined",
    "object", "symbol", "bigint",
];

/// Properties the `css` stage prefixes when the options table does not
/// supply its own `properties` list
const DEFAULT_PREFIX_PROPS: &[&str] = &[
    "user-select",
    "appearance",
    "backdrop-filter",
    "text-size-adjust",
    "mask",
];

/// Erase TypeScript type syntax: `interface` blocks, `type` aliases,
/// `: Type` annotations, `as Type` casts. Heuristic and character-based;
/// it never touches string or comment content.
pub fn strip_types(source: &str, _options: &toml::Table) -> Result<String, String> {
    let cs: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut ternary_depth = 0usize;
    // bracket context stack; `true` marks an object literal, where `:` is
    // a key separator and never an annotation
    let mut contexts: Vec<bool> = Vec::new();
    let mut prev_sig: Option<char> = None;
    let mut prev_word = String::new();

    while i < cs.len() {
        let c = cs[i];

        if c == '"' || c == '\'' || c == '`' {
            let end = string_end(&cs, i);
            out.extend(&cs[i..end]);
            prev_sig = Some(c);
            prev_word.clear();
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
            let end = word_end(&cs, i);
            let word: String = cs[i..end].iter().collect();
            let prev_ws = i == 0 || cs[i - 1].is_whitespace();

            match word.as_str() {
                "interface" if prev_ws => {
                    if let Some(after) = skip_interface(&cs, end) {
                        i = after;
                        continue;
                    }
                }
                "type" if prev_ws && is_type_alias(&cs, end) => {
                    i = skip_to_statement_end(&cs, end);
                    continue;
                }
                "as" if prev_ws && end < cs.len() && cs[end].is_whitespace() => {
                    i = skip_type(&cs, end);
                    continue;
                }
                _ => {}
            }

            out.extend(&cs[i..end]);
            prev_sig = Some(cs[end - 1]);
            prev_word = word;
            i = end;
            continue;
        }

        if c == '?' {
            let next = cs.get(i + 1).copied();
            if next == Some(':') {
                // optional-member marker, drop it with the annotation
                i += 1;
                continue;
            }
            if next != Some('?') && next != Some('.') {
                ternary_depth += 1;
            } else {
                out.push(c);
                out.push(next.unwrap());
                prev_sig = next;
                prev_word.clear();
                i += 2;
                continue;
            }
            out.push(c);
            prev_sig = Some(c);
            prev_word.clear();
            i += 1;
            continue;
        }

        if c == ':' {
            if ternary_depth > 0 {
                ternary_depth -= 1;
                out.push(c);
                prev_sig = Some(c);
                prev_word.clear();
                i += 1;
                continue;
            }
            let in_object = contexts.last().copied().unwrap_or(false);
            if !in_object && annotation_follows(&cs, i + 1) {
                i = skip_type(&cs, i + 1);
                // keep the separator the annotation swallowed
                if matches!(cs.get(i), Some('=') | Some('{')) && !out.ends_with(char::is_whitespace)
                {
                    out.push(' ');
                }
                continue;
            }
        }

        match c {
            '{' => {
                // an opening brace after a value-position token starts an
                // object literal, otherwise a block
                let object = matches!(
                    prev_sig,
                    Some('(') | Some('[') | Some(',') | Some('=') | Some(':') | Some('?')
                ) || prev_word == "return";
                contexts.push(object);
                ternary_depth = 0;
            }
            '}' => {
                contexts.pop();
                ternary_depth = 0;
            }
            '(' | '[' => contexts.push(false),
            ')' | ']' => {
                contexts.pop();
            }
            ';' => ternary_depth = 0,
            _ => {}
        }

        if !c.is_whitespace() {
            prev_sig = Some(c);
            prev_word.clear();
        }
        out.push(c);
        i += 1;
    }

    Ok(out)
}

/// Syntax lowering: rewrites block-scoped declarations to `var`, word-wise
/// and outside strings and comments. The preset table (browser targets and
/// the like) is accepted but not interpreted further.
pub fn lower(source: &str, _options: &toml::Table) -> Result<String, String> {
    Ok(replace_words(source, &[("const", "var"), ("let", "var")]))
}

/// Vendor-prefix pass for stylesheet declarations. The options table may
/// carry a `properties` list overriding the built-in set.
pub fn css_prefix(source: &str, options: &toml::Table) -> Result<String, String> {
    let props: Vec<String> = match options.get("properties").and_then(|v| v.as_array()) {
        Some(list) => list
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        None => DEFAULT_PREFIX_PROPS.iter().map(|s| s.to_string()).collect(),
    };

    let mut out = source.to_string();
    for prop in &props {
        let escaped = regex::escape(prop);
        // the optional group captures an already-present -webkit- twin so
        // rerunning the pass on its own output changes nothing
        let pattern = format!(
            r"(?m)([{{;]|^)([ \t]*)((?:-webkit-{escaped}\s*:[^;}}\n]*;[ \t]*)?){escaped}\s*:\s*([^;}}\n]+)"
        );
        let re = regex::Regex::new(&pattern).map_err(|e| e.to_string())?;
        out = re
            .replace_all(&out, |caps: &regex::Captures| {
                if !caps[3].is_empty() {
                    return caps[0].to_string();
                }
                format!(
                    "{}{}-webkit-{}: {};{}{}: {}",
                    &caps[1], &caps[2], prop, &caps[4], &caps[2], prop, &caps[4]
                )
            })
            .into_owned();
    }

    Ok(out)
}

/// Wrap stylesheet content as a script module that injects a `<style>`
/// element at load time (development-mode stylesheet handling).
pub fn style_inject(source: &str, _options: &toml::Table) -> Result<String, String> {
    let escaped = source
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${");

    Ok(format!(
        r#"(function() {{
  var style = document.createElement('style');
  style.textContent = `{}`;
  document.head.appendChild(style);
}})();
module.exports = {{}};
"#,
        escaped
    ))
}

/// Validate JSON and wrap it as a script module
pub fn json_module(source: &str, _options: &toml::Table) -> Result<String, String> {
    serde_json::from_str::<serde_json::Value>(source).map_err(|e| format!("invalid JSON: {}", e))?;
    Ok(format!("module.exports = {};", source.trim_end()))
}

/// Whether the text after a ':' looks like a type annotation
fn annotation_follows(cs: &[char], mut i: usize) -> bool {
    while i < cs.len() && (cs[i] == ' ' || cs[i] == '\t') {
        i += 1;
    }
    if i >= cs.len() {
        return false;
    }

    let end = word_end(cs, i);
    if end == i {
        return false;
    }
    let word: String = cs[i..end].iter().collect();

    PRIMITIVES.contains(&word.as_str())
        || word.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

/// Skip a type expression starting at `i`, returning the index of the
/// first character after it (the break character is not consumed).
fn skip_type(cs: &[char], mut i: usize) -> usize {
    let mut depth = 0i32;
    let mut consumed_any = false;

    while i < cs.len() {
        let c = cs[i];

        if c == '"' || c == '\'' || c == '`' {
            i = string_end(cs, i);
            consumed_any = true;
            continue;
        }

        if c == '=' && cs.get(i + 1) == Some(&'>') {
            // arrow inside a function type
            i += 2;
            continue;
        }

        match c {
            '<' | '(' | '[' => depth += 1,
            '{' if !consumed_any || depth > 0 => depth += 1,
            '>' | ']' => depth -= 1,
            ')' | '}' => {
                if depth > 0 {
                    depth -= 1;
                } else {
                    break;
                }
            }
            '=' | ',' | ';' | '\n' | '{' if depth == 0 => break,
            _ => {}
        }

        if !c.is_whitespace() {
            consumed_any = true;
        }
        i += 1;
    }

    i
}

/// Skip an `interface Name { ... }` block; None when the block shape is
/// not recognized, in which case the word is kept verbatim.
fn skip_interface(cs: &[char], mut i: usize) -> Option<usize> {
    while i < cs.len() && cs[i].is_whitespace() {
        i += 1;
    }
    let name_end = word_end(cs, i);
    if name_end == i {
        return None;
    }
    i = name_end;

    // only whitespace, identifiers (extends clauses), commas, and generic
    // params may sit between the name and the body
    while i < cs.len() && cs[i] != '{' {
        let ok = cs[i].is_whitespace()
            || cs[i].is_alphanumeric()
            || matches!(cs[i], '_' | '$' | ',' | '<' | '>');
        if !ok {
            return None;
        }
        i += 1;
    }
    if i >= cs.len() {
        return None;
    }

    let mut depth = 0;
    while i < cs.len() {
        match cs[i] {
            '"' | '\'' | '`' => {
                i = string_end(cs, i);
                continue;
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Some(cs.len())
}

/// Whether `type` at this position introduces an alias (`type Name =`)
fn is_type_alias(cs: &[char], mut i: usize) -> bool {
    while i < cs.len() && (cs[i] == ' ' || cs[i] == '\t') {
        i += 1;
    }
    let name_end = word_end(cs, i);
    if name_end == i {
        return false;
    }
    i = name_end;
    while i < cs.len() && (cs[i] == ' ' || cs[i] == '\t') {
        i += 1;
    }
    // generic params on the alias
    if i < cs.len() && cs[i] == '<' {
        let mut depth = 0;
        while i < cs.len() {
            match cs[i] {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        while i < cs.len() && (cs[i] == ' ' || cs[i] == '\t') {
            i += 1;
        }
    }
    cs.get(i) == Some(&'=')
}

/// Skip to the end of a statement: the first `;` or newline at brace
/// depth zero.
fn skip_to_statement_end(cs: &[char], mut i: usize) -> usize {
    let mut depth = 0;
    while i < cs.len() {
        match cs[i] {
            '"' | '\'' | '`' => {
                i = string_end(cs, i);
                continue;
            }
            '{' | '<' | '(' | '[' => depth += 1,
            '}' | '>' | ')' | ']' => depth -= 1,
            ';' | '\n' if depth <= 0 => return i + 1,
            _ => {}
        }
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> toml::Table {
        toml::Table::new()
    }

    #[test]
    fn test_strip_variable_annotation() {
        let out = strip_types("const x: number = 1;", &table()).unwrap();
        assert_eq!(out, "const x = 1;");
    }

    #[test]
    fn test_strip_param_and_return_annotations() {
        let out = strip_types(
            "function greet(name: string, count: Count): void { return; }",
            &table(),
        )
        .unwrap();
        assert_eq!(out, "function greet(name, count) { return; }");
    }

    #[test]
    fn test_strip_interface_block() {
        let out = strip_types(
            "interface Point { x: number; y: number; }\nconst p = { x: 1, y: 2 };",
            &table(),
        )
        .unwrap();
        assert!(!out.contains("interface"));
        assert!(out.contains("const p = { x: 1, y: 2 };"));
    }

    #[test]
    fn test_strip_type_alias() {
        let out = strip_types("type Id = string;\nconst id = 'a';", &table()).unwrap();
        assert!(!out.contains("type Id"));
        assert!(out.contains("const id = 'a';"));
    }

    #[test]
    fn test_strip_as_cast() {
        let out = strip_types("const el = target as HTMLElement;", &table()).unwrap();
        assert_eq!(out, "const el = target ;");
    }

    #[test]
    fn test_strings_left_untouched() {
        let src = "const msg = 'value: Number';";
        assert_eq!(strip_types(src, &table()).unwrap(), src);
    }

    #[test]
    fn test_object_literal_values_survive() {
        let out = strip_types("const route = { component: HomeView, path: '/' };", &table()).unwrap();
        assert_eq!(out, "const route = { component: HomeView, path: '/' };");
    }

    #[test]
    fn test_returned_object_literal_survives() {
        let out =
            strip_types("function make(): Route { return { view: Panel }; }", &table()).unwrap();
        assert_eq!(out, "function make() { return { view: Panel }; }");
    }

    #[test]
    fn test_annotations_stripped_inside_object_methods() {
        let out = strip_types(
            "var o = { render: function (size: number) { return size; } };",
            &table(),
        )
        .unwrap();
        assert_eq!(out, "var o = { render: function (size) { return size; } };");
    }

    #[test]
    fn test_ternary_survives() {
        let src = "const v = flag ? first : second;";
        assert_eq!(strip_types(src, &table()).unwrap(), src);
    }

    #[test]
    fn test_generic_annotation() {
        let out = strip_types("const xs: Array<Promise<void>> = [];", &table()).unwrap();
        assert_eq!(out, "const xs = [];");
    }

    #[test]
    fn test_lower_rewrites_declarations() {
        let out = lower("const a = 1;\nlet b = 2;\nvar c = 3;", &table()).unwrap();
        assert_eq!(out, "var a = 1;\nvar b = 2;\nvar c = 3;");
    }

    #[test]
    fn test_lower_skips_strings_and_words() {
        let out = lower("const s = 'let const';\nconst letter = 1;", &table()).unwrap();
        assert_eq!(out, "var s = 'let const';\nvar letter = 1;");
    }

    #[test]
    fn test_css_prefix_default_list() {
        let out = css_prefix(".a { user-select: none; color: red; }", &table()).unwrap();
        assert!(out.contains("-webkit-user-select: none"));
        assert!(out.contains("user-select: none;"));
        assert!(!out.contains("-webkit-color"));
    }

    #[test]
    fn test_css_prefix_custom_properties() {
        let mut opts = toml::Table::new();
        opts.insert(
            "properties".to_string(),
            toml::Value::Array(vec![toml::Value::String("transition".to_string())]),
        );
        let out = css_prefix(".a { transition: all 1s; }", &opts).unwrap();
        assert!(out.contains("-webkit-transition: all 1s"));
    }

    #[test]
    fn test_css_prefix_does_not_double_prefix() {
        let once = css_prefix(".a { user-select: none; }", &table()).unwrap();
        let twice = css_prefix(&once, &table()).unwrap();
        assert_eq!(once.matches("-webkit--webkit").count(), 0);
        assert_eq!(twice.matches("-webkit--webkit").count(), 0);
    }

    #[test]
    fn test_css_prefix_is_idempotent() {
        let src = ".a {\n  user-select: none;\n  appearance: button;\n}\n";
        let once = css_prefix(src, &table()).unwrap();
        let twice = css_prefix(&once, &table()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.matches("-webkit-user-select").count(), 1);
    }

    #[test]
    fn test_style_inject_wraps_css() {
        let out = style_inject("body { color: red; }", &table()).unwrap();
        assert!(out.contains("document.createElement('style')"));
        assert!(out.contains("body { color: red; }"));
        assert!(out.contains("module.exports = {};"));
    }

    #[test]
    fn test_style_inject_escapes_backticks() {
        let out = style_inject("a::before { content: `x`; }", &table()).unwrap();
        assert!(out.contains("\\`x\\`"));
    }

    #[test]
    fn test_json_module() {
        let out = json_module(r#"{"key": "value"}"#, &table()).unwrap();
        assert_eq!(out, r#"module.exports = {"key": "value"};"#);
        assert!(json_module("{broken", &table()).is_err());
    }
}
