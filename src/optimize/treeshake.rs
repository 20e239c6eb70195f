//! Tree shaking
//!
//! Removes export declarations nothing imports. Usage is computed from the
//! import statements of every module in the graph; anything reached through
//! a namespace import, a star re-export, a `require` call, or a dynamic
//! import is treated as fully used, and entry modules always keep their
//! whole export surface. Runs to a fixpoint so a second pass is a no-op.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::graph::ModuleGraph;
use crate::utils::scan::{comment_end, string_end, word_end};

static IMPORT_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s+([^'";]+?)\s+from\s*['"]([^'"]+)['"]"#).unwrap());

static EXPORT_STAR_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"export\s*\*\s*(?:as\s+[\w$]+\s+)?from\s*['"]([^'"]+)['"]"#).unwrap()
});

static EXPORT_NAMED_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"export\s*\{([^}]*)\}\s*from\s*['"]([^'"]+)['"]"#).unwrap());

static REQUIRE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

static IMPORT_BINDINGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+([^'";]+?)\s+from\s*['"][^'"]+['"]"#).unwrap()
});

/// How much of a module's export surface its importers need
#[derive(Debug, Clone, PartialEq)]
enum Used {
    All,
    Named(BTreeSet<String>),
}

impl Used {
    fn add(&mut self, names: Option<Vec<String>>) {
        match (self, names) {
            (u @ Used::Named(_), None) => *u = Used::All,
            (Used::Named(set), Some(names)) => set.extend(names),
            (Used::All, _) => {}
        }
    }
}

/// Remove unused exports across the whole graph. Mutates the transformed
/// source of affected modules in place.
pub fn shake(graph: &mut ModuleGraph) {
    // each pass can only shrink sources, so this terminates; the bound is
    // a backstop against a rewrite oscillation bug
    for _ in 0..16 {
        if !shake_pass(graph) {
            break;
        }
    }
}

fn shake_pass(graph: &mut ModuleGraph) -> bool {
    let used = collect_used(graph);

    let mut updates: Vec<(PathBuf, String)> = Vec::new();
    for m in graph.modules() {
        if m.is_entry || !m.kind.is_script_like() {
            continue;
        }
        let keep = match used.get(&m.path) {
            Some(Used::All) => continue,
            Some(Used::Named(names)) => names.clone(),
            None => BTreeSet::new(),
        };
        if let Some(stripped) = strip_unused_exports(&m.output_code(), &keep) {
            updates.push((m.path.clone(), stripped));
        }
    }

    let changed = !updates.is_empty();
    for (path, source) in updates {
        if let Some(m) = graph.get_mut(&path) {
            m.transformed = Some(source);
        }
    }
    changed
}

/// Compute, for every module, which of its exports the rest of the graph
/// actually names.
fn collect_used(graph: &ModuleGraph) -> BTreeMap<PathBuf, Used> {
    let mut used: BTreeMap<PathBuf, Used> = BTreeMap::new();
    let mut mark = |target: &PathBuf, names: Option<Vec<String>>| {
        used.entry(target.clone())
            .or_insert_with(|| Used::Named(BTreeSet::new()))
            .add(names);
    };

    for entry in graph.entries() {
        mark(entry, None);
    }

    for m in graph.modules() {
        if !m.kind.is_script_like() {
            continue;
        }
        let source = m.output_code();
        let edges: HashMap<&str, &PathBuf> = m
            .static_imports
            .iter()
            .filter_map(|e| e.resolved.as_ref().map(|p| (e.specifier.as_str(), p)))
            .collect();

        for cap in IMPORT_CLAUSE.captures_iter(&source) {
            if let Some(target) = edges.get(&cap[2]) {
                mark(target, clause_names(&cap[1]));
            }
        }
        for cap in EXPORT_STAR_FROM.captures_iter(&source) {
            if let Some(target) = edges.get(&cap[1]) {
                mark(target, None);
            }
        }
        for cap in EXPORT_NAMED_FROM.captures_iter(&source) {
            if let Some(target) = edges.get(&cap[2]) {
                mark(target, Some(list_names(&cap[1])));
            }
        }
        for cap in REQUIRE_CALL.captures_iter(&source) {
            if let Some(target) = edges.get(&cap[1]) {
                mark(target, None);
            }
        }

        // a dynamic importer's shape is unknowable until runtime
        for target in m.dynamic_deps() {
            mark(target, None);
        }
    }

    used
}

/// Names an import clause pulls in, or None when it takes everything
fn clause_names(clause: &str) -> Option<Vec<String>> {
    let clause = clause.trim();
    if clause.contains('*') {
        return None;
    }

    let mut names = Vec::new();
    match clause.split_once('{') {
        Some((default_part, rest)) => {
            if !default_part.trim().trim_end_matches(',').trim().is_empty() {
                names.push("default".to_string());
            }
            let inner = rest.split('}').next().unwrap_or("");
            names.extend(list_names(inner));
        }
        None => names.push("default".to_string()),
    }
    Some(names)
}

/// Exported names in a `{ a, b as c }` list (the pre-`as` side)
fn list_names(inner: &str) -> Vec<String> {
    inner
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
        .filter(|n| !n.is_empty())
        .map(|n| n.to_string())
        .collect()
}

/// Local bindings a module's import statements introduce. The minifier
/// must not rename these; the runtime wires them up by original name.
pub fn imported_bindings(source: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for cap in IMPORT_BINDINGS.captures_iter(source) {
        let clause = cap[1].trim();
        if let Some(pos) = clause.find('*') {
            // "* as ns" or "def, * as ns"
            if let Some(alias) = clause[pos..].split_whitespace().nth(2) {
                names.insert(alias.trim_end_matches(',').to_string());
            }
            if let Some(default_part) = clause[..pos].split(',').next() {
                let d = default_part.trim();
                if !d.is_empty() {
                    names.insert(d.to_string());
                }
            }
            continue;
        }
        match clause.split_once('{') {
            Some((default_part, rest)) => {
                let d = default_part.trim().trim_end_matches(',').trim();
                if !d.is_empty() {
                    names.insert(d.to_string());
                }
                let inner = rest.split('}').next().unwrap_or("");
                for entry in inner.split(',') {
                    // local side is the alias when present
                    let mut words = entry.split_whitespace();
                    let first = words.next();
                    let local = match (first, words.next(), words.next()) {
                        (_, Some("as"), Some(alias)) => Some(alias),
                        (Some(name), _, _) => Some(name),
                        _ => None,
                    };
                    if let Some(local) = local.filter(|n| !n.is_empty()) {
                        names.insert(local.to_string());
                    }
                }
            }
            None => {
                names.insert(clause.to_string());
            }
        }
    }
    names
}

/// Local bindings the module exports. Also protected from renaming.
pub fn exported_bindings(source: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let cs: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < cs.len() {
        let c = cs[i];
        if c == '"' || c == '\'' || c == '`' {
            i = string_end(&cs, i);
            continue;
        }
        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            i = comment_end(&cs, i);
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let end = word_end(&cs, i);
            let word: String = cs[i..end].iter().collect();
            let after_dot = i > 0 && cs[i - 1] == '.';
            if word == "export" && !after_dot {
                if let Some(parsed) = parse_export(&cs, end) {
                    match parsed {
                        ParsedExport::Decl { name, .. } => {
                            names.insert(name);
                        }
                        ParsedExport::List { entries, end, from } => {
                            if from.is_none() {
                                for (local, _) in entries {
                                    names.insert(local);
                                }
                            }
                            i = end;
                            continue;
                        }
                        ParsedExport::Default { .. } | ParsedExport::Star { .. } => {}
                    }
                }
            }
            i = end;
            continue;
        }
        i += 1;
    }
    names
}

pub(super) enum ParsedExport {
    /// export const/let/var/function/class <name>
    Decl {
        name: String,
        /// index of the declaration keyword (demotion cut point)
        decl_start: usize,
        /// one past the end of the whole statement
        stmt_end: usize,
    },
    /// export default ...
    Default {
        /// first index of the exported expression or declaration
        body_start: usize,
        stmt_end: usize,
    },
    /// export { a, b as c } with optional trailing `from` source
    List {
        /// (local, exported) pairs
        entries: Vec<(String, String)>,
        /// one past the closing brace (and `;` / `from` clause)
        end: usize,
        from: Option<String>,
    },
    /// export * [as ns] from '...'
    Star {
        alias: Option<String>,
        specifier: String,
        end: usize,
    },
}

/// Parse the export statement whose `export` keyword ends at `kw_end`
pub(super) fn parse_export(cs: &[char], kw_end: usize) -> Option<ParsedExport> {
    let mut j = kw_end;
    while j < cs.len() && cs[j].is_whitespace() {
        j += 1;
    }
    if j >= cs.len() {
        return None;
    }

    match cs[j] {
        '*' => parse_export_star(cs, j),
        '{' => parse_export_list(cs, j),
        _ => {
            let w_end = word_end(cs, j);
            let word: String = cs[j..w_end].iter().collect();
            match word.as_str() {
                "default" => Some(ParsedExport::Default {
                    body_start: skip_ws(cs, w_end),
                    stmt_end: default_end(cs, w_end),
                }),
                "const" | "let" | "var" => {
                    let name_start = skip_ws(cs, w_end);
                    let name_end = word_end(cs, name_start);
                    Some(ParsedExport::Decl {
                        name: cs[name_start..name_end].iter().collect(),
                        decl_start: j,
                        stmt_end: statement_end(cs, w_end),
                    })
                }
                "function" | "class" | "async" => {
                    let mut k = w_end;
                    if word == "async" {
                        k = skip_ws(cs, k);
                        k = word_end(cs, k); // "function"
                    }
                    let name_start = skip_ws(cs, k);
                    let name_end = word_end(cs, name_start);
                    Some(ParsedExport::Decl {
                        name: cs[name_start..name_end].iter().collect(),
                        decl_start: j,
                        stmt_end: brace_span_end(cs, name_end),
                    })
                }
                _ => None,
            }
        }
    }
}

fn parse_export_list(cs: &[char], brace: usize) -> Option<ParsedExport> {
    let mut close = brace + 1;
    while close < cs.len() && cs[close] != '}' {
        close += 1;
    }
    if close >= cs.len() {
        return None;
    }

    let inner: String = cs[brace + 1..close].iter().collect();
    let entries = inner
        .split(',')
        .filter_map(|entry| {
            let mut words = entry.split_whitespace();
            let local = words.next()?.to_string();
            let exported = match (words.next(), words.next()) {
                (Some("as"), Some(alias)) => alias.to_string(),
                _ => local.clone(),
            };
            Some((local, exported))
        })
        .collect();

    let mut end = skip_ws(cs, close + 1);
    let from_end = word_end(cs, end);
    let is_from = from_end > end
        && cs[end..from_end].iter().collect::<String>() == "from";

    let mut from = None;
    if is_from {
        let q = skip_ws(cs, from_end);
        if q >= cs.len() || (cs[q] != '"' && cs[q] != '\'') {
            return None;
        }
        let s_end = string_end(cs, q);
        from = Some(cs[q + 1..s_end - 1].iter().collect());
        end = s_end;
    }
    if end < cs.len() && cs[end] == ';' {
        end += 1;
    }

    Some(ParsedExport::List { entries, end, from })
}

/// Parse `export * from '...'` and `export * as ns from '...'`
fn parse_export_star(cs: &[char], star: usize) -> Option<ParsedExport> {
    let mut j = skip_ws(cs, star + 1);
    let mut alias = None;

    let w_end = word_end(cs, j);
    if w_end > j && cs[j..w_end].iter().collect::<String>() == "as" {
        let a_start = skip_ws(cs, w_end);
        let a_end = word_end(cs, a_start);
        if a_end == a_start {
            return None;
        }
        alias = Some(cs[a_start..a_end].iter().collect());
        j = skip_ws(cs, a_end);
    }

    let f_end = word_end(cs, j);
    if cs[j..f_end].iter().collect::<String>() != "from" {
        return None;
    }
    let q = skip_ws(cs, f_end);
    if q >= cs.len() || (cs[q] != '"' && cs[q] != '\'') {
        return None;
    }
    let s_end = string_end(cs, q);
    let specifier = cs[q + 1..s_end - 1].iter().collect();
    let mut end = s_end;
    if end < cs.len() && cs[end] == ';' {
        end += 1;
    }

    Some(ParsedExport::Star { alias, specifier, end })
}

pub(super) fn skip_ws(cs: &[char], mut i: usize) -> usize {
    while i < cs.len() && cs[i].is_whitespace() {
        i += 1;
    }
    i
}

/// End of an `export default` statement: a braced body for functions and
/// classes, a plain statement otherwise
fn default_end(cs: &[char], after_default: usize) -> usize {
    let mut j = skip_ws(cs, after_default);
    let w_end = word_end(cs, j);
    let mut word: String = cs[j..w_end].iter().collect();
    if word == "async" {
        j = skip_ws(cs, w_end);
        let w2 = word_end(cs, j);
        word = cs[j..w2].iter().collect();
    }
    if word == "function" || word == "class" {
        brace_span_end(cs, j)
    } else {
        statement_end(cs, after_default)
    }
}

/// One past the end of the statement starting after `from`: the first `;`
/// at bracket depth zero, or the line break that ends an unterminated
/// statement
pub(super) fn statement_end(cs: &[char], from: usize) -> usize {
    let mut depth: i32 = 0;
    let mut i = from;
    while i < cs.len() {
        let c = cs[i];
        if c == '"' || c == '\'' || c == '`' {
            i = string_end(cs, i);
            continue;
        }
        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            i = comment_end(cs, i);
            continue;
        }
        match c {
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            ';' if depth == 0 => return i + 1,
            '\n' if depth == 0 => return i,
            _ => {}
        }
        i += 1;
    }
    cs.len()
}

/// One past the closing brace of the body that starts at the first `{`
/// found outside parentheses
pub(super) fn brace_span_end(cs: &[char], from: usize) -> usize {
    let mut i = from;
    let mut paren: i32 = 0;
    while i < cs.len() {
        let c = cs[i];
        if c == '"' || c == '\'' || c == '`' {
            i = string_end(cs, i);
            continue;
        }
        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            i = comment_end(cs, i);
            continue;
        }
        match c {
            '(' => paren += 1,
            ')' => paren -= 1,
            '{' if paren == 0 => break,
            _ => {}
        }
        i += 1;
    }
    if i >= cs.len() {
        return cs.len();
    }

    let mut depth = 0;
    while i < cs.len() {
        let c = cs[i];
        if c == '"' || c == '\'' || c == '`' {
            i = string_end(cs, i);
            continue;
        }
        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            i = comment_end(cs, i);
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    cs.len()
}

/// Whether `name` is referenced anywhere outside the span
fn referenced_outside(cs: &[char], name: &str, span_start: usize, span_end: usize) -> bool {
    let mut i = 0;
    while i < cs.len() {
        if i == span_start {
            i = span_end;
            continue;
        }
        let c = cs[i];
        if c == '"' || c == '\'' || c == '`' {
            i = string_end(cs, i);
            continue;
        }
        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            i = comment_end(cs, i);
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let end = word_end(cs, i);
            if end <= span_end && i >= span_start {
                i = end;
                continue;
            }
            let word: String = cs[i..end].iter().collect();
            let after_dot = i > 0 && cs[i - 1] == '.';
            if word == name && !after_dot {
                return true;
            }
            i = end;
            continue;
        }
        i += 1;
    }
    false
}

/// Rewrite `source` keeping only the exports in `keep`. Declarations still
/// referenced inside the module are demoted to plain declarations instead
/// of removed. Returns None when nothing changed.
fn strip_unused_exports(source: &str, keep: &BTreeSet<String>) -> Option<String> {
    let cs: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut changed = false;

    while i < cs.len() {
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
            let end = word_end(&cs, i);
            let word: String = cs[i..end].iter().collect();
            let after_dot = i > 0 && cs[i - 1] == '.';
            if word == "export" && !after_dot {
                if let Some((skip_to, replacement)) = rewrite_export(&cs, i, end, keep) {
                    out.push_str(&replacement);
                    i = skip_to;
                    changed = true;
                    continue;
                }
            }
            out.push_str(&word);
            i = end;
            continue;
        }
        out.push(c);
        i += 1;
    }

    changed.then_some(out)
}

/// Decide what happens to one export statement. None leaves it untouched;
/// Some gives the resume index and the replacement text.
fn rewrite_export(
    cs: &[char],
    kw_start: usize,
    kw_end: usize,
    keep: &BTreeSet<String>,
) -> Option<(usize, String)> {
    match parse_export(cs, kw_end)? {
        // star re-exports stay; the target module decides what survives
        ParsedExport::Star { .. } => None,
        ParsedExport::Default { stmt_end, .. } => {
            if keep.contains("default") {
                None
            } else {
                Some((stmt_end, String::new()))
            }
        }
        ParsedExport::Decl { name, decl_start, stmt_end } => {
            if keep.contains(&name) {
                None
            } else if referenced_outside(cs, &name, kw_start, stmt_end) {
                // drop only the keyword, keep the binding
                Some((decl_start, String::new()))
            } else {
                Some((stmt_end, String::new()))
            }
        }
        ParsedExport::List { entries, end, from } => {
            if from.is_some() {
                return None;
            }
            let kept: Vec<&(String, String)> =
                entries.iter().filter(|(_, exported)| keep.contains(exported)).collect();
            if kept.len() == entries.len() {
                return None;
            }
            if kept.is_empty() {
                return Some((end, String::new()));
            }
            let body = kept
                .iter()
                .map(|(local, exported)| {
                    if local == exported {
                        local.clone()
                    } else {
                        format!("{} as {}", local, exported)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            Some((end, format!("export {{ {} }};", body)))
        }
    }
}
