//! Chunk rendering
//!
//! Turns transformed module sources into browser-ready chunk files. Each
//! module body is rewritten from ES import/export syntax to a registry
//! call convention and wrapped in a factory; the entry chunk additionally
//! carries the runtime that wires factories together and loads async
//! chunks by script tag.
//!
//! Single-use side-effect-free modules are spliced directly into their
//! importer's factory when concatenation is enabled, which saves a wrapper
//! and a registry lookup per module.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use crate::config::{Config, Mode};
use crate::graph::{ModuleGraph, ModuleRecord};
use crate::utils::scan::{comment_end, string_end, word_end};

use super::chunk::{Chunk, ChunkKind};
use super::treeshake::{
    brace_span_end, parse_export, skip_ws, statement_end, ParsedExport,
};

/// Module id to public chunk URL, embedded in the entry runtime
pub type ChunkMap = BTreeMap<String, String>;

const RUNTIME: &str = r#"var __skein_modules__ = __skein_modules__ || {};
var __skein_cache__ = __skein_cache__ || {};
function __skein_require__(id) {
  var cached = __skein_cache__[id];
  if (cached) return cached.exports;
  var factory = __skein_modules__[id];
  if (!factory) throw new Error("module not found: " + id);
  var registered = { exports: {} };
  __skein_cache__[id] = registered;
  factory(registered, registered.exports, __skein_require__);
  return registered.exports;
}
var __skein_chunks__ = __CHUNK_MAP__;
var __skein_loading__ = __skein_loading__ || {};
function __skein_import__(id) {
  if (__skein_modules__[id]) return Promise.resolve().then(function () { return __skein_require__(id); });
  var url = __skein_chunks__[id];
  if (!url) return Promise.reject(new Error("no chunk registered for " + id));
  if (!__skein_loading__[url]) {
    __skein_loading__[url] = new Promise(function (resolve, reject) {
      var tag = document.createElement("script");
      tag.src = url;
      tag.onload = resolve;
      tag.onerror = function () { reject(new Error("failed to load " + url)); };
      document.head.appendChild(tag);
    });
  }
  return __skein_loading__[url].then(function () { return __skein_require__(id); });
}
"#;

/// Render one chunk to its final (pre-minification) source
pub fn render_chunk(
    graph: &ModuleGraph,
    config: &Config,
    mode: Mode,
    chunk: &Chunk,
    chunk_map: &ChunkMap,
) -> String {
    let mut bodies: BTreeMap<PathBuf, String> = BTreeMap::new();
    let mut spec_maps: BTreeMap<PathBuf, HashMap<String, String>> = BTreeMap::new();
    for path in &chunk.modules {
        if let Some(record) = graph.get(path) {
            bodies.insert(path.clone(), record.output_code());
            spec_maps.insert(path.clone(), specifier_ids(record, graph));
        }
    }

    let mut inlined: BTreeSet<PathBuf> = BTreeSet::new();
    if mode.is_production() && config.optimize.concatenate {
        concatenate_chunk(graph, chunk, &mut bodies, &mut spec_maps, &mut inlined);
    }

    let mut out = String::new();
    match chunk.kind {
        ChunkKind::Entry => {
            let map_json =
                serde_json::to_string(chunk_map).unwrap_or_else(|_| "{}".to_string());
            out.push_str(&RUNTIME.replace("__CHUNK_MAP__", &map_json));
            out.push('\n');
        }
        _ => {
            out.push_str("var __skein_modules__ = __skein_modules__ || {};\n\n");
        }
    }

    for path in &chunk.modules {
        if inlined.contains(path) {
            continue;
        }
        let Some(record) = graph.get(path) else { continue };
        let body = rewrite_es(&bodies[path], &spec_maps[path], mode);
        out.push_str(&format!(
            "__skein_modules__[\"{}\"] = function (module, exports, require) {{\n{}\n}};\n\n",
            record.id,
            body.trim_end()
        ));
    }

    if chunk.kind == ChunkKind::Entry {
        if let Some(root) = &chunk.root {
            if let Some(record) = graph.get(root) {
                out.push_str(&format!("__skein_require__(\"{}\");\n", record.id));
            }
        }
    }

    out
}

/// Specifier-to-module-id map for one record's edges. Unresolved edges
/// keep the raw specifier as the id; the runtime reports those clearly.
fn specifier_ids(record: &ModuleRecord, graph: &ModuleGraph) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for edge in record.static_imports.iter().chain(&record.dynamic_imports) {
        let id = edge
            .resolved
            .as_ref()
            .and_then(|p| graph.get(p))
            .map(|m| m.id.clone())
            .unwrap_or_else(|| edge.specifier.clone());
        map.insert(edge.specifier.clone(), id);
    }
    map
}

/// Splice eligible modules into their single importer, deepest first so a
/// chain collapses into its outermost host.
fn concatenate_chunk(
    graph: &ModuleGraph,
    chunk: &Chunk,
    bodies: &mut BTreeMap<PathBuf, String>,
    spec_maps: &mut BTreeMap<PathBuf, HashMap<String, String>>,
    inlined: &mut BTreeSet<PathBuf>,
) {
    for candidate in chunk.modules.iter().rev() {
        let Some(record) = graph.get(candidate) else { continue };
        if record.is_entry || !record.kind.is_script_like() {
            continue;
        }
        if !graph.dynamic_importers(candidate).is_empty() {
            continue;
        }
        let importers = graph.static_importers(candidate);
        let [host] = importers.as_slice() else { continue };
        if host == candidate || !bodies.contains_key(host) {
            continue;
        }

        let Some(specifier) = graph
            .get(host)
            .and_then(|h| {
                h.static_imports
                    .iter()
                    .find(|e| e.resolved.as_deref() == Some(candidate.as_path()))
            })
            .map(|e| e.specifier.clone())
        else {
            continue;
        };

        // a merged body resolves specifiers from one shared map, so the
        // candidate's edges must not contradict the host's
        let cand_map = spec_maps[candidate].clone();
        let host_map = spec_maps.get_mut(host).unwrap();
        if cand_map
            .iter()
            .any(|(spec, id)| host_map.get(spec).is_some_and(|other| other != id))
        {
            continue;
        }

        let suffix = crate::utils::hash_content(record.id.as_bytes());
        if let Some(merged) =
            concatenate_into(&bodies[host.as_path()], &bodies[candidate], &specifier, &suffix)
        {
            for (spec, id) in cand_map {
                host_map.entry(spec).or_insert(id);
            }
            bodies.insert(host.clone(), merged);
            inlined.insert(candidate.clone());
        }
    }
}

/// Inline `candidate` into `host` at the statement importing `specifier`.
/// Returns None when the splice cannot be proven safe.
fn concatenate_into(
    host: &str,
    candidate: &str,
    specifier: &str,
    suffix: &str,
) -> Option<String> {
    if !side_effect_free(candidate) {
        return None;
    }

    let (demoted, export_map) = demote_exports(candidate, suffix)?;

    let cs: Vec<char> = host.chars().collect();
    let (start, stmt) = find_import(&cs, specifier)?;
    let aliases = import_aliases(&stmt.clause, &export_map)?;

    let mut host_rest = String::with_capacity(host.len());
    host_rest.push_str(&host[..char_to_byte(host, start)]);
    host_rest.push_str(&host[char_to_byte(host, stmt.end)..]);

    // a require of the inlined module would dangle
    if has_require_of(&host_rest, specifier) {
        return None;
    }

    // candidate names already used by the host collide, except the ones
    // the import itself bound; those now refer to the spliced declarations
    let bound = clause_locals(&stmt.clause);
    let idents = identifiers(&host_rest);
    for name in declared_names(&demoted) {
        if idents.contains(&name) && !bound.contains(&name) {
            return None;
        }
    }

    let mut merged = String::with_capacity(host.len() + demoted.len());
    merged.push_str(&host[..char_to_byte(host, start)]);
    merged.push_str(demoted.trim_end());
    merged.push('\n');
    merged.push_str(&aliases);
    merged.push_str(&host[char_to_byte(host, stmt.end)..]);
    Some(merged)
}

fn clause_locals(clause: &ImportClause) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    match clause {
        ImportClause::Bare => {}
        ImportClause::Namespace(ns) => {
            out.insert(ns.clone());
        }
        ImportClause::Named { default, names } => {
            if let Some(d) = default {
                out.insert(d.clone());
            }
            for (_, local) in names {
                out.insert(local.clone());
            }
        }
    }
    out
}

/// Top level consists only of declarations and module syntax
fn side_effect_free(source: &str) -> bool {
    let cs: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < cs.len() {
        let c = cs[i];
        if c.is_whitespace() || c == ';' {
            i += 1;
            continue;
        }
        if c == '/' && i + 1 < cs.len() && (cs[i + 1] == '/' || cs[i + 1] == '*') {
            i = comment_end(&cs, i);
            continue;
        }
        if !(c.is_alphabetic() || c == '_' || c == '$') {
            return false;
        }

        let end = word_end(&cs, i);
        let word: String = cs[i..end].iter().collect();
        match word.as_str() {
            "const" | "let" | "var" | "import" => i = statement_end(&cs, end),
            "function" | "class" => i = brace_span_end(&cs, end),
            "async" => {
                let j = skip_ws(&cs, end);
                let f_end = word_end(&cs, j);
                if cs[j..f_end].iter().collect::<String>() != "function" {
                    return false;
                }
                i = brace_span_end(&cs, f_end);
            }
            "export" => match parse_export(&cs, end) {
                Some(ParsedExport::Decl { stmt_end, .. }) => i = stmt_end,
                Some(ParsedExport::Default { stmt_end, .. }) => i = stmt_end,
                Some(ParsedExport::List { end, from, .. }) => {
                    // re-exports would need their own registry lookup
                    if from.is_some() {
                        return false;
                    }
                    i = end;
                }
                _ => return false,
            },
            _ => return false,
        }
    }
    true
}

/// Strip export keywords, binding every export to a plain local. Returns
/// the rewritten source and the exported-name to local-name map.
fn demote_exports(source: &str, suffix: &str) -> Option<(String, BTreeMap<String, String>)> {
    let cs: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut map = BTreeMap::new();
    let mut i = 0;

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
                match parse_export(&cs, end)? {
                    ParsedExport::Decl { name, decl_start, stmt_end } => {
                        out.extend(&cs[decl_start..stmt_end]);
                        map.insert(name.clone(), name);
                        i = stmt_end;
                        continue;
                    }
                    ParsedExport::Default { body_start, stmt_end } => {
                        let local = format!("__skein_default_{}__", suffix);
                        let body: String = cs[body_start..stmt_end].iter().collect();
                        out.push_str(&format!(
                            "var {} = {};",
                            local,
                            body.trim_end().trim_end_matches(';')
                        ));
                        map.insert("default".to_string(), local);
                        i = stmt_end;
                        continue;
                    }
                    ParsedExport::List { entries, end, from } => {
                        if from.is_some() {
                            return None;
                        }
                        for (local, exported) in entries {
                            map.insert(exported, local);
                        }
                        i = end;
                        continue;
                    }
                    ParsedExport::Star { .. } => return None,
                }
            }
            out.push_str(&word);
            i = end;
            continue;
        }
        out.push(c);
        i += 1;
    }

    Some((out, map))
}

/// Locate the static import of `specifier`; returns its keyword index and
/// the parsed statement
fn find_import(cs: &[char], specifier: &str) -> Option<(usize, ImportStmt)> {
    let mut i = 0;
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
        if c.is_alphabetic() || c == '_' || c == '$' {
            let end = word_end(cs, i);
            let word: String = cs[i..end].iter().collect();
            let after_dot = i > 0 && cs[i - 1] == '.';
            if word == "import" && !after_dot {
                if let Some(stmt) = parse_import(cs, i, end) {
                    if stmt.specifier == specifier {
                        return Some((i, stmt));
                    }
                    i = stmt.end;
                    continue;
                }
            }
            i = end;
            continue;
        }
        i += 1;
    }
    None
}

fn has_require_of(source: &str, specifier: &str) -> bool {
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
            if word == "require" && !after_dot {
                if let Some((spec, close)) = parse_require(&cs, end) {
                    if spec == specifier {
                        return true;
                    }
                    i = close;
                    continue;
                }
            }
            i = end;
            continue;
        }
        i += 1;
    }
    false
}

/// Alias declarations binding the host's imported names to the candidate's
/// demoted locals. None for clause shapes that need a namespace object.
fn import_aliases(clause: &ImportClause, map: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::new();
    match clause {
        ImportClause::Bare => {}
        ImportClause::Namespace(_) => return None,
        ImportClause::Named { default, names } => {
            if let Some(d) = default {
                let local = map.get("default")?;
                out.push_str(&format!("var {} = {};\n", d, local));
            }
            for (imported, local_name) in names {
                let source_local = map.get(imported)?;
                if local_name != source_local {
                    out.push_str(&format!("var {} = {};\n", local_name, source_local));
                }
            }
        }
    }
    Some(out)
}

fn char_to_byte(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}

/// Parsed static import statement
struct ImportStmt {
    clause: ImportClause,
    specifier: String,
    /// one past the statement (including a trailing semicolon)
    end: usize,
}

enum ImportClause {
    /// `import './x'`
    Bare,
    /// `import * as ns from './x'`
    Namespace(String),
    /// default and/or named bindings; names are (imported, local) pairs
    Named {
        default: Option<String>,
        names: Vec<(String, String)>,
    },
}

/// Parse the static import whose keyword spans `kw_start..kw_end`.
/// Returns None for dynamic imports and anything unrecognizable.
fn parse_import(cs: &[char], _kw_start: usize, kw_end: usize) -> Option<ImportStmt> {
    let j = skip_ws(cs, kw_end);
    if j >= cs.len() || cs[j] == '(' {
        return None;
    }

    if cs[j] == '"' || cs[j] == '\'' {
        let s_end = string_end(cs, j);
        let specifier = cs[j + 1..s_end - 1].iter().collect();
        return Some(ImportStmt {
            clause: ImportClause::Bare,
            specifier,
            end: consume_semicolon(cs, s_end),
        });
    }

    // scan ahead for the source string; the clause sits before `from`
    let mut q = j;
    while q < cs.len() && cs[q] != '"' && cs[q] != '\'' && cs[q] != ';' {
        q += 1;
    }
    if q >= cs.len() || cs[q] == ';' {
        return None;
    }
    let clause_text: String = cs[j..q].iter().collect();
    let clause_text = clause_text.trim();
    let clause_core = clause_text.strip_suffix("from")?.trim_end();

    let s_end = string_end(cs, q);
    let specifier = cs[q + 1..s_end - 1].iter().collect();
    let clause = parse_clause(clause_core)?;

    Some(ImportStmt {
        clause,
        specifier,
        end: consume_semicolon(cs, s_end),
    })
}

fn parse_clause(core: &str) -> Option<ImportClause> {
    if core.is_empty() {
        return None;
    }
    if let Some(rest) = core.trim().strip_prefix('*') {
        let ns = rest.trim().strip_prefix("as")?.trim();
        if ns.is_empty() {
            return None;
        }
        return Some(ImportClause::Namespace(ns.to_string()));
    }

    match core.split_once('{') {
        Some((default_part, rest)) => {
            let inner = rest.split('}').next()?;
            let default = {
                let d = default_part.trim().trim_end_matches(',').trim();
                (!d.is_empty()).then(|| d.to_string())
            };
            let mut names = Vec::new();
            for entry in inner.split(',') {
                let mut words = entry.split_whitespace();
                let Some(first) = words.next() else { continue };
                match (words.next(), words.next()) {
                    (Some("as"), Some(alias)) => {
                        names.push((first.to_string(), alias.to_string()))
                    }
                    (None, None) => names.push((first.to_string(), first.to_string())),
                    _ => return None,
                }
            }
            Some(ImportClause::Named { default, names })
        }
        None => Some(ImportClause::Named {
            default: Some(core.trim().to_string()),
            names: Vec::new(),
        }),
    }
}

fn consume_semicolon(cs: &[char], mut i: usize) -> usize {
    let mark = i;
    while i < cs.len() && (cs[i] == ' ' || cs[i] == '\t') {
        i += 1;
    }
    if i < cs.len() && cs[i] == ';' {
        i + 1
    } else {
        mark
    }
}

/// Parse `require('x')` starting right after the keyword; returns the
/// specifier and the index one past the closing paren
fn parse_require(cs: &[char], kw_end: usize) -> Option<(String, usize)> {
    let j = skip_ws(cs, kw_end);
    if cs.get(j) != Some(&'(') {
        return None;
    }
    let k = skip_ws(cs, j + 1);
    if k >= cs.len() || (cs[k] != '"' && cs[k] != '\'') {
        return None;
    }
    let s_end = string_end(cs, k);
    let specifier = cs[k + 1..s_end - 1].iter().collect();
    let close = skip_ws(cs, s_end);
    if cs.get(close) != Some(&')') {
        return None;
    }
    Some((specifier, close + 1))
}

/// Rewrite a module body from ES syntax to the registry convention
pub fn rewrite_es(source: &str, ids: &HashMap<String, String>, mode: Mode) -> String {
    let cs: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut temp = 0usize;
    let mut i = 0;

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

            if !after_dot && word == "import" {
                let j = skip_ws(&cs, end);
                if cs.get(j) == Some(&'(') {
                    if let Some((spec, close)) = dynamic_import_args(&cs, j) {
                        let id = resolve_id(ids, &spec);
                        match mode {
                            Mode::Production => {
                                out.push_str(&format!("__skein_import__(\"{}\")", id))
                            }
                            Mode::Development => out.push_str(&format!(
                                "Promise.resolve().then(function () {{ return require(\"{}\"); }})",
                                id
                            )),
                        }
                        i = close;
                        continue;
                    }
                } else if let Some(stmt) = parse_import(&cs, i, end) {
                    let id = resolve_id(ids, &stmt.specifier);
                    out.push_str(&emit_import_bindings(&stmt.clause, &id, &mut temp));
                    i = stmt.end;
                    continue;
                }
            }

            if !after_dot && word == "export" {
                if let Some(parsed) = parse_export(&cs, end) {
                    emit_export(&mut out, &cs, parsed, ids, &mut temp, &mut i);
                    continue;
                }
            }

            if !after_dot && word == "require" {
                if let Some((spec, close)) = parse_require(&cs, end) {
                    out.push_str(&format!("require(\"{}\")", resolve_id(ids, &spec)));
                    i = close;
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

    out
}

fn resolve_id(ids: &HashMap<String, String>, specifier: &str) -> String {
    ids.get(specifier).cloned().unwrap_or_else(|| specifier.to_string())
}

/// Parse `(` `'spec'` `)` of a dynamic import; literal arguments only
fn dynamic_import_args(cs: &[char], open: usize) -> Option<(String, usize)> {
    let k = skip_ws(cs, open + 1);
    if k >= cs.len() || (cs[k] != '"' && cs[k] != '\'' && cs[k] != '`') {
        return None;
    }
    let s_end = string_end(cs, k);
    let specifier = cs[k + 1..s_end - 1].iter().collect();
    let close = skip_ws(cs, s_end);
    if cs.get(close) != Some(&')') {
        return None;
    }
    Some((specifier, close + 1))
}

fn emit_import_bindings(clause: &ImportClause, id: &str, temp: &mut usize) -> String {
    match clause {
        ImportClause::Bare => format!("require(\"{}\");", id),
        ImportClause::Namespace(ns) => format!("var {} = require(\"{}\");", ns, id),
        ImportClause::Named { default, names } => {
            if default.is_none() && names.is_empty() {
                return format!("require(\"{}\");", id);
            }
            let t = format!("__skein_m{}__", temp);
            *temp += 1;
            let mut out = format!("var {} = require(\"{}\");", t, id);
            if let Some(d) = default {
                // asset and json modules export their value directly
                out.push_str(&format!(
                    " var {} = {t}[\"default\"] !== undefined ? {t}[\"default\"] : {t};",
                    d,
                    t = t
                ));
            }
            for (imported, local) in names {
                out.push_str(&format!(" var {} = {}[\"{}\"];", local, t, imported));
            }
            out
        }
    }
}

fn emit_export(
    out: &mut String,
    cs: &[char],
    parsed: ParsedExport,
    ids: &HashMap<String, String>,
    temp: &mut usize,
    i: &mut usize,
) {
    match parsed {
        ParsedExport::Decl { name, decl_start, stmt_end } => {
            out.extend(&cs[decl_start..stmt_end]);
            out.push_str(&format!("\nexports.{} = {};", name, name));
            *i = stmt_end;
        }
        ParsedExport::Default { body_start, stmt_end } => {
            let body: String = cs[body_start..stmt_end].iter().collect();
            if let Some(name) = named_decl(&body) {
                out.push_str(body.trim_end());
                out.push_str(&format!("\nexports[\"default\"] = {};", name));
            } else {
                out.push_str(&format!(
                    "exports[\"default\"] = {};",
                    body.trim_end().trim_end_matches(';')
                ));
            }
            *i = stmt_end;
        }
        ParsedExport::List { entries, end, from } => {
            match from {
                Some(spec) => {
                    let id = resolve_id(ids, &spec);
                    let t = format!("__skein_m{}__", temp);
                    *temp += 1;
                    out.push_str(&format!("var {} = require(\"{}\");", t, id));
                    for (local, exported) in entries {
                        out.push_str(&format!(
                            " exports.{} = {}[\"{}\"];",
                            exported, t, local
                        ));
                    }
                }
                None => {
                    let assignments: Vec<String> = entries
                        .iter()
                        .map(|(local, exported)| format!("exports.{} = {};", exported, local))
                        .collect();
                    out.push_str(&assignments.join(" "));
                }
            }
            *i = end;
        }
        ParsedExport::Star { alias, specifier, end } => {
            let id = resolve_id(ids, &specifier);
            match alias {
                Some(ns) => {
                    out.push_str(&format!("exports.{} = require(\"{}\");", ns, id));
                }
                None => {
                    let t = format!("__skein_m{}__", temp);
                    let k = format!("__skein_k{}__", temp);
                    *temp += 1;
                    out.push_str(&format!(
                        "var {t} = require(\"{id}\"); for (var {k} in {t}) {{ if ({k} !== \"default\") exports[{k}] = {t}[{k}]; }}",
                        t = t,
                        k = k,
                        id = id
                    ));
                }
            }
            *i = end;
        }
    }
}

/// Name of a function or class declaration, if the text is one
fn named_decl(body: &str) -> Option<String> {
    let mut words = body.split_whitespace();
    let mut first = words.next()?;
    if first == "async" {
        first = words.next()?;
    }
    if first != "function" && first != "class" {
        return None;
    }
    let next = words.next()?;
    let name: String = next
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    (!name.is_empty()).then_some(name)
}

/// Identifiers appearing anywhere outside strings and comments
fn identifiers(source: &str) -> BTreeSet<String> {
    let cs: Vec<char> = source.chars().collect();
    let mut out = BTreeSet::new();
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
            out.insert(cs[i..end].iter().collect());
            i = end;
            continue;
        }
        i += 1;
    }
    out
}

/// Top-level declared names plus import bindings
fn declared_names(source: &str) -> BTreeSet<String> {
    let mut out = super::treeshake::imported_bindings(source);
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
            if !after_dot
                && matches!(word.as_str(), "var" | "let" | "const" | "function" | "class")
            {
                let j = skip_ws(&cs, end);
                if j < cs.len() && (cs[j].is_alphabetic() || cs[j] == '_' || cs[j] == '$') {
                    let n_end = word_end(&cs, j);
                    out.insert(cs[j..n_end].iter().collect());
                }
            }
            i = end;
            continue;
        }
        i += 1;
    }
    out
}
