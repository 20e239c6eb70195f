//! Rule matching
//!
//! A rule pairs a path predicate with an ordered transform chain and an
//! output-kind declaration. Rules are compiled once from configuration and
//! never mutated during a build; matching evaluates every rule linearly in
//! declaration order.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;

use crate::config::{OutputKind, RuleConfig};

/// A compiled file-type rule
#[derive(Debug)]
pub struct Rule {
    /// Original pattern text, kept for diagnostics
    pub pattern: String,

    test: Regex,
    include: Option<Regex>,
    exclude: Option<Regex>,

    /// Ordered transform chain, applied left to right
    pub chain: Vec<String>,

    /// Output kind declared by this rule
    pub kind: OutputKind,

    /// Whether an asset match is eligible for data-URI inlining
    pub inline: bool,

    /// Opaque stage options (preset tables)
    pub options: toml::Table,
}

impl Rule {
    /// Compile a rule from its configuration form
    pub fn compile(cfg: &RuleConfig) -> Result<Self> {
        let test = Regex::new(&cfg.pattern)
            .with_context(|| format!("invalid rule pattern '{}'", cfg.pattern))?;
        let include = cfg
            .include
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("invalid include filter on rule '{}'", cfg.pattern))?;
        let exclude = cfg
            .exclude
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("invalid exclude filter on rule '{}'", cfg.pattern))?;

        Ok(Self {
            pattern: cfg.pattern.clone(),
            test,
            include,
            exclude,
            chain: cfg.chain.clone(),
            kind: cfg.kind,
            inline: cfg.inline,
            options: cfg.options.clone(),
        })
    }

    /// Whether this rule selects the given path. Exclude takes precedence
    /// over pattern and include.
    pub fn matches(&self, path: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(path) {
                return false;
            }
        }
        if !self.test.is_match(path) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(path),
            None => true,
        }
    }
}

/// The full ordered rule table
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

/// The combined outcome of every rule matching one path
#[derive(Debug)]
pub struct MatchedRules<'a> {
    /// Matching rules in declaration order
    pub rules: Vec<&'a Rule>,
}

impl<'a> MatchedRules<'a> {
    /// Concatenated transform chain in declaration order, with each
    /// stage paired with its owning rule's options table.
    pub fn chain(&self) -> Vec<(&'a str, &'a toml::Table)> {
        self.rules
            .iter()
            .flat_map(|r| r.chain.iter().map(move |s| (s.as_str(), &r.options)))
            .collect()
    }

    /// Effective output kind: the last matching rule decides, since later
    /// rules consume the output of earlier ones.
    pub fn kind(&self) -> OutputKind {
        self.rules.last().map(|r| r.kind).unwrap_or(OutputKind::Inline)
    }

    /// Whether the effective rule allows data-URI inlining
    pub fn inline_eligible(&self) -> bool {
        self.rules.last().map(|r| r.inline).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleSet {
    /// Compile every configured rule, preserving declaration order
    pub fn compile(configs: &[RuleConfig]) -> Result<Self> {
        let rules = configs.iter().map(Rule::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// All rules selecting `path`, in declaration order
    pub fn matching(&self, path: &Path) -> MatchedRules<'_> {
        let normalized = path.display().to_string().replace('\\', "/");
        MatchedRules {
            rules: self.rules.iter().filter(|r| r.matches(&normalized)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_rules;
    use std::path::PathBuf;

    fn rule_cfg(pattern: &str, exclude: Option<&str>, chain: &[&str]) -> RuleConfig {
        RuleConfig {
            pattern: pattern.to_string(),
            include: None,
            exclude: exclude.map(|s| s.to_string()),
            chain: chain.iter().map(|s| s.to_string()).collect(),
            kind: OutputKind::Inline,
            inline: false,
            options: toml::Table::new(),
        }
    }

    #[test]
    fn test_exclude_takes_precedence() {
        let set = RuleSet::compile(&[rule_cfg(r"\.js$", Some("node_modules"), &["lower"])]).unwrap();

        assert!(set.matching(&PathBuf::from("node_modules/dep/index.js")).is_empty());
        assert!(!set.matching(&PathBuf::from("src/app.js")).is_empty());
    }

    #[test]
    fn test_declaration_order_preserved() {
        let set = RuleSet::compile(&[
            rule_cfg(r"\.ts$", None, &["strip-types"]),
            rule_cfg(r"\.(ts|js)$", None, &["lower"]),
        ])
        .unwrap();

        let matched = set.matching(&PathBuf::from("src/app.ts"));
        let stages: Vec<&str> = matched.chain().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, vec!["strip-types", "lower"]);
    }

    #[test]
    fn test_zero_matches_is_not_an_error() {
        let set = RuleSet::compile(&default_rules()).unwrap();
        let matched = set.matching(&PathBuf::from("src/README.txt"));
        assert!(matched.is_empty());
        assert_eq!(matched.kind(), OutputKind::Inline);
    }

    #[test]
    fn test_last_matching_rule_decides_kind() {
        let mut asset = rule_cfg(r"\.svg$", None, &[]);
        asset.kind = OutputKind::Asset;
        asset.inline = true;

        let set = RuleSet::compile(&[rule_cfg(r"\.svg$", None, &[]), asset]).unwrap();
        let matched = set.matching(&PathBuf::from("img/logo.svg"));
        assert_eq!(matched.rules.len(), 2);
        assert_eq!(matched.kind(), OutputKind::Asset);
        assert!(matched.inline_eligible());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(RuleSet::compile(&[rule_cfg(r"(", None, &[])]).is_err());
    }
}
