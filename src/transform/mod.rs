//! Transform chain execution
//!
//! A chain is an ordered list of stage names from the matched rules. Each
//! stage is a pure `content -> content` function that receives its owning
//! rule's opaque options table; what the table means is the stage's
//! business. Stages run strictly left to right and the first failure
//! aborts the chain, discarding partial output.

mod stages;

use crate::error::TransformError;

type StageFn = fn(&str, &toml::Table) -> Result<String, String>;

/// Built-in stage registry, looked up by name from rule configuration
const STAGES: &[(&str, StageFn)] = &[
    ("strip-types", stages::strip_types),
    ("lower", stages::lower),
    ("css", stages::css_prefix),
    ("style", stages::style_inject),
    ("json", stages::json_module),
];

/// Whether a stage name is known; checked at configuration load
pub fn stage_exists(name: &str) -> bool {
    STAGES.iter().any(|(n, _)| *n == name)
}

fn stage_fn(name: &str) -> Option<StageFn> {
    STAGES.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

/// Thread raw content through a matched chain. `chain` pairs each stage
/// name with the options table of the rule that contributed it.
pub fn execute(source: &str, chain: &[(&str, &toml::Table)]) -> Result<String, TransformError> {
    let mut content = source.to_string();

    for (name, options) in chain {
        let stage = stage_fn(name).ok_or_else(|| TransformError {
            stage: name.to_string(),
            cause: "unknown stage".to_string(),
        })?;

        content = stage(&content, options).map_err(|cause| TransformError {
            stage: name.to_string(),
            cause,
        })?;
    }

    Ok(content)
}
