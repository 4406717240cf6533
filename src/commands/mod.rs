//! CLI subcommand implementations.

pub mod install;
pub mod plan;

use anyhow::Result;
use gantry::{ModuleSpec, SpecInput};

/// Normalize the CLI's module arguments into specs.
pub(crate) fn normalize_specs(raw: &[String]) -> Result<Vec<ModuleSpec>> {
    raw.iter()
        .map(|literal| {
            SpecInput::Literal(literal.clone())
                .normalize()
                .map_err(Into::into)
        })
        .collect()
}
