//! Deterministic seeded draw of per-session variable bindings.
//!
//! Every variable gets its own generator derived from `sha256(seed, name)`, so a
//! binding depends only on the seed, its name and its own spec. Adding a variable
//! never reshuffles the others.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::types::Vars;

/// Declared variable kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableSpec {
    /// Uniform pick among the listed values.
    Choice {
        #[serde(alias = "values")]
        choices: Vec<Value>,
    },
    /// Uniform integer in `[min, max]`.
    Number { min: i64, max: i64 },
    /// Any kind this interpreter does not know; never bound.
    #[serde(other)]
    Unknown,
}

/// Draw bindings for every declared variable.
///
/// Identical `seed` and `specs` always yield identical bindings. Unknown kinds
/// and empty choice lists produce no binding.
pub fn draw(specs: &BTreeMap<String, VariableSpec>, seed: &str) -> Vars {
    let mut vars = Vars::new();
    for (name, spec) in specs {
        match draw_one(spec, &mut rng_for(seed, name)) {
            Some(value) => {
                vars.insert(name.clone(), value);
            }
            None => debug!(variable = %name, "variable left unbound"),
        }
    }
    vars
}

fn draw_one(spec: &VariableSpec, rng: &mut StdRng) -> Option<Value> {
    match spec {
        VariableSpec::Choice { choices } => choices.choose(rng).cloned(),
        VariableSpec::Number { min, max } => {
            let (lo, hi) = if min <= max { (*min, *max) } else { (*max, *min) };
            Some(Value::from(rng.gen_range(lo..=hi)))
        }
        VariableSpec::Unknown => None,
    }
}

fn rng_for(seed: &str, name: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update([0u8]);
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    StdRng::from_seed(bytes)
}
