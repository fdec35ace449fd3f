//! Replay scripts: a seed plus an ordered list of submissions (TOML).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    pub seed: String,
    #[serde(default, rename = "submission")]
    pub submissions: Vec<Submission>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    /// Select this step before submitting.
    #[serde(default)]
    pub step: Option<String>,
    /// Seconds to advance the countdown before submitting.
    #[serde(default)]
    pub tick: u64,
    pub payload: Value,
}

impl Script {
    pub fn validate(&self) -> Result<()> {
        if self.seed.trim().is_empty() {
            return Err(anyhow!("seed must be non-empty"));
        }
        Ok(())
    }
}

pub fn load_script(path: &Path) -> Result<Script> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read script {}", path.display()))?;
    let script: Script =
        toml::from_str(&contents).with_context(|| format!("parse script {}", path.display()))?;
    script.validate()?;
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_submissions_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("script.toml");
        fs::write(
            &path,
            r#"
seed = "learner-42"

[[submission]]
payload = "echo hi"

[[submission]]
step = "form"
tick = 30
payload = { cidr = "10.0.0.0/16", tags = ["a"] }
"#,
        )
        .expect("write");
        let script = load_script(&path).expect("load");
        assert_eq!(script.seed, "learner-42");
        assert_eq!(script.submissions.len(), 2);
        assert_eq!(script.submissions[0].payload, json!("echo hi"));
        assert_eq!(script.submissions[1].step.as_deref(), Some("form"));
        assert_eq!(script.submissions[1].tick, 30);
        assert_eq!(script.submissions[1].payload, json!({"cidr": "10.0.0.0/16", "tags": ["a"]}));
    }

    #[test]
    fn blank_seed_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("script.toml");
        fs::write(&path, "seed = \" \"\n").expect("write");
        assert!(load_script(&path).is_err());
    }
}
