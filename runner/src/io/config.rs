//! Player configuration: host policies and sandbox limits.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::expr::Limits;

/// Player configuration (TOML).
///
/// Every field is optional; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Move to a step's `on_failure` target when it is not `#stay`.
    pub auto_navigate_on_failure: bool,

    /// Reject submissions once the countdown has expired.
    pub block_on_expiry: bool,

    /// Add a decoy palette entry to architecture steps that declare none.
    pub synthesize_decoys: bool,

    /// Expression sandbox limits.
    pub expression: Limits,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            auto_navigate_on_failure: true,
            block_on_expiry: false,
            synthesize_decoys: true,
            expression: Limits::default(),
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.expression.max_depth == 0 {
            return Err(anyhow!("expression.max_depth must be > 0"));
        }
        if self.expression.max_steps == 0 {
            return Err(anyhow!("expression.max_steps must be > 0"));
        }
        if self.expression.max_length == 0 {
            return Err(anyhow!("expression.max_length must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlayerConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlayerConfig> {
    if !path.exists() {
        return Ok(PlayerConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlayerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PlayerConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("player.toml");
        fs::write(&path, "block_on_expiry = true\n[expression]\nmax_steps = 50\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert!(cfg.block_on_expiry);
        assert!(cfg.auto_navigate_on_failure);
        assert_eq!(cfg.expression.max_steps, 50);
        assert_eq!(cfg.expression.max_depth, 64);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("player.toml");
        fs::write(&path, "[expression]\nmax_depth = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("max_depth"));
    }
}
