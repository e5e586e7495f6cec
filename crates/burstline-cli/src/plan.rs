//! Plan loading shared by the commands.

use anyhow::{Context, Result};
use burstline_core::PlanConfig;
use std::path::Path;

/// Load and validate a plan from `path`, or from the default search path.
pub fn load(path: Option<&Path>) -> Result<PlanConfig> {
    let config = match path {
        Some(path) => PlanConfig::load_from(path)
            .with_context(|| format!("Failed to load plan {}", path.display()))?,
        None => PlanConfig::load().context("No plan given")?,
    };
    config.validate().context("Invalid plan")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_rejects_invalid_plan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, "chain:\n  blocks: []\n").unwrap();

        let err = load(Some(path.as_path())).unwrap_err();
        assert!(format!("{:#}", err).contains("chain.blocks is empty"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(load(Some(dir.path().join("absent.yaml").as_path())).is_err());
    }
}
