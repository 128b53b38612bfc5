//! JSON configuration

use crate::{AnomalyPolicy, DuressPolicy, LockPolicy, Result, StateLayout};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level vault configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Where persisted state lives
    pub layout: StateLayout,
    /// Anomaly detection thresholds
    pub anomaly: AnomalyPolicy,
    /// Failed-attempt wipe threshold
    pub duress: DuressPolicy,
    /// Lock persistence retry schedule
    pub lock: LockPolicy,
}

impl VaultConfig {
    /// Load from a JSON file; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON document
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.anomaly.validate()?;
        self.duress.validate()?;
        self.lock.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = VaultConfig::load(dir.path().join("nope.json")).unwrap();
        assert_eq!(config, VaultConfig::default());
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config = VaultConfig::from_json(
            r#"{ "duress": { "max_failed_attempts": 3 }, "layout": { "data_dir": "/var/lib/vg" } }"#,
        )
        .unwrap();
        assert_eq!(config.duress.max_failed_attempts, 3);
        assert_eq!(config.layout.data_dir, PathBuf::from("/var/lib/vg"));
        assert_eq!(config.layout.database_file, "vault.db");
        assert_eq!(config.anomaly, AnomalyPolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "lock": {{ "backoff_ms": [10, 20] }} }}"#).unwrap();
        let config = VaultConfig::load(file.path()).unwrap();
        assert_eq!(config.lock.backoff_ms, vec![10, 20]);
        assert_eq!(config.lock.shutdown_grace_ms, 1000);
    }

    #[test]
    fn test_malformed_or_invalid_config_rejected() {
        assert!(VaultConfig::from_json("{ not json").is_err());
        assert!(VaultConfig::from_json(r#"{ "lock": { "backoff_ms": [] } }"#).is_err());
    }
}
