//! Configuration for the archival service, read from a TOML file.
//!
//! ```toml
//! db_path = "/var/lib/shipments/archive.db"
//! default_page_size = 10
//! max_page_size = 100
//! audit_role = "client"
//!
//! [[client_redaction.keys_to_remove]]
//! path = "root"
//! fields = ["currentStatus"]
//! ```
use super::transform::TransformConfig;
use super::types::Role;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArchivalConfig {
    pub db_path: PathBuf,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Only actions by callers holding this role are audited
    pub audit_role: Role,
    /// Extra redaction merged on top of the fixed client redaction
    pub client_redaction: Option<TransformConfig>,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("shipment-archive.db"),
            default_page_size: 10,
            max_page_size: 100,
            audit_role: Role::Client,
            client_redaction: None,
        }
    }
}

impl ArchivalConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: ArchivalConfig = toml::from_str(raw).context("invalid archival config")?;
        if config.default_page_size == 0 || config.default_page_size > config.max_page_size {
            anyhow::bail!(
                "default_page_size must be between 1 and max_page_size ({})",
                config.max_page_size
            );
        }
        Ok(config)
    }

    pub fn open_db(&self) -> anyhow::Result<sled::Db> {
        sled::open(&self.db_path)
            .with_context(|| format!("failed to open database at {}", self.db_path.display()))
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<ArchivalConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    ArchivalConfig::from_toml_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ROOT;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ArchivalConfig::from_toml_str("").unwrap();
        assert_eq!(config, ArchivalConfig::default());
    }

    #[test]
    fn parses_extra_redaction() {
        let raw = r#"
            max_page_size = 50
            audit_role = "admin"

            [[client_redaction.keys_to_remove]]
            path = "root"
            fields = ["currentStatus"]

            [[client_redaction.keys_to_move]]
            from = "navRecord"
            to = "root"
        "#;

        let config = ArchivalConfig::from_toml_str(raw).unwrap();

        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.audit_role, Role::Admin);
        let extra = config.client_redaction.unwrap();
        assert_eq!(extra.fields_at(ROOT).unwrap(), &["currentStatus".to_string()]);
        assert_eq!(extra.moves().len(), 1);
    }

    #[test]
    fn rejects_default_page_size_above_max() {
        let raw = "default_page_size = 200\nmax_page_size = 100";
        assert!(ArchivalConfig::from_toml_str(raw).is_err());
    }
}
