//! Host configuration, loadable from TOML.

use std::path::Path;

use guest_vm::runtime::MAX_TABLE_ELEMS;
use guest_vm::Pricing;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Upper bound on a guest memory's size, in 64 KiB pages.
    #[serde(default = "default_heap_bound_pages")]
    pub heap_bound_pages: u32,
    /// Upper bound on a guest table's size, in elements.
    #[serde(default = "default_table_bound_elems")]
    pub table_bound_elems: u32,
    /// Exports named `<entry_prefix><n>` become entry point `n`.
    #[serde(default = "default_entry_prefix")]
    pub entry_prefix: String,
    /// Export name given to a program's start function.
    #[serde(default = "default_start_export")]
    pub start_export: String,
    #[serde(default)]
    pub pricing: Pricing,
}

fn default_heap_bound_pages() -> u32 {
    128
}

fn default_table_bound_elems() -> u32 {
    4096
}

fn default_entry_prefix() -> String {
    "entry_".to_string()
}

fn default_start_export() -> String {
    "guest_start".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            heap_bound_pages: default_heap_bound_pages(),
            table_bound_elems: default_table_bound_elems(),
            entry_prefix: default_entry_prefix(),
            start_export: default_start_export(),
            pricing: Pricing::default(),
        }
    }
}

impl HostConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "entry_prefix",
                reason: "must not be empty".into(),
            });
        }
        if self.start_export.starts_with(&self.entry_prefix) {
            return Err(ConfigError::InvalidValue {
                key: "start_export",
                reason: format!("must not start with the entry prefix {:?}", self.entry_prefix),
            });
        }
        if self.heap_bound_pages > 65_536 {
            return Err(ConfigError::InvalidValue {
                key: "heap_bound_pages",
                reason: format!("{} exceeds the 65536 page address space", self.heap_bound_pages),
            });
        }
        if self.table_bound_elems > MAX_TABLE_ELEMS {
            return Err(ConfigError::InvalidValue {
                key: "table_bound_elems",
                reason: format!("{} exceeds {MAX_TABLE_ELEMS}", self.table_bound_elems),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = HostConfig::from_toml_str("").unwrap();
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.heap_bound_pages, 128);
        assert_eq!(config.pricing.memory_grow, 100);
    }

    #[test]
    fn partial_pricing_keeps_other_defaults() {
        let config = HostConfig::from_toml_str(
            r#"
            entry_prefix = "call_"

            [pricing]
            call = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.entry_prefix, "call_");
        assert_eq!(config.pricing.call, 9);
        assert_eq!(config.pricing.base, 1);
    }

    #[test]
    fn table_bound_is_capped() {
        assert_eq!(HostConfig::default().table_bound_elems, 4096);
        let err = HostConfig::from_toml_str("table_bound_elems = 4294967295").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "table_bound_elems", .. }));
    }

    #[test]
    fn start_export_may_not_look_like_an_entry() {
        let err = HostConfig::from_toml_str(r#"start_export = "entry_0""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "start_export", .. }));
    }
}
