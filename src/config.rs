// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Runtime knobs of a [`crate::DataHandler`] and its journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    pub journal: JournalConfig,
    pub lock: LockConfig,
    pub tables: TableConfig,
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct JournalConfig {
    /// Entries per journal page before a new page opens.
    pub page_capacity: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { page_capacity: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LockConfig {
    /// TTL applied to lock requests that do not ask for a positive one.
    pub max_ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { max_ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TableConfig {
    pub data: String,
    pub journal: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            data: "data".to_string(),
            journal: "journal".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SchemaConfig {
    /// Separator between type and version in archived schema ids.
    pub archive_divider: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            archive_divider: crate::schema::ARCHIVE_DIVIDER.to_string(),
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Config> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Config> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
