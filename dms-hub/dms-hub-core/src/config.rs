use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DmsResult;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DmsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    /// Documents of other institutions are never pushed to the index.
    #[serde(default = "default_institution")]
    pub institution: String,
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("index")
}

fn default_institution() -> String {
    "DMS".to_string()
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_dir: default_index_dir(),
            institution: default_institution(),
            redis_url: None,
        }
    }
}

impl DmsConfig {
    pub fn from_env() -> DmsResult<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from a variable lookup. `DMS_CONFIG`, when
    /// present, is a JSON document that replaces every other variable.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> DmsResult<Self> {
        if let Some(json) = lookup("DMS_CONFIG") {
            return Ok(serde_json::from_str(&json)?);
        }
        Ok(Self {
            data_dir: lookup("DMS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            index_dir: lookup("DMS_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_index_dir),
            institution: lookup("DMS_INSTITUTION_IDENTIFIER").unwrap_or_else(default_institution),
            redis_url: lookup("DMS_REDIS_URL").filter(|url| !url.is_empty()),
        })
    }
}
