//! Label-id to human-readable class name mapping.
//!
//! The mapping is the pickled `{int: str}` dictionary published alongside the
//! ImageNet 1000 class list. It can be cached as `labels.json` next to the
//! data so later runs stay offline.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_pickle::{DeOptions, HashableValue, Value};
use tracing::{debug, info};

use crate::utils::error::{AlexNetError, Result};

/// Source of the pickled mapping
pub const LABELS_URL: &str = "https://gist.githubusercontent.com/yrevar/6135f1bd8dcf2e0cc683/raw/d133d61a09d7e5a3b36b8c111a8dd5c4b5d560ee/imagenet1000_clsid_to_human.pkl";

/// Cache file name inside the data directory
pub const LABELS_CACHE_FILE: &str = "labels.json";

/// Ordered mapping `label id -> class name`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelMap {
    names: BTreeMap<usize, String>,
}

impl LabelMap {
    pub fn new(names: BTreeMap<usize, String>) -> Self {
        Self { names }
    }

    /// Decode a pickled `{int: str}` dictionary
    pub fn from_pickle(bytes: &[u8]) -> Result<Self> {
        let value = serde_pickle::value_from_slice(bytes, DeOptions::new())
            .map_err(|e| AlexNetError::Labels(format!("failed to unpickle mapping: {}", e)))?;

        let dict = match value {
            Value::Dict(dict) => dict,
            other => {
                return Err(AlexNetError::Labels(format!(
                    "expected a dictionary, got {:?}",
                    other
                )))
            }
        };

        let mut names = BTreeMap::new();
        for (key, value) in dict {
            let id = match key {
                HashableValue::I64(i) if i >= 0 => i as usize,
                other => {
                    return Err(AlexNetError::Labels(format!(
                        "expected a non-negative integer key, got {:?}",
                        other
                    )))
                }
            };
            let name = match value {
                Value::String(s) => s,
                Value::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
                other => {
                    return Err(AlexNetError::Labels(format!(
                        "expected a string name for label {}, got {:?}",
                        id, other
                    )))
                }
            };
            names.insert(id, name);
        }

        Ok(Self { names })
    }

    /// Download and decode the mapping from `url`
    pub fn fetch(url: &str) -> Result<Self> {
        info!("Downloading label names from {}", url);

        let response = reqwest::blocking::get(url)
            .and_then(|r| r.error_for_status())
            .map_err(|e| AlexNetError::Labels(format!("failed to download: {}", e)))?;
        let bytes = response
            .bytes()
            .map_err(|e| AlexNetError::Labels(format!("failed to read response: {}", e)))?;

        Self::from_pickle(&bytes)
    }

    /// Read `labels.json` from `cache_dir`, or fetch and write it
    pub fn load_or_fetch<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let cache = cache_dir.as_ref().join(LABELS_CACHE_FILE);

        if cache.is_file() {
            debug!("Reading cached label names from {:?}", cache);
            let json = std::fs::read_to_string(&cache)?;
            return Ok(serde_json::from_str(&json)?);
        }

        let labels = Self::fetch(LABELS_URL)?;
        if let Some(parent) = cache.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&cache, serde_json::to_string_pretty(&labels)?)?;
        info!("Cached {} label names at {:?}", labels.len(), cache);

        Ok(labels)
    }

    pub fn name(&self, label: usize) -> Option<&str> {
        self.names.get(&label).map(String::as_str)
    }

    /// Name of `label`, or its number when unknown
    pub fn display_name(&self, label: usize) -> String {
        self.name(label)
            .map(str::to_string)
            .unwrap_or_else(|| label.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }
}

/// Download the ImageNet label-id to name mapping
pub fn load_labelid_to_names() -> Result<LabelMap> {
    LabelMap::fetch(LABELS_URL)
}
