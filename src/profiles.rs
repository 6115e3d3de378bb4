//! Named conversion profiles persisted to a JSON file.
//!
//! The store is a single JSON object mapping a profile name to its
//! settings. A missing or unparsable store lists as empty; saving always
//! rewrites the whole file.

use crate::artifacts::write_atomic;
use crate::error::Pdf2McqError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default store location, relative to the working directory.
pub const DEFAULT_PROFILE_FILE: &str = "config.json";

/// Saved inputs of a conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub pdf_path: String,
    #[serde(default)]
    pub md_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_page_markers: Option<bool>,
}

/// A JSON file of named [`Profile`]s.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All profiles. Unreadable stores read as empty.
    pub async fn load_all(&self) -> BTreeMap<String, Profile> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No profile store at {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Ignoring unparsable profile store {}: {}", self.path.display(), e);
            BTreeMap::new()
        })
    }

    /// Profile names in sorted order.
    pub async fn list(&self) -> Vec<String> {
        self.load_all().await.into_keys().collect()
    }

    pub async fn get(&self, name: &str) -> Option<Profile> {
        self.load_all().await.remove(name)
    }

    /// Insert or replace `name`.
    pub async fn save(&self, name: &str, profile: Profile) -> Result<(), Pdf2McqError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Pdf2McqError::ProfileStore {
                path: self.path.clone(),
                detail: "profile name must not be empty".into(),
            });
        }
        let mut all = self.load_all().await;
        all.insert(name.to_string(), profile);
        self.write(&all).await
    }

    /// Remove `name`. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, Pdf2McqError> {
        let mut all = self.load_all().await;
        if all.remove(name).is_none() {
            return Ok(false);
        }
        self.write(&all).await?;
        Ok(true)
    }

    async fn write(&self, all: &BTreeMap<String, Profile>) -> Result<(), Pdf2McqError> {
        let json = serde_json::to_string_pretty(all).map_err(|e| Pdf2McqError::ProfileStore {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;
        write_atomic(&self.path, json.as_bytes()).await
    }
}
