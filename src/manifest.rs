//! Cartridge manifest — declared metadata read from each cartridge directory.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Manifest file name inside every cartridge directory.
pub const MANIFEST_FILE: &str = "cartridge.json";

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_entry_point() -> String {
    "cartridge".to_string()
}

/// Declared metadata for one cartridge.
///
/// `id` is unique within a domain. `domain_affinity` empty means the
/// cartridge may run in any domain. A `personal` cartridge is leaf-only:
/// it must not declare dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartridgeManifest {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub domain_affinity: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub output_slots: Vec<String>,
    #[serde(default)]
    pub personal: bool,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

impl CartridgeManifest {
    /// Parse a manifest from raw JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Read and parse `cartridge.json` from a cartridge directory.
    pub async fn from_dir(dir: &Path) -> Result<Self, LoadError> {
        let path = dir.join(MANIFEST_FILE);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LoadError::Manifest {
                dir: dir.to_path_buf(),
                reason: format!("cannot read {}: {}", MANIFEST_FILE, e),
            })?;
        let manifest = Self::from_json(&raw).map_err(|e| LoadError::Manifest {
            dir: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        manifest.validate().map_err(|e| match e {
            LoadError::Manifest { reason, .. } => LoadError::Manifest {
                dir: dir.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        Ok(manifest)
    }

    /// Structural validation, applied at load time.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.id.trim().is_empty() {
            return Err(LoadError::Manifest {
                dir: Default::default(),
                reason: "manifest id must not be empty".to_string(),
            });
        }
        // Personal cartridges are leaf-only.
        if self.personal && !self.depends_on.is_empty() {
            return Err(LoadError::Scope {
                id: self.id.clone(),
                reason: format!(
                    "personal cartridge declares dependencies: {}",
                    self.depends_on.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Whether this cartridge may run in the given domain.
    pub fn runs_in(&self, domain: &str) -> bool {
        self.domain_affinity.is_empty() || self.domain_affinity.iter().any(|d| d == domain)
    }
}
