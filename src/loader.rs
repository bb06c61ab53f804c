//! Cartridge loader — binds manifests to their executable entry points.
//!
//! Binding goes through the `CartridgeBinder` seam: resolve an entry-point
//! name to a callable, nothing more. The default `RegistryBinder` is a
//! compiled-in registry keyed by entry-point name, so loading a cartridge
//! never touches any process-wide search path.
//!
//! Discovery scans the immediate subdirectories of a cartridge root. A bad
//! manifest or unbound entry point in one subdirectory is recorded and
//! skipped; it never aborts discovery of siblings.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::envelope::Cartridge;
use crate::error::LoadError;
use crate::manifest::CartridgeManifest;

// ── Binder ──────────────────────────────────────────────────────────

/// Resolves an entry-point name to a callable cartridge.
pub trait CartridgeBinder: Send + Sync {
    fn bind(&self, entry_point: &str) -> Option<Arc<dyn Cartridge>>;
}

/// Compiled-in binder: entry-point name → cartridge instance.
#[derive(Default)]
pub struct RegistryBinder {
    entries: HashMap<String, Arc<dyn Cartridge>>,
}

impl RegistryBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cartridge under an entry-point name.
    pub fn register(&mut self, entry_point: impl Into<String>, cartridge: Arc<dyn Cartridge>) {
        let name = entry_point.into();
        debug!(entry_point = %name, "Registered cartridge entry point");
        self.entries.insert(name, cartridge);
    }

    /// Number of registered entry points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CartridgeBinder for RegistryBinder {
    fn bind(&self, entry_point: &str) -> Option<Arc<dyn Cartridge>> {
        self.entries.get(entry_point).cloned()
    }
}

// ── Loaded cartridge ────────────────────────────────────────────────

/// A manifest bound to its callable and source location.
///
/// Immutable after load; cloning shares the callable.
#[derive(Clone)]
pub struct LoadedCartridge {
    pub manifest: CartridgeManifest,
    pub callable: Arc<dyn Cartridge>,
    pub source: PathBuf,
}

impl LoadedCartridge {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }
}

impl fmt::Debug for LoadedCartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCartridge")
            .field("id", &self.manifest.id)
            .field("entry_point", &self.manifest.entry_point)
            .field("source", &self.source)
            .finish()
    }
}

/// A cartridge directory that failed to load, with the reason.
#[derive(Debug)]
pub struct LoadFailure {
    pub directory: PathBuf,
    pub error: LoadError,
}

// ── Loader ──────────────────────────────────────────────────────────

/// Reads manifests and binds them to callables through the binder seam.
pub struct Loader {
    binder: Arc<dyn CartridgeBinder>,
}

impl Loader {
    pub fn new(binder: Arc<dyn CartridgeBinder>) -> Self {
        Self { binder }
    }

    /// Load a single cartridge directory.
    pub async fn load_dir(&self, dir: &Path) -> Result<LoadedCartridge, LoadError> {
        let manifest = CartridgeManifest::from_dir(dir).await?;
        let callable =
            self.binder
                .bind(&manifest.entry_point)
                .ok_or_else(|| LoadError::EntryPoint {
                    id: manifest.id.clone(),
                    entry_point: manifest.entry_point.clone(),
                })?;
        Ok(LoadedCartridge {
            manifest,
            callable,
            source: dir.to_path_buf(),
        })
    }

    /// Discover all cartridges under a root directory.
    ///
    /// A nonexistent root is treated as empty. Failures are collected per
    /// subdirectory; siblings keep loading.
    pub async fn discover(&self, root: &Path) -> (Vec<LoadedCartridge>, Vec<LoadFailure>) {
        let mut loaded = Vec::new();
        let mut failures = Vec::new();

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(_) => {
                debug!(root = %root.display(), "Cartridge root missing or unreadable, skipping");
                return (loaded, failures);
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            match self.load_dir(&path).await {
                Ok(cartridge) => {
                    debug!(
                        cartridge = %cartridge.manifest.id,
                        source = %path.display(),
                        "Loaded cartridge"
                    );
                    loaded.push(cartridge);
                }
                Err(error) => {
                    warn!(
                        directory = %path.display(),
                        error = %error,
                        "Skipping cartridge directory that failed to load"
                    );
                    failures.push(LoadFailure {
                        directory: path,
                        error,
                    });
                }
            }
        }

        // Deterministic order regardless of directory iteration order.
        loaded.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
        (loaded, failures)
    }

    /// Discover domain- or platform-scoped cartridges.
    ///
    /// A `personal` cartridge may only run in the personal tier; one found
    /// here is rejected with a scope error and skipped.
    pub async fn discover_domain(&self, root: &Path) -> (Vec<LoadedCartridge>, Vec<LoadFailure>) {
        let (loaded, mut failures) = self.discover(root).await;
        let mut kept = Vec::new();
        for cartridge in loaded {
            if cartridge.manifest.personal {
                warn!(
                    cartridge = %cartridge.manifest.id,
                    "Rejecting personal cartridge outside the personal tier"
                );
                failures.push(LoadFailure {
                    directory: cartridge.source.clone(),
                    error: LoadError::Scope {
                        id: cartridge.manifest.id.clone(),
                        reason: "personal cartridge may only run in the personal tier"
                            .to_string(),
                    },
                });
            } else {
                kept.push(cartridge);
            }
        }
        (kept, failures)
    }

    /// Discover personal cartridges for one member.
    ///
    /// The leaf invariant is enforced here: a manifest with
    /// `personal != true` (or dependencies, already caught by manifest
    /// validation) is rejected with a scope error rather than silently
    /// ignored.
    pub async fn discover_personal(&self, root: &Path) -> (Vec<LoadedCartridge>, Vec<LoadFailure>) {
        let (loaded, mut failures) = self.discover(root).await;
        let mut personal = Vec::new();
        for cartridge in loaded {
            if !cartridge.manifest.personal {
                warn!(
                    cartridge = %cartridge.manifest.id,
                    "Rejecting non-personal cartridge in personal scope"
                );
                failures.push(LoadFailure {
                    directory: cartridge.source.clone(),
                    error: LoadError::Scope {
                        id: cartridge.manifest.id.clone(),
                        reason: "cartridge is not marked personal".to_string(),
                    },
                });
            } else {
                personal.push(cartridge);
            }
        }
        (personal, failures)
    }
}
