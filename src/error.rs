//! Error types for the cartridge engine.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration section: {0}")]
    MissingSection(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discovery/load-time errors. Per-cartridge and non-fatal: a failure in one
/// cartridge directory never aborts discovery of its siblings.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Invalid manifest in {}: {reason}", dir.display())]
    Manifest { dir: PathBuf, reason: String },

    #[error("Entry point '{entry_point}' for cartridge {id} is not registered")]
    EntryPoint { id: String, entry_point: String },

    #[error("Scope violation for cartridge {id}: {reason}")]
    Scope { id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural errors from DAG resolution. Fatal to the owning domain's
/// pipeline only: the domain is disabled and everything else proceeds.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Dependency cycle in domain {domain}: {}", path.join(" -> "))]
    Cycle { domain: String, path: Vec<String> },

    #[error("Cartridge {cartridge} in domain {domain} depends on unknown cartridge {missing}")]
    Dependency {
        domain: String,
        cartridge: String,
        missing: String,
    },

    #[error("Duplicate cartridge id {id} in domain {domain}")]
    DuplicateId { domain: String, id: String },

    #[error("Cartridge {cartridge} is out of scope for domain {domain}: {reason}")]
    Scope {
        domain: String,
        cartridge: String,
        reason: String,
    },

    /// Reserved for a future strict mode. Output-slot collisions are
    /// currently logged as warnings, never raised.
    #[error("Output slot {slot} in domain {domain} is claimed by both {first} and {second}")]
    Conflict {
        domain: String,
        slot: String,
        first: String,
        second: String,
    },
}

/// Lifecycle operation errors. Returned synchronously to the caller; a
/// failed operation performs no partial filesystem mutation.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Operation '{operation}' on scope {scope} requires admin role")]
    Permission { operation: String, scope: String },

    #[error("Cartridge {id} not found in scope {scope} at {}", path.display())]
    NotFound {
        id: String,
        scope: String,
        path: PathBuf,
    },

    #[error("Illegal promotion: {from} -> {to} (only personal -> domain and domain -> platform)")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid cartridge manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single cartridge invocation at the call boundary.
///
/// Isolation is structural: the pipeline matches on this instead of relying
/// on a blanket catch-all, and a failure never escapes the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CartridgeError {
    #[error("Cartridge failed: {0}")]
    Failed(String),

    #[error("Cartridge timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
