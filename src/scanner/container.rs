//! Pluggable analyzers that look inside container files.

use crate::core::error::Result;
use crate::core::types::{DetectionMethod, DigestAlgorithm};
use crate::detection::{Signature, SignatureDatabase};
use std::path::Path;

/// A detection made by an analyzer.
#[derive(Debug, Clone)]
pub struct ContainerMatch {
    /// Entry name inside the container, for entry-level matches
    pub entry: Option<String>,
    /// Digest that matched, when the verdict came from the signature store
    pub algorithm: Option<DigestAlgorithm>,
    pub method: DetectionMethod,
    pub signature: Signature,
}

impl ContainerMatch {
    /// A signature match on one entry inside a container.
    pub fn entry(entry: impl Into<String>, algorithm: DigestAlgorithm, signature: Signature) -> Self {
        Self {
            entry: Some(entry.into()),
            algorithm: Some(algorithm),
            method: DetectionMethod::Archive,
            signature,
        }
    }

    /// A verdict reported by an external scanning engine.
    pub fn external(signature: Signature) -> Self {
        Self {
            entry: None,
            algorithm: None,
            method: DetectionMethod::ExternalEngine,
            signature,
        }
    }
}

/// Runs after a file passes the signature and heuristic stages.
///
/// Analyzers are shared across scan workers. Besides container formats this
/// seam also hosts delegates to external engines.
pub trait ContainerAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this analyzer understands the file at `path`.
    fn handles(&self, path: &Path) -> bool;

    /// Check the container's entries against the signature store.
    /// Returns the first matching entry.
    fn analyze(&self, path: &Path, db: &SignatureDatabase) -> Result<Option<ContainerMatch>>;
}
