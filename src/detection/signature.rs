//! Signature types and the JSON signature feed format.

use crate::core::error::{Error, Result};
use crate::core::types::{DigestAlgorithm, ThreatLevel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A known-malware signature.
///
/// Any subset of the digests may be present. Digests are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// MD5 digest (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// SHA-1 digest (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    /// SHA-256 digest (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// SHA-512 digest (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    /// Malware name (e.g., "Trojan.Downloader.Agent")
    pub name: String,
    /// Malware family
    #[serde(default)]
    pub family: String,
    /// Threat level
    pub threat_level: ThreatLevel,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Attribution (e.g., "ClamAV")
    #[serde(default)]
    pub source: String,
}

impl Signature {
    /// Create a signature with no digests attached.
    pub fn new(
        name: impl Into<String>,
        family: impl Into<String>,
        threat_level: ThreatLevel,
    ) -> Self {
        Self {
            md5: None,
            sha1: None,
            sha256: None,
            sha512: None,
            name: name.into(),
            family: family.into(),
            threat_level,
            description: String::new(),
            source: String::new(),
        }
    }

    /// Attach a digest for the given algorithm.
    pub fn with_digest(mut self, algorithm: DigestAlgorithm, digest: impl Into<String>) -> Self {
        let digest = Some(normalize_digest(&digest.into()));
        match algorithm {
            DigestAlgorithm::Md5 => self.md5 = digest,
            DigestAlgorithm::Sha1 => self.sha1 = digest,
            DigestAlgorithm::Sha256 => self.sha256 = digest,
            DigestAlgorithm::Sha512 => self.sha512 = digest,
        }
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the attribution source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Non-empty digest for an algorithm, if present.
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        let digest = match algorithm {
            DigestAlgorithm::Md5 => self.md5.as_deref(),
            DigestAlgorithm::Sha1 => self.sha1.as_deref(),
            DigestAlgorithm::Sha256 => self.sha256.as_deref(),
            DigestAlgorithm::Sha512 => self.sha512.as_deref(),
        };
        digest.map(str::trim).filter(|d| !d.is_empty())
    }

    /// Trim and lowercase every digest. Feeds may carry uppercase hex.
    pub fn normalized(mut self) -> Self {
        for digest in [&mut self.md5, &mut self.sha1, &mut self.sha256, &mut self.sha512] {
            if let Some(d) = digest.as_mut() {
                *d = normalize_digest(d);
            }
        }
        self
    }

    /// Whether the signature carries at least one digest.
    pub fn has_digests(&self) -> bool {
        DigestAlgorithm::ALL.iter().any(|a| self.digest(*a).is_some())
    }
}

pub(crate) fn normalize_digest(digest: &str) -> String {
    digest.trim().to_ascii_lowercase()
}

/// Signature feed file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureFeed {
    /// Feed version (e.g., "2026.10.01")
    pub version: String,
    /// Default attribution for signatures that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Signatures
    #[serde(default)]
    pub signatures: Vec<Signature>,
    /// Malicious domains
    #[serde(default)]
    pub domains: Vec<String>,
}

impl SignatureFeed {
    /// Create a new empty feed.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            source: None,
            signatures: Vec::new(),
            domains: Vec::new(),
        }
    }

    /// Load a feed from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::SignatureLoad(format!("Failed to parse signature feed {:?}: {}", path, e))
        })
    }

    /// Save the feed to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::file_write(path, e))?;
        }
        std::fs::write(path, contents).map_err(|e| Error::file_write(path, e))
    }

    /// Add a signature.
    pub fn add(&mut self, sig: Signature) {
        self.signatures.push(sig);
    }
}
