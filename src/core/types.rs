//! Core type definitions used throughout veriscan.

use serde::{Deserialize, Serialize};

/// Digest algorithms computed for every scanned file.
///
/// Declaration order is the signature-check priority: the first algorithm whose
/// filter and exact index both confirm a match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// All algorithms, in signature-check priority order.
    pub const ALL: [DigestAlgorithm; 4] = [
        DigestAlgorithm::Md5,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha512,
    ];

    /// Length of the lowercase hex encoding of this digest.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        }
    }

    /// Stable slot index, used for per-algorithm tables and the on-disk layout.
    pub fn index(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 0,
            DigestAlgorithm::Sha1 => 1,
            DigestAlgorithm::Sha256 => 2,
            DigestAlgorithm::Sha512 => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "").as_str() {
            "md5" => Some(DigestAlgorithm::Md5),
            "sha1" => Some(DigestAlgorithm::Sha1),
            "sha256" => Some(DigestAlgorithm::Sha256),
            "sha512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Guess the algorithm from the length of a hex digest.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.hex_len() == len)
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestAlgorithm::Md5 => write!(f, "MD5"),
            DigestAlgorithm::Sha1 => write!(f, "SHA-1"),
            DigestAlgorithm::Sha256 => write!(f, "SHA-256"),
            DigestAlgorithm::Sha512 => write!(f, "SHA-512"),
        }
    }
}

/// Threat level of a known signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    /// Potentially unwanted but not necessarily malicious
    Low,
    /// Suspicious behavior
    Medium,
    /// Likely malicious
    High,
    /// Confirmed, actively harmful malware
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(ThreatLevel::Low),
            "medium" => Some(ThreatLevel::Medium),
            "high" => Some(ThreatLevel::High),
            "critical" => Some(ThreatLevel::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatLevel::Low => write!(f, "LOW"),
            ThreatLevel::Medium => write!(f, "MEDIUM"),
            ThreatLevel::High => write!(f, "HIGH"),
            ThreatLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Terminal status of a single file scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// No signature match and heuristic score at or below threshold
    Clean,
    /// Digest matched a known signature
    ThreatDetected,
    /// Heuristic score above threshold
    Suspicious,
    /// File missing, unreadable, or failed mid-read
    Error,
    /// File exceeded the size limit
    Skipped,
}

impl ScanStatus {
    /// Whether listeners should be told about this result as a threat.
    pub fn is_threat(&self) -> bool {
        matches!(self, ScanStatus::ThreatDetected | ScanStatus::Suspicious)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStatus::Clean => write!(f, "CLEAN"),
            ScanStatus::ThreatDetected => write!(f, "THREAT_DETECTED"),
            ScanStatus::Suspicious => write!(f, "SUSPICIOUS"),
            ScanStatus::Error => write!(f, "ERROR"),
            ScanStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// How a result was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Digest matched the signature database
    Signature,
    /// Heuristic scoring
    Heuristic,
    /// Digest of an entry inside a container matched
    Archive,
    /// An external scanning engine reported the file
    ExternalEngine,
}

impl DetectionMethod {
    /// Human-readable label attached to scan results.
    pub fn label(&self) -> &'static str {
        match self {
            DetectionMethod::Signature => "Signature Match",
            DetectionMethod::Heuristic => "Heuristic Analysis",
            DetectionMethod::Archive => "Archive Content Match",
            DetectionMethod::ExternalEngine => "External Engine Match",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
