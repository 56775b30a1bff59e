//! Per-file scan outcome.

use crate::core::types::{DetectionMethod, DigestAlgorithm, ScanStatus};
use crate::detection::heuristic::HeuristicResult;
use crate::detection::signature::Signature;
use crate::scanner::container::ContainerMatch;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outcome of scanning one file. Built fresh for every scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// Scanned file
    pub path: PathBuf,
    /// Terminal status
    pub status: ScanStatus,
    /// Matched signature (only for `ThreatDetected`)
    pub signature: Option<Signature>,
    /// Digest algorithm that produced the match
    pub matched_algorithm: Option<DigestAlgorithm>,
    /// How the verdict was reached
    pub detection_method: Option<DetectionMethod>,
    /// Archive entry that matched, for container detections
    pub container_entry: Option<String>,
    /// Heuristic score (0 when heuristics did not run)
    pub heuristic_score: u32,
    /// Human-readable suspicion indicators
    pub indicators: Vec<String>,
    /// Failure or skip reason
    pub error_message: Option<String>,
    /// File size in bytes (0 if unknown)
    pub size: u64,
    /// Time spent on this file
    pub duration: Duration,
    /// When the scan finished
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    fn new(path: &Path, status: ScanStatus) -> Self {
        Self {
            path: path.to_path_buf(),
            status,
            signature: None,
            matched_algorithm: None,
            detection_method: None,
            container_entry: None,
            heuristic_score: 0,
            indicators: Vec::new(),
            error_message: None,
            size: 0,
            duration: Duration::ZERO,
            scanned_at: Utc::now(),
        }
    }

    pub fn clean(path: &Path, size: u64) -> Self {
        Self {
            size,
            ..Self::new(path, ScanStatus::Clean)
        }
    }

    /// Signature match on the file's own digests.
    pub fn threat(path: &Path, size: u64, algorithm: DigestAlgorithm, signature: Signature) -> Self {
        Self {
            size,
            signature: Some(signature),
            matched_algorithm: Some(algorithm),
            detection_method: Some(DetectionMethod::Signature),
            ..Self::new(path, ScanStatus::ThreatDetected)
        }
    }

    /// Threat reported by a registered analyzer.
    pub fn container_threat(path: &Path, size: u64, found: ContainerMatch) -> Self {
        let indicator = match &found.entry {
            Some(entry) => format!("Matched archive entry: {}", entry),
            None => format!("Reported by {}", found.signature.source),
        };
        Self {
            size,
            indicators: vec![indicator],
            container_entry: found.entry,
            matched_algorithm: found.algorithm,
            detection_method: Some(found.method),
            signature: Some(found.signature),
            ..Self::new(path, ScanStatus::ThreatDetected)
        }
    }

    pub fn suspicious(path: &Path, size: u64, heuristic: HeuristicResult) -> Self {
        Self {
            size,
            detection_method: Some(DetectionMethod::Heuristic),
            heuristic_score: heuristic.score,
            indicators: heuristic.indicators,
            ..Self::new(path, ScanStatus::Suspicious)
        }
    }

    pub fn error(path: &Path, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(path, ScanStatus::Error)
        }
    }

    pub fn skipped(path: &Path, size: u64, reason: impl Into<String>) -> Self {
        Self {
            size,
            error_message: Some(reason.into()),
            ..Self::new(path, ScanStatus::Skipped)
        }
    }

    /// Carry a below-threshold heuristic score on a clean result.
    pub fn with_heuristic(mut self, heuristic: HeuristicResult) -> Self {
        self.heuristic_score = heuristic.score;
        self.indicators = heuristic.indicators;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Threat name, when a signature matched.
    pub fn threat_name(&self) -> Option<&str> {
        self.signature.as_ref().map(|s| s.name.as_str())
    }

    /// Label of the detection method, empty when none applies.
    pub fn method_label(&self) -> &'static str {
        self.detection_method.map(|m| m.label()).unwrap_or_default()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

impl std::fmt::Display for ScanResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status, self.path.display())?;
        match self.status {
            ScanStatus::ThreatDetected => {
                if let Some(sig) = &self.signature {
                    write!(f, " - {} ({}, {})", sig.name, sig.threat_level, self.method_label())?;
                }
            }
            ScanStatus::Suspicious => {
                write!(f, " - score {}: {}", self.heuristic_score, self.indicators.join("; "))?;
            }
            ScanStatus::Error | ScanStatus::Skipped => {
                if let Some(message) = &self.error_message {
                    write!(f, " - {}", message)?;
                }
            }
            ScanStatus::Clean => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ThreatLevel;

    #[test]
    fn test_threat_result() {
        let sig = Signature::new("Trojan.Test", "Trojan", ThreatLevel::High);
        let result = ScanResult::threat(Path::new("/tmp/a.bin"), 10, DigestAlgorithm::Md5, sig);

        assert_eq!(result.status, ScanStatus::ThreatDetected);
        assert_eq!(result.method_label(), "Signature Match");
        assert_eq!(result.threat_name(), Some("Trojan.Test"));
        assert!(result.to_string().contains("Trojan.Test"));
    }

    #[test]
    fn test_container_threat_result() {
        let sig = Signature::new("Dropper.Zip", "Dropper", ThreatLevel::Critical);
        let result = ScanResult::container_threat(
            Path::new("/tmp/a.zip"),
            10,
            ContainerMatch::entry("payload.exe", DigestAlgorithm::Sha256, sig),
        );

        assert_eq!(result.status, ScanStatus::ThreatDetected);
        assert_eq!(result.method_label(), "Archive Content Match");
        assert_eq!(result.container_entry.as_deref(), Some("payload.exe"));
        assert_eq!(result.matched_algorithm, Some(DigestAlgorithm::Sha256));
    }

    #[test]
    fn test_external_engine_result() {
        let sig = Signature::new("Eicar-Signature", "External", ThreatLevel::High)
            .with_source("clamdscan");
        let result =
            ScanResult::container_threat(Path::new("/tmp/e.com"), 68, ContainerMatch::external(sig));

        assert_eq!(result.method_label(), "External Engine Match");
        assert_eq!(result.container_entry, None);
        assert_eq!(result.matched_algorithm, None);
        assert_eq!(result.indicators, vec!["Reported by clamdscan".to_string()]);
    }

    #[test]
    fn test_error_and_skip_results() {
        let err = ScanResult::error(Path::new("/missing"), "Path not found");
        assert_eq!(err.status, ScanStatus::Error);
        assert!(err.signature.is_none());
        assert_eq!(err.method_label(), "");

        let skipped = ScanResult::skipped(Path::new("/big"), 1 << 30, "too large");
        assert_eq!(skipped.status, ScanStatus::Skipped);
        assert_eq!(skipped.size, 1 << 30);
    }

    #[test]
    fn test_json_shape() {
        let result = ScanResult::clean(Path::new("/tmp/ok.txt"), 5);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "clean");
        assert_eq!(json["heuristic_score"], 0);
    }
}
