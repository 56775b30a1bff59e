//! Delegate verdicts to an external command-line scanner such as `clamdscan`.

use crate::core::config::ExternalEngineConfig;
use crate::core::error::{Error, Result};
use crate::core::types::ThreatLevel;
use crate::detection::{Signature, SignatureDatabase};
use crate::scanner::container::{ContainerAnalyzer, ContainerMatch};
use std::path::{Path, PathBuf};
use std::process::Command;

const EXIT_CLEAN: i32 = 0;
const EXIT_INFECTED: i32 = 1;

/// Runs `program args... <file>` for every file that reaches the analyzer stage.
#[derive(Debug, Clone)]
pub struct ExternalEngineAnalyzer {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalEngineAnalyzer {
    /// Resolve the configured program. `None` if it is not installed.
    pub fn from_config(config: &ExternalEngineConfig) -> Option<Self> {
        let configured = config.program.trim();
        let program = resolve_program(configured)?;
        let name = Path::new(configured)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| configured.to_string());

        Some(Self {
            name,
            program,
            args: config.args.clone(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ContainerAnalyzer for ExternalEngineAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, _path: &Path) -> bool {
        true
    }

    fn analyze(&self, path: &Path, _db: &SignatureDatabase) -> Result<Option<ContainerMatch>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .map_err(|e| Error::external_engine(&self.name, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match output.status.code() {
            Some(EXIT_CLEAN) => Ok(None),
            Some(EXIT_INFECTED) => {
                let threat = parse_threat_name(&stdout).unwrap_or("Unknown");
                log::debug!("{} reported {} for {:?}", self.name, threat, path);
                let signature = Signature::new(threat, "External", ThreatLevel::High)
                    .with_description(stdout.trim())
                    .with_source(self.name.as_str());
                Ok(Some(ContainerMatch::external(signature)))
            }
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let status = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                Err(Error::external_engine(
                    &self.name,
                    format!("exit status {}: {}", status, stderr.trim()),
                ))
            }
        }
    }
}

/// Threat name from a `"<path>: <name> FOUND"` report line.
fn parse_threat_name(output: &str) -> Option<&str> {
    output
        .lines()
        .filter_map(|line| line.trim_end().strip_suffix("FOUND"))
        .filter_map(|rest| rest.rsplit_once(": ").map(|(_, name)| name.trim()))
        .find(|name| !name.is_empty())
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| {
            let plain = dir.join(program);
            let exe = dir.join(format!("{}.exe", program));
            [plain, exe]
        })
        .find(|path| path.is_file())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::types::{DetectionMethod, ScanStatus};
    use crate::core::Config;
    use crate::scanner::ScanEngine;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Runs `script` through `/bin/sh`, which receives the scanned path as `$1`.
    fn shell_engine(dir: &TempDir, script: &str) -> ExternalEngineConfig {
        let script_path = dir.path().join("engine.sh");
        std::fs::write(&script_path, script).unwrap();
        ExternalEngineConfig {
            enabled: true,
            program: "/bin/sh".to_string(),
            args: vec![script_path.to_string_lossy().into_owned()],
        }
    }

    fn sample(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("sample.txt");
        std::fs::write(&path, vec![b's'; 300]).unwrap();
        path
    }

    #[test]
    fn test_parse_threat_name() {
        assert_eq!(
            parse_threat_name("/tmp/a b: c.com: Eicar-Signature FOUND\n"),
            Some("Eicar-Signature")
        );
        assert_eq!(parse_threat_name("/tmp/x: OK\n"), None);
        assert_eq!(parse_threat_name(""), None);
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let config = ExternalEngineConfig {
            enabled: true,
            program: "veriscan-no-such-engine".to_string(),
            args: Vec::new(),
        };
        assert!(ExternalEngineAnalyzer::from_config(&config).is_none());

        let config = ExternalEngineConfig {
            program: "/no/such/dir/clamdscan".to_string(),
            ..config
        };
        assert!(ExternalEngineAnalyzer::from_config(&config).is_none());
    }

    #[test]
    fn test_exit_one_is_threat() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_engine(&dir, "echo \"$1: Eicar-Signature FOUND\"\nexit 1\n");
        let analyzer = ExternalEngineAnalyzer::from_config(&config).unwrap();
        assert_eq!(analyzer.name(), "sh");

        let db = SignatureDatabase::with_capacity(100, 0.01, 10);
        let found = analyzer.analyze(&sample(&dir), &db).unwrap().unwrap();
        assert_eq!(found.method, DetectionMethod::ExternalEngine);
        assert_eq!(found.signature.name, "Eicar-Signature");
        assert_eq!(found.signature.source, "sh");
        assert!(found.algorithm.is_none());
    }

    #[test]
    fn test_exit_zero_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_engine(&dir, "echo \"$1: OK\"\nexit 0\n");
        let analyzer = ExternalEngineAnalyzer::from_config(&config).unwrap();

        let db = SignatureDatabase::with_capacity(100, 0.01, 10);
        assert!(analyzer.analyze(&sample(&dir), &db).unwrap().is_none());
    }

    #[test]
    fn test_other_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_engine(&dir, "echo 'cannot connect to clamd' >&2\nexit 2\n");
        let analyzer = ExternalEngineAnalyzer::from_config(&config).unwrap();

        let db = SignatureDatabase::with_capacity(100, 0.01, 10);
        let err = analyzer.analyze(&sample(&dir), &db).unwrap_err();
        assert!(matches!(err, Error::ExternalEngine { .. }));
        assert!(err.to_string().contains("cannot connect"));
    }

    #[test]
    fn test_engine_reports_external_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.scan.external_engine = shell_engine(&dir, "echo \"$1: Win.Test FOUND\"\nexit 1\n");
        let db = Arc::new(SignatureDatabase::with_capacity(100, 0.01, 10));
        let engine = ScanEngine::new(&config, db).unwrap();

        let result = engine.scan_file(&sample(&dir));
        assert_eq!(result.status, ScanStatus::ThreatDetected);
        assert_eq!(result.method_label(), "External Engine Match");
        assert_eq!(result.threat_name(), Some("Win.Test"));
    }

    #[test]
    fn test_engine_failure_leaves_file_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.scan.external_engine = shell_engine(&dir, "exit 2\n");
        let db = Arc::new(SignatureDatabase::with_capacity(100, 0.01, 10));
        let engine = ScanEngine::new(&config, db).unwrap();

        assert_eq!(engine.scan_file(&sample(&dir)).status, ScanStatus::Clean);
    }
}
