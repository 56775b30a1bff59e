//! Error types and result handling for veriscan.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for veriscan operations.
#[derive(Error, Debug)]
pub enum Error {
    // ===== I/O Errors =====
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to access directory: {path}")]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Permission denied: {path}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ===== Configuration Errors =====
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    #[error("Invalid configuration value: {field} - {message}")]
    ConfigInvalid { field: String, message: String },

    // ===== Database Errors =====
    #[error("Signature database format error: {0}")]
    DatabaseFormat(String),

    #[error("Failed to load signature database: {path}")]
    DatabaseLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to save signature database: {path}")]
    DatabaseSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load signatures: {0}")]
    SignatureLoad(String),

    #[error("Database refresh failed: {0}")]
    RefreshFailed(String),

    // ===== Scanning Errors =====
    #[error("File too large to scan: {path} ({size} bytes, limit {limit})")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Digest computation failed: {path}")]
    DigestComputation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan already in progress")]
    ScanAlreadyInProgress,

    #[error("Archive analysis failed: {path}")]
    ArchiveError {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("External engine {engine} failed: {message}")]
    ExternalEngine { engine: String, message: String },

    // ===== Monitoring Errors =====
    #[error("Invalid monitor target: {0}")]
    InvalidMonitorTarget(PathBuf),

    #[error("Monitoring already active on: {0}")]
    AlreadyMonitoring(PathBuf),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    // ===== Concurrency Errors =====
    #[error("Worker pool is shut down: {context}")]
    PoolShutdown { context: String },

    // ===== Serialization Errors =====
    #[error("JSON serialization error")]
    JsonSerialize(#[from] serde_json::Error),

    // ===== Generic Errors =====
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a file read error, mapping permission failures to `PermissionDenied`.
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::PathNotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, source },
            _ => Self::FileRead { path, source },
        }
    }

    /// Create a file write error.
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a digest computation error (file vanished or became unreadable mid-read).
    pub fn digest(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DigestComputation {
            path: path.into(),
            source,
        }
    }

    /// Create a database format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::DatabaseFormat(message.into())
    }

    pub fn invalid_monitor_target(path: impl Into<PathBuf>) -> Self {
        Self::InvalidMonitorTarget(path.into())
    }

    pub fn external_engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalEngine {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (a batch can continue past it).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::FileRead { .. }
                | Error::PathNotFound(_)
                | Error::PermissionDenied { .. }
                | Error::FileTooLarge { .. }
                | Error::DigestComputation { .. }
                | Error::ArchiveError { .. }
                | Error::ExternalEngine { .. }
        )
    }

    /// Get a user-friendly suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::PermissionDenied { .. } => {
                Some("Try running with elevated privileges (sudo/administrator)")
            }
            Error::PathNotFound(_) => Some("Check that the path exists and is accessible"),
            Error::ConfigLoad(_) | Error::ConfigInvalid { .. } => {
                Some("Check your configuration file for syntax errors or missing fields")
            }
            Error::DatabaseFormat(_) | Error::DatabaseLoad { .. } => {
                Some("Re-import the signature feed to rebuild the database file")
            }
            Error::ScanAlreadyInProgress => Some("Wait for the running scan or stop it first"),
            Error::InvalidMonitorTarget(_) => Some("Pass an existing directory to monitor"),
            Error::ExternalEngine { .. } => {
                Some("Check that the external scanner is installed and its daemon is running")
            }
            _ => None,
        }
    }

    /// Get the error category for logging.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::FileRead { .. }
            | Error::FileWrite { .. }
            | Error::DirectoryAccess { .. }
            | Error::PathNotFound(_)
            | Error::PermissionDenied { .. }
            | Error::Io(_) => ErrorCategory::Io,

            Error::ConfigLoad(_) | Error::ConfigSave(_) | Error::ConfigInvalid { .. } => {
                ErrorCategory::Configuration
            }

            Error::DatabaseFormat(_)
            | Error::DatabaseLoad { .. }
            | Error::DatabaseSave { .. }
            | Error::SignatureLoad(_)
            | Error::RefreshFailed(_) => ErrorCategory::Database,

            Error::FileTooLarge { .. }
            | Error::DigestComputation { .. }
            | Error::ScanAlreadyInProgress
            | Error::ArchiveError { .. }
            | Error::ExternalEngine { .. } => ErrorCategory::Scanning,

            Error::InvalidMonitorTarget(_) | Error::AlreadyMonitoring(_) | Error::Watch(_) => {
                ErrorCategory::Monitoring
            }

            Error::PoolShutdown { .. } => ErrorCategory::Concurrency,

            Error::JsonSerialize(_) => ErrorCategory::Serialization,

            Error::Internal(_) | Error::Other(_) => ErrorCategory::Other,
        }
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Io,
    Configuration,
    Database,
    Scanning,
    Monitoring,
    Concurrency,
    Serialization,
    Other,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io => write!(f, "I/O"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Database => write!(f, "Database"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Monitoring => write!(f, "Monitoring"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Serialization => write!(f, "Serialization"),
            Self::Other => write!(f, "Other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PathNotFound(PathBuf::from("/test/path"));
        assert_eq!(err.to_string(), "Path not found: /test/path");
    }

    #[test]
    fn test_file_read_classifies_io_kind() {
        let err = Error::file_read(
            "/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, Error::PathNotFound(_)));

        let err = Error::file_read(
            "/locked",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[test]
    fn test_recoverable_errors() {
        let err = Error::FileTooLarge {
            path: "/big".into(),
            size: 10,
            limit: 5,
        };
        assert!(err.is_recoverable());
        assert!(!Error::ScanAlreadyInProgress.is_recoverable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::InvalidMonitorTarget("/x".into()).category(),
            ErrorCategory::Monitoring
        );
        assert_eq!(Error::format("bad magic").category(), ErrorCategory::Database);
        assert_eq!(ErrorCategory::Io.to_string(), "I/O");
    }
}
