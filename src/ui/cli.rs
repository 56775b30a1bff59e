//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// veriscan: on-device malware detection engine
#[derive(Parser, Debug)]
#[command(name = "veriscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Signature database file (overrides the configured location)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan files and directories
    Scan {
        /// Files or directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Do not follow symbolic links while walking directories
        #[arg(long)]
        no_follow: bool,
    },

    /// Watch a directory and scan files as they change
    Watch {
        /// Directory to monitor
        directory: PathBuf,
    },

    /// Manage the signature database
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show application information
    Info,
}

/// Signature database subcommands.
#[derive(Subcommand, Debug)]
pub enum DbAction {
    /// Import a JSON signature feed and save the database
    Import {
        /// Feed file
        feed: PathBuf,
    },

    /// Show database statistics
    Stats,

    /// Look up a hex digest
    Check {
        /// Hex digest
        digest: String,

        /// Digest algorithm (md5, sha1, sha256, sha512); guessed from length if omitted
        #[arg(short, long)]
        algorithm: Option<String>,
    },

    /// Malicious domain list
    Domain {
        #[command(subcommand)]
        action: DomainAction,
    },
}

/// Domain subcommands.
#[derive(Subcommand, Debug)]
pub enum DomainAction {
    /// Add a domain and save the database
    Add { domain: String },

    /// Check whether a domain is listed
    Check { domain: String },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print configuration file location
    Path,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan() {
        let cli = Cli::parse_from(["veriscan", "--format", "json", "scan", "/tmp/a", "/tmp/b"]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Some(Commands::Scan { paths, no_follow }) => {
                assert_eq!(paths.len(), 2);
                assert!(!no_follow);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_db_check() {
        let cli = Cli::parse_from([
            "veriscan",
            "--database",
            "/tmp/sigs.sgdb",
            "db",
            "check",
            "abc",
            "--algorithm",
            "md5",
        ]);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/sigs.sgdb")));
        assert!(matches!(
            cli.command,
            Some(Commands::Db {
                action: DbAction::Check { .. }
            })
        ));
    }

    #[test]
    fn test_scan_requires_paths() {
        assert!(Cli::try_parse_from(["veriscan", "scan"]).is_err());
    }
}
