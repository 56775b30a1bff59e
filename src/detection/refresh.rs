//! Database refresh hook.
//!
//! Fetching new signature data is someone else's job; the store only needs
//! to be told the target directory has been refreshed so it can reload.

use crate::core::error::{Error, Result};
use crate::detection::database::SignatureDatabase;
use std::path::{Path, PathBuf};

/// Database file extension recognised by the reload step.
pub const DATABASE_EXTENSION: &str = "sgdb";
/// Signature feed extension recognised by the reload step.
pub const FEED_EXTENSION: &str = "json";

/// Populates or refreshes signature files in a directory.
pub trait DatabaseRefresher: Send + Sync {
    fn refresh(&self, target_dir: &Path) -> Result<()>;
}

impl<F> DatabaseRefresher for F
where
    F: Fn(&Path) -> Result<()> + Send + Sync,
{
    fn refresh(&self, target_dir: &Path) -> Result<()> {
        self(target_dir)
    }
}

/// What a reload picked up.
#[derive(Debug, Default, Clone)]
pub struct ReloadSummary {
    pub databases_loaded: Vec<PathBuf>,
    pub feeds_imported: Vec<PathBuf>,
    pub signatures_imported: usize,
}

/// Run the refresher, then reload everything it left in `target_dir`.
///
/// Database files are loaded first (each replaces the store's state, so the
/// last one in name order wins), then every feed is imported on top.
pub fn refresh_and_reload(
    refresher: &dyn DatabaseRefresher,
    target_dir: &Path,
    db: &SignatureDatabase,
) -> Result<ReloadSummary> {
    refresher
        .refresh(target_dir)
        .map_err(|e| Error::RefreshFailed(e.to_string()))?;
    log::info!("Refresh of {:?} completed, reloading", target_dir);
    reload_directory(target_dir, db)
}

/// Load every recognised file in `dir` into `db`.
pub fn reload_directory(dir: &Path, db: &SignatureDatabase) -> Result<ReloadSummary> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::DirectoryAccess {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut databases = Vec::new();
    let mut feeds = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(DATABASE_EXTENSION) => databases.push(path),
            Some(ext) if ext.eq_ignore_ascii_case(FEED_EXTENSION) => feeds.push(path),
            _ => {}
        }
    }
    databases.sort();
    feeds.sort();

    let mut summary = ReloadSummary::default();
    for path in databases {
        db.load_from_disk(&path)?;
        summary.databases_loaded.push(path);
    }
    for path in feeds {
        match db.import_feed(&path) {
            Ok(result) => {
                summary.signatures_imported += result.imported;
                summary.feeds_imported.push(path);
            }
            Err(e) => log::warn!("Skipping feed {:?}: {}", path, e),
        }
    }

    if summary.databases_loaded.is_empty() && summary.feeds_imported.is_empty() {
        log::warn!("Nothing to reload in {:?}", dir);
    }
    Ok(summary)
}
