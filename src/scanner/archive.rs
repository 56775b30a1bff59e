//! ZIP-family container analysis.

use crate::core::config::ScanConfig;
use crate::core::error::{Error, Result};
use crate::detection::SignatureDatabase;
use crate::scanner::container::{ContainerAnalyzer, ContainerMatch};
use crate::utils::hash::DigestEngine;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

/// Maximum decompression ratio (to prevent zip bombs).
const MAX_COMPRESSION_RATIO: f64 = 100.0;

/// Extensions opened as ZIP containers.
const ZIP_EXTENSIONS: &[&str] = &["zip", "jar", "apk", "xpi", "docx", "xlsx", "pptx"];

/// Digests every entry of a ZIP archive and checks it against the store.
#[derive(Debug, Clone)]
pub struct ArchiveAnalyzer {
    max_entry_size: u64,
    max_entries: usize,
}

impl Default for ArchiveAnalyzer {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl ArchiveAnalyzer {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            max_entry_size: config.max_archive_entry_mb * 1024 * 1024,
            max_entries: config.max_archive_entries,
        }
    }

    /// Set maximum entry size to extract.
    pub fn with_max_entry_size(mut self, size: u64) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Check if a path is a supported archive format.
    pub fn is_supported_archive(path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                ZIP_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    fn analyze_reader<R: Read + Seek>(
        &self,
        reader: R,
        path: &Path,
        db: &SignatureDatabase,
    ) -> Result<Option<ContainerMatch>> {
        let archive_error = |e: zip::result::ZipError| Error::ArchiveError {
            path: path.to_path_buf(),
            source: Box::new(e),
        };
        let mut archive = ZipArchive::new(reader).map_err(archive_error)?;
        let entry_count = archive.len().min(self.max_entries);

        for i in 0..entry_count {
            let entry = archive.by_index(i).map_err(archive_error)?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            let compressed_size = entry.compressed_size();
            let uncompressed_size = entry.size();

            let ratio = if compressed_size > 0 {
                uncompressed_size as f64 / compressed_size as f64
            } else {
                0.0
            };
            if ratio > MAX_COMPRESSION_RATIO {
                log::warn!(
                    "Suspicious compression ratio ({:.1}x) in {:?}: {}",
                    ratio,
                    path,
                    name
                );
                continue;
            }

            if uncompressed_size > self.max_entry_size {
                log::trace!("Skipping large archive entry: {} ({} bytes)", name, uncompressed_size);
                continue;
            }

            // Declared sizes can lie; bound the actual read as well.
            let mut content = Vec::with_capacity(uncompressed_size as usize);
            if let Err(e) = entry.take(self.max_entry_size + 1).read_to_end(&mut content) {
                log::debug!("Failed to read archive entry {} in {:?}: {}", name, path, e);
                continue;
            }
            if content.len() as u64 > self.max_entry_size {
                continue;
            }

            let digests = DigestEngine::digest_all_bytes(&content);
            if let Some((algorithm, signature)) = db.lookup(&digests) {
                log::debug!("Archive entry {} in {:?} matched {}", name, path, signature.name);
                return Ok(Some(ContainerMatch::entry(name, algorithm, signature)));
            }
        }

        if archive.len() > entry_count {
            log::debug!(
                "Archive {:?} has {} entries, inspected the first {}",
                path,
                archive.len(),
                entry_count
            );
        }

        Ok(None)
    }
}

impl ContainerAnalyzer for ArchiveAnalyzer {
    fn name(&self) -> &str {
        "zip"
    }

    fn handles(&self, path: &Path) -> bool {
        Self::is_supported_archive(path)
    }

    fn analyze(&self, path: &Path, db: &SignatureDatabase) -> Result<Option<ContainerMatch>> {
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        self.analyze_reader(file, path, db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DigestAlgorithm, ThreatLevel};
    use crate::detection::Signature;
    use std::io::{Cursor, Write};

    const PAYLOAD: &[u8] = b"definitely-not-a-dropper payload bytes";

    fn create_test_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);

            for (name, data) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    fn db_with_payload() -> SignatureDatabase {
        let db = SignatureDatabase::with_capacity(1000, 0.01, 100);
        let sig = Signature::new("Dropper.Zip", "Dropper", ThreatLevel::Critical).with_digest(
            DigestAlgorithm::Sha256,
            DigestEngine::digest_bytes(PAYLOAD, DigestAlgorithm::Sha256),
        );
        db.add_signature(sig);
        db
    }

    #[test]
    fn test_finds_known_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        std::fs::write(
            &path,
            create_test_zip(&[("readme.txt", b"hello"), ("bin/payload.exe", PAYLOAD)]),
        )
        .unwrap();

        let analyzer = ArchiveAnalyzer::default();
        let found = analyzer.analyze(&path, &db_with_payload()).unwrap().unwrap();
        assert_eq!(found.entry.as_deref(), Some("bin/payload.exe"));
        assert_eq!(found.algorithm, Some(DigestAlgorithm::Sha256));
        assert_eq!(found.signature.name, "Dropper.Zip");
    }

    #[test]
    fn test_clean_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.zip");
        std::fs::write(&path, create_test_zip(&[("a.txt", b"aaa"), ("b.txt", b"bbb")])).unwrap();

        let found = ArchiveAnalyzer::default().analyze(&path, &db_with_payload()).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_oversized_entry_is_skipped() {
        let data = create_test_zip(&[("payload.exe", PAYLOAD)]);
        let analyzer = ArchiveAnalyzer::default().with_max_entry_size(8);
        let found = analyzer
            .analyze_reader(Cursor::new(data), Path::new("mem.zip"), &db_with_payload())
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_corrupt_archive_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"PK not really a zip").unwrap();

        let err = ArchiveAnalyzer::default().analyze(&path, &db_with_payload()).unwrap_err();
        assert!(matches!(err, Error::ArchiveError { .. }));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(ArchiveAnalyzer::is_supported_archive(Path::new("x.ZIP")));
        assert!(ArchiveAnalyzer::is_supported_archive(Path::new("x.docx")));
        assert!(!ArchiveAnalyzer::is_supported_archive(Path::new("x.rar")));
        assert!(!ArchiveAnalyzer::is_supported_archive(Path::new("noext")));
    }
}
