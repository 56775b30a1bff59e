//! On-disk layout of the signature database.
//!
//! All integers are little-endian.
//!
//! ```text
//! magic "VSDB" | format version u32
//! expected signatures u64 | false-positive rate f64 | expected domains u64
//! feed version (u32 length + UTF-8)
//! filter bodies: MD5, SHA-1, SHA-256, SHA-512, domain
//! signature count u64
//! exact index flag u8 [| u64 length + JSON signature array]
//! ```

use crate::core::error::{Error, Result};
use crate::detection::bloom::{read_u32, read_u64, BloomFilter};
use crate::detection::signature::Signature;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const MAGIC: &[u8; 4] = b"VSDB";
pub const FORMAT_VERSION: u32 = 1;

/// Longest feed version string accepted from disk.
const MAX_VERSION_LEN: u32 = 1024;

/// Filter sizing recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub expected_signatures: u64,
    pub false_positive_rate: f64,
    pub expected_domains: u64,
}

/// Borrowed view of a store, written in one pass.
pub struct SnapshotRef<'a> {
    pub params: FilterParams,
    pub feed_version: Option<&'a str>,
    pub digest_filters: [&'a BloomFilter; 4],
    pub domain_filter: &'a BloomFilter,
    pub signature_count: u64,
    pub signatures: Option<Vec<&'a Signature>>,
}

/// Owned store state read back from disk.
#[derive(Debug)]
pub struct Snapshot {
    pub params: FilterParams,
    pub feed_version: Option<String>,
    pub digest_filters: [BloomFilter; 4],
    pub domain_filter: BloomFilter,
    pub signature_count: u64,
    pub signatures: Option<Vec<Signature>>,
}

/// Write a snapshot to `path`, replacing any existing file atomically.
pub fn save(path: &Path, snapshot: &SnapshotRef<'_>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| save_error(path, e))?;
    }

    let tmp = temp_path(path);
    let result = write_file(&tmp, snapshot).and_then(|_| {
        std::fs::rename(&tmp, path).map_err(|e| save_error(path, e))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Read a snapshot written by [`save`].
pub fn load(path: &Path) -> Result<Snapshot> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::PathNotFound(path.to_path_buf()),
        _ => Error::DatabaseLoad {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    read_snapshot(&mut BufReader::new(file))
}

fn write_file(path: &Path, snapshot: &SnapshotRef<'_>) -> Result<()> {
    let file = File::create(path).map_err(|e| save_error(path, e))?;
    let mut writer = BufWriter::new(file);
    write_snapshot(&mut writer, snapshot)?;
    let file = writer
        .into_inner()
        .map_err(|e| save_error(path, e.into_error()))?;
    file.sync_all().map_err(|e| save_error(path, e))
}

pub fn write_snapshot<W: Write>(writer: &mut W, snapshot: &SnapshotRef<'_>) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;

    let params = &snapshot.params;
    writer.write_all(&params.expected_signatures.to_le_bytes())?;
    writer.write_all(&params.false_positive_rate.to_bits().to_le_bytes())?;
    writer.write_all(&params.expected_domains.to_le_bytes())?;

    let version = snapshot.feed_version.unwrap_or_default().as_bytes();
    writer.write_all(&(version.len() as u32).to_le_bytes())?;
    writer.write_all(version)?;

    for filter in snapshot.digest_filters {
        filter.write_to(writer)?;
    }
    snapshot.domain_filter.write_to(writer)?;

    writer.write_all(&snapshot.signature_count.to_le_bytes())?;

    match &snapshot.signatures {
        Some(signatures) => {
            let json = serde_json::to_vec(signatures)?;
            writer.write_all(&[1u8])?;
            writer.write_all(&(json.len() as u64).to_le_bytes())?;
            writer.write_all(&json)?;
        }
        None => writer.write_all(&[0u8])?,
    }

    writer.flush()?;
    Ok(())
}

pub fn read_snapshot<R: Read>(reader: &mut R) -> Result<Snapshot> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| Error::format("File too short for a database header"))?;
    if &magic != MAGIC {
        return Err(Error::format("Not a signature database (bad magic)"));
    }

    let version = read_u32(reader)?;
    if version != FORMAT_VERSION {
        return Err(Error::format(format!(
            "Unsupported database format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let params = FilterParams {
        expected_signatures: read_u64(reader)?,
        false_positive_rate: f64::from_bits(read_u64(reader)?),
        expected_domains: read_u64(reader)?,
    };

    let version_len = read_u32(reader)?;
    if version_len > MAX_VERSION_LEN {
        return Err(Error::format(format!("Feed version too long: {} bytes", version_len)));
    }
    let mut version_bytes = vec![0u8; version_len as usize];
    reader
        .read_exact(&mut version_bytes)
        .map_err(|e| Error::format(format!("Truncated database file: {}", e)))?;
    let feed_version = String::from_utf8(version_bytes)
        .map_err(|_| Error::format("Feed version is not valid UTF-8"))?;
    let feed_version = Some(feed_version).filter(|v| !v.is_empty());

    let digest_filters = [
        BloomFilter::read_from(reader)?,
        BloomFilter::read_from(reader)?,
        BloomFilter::read_from(reader)?,
        BloomFilter::read_from(reader)?,
    ];
    let domain_filter = BloomFilter::read_from(reader)?;
    let signature_count = read_u64(reader)?;

    let mut flag = [0u8; 1];
    reader
        .read_exact(&mut flag)
        .map_err(|e| Error::format(format!("Truncated database file: {}", e)))?;

    let signatures = match flag[0] {
        0 => None,
        1 => {
            let len = read_u64(reader)?;
            let mut json = Vec::new();
            reader
                .by_ref()
                .take(len)
                .read_to_end(&mut json)
                .map_err(|e| Error::format(format!("Truncated signature index: {}", e)))?;
            if json.len() as u64 != len {
                return Err(Error::format("Truncated signature index"));
            }
            let signatures: Vec<Signature> = serde_json::from_slice(&json)
                .map_err(|e| Error::format(format!("Corrupt signature index: {}", e)))?;
            Some(signatures)
        }
        other => {
            return Err(Error::format(format!("Unknown exact index flag {}", other)));
        }
    };

    Ok(Snapshot {
        params,
        feed_version,
        digest_filters,
        domain_filter,
        signature_count,
        signatures,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "signatures.sgdb".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn save_error(path: &Path, source: std::io::Error) -> Error {
    Error::DatabaseSave {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DigestAlgorithm, ThreatLevel};

    fn params() -> FilterParams {
        FilterParams {
            expected_signatures: 1000,
            false_positive_rate: 0.001,
            expected_domains: 100,
        }
    }

    fn filters() -> ([BloomFilter; 4], BloomFilter) {
        let mut digest = [
            BloomFilter::with_rate(1000, 0.001),
            BloomFilter::with_rate(1000, 0.001),
            BloomFilter::with_rate(1000, 0.001),
            BloomFilter::with_rate(1000, 0.001),
        ];
        digest[2].insert("abc");
        let mut domain = BloomFilter::with_rate(100, 0.001);
        domain.insert("evil.example");
        (digest, domain)
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (digest, domain) = filters();
        let sig = Signature::new("Test.Malware", "Test", ThreatLevel::High)
            .with_digest(DigestAlgorithm::Sha256, "abc");

        let snapshot = SnapshotRef {
            params: params(),
            feed_version: Some("2026.10.01"),
            digest_filters: [&digest[0], &digest[1], &digest[2], &digest[3]],
            domain_filter: &domain,
            signature_count: 1,
            signatures: Some(vec![&sig]),
        };

        let mut buf = Vec::new();
        write_snapshot(&mut buf, &snapshot).unwrap();
        let restored = read_snapshot(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.params, params());
        assert_eq!(restored.feed_version.as_deref(), Some("2026.10.01"));
        assert_eq!(restored.signature_count, 1);
        assert!(restored.digest_filters[2].might_contain("abc"));
        assert!(restored.domain_filter.might_contain("evil.example"));
        assert_eq!(restored.signatures, Some(vec![sig]));
    }

    #[test]
    fn test_filters_only() {
        let (digest, domain) = filters();
        let snapshot = SnapshotRef {
            params: params(),
            feed_version: None,
            digest_filters: [&digest[0], &digest[1], &digest[2], &digest[3]],
            domain_filter: &domain,
            signature_count: 7,
            signatures: None,
        };

        let mut buf = Vec::new();
        write_snapshot(&mut buf, &snapshot).unwrap();
        let restored = read_snapshot(&mut buf.as_slice()).unwrap();

        assert!(restored.signatures.is_none());
        assert!(restored.feed_version.is_none());
        assert_eq!(restored.signature_count, 7);
    }

    #[test]
    fn test_bad_magic() {
        let data = b"NOPE\x01\x00\x00\x00";
        assert!(matches!(
            read_snapshot(&mut &data[..]),
            Err(Error::DatabaseFormat(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&99u32.to_le_bytes());
        let err = read_snapshot(&mut data.as_slice()).unwrap_err();
        assert!(err.to_string().contains("format error"));
    }

    #[test]
    fn test_huge_filter_header_is_format_error() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        data.extend_from_slice(&1_000u64.to_le_bytes());
        data.extend_from_slice(&0.001f64.to_bits().to_le_bytes());
        data.extend_from_slice(&100u64.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        // MD5 filter header claiming 2^40 bits with no body behind it.
        data.extend_from_slice(&(1u64 << 40).to_le_bytes());
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&(1u64 << 34).to_le_bytes());

        let err = read_snapshot(&mut data.as_slice()).unwrap_err();
        assert!(matches!(err, Error::DatabaseFormat(_)));
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("signatures.sgdb");
        let (digest, domain) = filters();
        let snapshot = SnapshotRef {
            params: params(),
            feed_version: None,
            digest_filters: [&digest[0], &digest[1], &digest[2], &digest[3]],
            domain_filter: &domain,
            signature_count: 0,
            signatures: None,
        };

        save(&path, &snapshot).unwrap();
        assert!(path.exists());
        assert!(!temp_path(&path).exists());
        assert!(load(&path).is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load(Path::new("/no/such/signatures.sgdb")),
            Err(Error::PathNotFound(_))
        ));
    }
}
