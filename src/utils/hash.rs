//! Digest calculation utilities.

use crate::core::error::{Error, Result};
use crate::core::types::DigestAlgorithm;
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Buffer size for reading files (8KB).
const BUFFER_SIZE: usize = 8 * 1024;

/// Chunk size and chunk count sampled by the fuzzy digest.
const FUZZY_CHUNK_SIZE: usize = 1024;
const FUZZY_MAX_CHUNKS: usize = 10;

/// Lowercase hex digests of one file, one per algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSet {
    digests: BTreeMap<DigestAlgorithm, String>,
    /// Number of bytes fed to the digests
    pub size: u64,
}

impl DigestSet {
    /// Digest for one algorithm.
    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        self.digests.get(&algorithm).map(String::as_str)
    }

    pub fn md5(&self) -> &str {
        self.get(DigestAlgorithm::Md5).unwrap_or_default()
    }

    pub fn sha1(&self) -> &str {
        self.get(DigestAlgorithm::Sha1).unwrap_or_default()
    }

    pub fn sha256(&self) -> &str {
        self.get(DigestAlgorithm::Sha256).unwrap_or_default()
    }

    pub fn sha512(&self) -> &str {
        self.get(DigestAlgorithm::Sha512).unwrap_or_default()
    }

    /// Iterate digests in signature-check priority order.
    pub fn iter(&self) -> impl Iterator<Item = (DigestAlgorithm, &str)> {
        self.digests.iter().map(|(a, d)| (*a, d.as_str()))
    }
}

/// Running state of all four digests, fed chunk by chunk.
struct MultiHasher {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    sha512: Sha512,
    size: u64,
}

impl MultiHasher {
    fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            sha512: Sha512::new(),
            size: 0,
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.sha1.update(chunk);
        self.sha256.update(chunk);
        self.sha512.update(chunk);
        self.size += chunk.len() as u64;
    }

    fn finish(self) -> DigestSet {
        let mut digests = BTreeMap::new();
        digests.insert(DigestAlgorithm::Md5, hex::encode(self.md5.finalize()));
        digests.insert(DigestAlgorithm::Sha1, hex::encode(self.sha1.finalize()));
        digests.insert(DigestAlgorithm::Sha256, hex::encode(self.sha256.finalize()));
        digests.insert(DigestAlgorithm::Sha512, hex::encode(self.sha512.finalize()));
        DigestSet {
            digests,
            size: self.size,
        }
    }
}

/// Digest engine for files and byte buffers.
pub struct DigestEngine;

impl DigestEngine {
    /// Compute MD5, SHA-1, SHA-256 and SHA-512 of a file in one sequential read.
    ///
    /// Every chunk is fed to all four digests before the next read. Nothing is
    /// returned if the file becomes unreadable part-way through.
    pub fn digest_all(path: &Path) -> Result<DigestSet> {
        let mut file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let mut hasher = MultiHasher::new();
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            let bytes_read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::digest(path, e)),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finish())
    }

    /// Compute all four digests of an in-memory buffer.
    pub fn digest_all_bytes(data: &[u8]) -> DigestSet {
        let mut hasher = MultiHasher::new();
        for chunk in data.chunks(BUFFER_SIZE) {
            hasher.update(chunk);
        }
        hasher.finish()
    }

    /// Compute a single digest of a file.
    pub fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> Result<String> {
        let mut file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let mut buffer = [0u8; BUFFER_SIZE];

        match algorithm {
            DigestAlgorithm::Md5 => stream(&mut file, path, &mut buffer, Md5::new()),
            DigestAlgorithm::Sha1 => stream(&mut file, path, &mut buffer, Sha1::new()),
            DigestAlgorithm::Sha256 => stream(&mut file, path, &mut buffer, Sha256::new()),
            DigestAlgorithm::Sha512 => stream(&mut file, path, &mut buffer, Sha512::new()),
        }
    }

    /// Compute a single digest of bytes.
    pub fn digest_bytes(data: &[u8], algorithm: DigestAlgorithm) -> String {
        match algorithm {
            DigestAlgorithm::Md5 => hex::encode(Md5::digest(data)),
            DigestAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }

    /// Coarse similarity digest over the first few 1 KiB chunks.
    ///
    /// Each chunk contributes the hex byte-sum followed by `:`. Advisory only,
    /// never used for exact matching.
    pub fn fuzzy_digest(path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let mut buffer = [0u8; FUZZY_CHUNK_SIZE];
        let mut out = String::new();

        for _ in 0..FUZZY_MAX_CHUNKS {
            let bytes_read = read_full(&mut file, &mut buffer).map_err(|e| Error::digest(path, e))?;
            if bytes_read == 0 {
                break;
            }
            let sum: u32 = buffer[..bytes_read].iter().map(|&b| b as u32).sum();
            out.push_str(&format!("{:x}:", sum));
        }

        Ok(out)
    }
}

fn stream<D: Digest>(file: &mut File, path: &Path, buffer: &mut [u8], mut hasher: D) -> Result<String> {
    loop {
        let bytes_read = match file.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::digest(path, e)),
        };
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fill `buffer` unless EOF comes first; returns bytes read.
fn read_full(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
