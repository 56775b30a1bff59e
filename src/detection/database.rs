//! Two-tier signature store: bloom filter pre-check, exact index confirmation.

use crate::core::config::DatabaseConfig;
use crate::core::error::Result;
use crate::core::types::DigestAlgorithm;
use crate::detection::bloom::BloomFilter;
use crate::detection::persist::{self, FilterParams, SnapshotRef};
use crate::detection::signature::{normalize_digest, Signature, SignatureFeed};
use crate::utils::hash::DigestSet;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Signature database shared by the scan engine and the realtime monitor.
///
/// Lookups take a read lock and can run from any number of workers at once.
/// Writes (`add_signature`, `load_from_disk`, `clear`) are expected while no
/// batch is running.
pub struct SignatureDatabase {
    inner: RwLock<StoreInner>,
    persist_exact_index: bool,
}

struct StoreInner {
    params: FilterParams,
    filters: [BloomFilter; 4],
    indexes: [HashMap<String, Arc<Signature>>; 4],
    signatures: Vec<Arc<Signature>>,
    domains: BloomFilter,
    signature_count: u64,
    feed_version: Option<String>,
    loaded: bool,
}

impl StoreInner {
    fn empty(params: FilterParams) -> Self {
        let filter = || BloomFilter::with_rate(params.expected_signatures, params.false_positive_rate);
        Self {
            params,
            filters: [filter(), filter(), filter(), filter()],
            indexes: Default::default(),
            signatures: Vec::new(),
            domains: BloomFilter::with_rate(params.expected_domains, params.false_positive_rate),
            signature_count: 0,
            feed_version: None,
            loaded: false,
        }
    }

    fn index_signature(&mut self, sig: Arc<Signature>) {
        for algorithm in DigestAlgorithm::ALL {
            if let Some(digest) = sig.digest(algorithm) {
                self.indexes[algorithm.index()].insert(digest.to_string(), Arc::clone(&sig));
            }
        }
        self.signatures.push(sig);
    }
}

impl SignatureDatabase {
    /// Create an empty store with default capacities.
    pub fn new() -> Self {
        Self::with_config(&DatabaseConfig::default())
    }

    /// Create an empty store sized by configuration.
    pub fn with_config(config: &DatabaseConfig) -> Self {
        let params = FilterParams {
            expected_signatures: config.expected_signatures,
            false_positive_rate: config.false_positive_rate,
            expected_domains: config.expected_domains,
        };
        Self {
            inner: RwLock::new(StoreInner::empty(params)),
            persist_exact_index: config.persist_exact_index,
        }
    }

    /// Create an empty store with explicit capacities.
    pub fn with_capacity(expected_signatures: u64, false_positive_rate: f64, expected_domains: u64) -> Self {
        Self::with_config(&DatabaseConfig {
            expected_signatures,
            false_positive_rate,
            expected_domains,
            ..DatabaseConfig::default()
        })
    }

    /// Open the store at the configured path, or start empty if no file exists yet.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let db = Self::with_config(config);
        let path = config.database_file();
        if path.exists() {
            db.load_from_disk(&path)?;
        } else {
            log::info!("No signature database at {:?}; starting empty", path);
        }
        Ok(db)
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert every digest the signature carries into its filter, then its index.
    pub fn add_signature(&self, sig: Signature) {
        let sig = sig.normalized();
        let mut inner = self.write();
        for algorithm in DigestAlgorithm::ALL {
            if let Some(digest) = sig.digest(algorithm) {
                inner.filters[algorithm.index()].insert(digest);
            }
        }
        inner.index_signature(Arc::new(sig));
        inner.signature_count += 1;
    }

    /// Filter probe. False positives possible, false negatives never.
    pub fn might_contain(&self, digest: &str, algorithm: DigestAlgorithm) -> bool {
        let digest = normalize(digest);
        self.read().filters[algorithm.index()].might_contain(&digest)
    }

    /// Exact index lookup.
    pub fn get_signature(&self, digest: &str, algorithm: DigestAlgorithm) -> Option<Signature> {
        let digest = normalize(digest);
        self.read().indexes[algorithm.index()]
            .get(&digest)
            .map(|sig| sig.as_ref().clone())
    }

    /// Check a file's digests in priority order; the first confirmed match wins.
    pub fn lookup(&self, digests: &DigestSet) -> Option<(DigestAlgorithm, Signature)> {
        let inner = self.read();
        for (algorithm, digest) in digests.iter() {
            let slot = algorithm.index();
            if !inner.filters[slot].might_contain(digest) {
                continue;
            }
            match inner.indexes[slot].get(digest) {
                Some(sig) => return Some((algorithm, sig.as_ref().clone())),
                None => log::trace!("{} filter hit without exact match: {}", algorithm, digest),
            }
        }
        None
    }

    pub fn add_malicious_domain(&self, domain: &str) {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return;
        }
        let mut inner = self.write();
        inner.domains.insert(&domain);
    }

    /// Probabilistic only; a positive needs further confirmation.
    pub fn is_domain_malicious(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        !domain.is_empty() && self.read().domains.might_contain(&domain)
    }

    /// Persist filters, signature count and (when enabled) the exact index.
    pub fn save_to_disk(&self, path: &Path) -> Result<()> {
        let inner = self.read();
        let snapshot = SnapshotRef {
            params: inner.params,
            feed_version: inner.feed_version.as_deref(),
            digest_filters: [
                &inner.filters[0],
                &inner.filters[1],
                &inner.filters[2],
                &inner.filters[3],
            ],
            domain_filter: &inner.domains,
            signature_count: inner.signature_count,
            signatures: self
                .persist_exact_index
                .then(|| inner.signatures.iter().map(Arc::as_ref).collect()),
        };
        persist::save(path, &snapshot)?;

        log::info!(
            "Saved signature database to {:?} ({} signatures)",
            path,
            inner.signature_count
        );
        Ok(())
    }

    /// Replace all in-memory state with the contents of a database file.
    ///
    /// On error the current state is left untouched.
    pub fn load_from_disk(&self, path: &Path) -> Result<()> {
        let snapshot = persist::load(path)?;

        let mut fresh = StoreInner {
            params: snapshot.params,
            filters: snapshot.digest_filters,
            indexes: Default::default(),
            signatures: Vec::new(),
            domains: snapshot.domain_filter,
            signature_count: snapshot.signature_count,
            feed_version: snapshot.feed_version,
            loaded: true,
        };

        let exact = snapshot.signatures.is_some();
        for sig in snapshot.signatures.into_iter().flatten() {
            fresh.index_signature(Arc::new(sig.normalized()));
        }

        *self.write() = fresh;

        if exact {
            log::info!("Loaded signature database from {:?}", path);
        } else {
            log::warn!(
                "Loaded filters only from {:?}; exact matches need the signature feed re-imported",
                path
            );
        }
        Ok(())
    }

    /// Reset every filter and index and zero the counters.
    pub fn clear(&self) {
        let mut inner = self.write();
        let params = inner.params;
        *inner = StoreInner::empty(params);
        log::debug!("Signature database cleared");
    }

    pub fn is_loaded(&self) -> bool {
        self.read().loaded
    }

    /// Counts for observability.
    pub fn get_stats(&self) -> DatabaseStats {
        let inner = self.read();
        let algorithms = DigestAlgorithm::ALL
            .iter()
            .map(|&algorithm| AlgorithmStats {
                algorithm,
                indexed_digests: inner.indexes[algorithm.index()].len(),
                approximate_filter_elements: inner.filters[algorithm.index()]
                    .approximate_element_count(),
                filter_bits: inner.filters[algorithm.index()].num_bits(),
                filter_hashes: inner.filters[algorithm.index()].num_hashes(),
            })
            .collect();

        DatabaseStats {
            total_signatures: inner.signature_count,
            exact_signatures: inner.signatures.len(),
            algorithms,
            approximate_domains: inner.domains.approximate_element_count(),
            loaded: inner.loaded,
            feed_version: inner.feed_version.clone(),
            expected_signatures: inner.params.expected_signatures,
            false_positive_rate: inner.params.false_positive_rate,
        }
    }

    /// Ingest a parsed signature feed.
    pub fn import(&self, feed: &SignatureFeed) -> ImportResult {
        let mut imported = 0;
        let mut skipped = 0;
        let mut errors = Vec::new();

        for sig in &feed.signatures {
            if !sig.has_digests() {
                errors.push(format!("{}: no digests", sig.name));
                skipped += 1;
                continue;
            }

            let mut sig = sig.clone();
            if sig.source.is_empty() {
                if let Some(source) = &feed.source {
                    sig.source = source.clone();
                }
            }
            self.add_signature(sig);
            imported += 1;
        }

        for domain in &feed.domains {
            self.add_malicious_domain(domain);
        }

        {
            let mut inner = self.write();
            inner.feed_version = Some(feed.version.clone());
            inner.loaded = true;
        }

        log::info!(
            "Imported {} signatures and {} domains from feed version {}",
            imported,
            feed.domains.len(),
            feed.version
        );

        ImportResult {
            imported,
            skipped,
            domains: feed.domains.len(),
            errors,
            version: feed.version.clone(),
        }
    }

    /// Ingest a JSON signature feed file.
    pub fn import_feed(&self, path: &Path) -> Result<ImportResult> {
        let feed = SignatureFeed::load(path)?;
        Ok(self.import(&feed))
    }
}

impl Default for SignatureDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(digest: &str) -> String {
    normalize_digest(digest)
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_lowercase()
}

/// Per-algorithm store counters.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmStats {
    pub algorithm: DigestAlgorithm,
    pub indexed_digests: usize,
    pub approximate_filter_elements: u64,
    pub filter_bits: u64,
    pub filter_hashes: u32,
}

/// Snapshot of store counters.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    /// Signatures added since creation or last load
    pub total_signatures: u64,
    /// Signatures held in the exact index
    pub exact_signatures: usize,
    pub algorithms: Vec<AlgorithmStats>,
    pub approximate_domains: u64,
    pub loaded: bool,
    pub feed_version: Option<String>,
    pub expected_signatures: u64,
    pub false_positive_rate: f64,
}

impl DatabaseStats {
    /// Stats for one algorithm.
    pub fn algorithm(&self, algorithm: DigestAlgorithm) -> Option<&AlgorithmStats> {
        self.algorithms.iter().find(|s| s.algorithm == algorithm)
    }
}

/// Result of importing a signature feed.
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    /// Number of signatures imported
    pub imported: usize,
    /// Number of signatures skipped
    pub skipped: usize,
    /// Number of domains imported
    pub domains: usize,
    /// Reasons for skipped signatures
    pub errors: Vec<String>,
    /// Feed version
    pub version: String,
}

impl std::fmt::Display for ImportResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} signatures and {} domains (skipped: {}) - version {}",
            self.imported, self.domains, self.skipped, self.version
        )
    }
}
