//! Vocabulary materialization with SHA-256 verification
//!
//! - Cache hits are re-hashed on every load and served without network access
//! - Downloads are hashed in memory, then staged in a temp file inside the cache directory
//! - The staged file is published by atomic rename only after its digest matches
//! - A failed download never replaces or truncates the existing cache entry

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::descriptor::VocabularyDescriptor;
use crate::error::{TokenizerError, TokenizerResult};
use crate::source::VocabularySource;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Streaming SHA-256 of a file, `None` when it does not exist
fn file_digest(path: &Path) -> io::Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Some(format!("{:x}", hasher.finalize())))
}

#[inline(always)]
fn digest_matches(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

/// State of the cache entry for one descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Missing,
    Valid,
    /// Present but hashing to something other than the descriptor's digest
    Stale { actual: String },
}

/// Counters for cache behaviour
#[derive(Debug, Default)]
struct FetchCounters {
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    downloads: AtomicUsize,
    integrity_failures: AtomicUsize,
    bytes_downloaded: AtomicU64,
}

/// Point-in-time copy of the fetcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Successful, verified and published downloads
    pub downloads: usize,
    pub integrity_failures: usize,
    pub bytes_downloaded: u64,
}

impl FetchStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Downloads vocabularies into a dedicated cache directory
#[derive(Clone)]
pub struct VocabularyFetcher {
    cache_dir: PathBuf,
    source: Arc<dyn VocabularySource>,
    counters: Arc<FetchCounters>,
}

impl std::fmt::Debug for VocabularyFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VocabularyFetcher")
            .field("cache_dir", &self.cache_dir)
            .field("stats", &self.stats())
            .finish()
    }
}

impl VocabularyFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, source: Arc<dyn VocabularySource>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            source,
            counters: Arc::new(FetchCounters::default()),
        }
    }

    #[inline(always)]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the verified file for `descriptor` lives (whether or not it exists yet)
    pub fn cached_path(&self, descriptor: &VocabularyDescriptor) -> PathBuf {
        self.cache_dir.join(descriptor.file_name())
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            downloads: self.counters.downloads.load(Ordering::Relaxed),
            integrity_failures: self.counters.integrity_failures.load(Ordering::Relaxed),
            bytes_downloaded: self.counters.bytes_downloaded.load(Ordering::Relaxed),
        }
    }

    /// Hash the cache entry for `descriptor` against its content hash
    pub async fn cache_status(&self, descriptor: &VocabularyDescriptor) -> TokenizerResult<CacheStatus> {
        let path = self.cached_path(descriptor);
        let expected = descriptor.content_hash().to_string();

        let hashed = path.clone();
        let digest = tokio::task::spawn_blocking(move || file_digest(&hashed))
            .await
            .map_err(TokenizerError::task_failed)?
            .map_err(TokenizerError::filesystem(&path))?;

        Ok(match digest {
            None => CacheStatus::Missing,
            Some(actual) if digest_matches(&expected, &actual) => CacheStatus::Valid,
            Some(actual) => CacheStatus::Stale { actual },
        })
    }

    /// Ensure a verified copy of the descriptor's vocabulary exists locally and return its path
    pub async fn materialize(&self, descriptor: &VocabularyDescriptor) -> TokenizerResult<PathBuf> {
        Ok(self.load(descriptor).await?.path)
    }

    /// Like [`materialize`](Self::materialize), but also hand back the bytes that were hashed.
    ///
    /// Cache hits are read into memory once and hashed from that buffer, so
    /// callers building from [`VerifiedVocabulary::bytes`] never parse bytes
    /// that skipped verification, even if the file changes on disk afterwards.
    #[instrument(skip(self, descriptor), fields(model_id = descriptor.model_id()))]
    pub async fn load(&self, descriptor: &VocabularyDescriptor) -> TokenizerResult<VerifiedVocabulary> {
        let path = self.cached_path(descriptor);

        let read_from = path.clone();
        let cached = tokio::task::spawn_blocking(move || read_cached(&read_from))
            .await
            .map_err(TokenizerError::task_failed)?
            .map_err(TokenizerError::filesystem(&path))?;

        match cached {
            Some((bytes, actual)) if digest_matches(descriptor.content_hash(), &actual) => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(path = %path.display(), "vocabulary cache hit");
                return Ok(VerifiedVocabulary { path, bytes });
            }
            Some((_, actual)) => {
                warn!(
                    path = %path.display(),
                    expected = descriptor.content_hash(),
                    actual = %actual,
                    "cached vocabulary failed verification, downloading again"
                );
            }
            None => {
                debug!(path = %path.display(), "vocabulary cache miss");
            }
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        self.download(descriptor, path).await
    }

    /// Download and publish the vocabulary even when a valid copy is cached.
    ///
    /// The existing file is only replaced once the new bytes verify; on any
    /// error it stays exactly as it was.
    #[instrument(skip(self, descriptor), fields(model_id = descriptor.model_id()))]
    pub async fn refresh(&self, descriptor: &VocabularyDescriptor) -> TokenizerResult<VerifiedVocabulary> {
        let path = self.cached_path(descriptor);
        self.download(descriptor, path).await
    }

    async fn download(&self, descriptor: &VocabularyDescriptor, path: PathBuf) -> TokenizerResult<VerifiedVocabulary> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(TokenizerError::filesystem(&self.cache_dir))?;

        info!(url = descriptor.source_url(), "downloading vocabulary");
        let body = self.source.fetch(descriptor.source_url()).await?;
        let size = body.len() as u64;

        let actual = sha256_hex(&body);
        if !digest_matches(descriptor.content_hash(), &actual) {
            let err = TokenizerError::Integrity {
                model_id: descriptor.model_id().to_string(),
                expected: descriptor.content_hash().to_string(),
                actual,
            };
            self.counters.integrity_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "rejected downloaded vocabulary");
            return Err(err);
        }

        let cache_dir = self.cache_dir.clone();
        let target = path.clone();
        let staged = body.clone();
        tokio::task::spawn_blocking(move || publish(&cache_dir, &target, &staged))
            .await
            .map_err(TokenizerError::task_failed)??;

        self.counters.downloads.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_downloaded.fetch_add(size, Ordering::Relaxed);
        info!(path = %path.display(), bytes = size, "vocabulary cached");
        Ok(VerifiedVocabulary { path, bytes: body })
    }

    /// Delete the cache entry for `descriptor`; `Ok(false)` when there was none
    pub async fn purge(&self, descriptor: &VocabularyDescriptor) -> TokenizerResult<bool> {
        let path = self.cached_path(descriptor);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "purged cached vocabulary");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TokenizerError::filesystem(&path)(e)),
        }
    }
}

/// Vocabulary bytes that matched the descriptor's content hash, and where they are cached
#[derive(Debug, Clone)]
pub struct VerifiedVocabulary {
    path: PathBuf,
    bytes: Bytes,
}

impl VerifiedVocabulary {
    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Whole cache file plus its digest, `None` when it does not exist
fn read_cached(path: &Path) -> io::Result<Option<(Bytes, String)>> {
    match fs::read(path) {
        Ok(contents) => {
            let digest = sha256_hex(&contents);
            Ok(Some((Bytes::from(contents), digest)))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write already verified `body` to a temp file in `cache_dir`, fsync, then rename onto `target`.
///
/// The temp file is removed on every error path by the `NamedTempFile` guard.
fn publish(cache_dir: &Path, target: &Path, body: &[u8]) -> TokenizerResult<()> {
    let mut staged = tempfile::Builder::new()
        .prefix(".vocab-")
        .suffix(".part")
        .tempfile_in(cache_dir)
        .map_err(TokenizerError::filesystem(cache_dir))?;

    staged
        .write_all(body)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(TokenizerError::filesystem(staged.path()))?;

    staged
        .persist(target)
        .map_err(|e| TokenizerError::filesystem(target)(e.error))?;

    if let Err(e) = sync_dir(cache_dir) {
        warn!(dir = %cache_dir.display(), error = %e, "published vocabulary but could not sync cache directory");
    }
    Ok(())
}

/// Flush directory entries so a completed rename survives a crash
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Remove leftover `.part` files from interrupted downloads
pub fn remove_stale_parts(cache_dir: &Path) -> TokenizerResult<usize> {
    let entries = match fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(TokenizerError::filesystem(cache_dir)(e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(TokenizerError::filesystem(cache_dir))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(".vocab-") && name.ends_with(".part") {
            let path = entry.path();
            fs::remove_file(&path).map_err(TokenizerError::filesystem(&path))?;
            removed += 1;
        }
    }
    Ok(removed)
}
