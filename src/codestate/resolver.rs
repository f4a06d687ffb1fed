//! Code state resolution
//!
//! Per storage mode:
//! - Inline: the `Code` column of the CodeStates row
//! - External: the file named by the row's `Path` fragment, or
//!   `CodeStates/<first two characters>/<id>.txt` under the dataset root,
//!   whether that root is a directory or a zip archive
//!
//! Lookups are lazy. A missing code state fails only the lookup that asked
//! for it. Results are cached in a bounded LRU shared by all events of a
//! dataset.

use std::io;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use lru::LruCache;
use regex::Regex;

use crate::errors::{ProgsnapError, ProgsnapResult};
use crate::index::LinkIndex;
use crate::metadata::{CodeStateStorage, CODE_STATES_DIR};
use crate::observability::{log_event_with_fields, Event};
use crate::source::DatasetSource;

/// Column holding inline source text
const CODE_COLUMN: &str = "Code";

/// Column holding the relative path of an external code state file
const PATH_COLUMN: &str = "Path";

/// Identifiers usable as a file name: no separators, NUL or drive colons
const SAFE_ID_PATTERN: &str = r"^[^/\\:\x00]+$";

/// Cache statistics for observability.
///
/// Counters are passive; they never influence caching.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that had to load content
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
}

/// Where code state text comes from, fixed at open
#[derive(Debug)]
pub enum CodeStateSource {
    /// Text stored in the CodeStates table
    Inline(LinkIndex),
    /// Text stored in files under the dataset root
    External {
        source: DatasetSource,
        /// CodeStates rows, possibly empty, for `Path` fragments
        index: LinkIndex,
    },
}

impl CodeStateSource {
    fn storage(&self) -> CodeStateStorage {
        match self {
            CodeStateSource::Inline(_) => CodeStateStorage::Inline,
            CodeStateSource::External { .. } => CodeStateStorage::External,
        }
    }

    fn index(&self) -> &LinkIndex {
        match self {
            CodeStateSource::Inline(index) | CodeStateSource::External { index, .. } => index,
        }
    }
}

struct ResolverCache {
    entries: Option<LruCache<String, Arc<str>>>,
    stats: CacheStats,
}

/// Resolves code state identifiers to source text
pub struct CodeStateResolver {
    source: CodeStateSource,
    cache: Mutex<ResolverCache>,
}

impl CodeStateResolver {
    /// Creates a resolver caching up to `cache_entries` code states
    /// (0 disables caching).
    pub fn new(source: CodeStateSource, cache_entries: usize) -> Self {
        Self {
            source,
            cache: Mutex::new(ResolverCache {
                entries: NonZeroUsize::new(cache_entries).map(LruCache::new),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Storage mode in use
    pub fn storage(&self) -> CodeStateStorage {
        self.source.storage()
    }

    /// Indexed CodeStates rows
    pub fn index(&self) -> &LinkIndex {
        self.source.index()
    }

    /// Current cache counters
    pub fn stats(&self) -> CacheStats {
        self.lock_cache().stats
    }

    /// Number of cached code states
    pub fn cached_entries(&self) -> usize {
        self.lock_cache().entries.as_ref().map_or(0, LruCache::len)
    }

    /// Returns the source text of a code state.
    ///
    /// Resolving the same identifier twice yields identical text.
    ///
    /// # Errors
    ///
    /// - `CodeStateNotFound` if the row or file is missing, or the
    ///   identifier cannot name a file. A row with an empty `Code` is an
    ///   empty snapshot, as is an empty file.
    /// - `DatasetFormat` if the file is unreadable or not UTF-8
    pub fn resolve(&self, code_state_id: &str) -> ProgsnapResult<Arc<str>> {
        let cached = {
            let mut cache = self.lock_cache();
            let ResolverCache { entries, stats } = &mut *cache;
            match entries.as_mut() {
                Some(entries) => match entries.get(code_state_id) {
                    Some(text) => {
                        stats.hits += 1;
                        Some(Arc::clone(text))
                    }
                    None => {
                        stats.misses += 1;
                        None
                    }
                },
                None => None,
            }
        };
        if let Some(text) = cached {
            log_event_with_fields(Event::CodeStateCacheHit, &[("id", code_state_id)]);
            return Ok(text);
        }

        let text = match self.load(code_state_id) {
            Ok(text) => text,
            Err(e) => {
                log_event_with_fields(
                    Event::CodeStateMissing,
                    &[("id", code_state_id), ("reason", &e.to_string())],
                );
                return Err(e);
            }
        };

        {
            let mut cache = self.lock_cache();
            let ResolverCache { entries, stats } = &mut *cache;
            if let Some(entries) = entries.as_mut() {
                // push returns the replaced pair when another caller loaded the same id
                if let Some((evicted, _)) = entries.push(code_state_id.to_string(), Arc::clone(&text)) {
                    if evicted != code_state_id {
                        stats.evictions += 1;
                    }
                }
            }
        }

        log_event_with_fields(
            Event::CodeStateLoaded,
            &[("id", code_state_id), ("bytes", &text.len().to_string())],
        );
        Ok(text)
    }

    /// Location of the file an external code state is read from.
    ///
    /// # Errors
    ///
    /// `CodeStateNotFound` for inline storage, unsafe identifiers, or a
    /// `Path` fragment that is absolute or leaves the dataset root.
    pub fn external_path(&self, code_state_id: &str) -> ProgsnapResult<PathBuf> {
        let (source, relative) = self.external_file(code_state_id)?;
        Ok(source.location(&relative))
    }

    /// Storage and `/`-separated relative path of an external code state
    fn external_file(&self, code_state_id: &str) -> ProgsnapResult<(&DatasetSource, String)> {
        let (source, index) = match &self.source {
            CodeStateSource::External { source, index } => (source, index),
            CodeStateSource::Inline(_) => {
                return Err(ProgsnapError::code_state_not_found(
                    code_state_id,
                    "dataset stores code states inline",
                ))
            }
        };

        if !is_safe_id(code_state_id) {
            return Err(ProgsnapError::code_state_not_found(
                code_state_id,
                "identifier cannot name a file",
            ));
        }

        let fragment = index
            .get(code_state_id)
            .and_then(|row| row.get_str(PATH_COLUMN))
            .map(str::trim)
            .filter(|f| !f.is_empty());

        match fragment {
            Some(fragment) => match contained_relative(Path::new(fragment)) {
                Some(relative) => Ok((source, relative)),
                None => Err(ProgsnapError::code_state_not_found(
                    code_state_id,
                    format!("path '{}' leaves the dataset root", fragment),
                )),
            },
            None => Ok((source, conventional_path(code_state_id))),
        }
    }

    fn load(&self, code_state_id: &str) -> ProgsnapResult<Arc<str>> {
        match &self.source {
            CodeStateSource::Inline(index) => {
                let row = index.get(code_state_id).ok_or_else(|| {
                    ProgsnapError::code_state_not_found(code_state_id, "no row in CodeStates table")
                })?;
                // An empty Code field is an empty snapshot, as an empty file is.
                Ok(Arc::from(row.get_str(CODE_COLUMN).unwrap_or("")))
            }
            CodeStateSource::External { .. } => {
                let (source, relative) = self.external_file(code_state_id)?;
                let location = source.location(&relative);
                let bytes = source.read(&relative).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => ProgsnapError::code_state_not_found(
                        code_state_id,
                        format!("file {} does not exist", location.display()),
                    ),
                    _ => ProgsnapError::format_at(&location, format!("cannot read code state: {}", e)),
                })?;
                let text = String::from_utf8(bytes).map_err(|_| {
                    ProgsnapError::format_at(&location, "code state is not valid UTF-8")
                })?;
                Ok(Arc::from(text))
            }
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ResolverCache> {
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for CodeStateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeStateResolver")
            .field("storage", &self.storage())
            .field("stats", &self.stats())
            .finish()
    }
}

/// `CodeStates/<first two characters>/<id>.txt`, relative to the dataset root
pub fn conventional_path(code_state_id: &str) -> String {
    let prefix: String = code_state_id.chars().take(2).collect();
    format!("{}/{}/{}.txt", CODE_STATES_DIR, prefix, code_state_id)
}

fn is_safe_id(code_state_id: &str) -> bool {
    static SAFE_ID: OnceLock<Regex> = OnceLock::new();
    let safe_id = SAFE_ID.get_or_init(|| Regex::new(SAFE_ID_PATTERN).expect("valid pattern"));
    safe_id.is_match(code_state_id) && !code_state_id.contains("..")
}

/// Joins the components of a fragment with `/`, or `None` if it is absolute
/// or climbs out of the root.
fn contained_relative(fragment: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in fragment.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}
