//! Result data sources.
//!
//! A source maps a competition to the fixtures it knows about. The file
//! source reads per-competition text files and keeps each parsed file in a
//! [`ResultCache`] for `ttl`; the cache is an explicit object handed to the
//! source, so tests can pre-load a fixed snapshot.

use super::parser::{parse_results_text, ParsedFixture};
use crate::{error::ResolutionError, names};
use parking_lot::RwLock;
use std::{
    borrow::Cow,
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

pub type Fixtures = Arc<Vec<ParsedFixture>>;

/// Read-only provider of finished (and scheduled) fixtures
pub trait ResultSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fixtures for one competition. `Err(NoSource)` when the competition is
    /// not covered or its data is absent.
    fn fixtures(&self, competition: &str) -> Result<Fixtures, ResolutionError>;
}

/// One parsed file and when it was read
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub loaded_at: Instant,
    pub ttl: Duration,
    pub data: Fixtures,
}

impl SourceSnapshot {
    pub fn is_fresh(&self) -> bool {
        self.loaded_at.elapsed() < self.ttl
    }
}

/// Parsed result files keyed by path
pub struct ResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<PathBuf, SourceSnapshot>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Pin a snapshot for `path`; it is served until its own ttl runs out
    pub fn insert_snapshot(&self, path: impl Into<PathBuf>, snapshot: SourceSnapshot) {
        self.entries.write().insert(path.into(), snapshot);
    }

    /// Cached fixtures for `path`, reading and parsing the file when stale
    pub fn get_or_load(&self, path: &Path) -> Result<Fixtures, ResolutionError> {
        if let Some(snapshot) = self.entries.read().get(path) {
            if snapshot.is_fresh() {
                return Ok(snapshot.data.clone());
            }
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ResolutionError::NoSource),
            Err(e) => return Err(ResolutionError::Io(format!("{}: {}", path.display(), e))),
        };

        // Stray non-UTF-8 bytes (Latin-1 exports) only spoil their own line
        let raw = String::from_utf8_lossy(&bytes);
        if let Cow::Owned(_) = raw {
            warn!(path = %path.display(), "Result file is not valid UTF-8, decoding lossily");
        }

        let data: Fixtures = Arc::new(parse_results_text(&raw));
        debug!(path = %path.display(), fixtures = data.len(), "Result file loaded");

        self.entries.write().insert(
            path.to_path_buf(),
            SourceSnapshot {
                loaded_at: Instant::now(),
                ttl: self.ttl,
                data: data.clone(),
            },
        );
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Per-competition text files under one directory
pub struct FileResultSource {
    results_dir: PathBuf,
    /// Normalized competition name -> file names
    competitions: HashMap<String, Vec<String>>,
    cache: Arc<ResultCache>,
}

impl FileResultSource {
    pub fn new(
        results_dir: impl Into<PathBuf>,
        competitions: &HashMap<String, Vec<String>>,
        cache: Arc<ResultCache>,
    ) -> Self {
        let competitions = competitions
            .iter()
            .map(|(name, files)| (names::normalize(name), files.clone()))
            .collect();
        Self {
            results_dir: results_dir.into(),
            competitions,
            cache,
        }
    }

    pub fn files_for(&self, competition: &str) -> Option<Vec<PathBuf>> {
        self.competitions
            .get(&names::normalize(competition))
            .map(|files| files.iter().map(|f| self.results_dir.join(f)).collect())
    }
}

impl ResultSource for FileResultSource {
    fn name(&self) -> &str {
        "files"
    }

    fn fixtures(&self, competition: &str) -> Result<Fixtures, ResolutionError> {
        let Some(paths) = self.files_for(competition) else {
            return Err(ResolutionError::NoSource);
        };

        let mut merged: Vec<ParsedFixture> = Vec::new();
        let mut any_file = false;
        for path in paths {
            match self.cache.get_or_load(&path) {
                Ok(fixtures) => {
                    any_file = true;
                    merged.extend(fixtures.iter().cloned());
                }
                Err(ResolutionError::NoSource) => {
                    warn!(path = %path.display(), competition, "Result file missing");
                }
                Err(e) => return Err(e),
            }
        }

        if !any_file {
            return Err(ResolutionError::NoSource);
        }
        Ok(Arc::new(merged))
    }
}

/// Fixed in-memory fixtures per competition
#[derive(Default)]
pub struct StaticResultSource {
    competitions: HashMap<String, Fixtures>,
}

impl StaticResultSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixtures(mut self, competition: &str, fixtures: Vec<ParsedFixture>) -> Self {
        self.competitions
            .insert(names::normalize(competition), Arc::new(fixtures));
        self
    }

    /// Parse `raw` as a result file body for `competition`
    pub fn with_text(self, competition: &str, raw: &str) -> Self {
        self.with_fixtures(competition, parse_results_text(raw))
    }
}

impl ResultSource for StaticResultSource {
    fn name(&self) -> &str {
        "static"
    }

    fn fixtures(&self, competition: &str) -> Result<Fixtures, ResolutionError> {
        self.competitions
            .get(&names::normalize(competition))
            .cloned()
            .ok_or(ResolutionError::NoSource)
    }
}
