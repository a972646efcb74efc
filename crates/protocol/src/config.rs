use crate::language::default_supported_extensions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration bundle threaded through the engine.
///
/// There are no global singletons: callers build one of these (usually from
/// `Default`) and hand it to the coordinator, which passes the relevant
/// sections down to the components that need them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub traversal: TraversalConfig,
    pub chunking: ChunkingConfig,
    pub batching: BatchConfig,
    pub retry: RetryConfig,
    pub watcher: WatcherConfig,
    pub memory: MemoryConfig,

    /// Embedding provider name, used for the dimension fallback table when
    /// the provider cannot be queried.
    pub embedder: String,
}

impl IndexingConfig {
    /// Validate every section; the first violation is returned.
    pub fn validate(&self) -> Result<(), String> {
        self.chunking.validate()?;
        self.batching.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

/// Filesystem traversal options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalConfig {
    /// Glob patterns a file must match to be indexed. Empty = everything.
    pub include_patterns: Vec<String>,

    /// Glob patterns that exclude a file. Exclusion wins over inclusion.
    pub exclude_patterns: Vec<String>,

    /// Files larger than this are skipped and reported.
    pub max_file_size: u64,

    /// Extension → language whitelist.
    pub supported_extensions: HashMap<String, String>,

    /// Directory names that are never descended into.
    pub ignore_directories: Vec<String>,

    /// Skip dotfiles and dot-directories.
    pub ignore_hidden_files: bool,

    /// Merge root `.gitignore` patterns into the excludes.
    pub respect_gitignore: bool,

    /// Follow symlinked directories (cycle-guarded either way).
    pub follow_symlinks: bool,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_file_size: 10 * 1024 * 1024,
            supported_extensions: default_supported_extensions(),
            ignore_directories: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "dist".to_string(),
                "build".to_string(),
                "target".to_string(),
                "coverage".to_string(),
                ".cache".to_string(),
            ],
            ignore_hidden_files: true,
            respect_gitignore: true,
            follow_symlinks: false,
        }
    }
}

/// Chunking shape knobs (sizes are characters, windows are lines).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub max_lines_per_chunk: usize,
    pub overlap_size: usize,
    pub max_overlap_ratio: f64,
    pub similarity_threshold: f64,

    /// Files at or below this content length bypass strategy selection and
    /// are emitted as a single chunk.
    pub small_file_threshold: usize,

    /// Complexity score above which the semantic strategy applies.
    pub complexity_threshold: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 100,
            max_chunk_size: 2000,
            max_lines_per_chunk: 60,
            overlap_size: 5,
            max_overlap_ratio: 0.3,
            similarity_threshold: 0.8,
            small_file_threshold: 10_000,
            complexity_threshold: 40,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_size == 0 {
            return Err("max_chunk_size must be > 0".to_string());
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(format!(
                "min_chunk_size ({}) cannot exceed max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            ));
        }
        if self.max_lines_per_chunk == 0 {
            return Err("max_lines_per_chunk must be > 0".to_string());
        }
        if self.overlap_size >= self.max_lines_per_chunk {
            return Err(format!(
                "overlap_size ({}) must be smaller than max_lines_per_chunk ({})",
                self.overlap_size, self.max_lines_per_chunk
            ));
        }
        if !(0.0..=1.0).contains(&self.max_overlap_ratio) {
            return Err("max_overlap_ratio must be within 0.0..=1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err("similarity_threshold must be within 0.0..=1.0".to_string());
        }
        Ok(())
    }
}

/// Adaptive batching shape for an indexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub initial_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub adjustment_factor: f64,

    /// Per-batch wall-time target; slower batches shrink, faster grow.
    pub performance_threshold_ms: u64,

    /// Concurrent items within one batch.
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_size: 20,
            min_size: 5,
            max_size: 100,
            adjustment_factor: 1.5,
            performance_threshold_ms: 2_000,
            max_concurrency: 8,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_size == 0 {
            return Err("min_size must be > 0".to_string());
        }
        if self.min_size > self.max_size {
            return Err(format!(
                "min_size ({}) cannot exceed max_size ({})",
                self.min_size, self.max_size
            ));
        }
        if !(self.min_size..=self.max_size).contains(&self.initial_size) {
            return Err(format!(
                "initial_size ({}) must lie within [{}, {}]",
                self.initial_size, self.min_size, self.max_size
            ));
        }
        if self.adjustment_factor <= 1.0 {
            return Err("adjustment_factor must be > 1.0".to_string());
        }
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be > 0".to_string());
        }
        Ok(())
    }
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    pub backoff_factor: f64,

    /// Jitter ratio in `0.0..=1.0`; each delay is scaled by `1 ± jitter`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_factor < 1.0 {
            return Err("backoff_factor must be >= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be within 0.0..=1.0".to_string());
        }
        Ok(())
    }
}

/// Filesystem watcher timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Quiet period after the last raw event for a path before the logical
    /// event fires.
    pub debounce_ms: u64,

    /// Window within which a delete followed by a matching add collapses
    /// into a rename.
    pub rename_window_ms: u64,

    /// Suppress events for files already present when watching starts.
    pub ignore_initial: bool,

    /// Extra glob patterns ignored by the watcher, merged with the path
    /// filter's excludes.
    pub ignored: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            rename_window_ms: 1_000,
            ignore_initial: true,
            ignored: Vec::new(),
        }
    }
}

impl WatcherConfig {
    /// Tighter timings for deterministic test harnesses.
    pub fn for_tests() -> Self {
        Self {
            debounce_ms: 100,
            rename_window_ms: 250,
            ..Default::default()
        }
    }
}

/// Memory-pressure thresholds for the adaptive batch runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub memory_limit_mb: u64,

    /// Above this percentage of the limit, batch size is forced to minimum.
    pub emergency_percent: f64,

    /// Above this percentage, the cooperative cleanup hook runs.
    pub critical_percent: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 512,
            emergency_percent: 80.0,
            critical_percent: 90.0,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(IndexingConfig::default().validate().is_ok());
    }

    #[test]
    fn chunking_rejects_inverted_bounds() {
        let config = ChunkingConfig {
            min_chunk_size: 5_000,
            max_chunk_size: 2_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn chunking_rejects_overlap_wider_than_window() {
        let config = ChunkingConfig {
            overlap_size: 60,
            max_lines_per_chunk: 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn batching_rejects_initial_outside_range() {
        let config = BatchConfig {
            initial_size: 200,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_round_trips_through_json() {
        let config = RetryConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: RetryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base_delay, config.base_delay);
        assert_eq!(back.max_attempts, config.max_attempts);
    }

    #[test]
    fn test_watcher_config_tightens_timings() {
        let config = WatcherConfig::for_tests();
        assert!(config.debounce_ms < WatcherConfig::default().debounce_ms);
        assert!(config.rename_window_ms < WatcherConfig::default().rename_window_ms);
    }
}
