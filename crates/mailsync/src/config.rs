//! Pipeline configuration
//!
//! All tuning knobs are plain construction-time options. The library never
//! reads files or environment variables.

/// Options for the sync and analysis pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum newly ingested messages handed to analysis per sync run
    pub max_batch_per_run: usize,
    /// Message bodies are truncated to this many bytes at a UTF-8 boundary
    pub max_body_bytes: usize,
    /// TTL of the per-account sync lock, in seconds
    pub lock_ttl_secs: i64,
    /// How many recent messages a full resync enumerates
    pub recent_window: usize,
    /// Worker threads draining the sync job queue
    pub worker_count: usize,
    /// Bounded depth of the sync job queue; overflow drops the job
    pub queue_depth: usize,
    /// Version tag stamped onto every analysis result
    pub analyzer_version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_per_run: 25,
            max_body_bytes: 64 * 1024,
            lock_ttl_secs: 300,
            recent_window: 100,
            worker_count: 2,
            queue_depth: 64,
            analyzer_version: "v1".to_string(),
        }
    }
}
