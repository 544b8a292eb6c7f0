//! Engine configuration.

use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrently executing tasks
    pub max_concurrent_tasks: usize,
    /// Work directory for temporary files
    pub work_dir: String,
    /// How often the poll loop scans for due task rows
    pub poll_interval: Duration,
    /// How often the keep-alive ticker extends an in-flight task's lease
    pub keepalive_interval: Duration,
    /// Lease window granted by each keep-alive extension
    pub keepalive_lease: Duration,
    /// Maximum declared/observed upload size in bytes
    pub max_upload_bytes: u64,
    /// How long an upload session may stay incomplete before it is failed
    pub upload_deadline: Duration,
    /// Maximum audio tracks per container
    pub max_audio_tracks: usize,
    /// Maximum subtitle tracks per container
    pub max_subtitle_tracks: usize,
    /// FFmpeg invocation timeout in seconds
    pub transcode_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            work_dir: "/tmp/hlspack".to_string(),
            poll_interval: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(60),
            keepalive_lease: Duration::from_secs(600),
            max_upload_bytes: 4 * 1024 * 1024 * 1024,
            upload_deadline: Duration::from_secs(24 * 3600),
            max_audio_tracks: 10,
            max_subtitle_tracks: 10,
            transcode_timeout_secs: 1800,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_tasks: env_parse("ENGINE_MAX_TASKS", defaults.max_concurrent_tasks),
            work_dir: std::env::var("ENGINE_WORK_DIR").unwrap_or(defaults.work_dir),
            poll_interval: Duration::from_secs(env_parse(
                "ENGINE_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )),
            keepalive_interval: Duration::from_secs(env_parse(
                "ENGINE_KEEPALIVE_INTERVAL_SECS",
                defaults.keepalive_interval.as_secs(),
            )),
            keepalive_lease: Duration::from_secs(env_parse(
                "ENGINE_KEEPALIVE_LEASE_SECS",
                defaults.keepalive_lease.as_secs(),
            )),
            max_upload_bytes: env_parse("ENGINE_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            upload_deadline: Duration::from_secs(env_parse(
                "ENGINE_UPLOAD_DEADLINE_SECS",
                defaults.upload_deadline.as_secs(),
            )),
            max_audio_tracks: env_parse("ENGINE_MAX_AUDIO_TRACKS", defaults.max_audio_tracks),
            max_subtitle_tracks: env_parse(
                "ENGINE_MAX_SUBTITLE_TRACKS",
                defaults.max_subtitle_tracks,
            ),
            transcode_timeout_secs: env_parse(
                "ENGINE_TRANSCODE_TIMEOUT_SECS",
                defaults.transcode_timeout_secs,
            ),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
