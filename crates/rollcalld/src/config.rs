use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Attendance backend base URL, including the `/api` prefix.
    pub api_base: String,
    /// Bearer token presented on every backend call.
    pub api_token: String,
    /// Base URL of the face detection/embedding sidecar.
    pub detector_url: String,
    /// Euclidean distance below which an observation matches.
    pub recognition_threshold: f32,
    /// Minimum confidence (1 − distance) to submit a match.
    pub confidence_threshold: f32,
    /// Per-student window during which repeat recognitions are skipped.
    pub cooldown_window: Duration,
    /// Tick period of the auto-recognition loop.
    pub auto_period: Duration,
    /// Tick period of the landmark-overlay loop.
    pub landmark_period: Duration,
    /// Minimum spacing between cache refreshes; earlier requests defer.
    pub refresh_cooldown: Duration,
    /// JPEG quality for submitted frame snapshots.
    pub snapshot_quality: u8,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            api_base: std::env::var("ROLLCALL_API_BASE")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            api_token: std::env::var("ROLLCALL_API_TOKEN").unwrap_or_default(),
            detector_url: std::env::var("ROLLCALL_DETECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:8090".to_string()),
            recognition_threshold: env_f32("ROLLCALL_RECOGNITION_THRESHOLD", 0.40),
            confidence_threshold: env_f32("ROLLCALL_CONFIDENCE_THRESHOLD", 0.70),
            cooldown_window: Duration::from_millis(env_u64("ROLLCALL_COOLDOWN_MS", 10_000)),
            auto_period: Duration::from_millis(env_u64("ROLLCALL_AUTO_PERIOD_MS", 1_500)),
            landmark_period: Duration::from_millis(env_u64("ROLLCALL_LANDMARK_PERIOD_MS", 100)),
            refresh_cooldown: Duration::from_millis(env_u64("ROLLCALL_REFRESH_COOLDOWN_MS", 3_000)),
            snapshot_quality: env_u64("ROLLCALL_SNAPSHOT_QUALITY", 80) as u8,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
