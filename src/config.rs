use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub timeout: Option<Duration>,
    /// How long backend output files survive after they have been read.
    pub artifact_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WatermarkConfig {
    pub logo_path: PathBuf,
    pub convert_bin: String,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub time_to_live: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub overall_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: Option<u16>,
    pub bind_address: String,
    pub backend: BackendConfig,
    pub moderation: ModerationConfig,
    pub watermark: WatermarkConfig,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub feed_capacity: usize,
    pub json_logs: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            url: "http://localhost:5555/predict".to_string(),
            timeout: None,
            artifact_grace: Duration::from_secs(10),
        }
    }
}

impl BackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        BackendConfig {
            url: env::var("BACKEND_URL").unwrap_or(defaults.url),
            timeout: env_parse("BACKEND_TIMEOUT_SECS").map(Duration::from_secs),
            artifact_grace: env_parse("ARTIFACT_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.artifact_grace),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_artifact_grace(mut self, grace: Duration) -> Self {
        self.artifact_grace = grace;
        self
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        ModerationConfig { url: None }
    }
}

impl ModerationConfig {
    pub fn from_env() -> Self {
        ModerationConfig {
            url: env::var("MODERATION_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        WatermarkConfig {
            logo_path: PathBuf::from("logo.png"),
            convert_bin: "convert".to_string(),
            offset: 10,
        }
    }
}

impl WatermarkConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        WatermarkConfig {
            logo_path: env::var("WATERMARK_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.logo_path),
            convert_bin: env::var("CONVERT_BIN").unwrap_or(defaults.convert_bin),
            offset: env_parse("WATERMARK_OFFSET").unwrap_or(defaults.offset),
        }
    }

    pub fn with_logo(mut self, path: impl Into<PathBuf>) -> Self {
        self.logo_path = path.into();
        self
    }

    pub fn with_convert_bin(mut self, bin: impl Into<String>) -> Self {
        self.convert_bin = bin.into();
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: 1_000,
            time_to_live: None,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        CacheConfig {
            max_entries: env_parse("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            time_to_live: env_parse("CACHE_TTL_SECS").map(Duration::from_secs),
        }
    }

    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: Some(10),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            overall_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = match env_parse::<u32>("RETRY_MAX_ATTEMPTS") {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.max_attempts,
        };
        RetryPolicy {
            max_attempts,
            initial_backoff: env_parse("RETRY_INITIAL_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: env_parse("RETRY_MAX_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
            multiplier: env_parse("RETRY_MULTIPLIER").unwrap_or(defaults.multiplier),
            overall_timeout: env_parse("REQUEST_TIMEOUT_SECS").map(Duration::from_secs),
        }
    }

    /// Retry forever without pausing between attempts.
    pub fn unbounded() -> Self {
        RetryPolicy {
            max_attempts: None,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            overall_timeout: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// Delay before attempt `attempt` (0-based). The first attempt never waits.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1.0).powi(attempt as i32 - 1);
        let nanos = (self.initial_backoff.as_nanos() as f64 * factor).min(u64::MAX as f64);
        Duration::from_nanos(nanos as u64).min(self.max_backoff)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: None,
            bind_address: "0.0.0.0".to_string(),
            backend: BackendConfig::default(),
            moderation: ModerationConfig::default(),
            watermark: WatermarkConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
            feed_capacity: 256,
            json_logs: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let port = env_parse("PORT");
        let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());
        let json_logs = env::var("LOG_JSON").ok().map_or(false, |val| val == "true");

        Config {
            port,
            bind_address,
            backend: BackendConfig::from_env(),
            moderation: ModerationConfig::from_env(),
            watermark: WatermarkConfig::from_env(),
            cache: CacheConfig::from_env(),
            retry: RetryPolicy::from_env(),
            feed_capacity: env_parse("FEED_CAPACITY").unwrap_or(256),
            json_logs,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_backend(mut self, config: BackendConfig) -> Self {
        self.backend = config;
        self
    }

    pub fn with_moderation(mut self, config: ModerationConfig) -> Self {
        self.moderation = config;
        self
    }

    pub fn with_watermark(mut self, config: WatermarkConfig) -> Self {
        self.watermark = config;
        self
    }

    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }
}
