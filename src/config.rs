use std::path::PathBuf;

/// Percentage of a video that must be watched before it counts as complete.
pub const DEFAULT_UNLOCK_THRESHOLD: u8 = 90;

const DEFAULT_STORAGE_DIR: &str = "lesson_data";
const DEFAULT_COOKIE_PREFIX: &str = "kajabi";
const DEFAULT_RESCAN_INTERVAL_MS: u64 = 2_000;
const DEFAULT_TRACK_INTERVAL_MS: u64 = 15_000;
const DEFAULT_BADGE_DISMISS_MS: u64 = 3_000;

/// Referrers never worth a back button (search engines and social feeds).
const DEFAULT_EXCLUDED_REFERRERS: [&str; 5] = [
    "google.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "linkedin.com",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub telemetry_base_url: String,
    pub storage_dir: PathBuf,
    pub cookie_jar_path: PathBuf,
    pub cookie_prefix: String,
    pub unlock_threshold: u8,
    pub rescan_interval_ms: u64,
    pub track_interval_ms: u64,
    pub badge_dismiss_ms: u64,
    /// Only offer the back button for same-host referrers.
    pub referrer_internal_only: bool,
    /// When non-empty, only these referrer domains are accepted.
    pub referrer_allowed_domains: Vec<String>,
    pub referrer_excluded_domains: Vec<String>,
}

impl Config {
    pub fn load() -> Self {
        let telemetry_base_url = std::env::var("TELEMETRY_BASE_URL").unwrap_or_default();
        let storage_dir =
            PathBuf::from(std::env::var("STORAGE_DIR").unwrap_or(DEFAULT_STORAGE_DIR.into()));
        let cookie_jar_path = std::env::var("COOKIE_JAR_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| storage_dir.join("cookies.txt"));
        let cookie_prefix = std::env::var("COOKIE_PREFIX").unwrap_or(DEFAULT_COOKIE_PREFIX.into());
        Config {
            telemetry_base_url,
            storage_dir,
            cookie_jar_path,
            cookie_prefix,
            unlock_threshold: env_number("UNLOCK_THRESHOLD", DEFAULT_UNLOCK_THRESHOLD),
            rescan_interval_ms: env_number("RESCAN_INTERVAL_MS", DEFAULT_RESCAN_INTERVAL_MS),
            track_interval_ms: env_number("TRACK_INTERVAL_MS", DEFAULT_TRACK_INTERVAL_MS),
            badge_dismiss_ms: env_number("BADGE_DISMISS_MS", DEFAULT_BADGE_DISMISS_MS),
            referrer_internal_only: std::env::var("REFERRER_INTERNAL_ONLY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            referrer_allowed_domains: env_list("REFERRER_ALLOWED_DOMAINS", &[]),
            referrer_excluded_domains: env_list(
                "REFERRER_EXCLUDED_DOMAINS",
                &DEFAULT_EXCLUDED_REFERRERS,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.telemetry_base_url.is_empty() {
            return Err("TELEMETRY_BASE_URL is missing".into());
        }
        if self.unlock_threshold == 0 || self.unlock_threshold > 100 {
            return Err(format!(
                "UNLOCK_THRESHOLD must be 1-100, got {}",
                self.unlock_threshold
            ));
        }
        if self.rescan_interval_ms == 0 {
            return Err("RESCAN_INTERVAL_MS must be non-zero".into());
        }
        if self.track_interval_ms == 0 {
            return Err("TRACK_INTERVAL_MS must be non-zero".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let storage_dir = PathBuf::from(DEFAULT_STORAGE_DIR);
        Config {
            telemetry_base_url: String::new(),
            cookie_jar_path: storage_dir.join("cookies.txt"),
            storage_dir,
            cookie_prefix: DEFAULT_COOKIE_PREFIX.into(),
            unlock_threshold: DEFAULT_UNLOCK_THRESHOLD,
            rescan_interval_ms: DEFAULT_RESCAN_INTERVAL_MS,
            track_interval_ms: DEFAULT_TRACK_INTERVAL_MS,
            badge_dismiss_ms: DEFAULT_BADGE_DISMISS_MS,
            referrer_internal_only: false,
            referrer_allowed_domains: Vec::new(),
            referrer_excluded_domains: DEFAULT_EXCLUDED_REFERRERS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

fn env_number<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(name: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect(),
        Err(_) => default.iter().map(|d| d.to_string()).collect(),
    }
}
