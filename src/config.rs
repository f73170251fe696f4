use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8190;
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-1.5-flash";
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 168;
/// Ten years.
pub const MAX_SESSION_TTL_HOURS: i64 = 87_600;

/// Runtime configuration, read once at startup from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub openrouter_api_key: Option<String>,
    pub openrouter_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub llm_timeout: Duration,
    pub chat_max_steps: usize,
    pub supabase: Option<SupabaseConfig>,
    pub db_path: PathBuf,
    pub session_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
    pub history_queue_capacity: usize,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            openrouter_api_key: None,
            openrouter_url: DEFAULT_OPENROUTER_URL.to_string(),
            chat_model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            llm_timeout: Duration::from_secs(60),
            chat_max_steps: 1,
            supabase: None,
            db_path: PathBuf::from("farmwise.db"),
            session_ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            history_queue_capacity: 256,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let openrouter_api_key = non_empty_var("OPENROUTER_API_KEY");
        if openrouter_api_key.is_none() {
            warn!(
                "OPENROUTER_API_KEY is not set; /api/chat and /api/pest-detection will reject requests \
                 until it is configured"
            );
        }

        let chat_model = non_empty_var("OPENROUTER_MODEL").unwrap_or(defaults.chat_model);
        let vision_model =
            non_empty_var("OPENROUTER_VISION_MODEL").unwrap_or_else(|| chat_model.clone());

        let supabase = match (non_empty_var("SUPABASE_URL"), non_empty_var("SUPABASE_SERVICE_KEY")) {
            (Some(url), Some(service_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            (Some(_), None) => {
                warn!("SUPABASE_URL is set without SUPABASE_SERVICE_KEY; using the embedded SQLite store");
                None
            }
            _ => None,
        };

        let config = Self {
            port: parse_var("FARMWISE_PORT", defaults.port),
            openrouter_api_key,
            openrouter_url: non_empty_var("OPENROUTER_URL").unwrap_or(defaults.openrouter_url),
            chat_model,
            vision_model,
            llm_timeout: Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", 60u64)),
            chat_max_steps: parse_var("CHAT_MAX_STEPS", defaults.chat_max_steps).max(1),
            supabase,
            db_path: non_empty_var("FARMWISE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            session_ttl: chrono::Duration::hours(session_ttl_hours(parse_var(
                "SESSION_TTL_HOURS",
                DEFAULT_SESSION_TTL_HOURS,
            ))),
            bcrypt_cost: parse_var("BCRYPT_COST", defaults.bcrypt_cost).clamp(4, 31),
            history_queue_capacity: parse_var("HISTORY_QUEUE_CAPACITY", defaults.history_queue_capacity)
                .max(1),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        };

        info!(
            port = config.port,
            openrouter_url = %config.openrouter_url,
            chat_model = %config.chat_model,
            vision_model = %config.vision_model,
            chat_max_steps = config.chat_max_steps,
            store = if config.supabase.is_some() { "supabase" } else { "sqlite" },
            "Configuration loaded"
        );

        config
    }
}

/// Outcome of [`load_dotenv`], reported once logging is up.
#[derive(Debug, Default)]
pub struct DotenvReport {
    pub loaded: Option<PathBuf>,
    pub failures: Vec<(PathBuf, dotenvy::Error)>,
}

impl DotenvReport {
    pub fn log(&self) {
        for (path, e) in &self.failures {
            warn!(path = %path.display(), error = %e, "Failed to load .env");
        }
        match &self.loaded {
            Some(path) => info!(path = %path.display(), "Loaded .env"),
            None => info!("No .env file loaded"),
        }
    }
}

/// Loads `.env` from the crate directory first, then from the working directory.
///
/// Runs before the subscriber exists so `RUST_LOG` can come from the file.
pub fn load_dotenv() -> DotenvReport {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    load_dotenv_from([manifest_dir.join(".env"), PathBuf::from(".env")])
}

fn load_dotenv_from(candidates: impl IntoIterator<Item = PathBuf>) -> DotenvReport {
    let mut report = DotenvReport::default();
    for candidate in candidates {
        if !candidate.exists() {
            continue;
        }
        match dotenvy::from_path(&candidate) {
            Ok(_) => {
                report.loaded = Some(candidate);
                break;
            }
            Err(e) => report.failures.push((candidate, e)),
        }
    }
    report
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        None => default,
        Some(raw) => raw.parse::<T>().unwrap_or_else(|e| {
            warn!(key = key, value = %raw, error = %e, fallback = %default, "Invalid value; using default");
            default
        }),
    }
}

fn session_ttl_hours(hours: i64) -> i64 {
    let clamped = hours.clamp(1, MAX_SESSION_TTL_HOURS);
    if clamped != hours {
        warn!(
            key = "SESSION_TTL_HOURS",
            value = hours,
            fallback = clamped,
            "Session lifetime out of range; clamping"
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotenv_loads_first_readable_candidate() {
        let dir = env::temp_dir().join(format!("farmwise-dotenv-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let env_file = dir.join(".env");
        std::fs::write(&env_file, "FARMWISE_DOTENV_TEST_FILTER=farmwise_gateway=debug\n").unwrap();

        let report = load_dotenv_from([dir.join("missing.env"), env_file.clone()]);
        assert_eq!(report.loaded.as_deref(), Some(env_file.as_path()));
        assert!(report.failures.is_empty());
        assert_eq!(
            env::var("FARMWISE_DOTENV_TEST_FILTER").unwrap(),
            "farmwise_gateway=debug"
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_session_ttl_is_clamped_to_a_positive_range() {
        assert_eq!(session_ttl_hours(168), 168);
        assert_eq!(session_ttl_hours(0), 1);
        assert_eq!(session_ttl_hours(-24), 1);
        assert_eq!(session_ttl_hours(5_000_000_000), MAX_SESSION_TTL_HOURS);
        // The clamped maximum must still be a representable lifetime.
        assert!(chrono::Utc::now()
            .checked_add_signed(chrono::Duration::hours(MAX_SESSION_TTL_HOURS))
            .is_some());
    }
}
