use chrono::{Duration, Utc};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 10;
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub upload_field: String,
    pub max_file_size: u64,
    pub max_files: usize,
    pub token_ttl_secs: i64,
    /// SQLite file for users; in-memory when unset.
    pub database_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("upload"),
            upload_field: "files".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            database_path: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let mut config = Self::new(jwt_secret);
        config.port = parse_or(&lookup, "PORT", config.port)?;
        config.max_file_size = parse_or(&lookup, "MAX_FILE_SIZE", config.max_file_size)?;
        config.max_files = parse_or(&lookup, "MAX_FILES", config.max_files)?;
        config.token_ttl_secs = parse_or(&lookup, "TOKEN_TTL_SECS", config.token_ttl_secs)?;

        if let Some(dir) = lookup("UPLOAD_DIR").filter(|s| !s.is_empty()) {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(field) = lookup("UPLOAD_FIELD").filter(|s| !s.is_empty()) {
            config.upload_field = field;
        }
        config.database_path = lookup("DATABASE_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        if config.max_files == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_FILES",
                value: "0".to_string(),
            });
        }
        let ttl_fits = Duration::try_seconds(config.token_ttl_secs)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .is_some();
        if config.token_ttl_secs <= 0 || !ttl_fits {
            return Err(ConfigError::Invalid {
                name: "TOKEN_TTL_SECS",
                value: config.token_ttl_secs.to_string(),
            });
        }

        Ok(config)
    }

    /// Largest request body the upload route will read.
    pub fn body_limit(&self) -> usize {
        // Room for part headers and boundaries on top of the file bytes.
        const MULTIPART_OVERHEAD: usize = 64 * 1024;
        usize::try_from(self.max_file_size)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.max_files)
            .saturating_add(MULTIPART_OVERHEAD)
    }

    /// Token lifetime; out-of-range values fall back to the default.
    pub fn token_ttl(&self) -> Duration {
        Duration::try_seconds(self.token_ttl_secs)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) if value.is_empty() => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
