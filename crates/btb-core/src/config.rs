use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (plus `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub blinko_base_url: String,

    // Credential encryption
    pub encryption_key: Option<String>,
    pub encryption_key_file: PathBuf,

    // Persistence
    pub database_path: PathBuf,

    // Remote API behavior
    pub request_timeout: Duration,
    pub verify_timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let blinko_base_url = env_str("BLINKO_BASE_URL").and_then(non_empty).ok_or_else(|| {
            Error::Config("BLINKO_BASE_URL environment variable is required".to_string())
        })?;

        let database_path =
            env_path("DATABASE_PATH").unwrap_or_else(|| PathBuf::from("./bot_data.db"));

        // A missing key is generated at startup and persisted to the key file;
        // regenerating on every start would invalidate all stored credentials.
        let encryption_key = env_str("ENCRYPTION_KEY").and_then(non_empty);
        let encryption_key_file =
            env_path("ENCRYPTION_KEY_FILE").unwrap_or_else(|| default_key_file(&database_path));

        let request_timeout =
            Duration::from_millis(env_u64("REQUEST_TIMEOUT_MS").unwrap_or(30_000));
        let verify_timeout = Duration::from_millis(env_u64("VERIFY_TIMEOUT_MS").unwrap_or(10_000));

        // Some deployments sit behind self-signed certificates; trusting them
        // is a deployment policy, off by default.
        let accept_invalid_certs = env_bool("ACCEPT_INVALID_CERTS").unwrap_or(false);

        Ok(Self {
            bot_token,
            blinko_base_url,
            encryption_key,
            encryption_key_file,
            database_path,
            request_timeout,
            verify_timeout,
            accept_invalid_certs,
        })
    }
}

fn default_key_file(database_path: &Path) -> PathBuf {
    let mut os = database_path.as_os_str().to_os_string();
    os.push(".key");
    PathBuf::from(os)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
