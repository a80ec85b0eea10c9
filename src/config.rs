use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GoogleKeys {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub blob_dir: PathBuf,
    /// Externally visible origin, used for OAuth redirects.
    pub public_url: String,
    pub google: Option<GoogleKeys>,
    pub session_minutes: i64,
    pub upload_limit_bytes: usize,
}

impl Config {
    /// Reads the environment, after loading `.env` if there is one.
    pub fn load() -> anyhow::Result<Self> {
        if dotenv::dotenv().is_err() {
            info!("no .env file, using the process environment");
        }

        let port = try_load("PORT", "8080")?;
        let upload_limit_mb: usize = try_load("MAX_UPLOAD_MB", "16")?;

        let google = match (var("GOOGLE_CLIENT_ID"), var("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleKeys { client_id, client_secret }),
            (None, None) => {
                info!("Google sign-in disabled");
                None
            }
            _ => return Err(anyhow!("GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set together")),
        };

        Ok(Self {
            port,
            database_url: try_load("DATABASE_URL", "sqlite://linkal.db")?,
            blob_dir: try_load("BLOB_DIR", "blobs")?,
            public_url: try_load::<String>("PUBLIC_URL", &format!("http://localhost:{port}"))?
                .trim_end_matches('/')
                .to_owned(),
            google,
            session_minutes: try_load("SESSION_MINUTES", "60")?,
            upload_limit_bytes: upload_limit_mb * 1024 * 1024,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });

    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow!("{e}")
    }).with_context(|| format!("environment misconfigured: {key}"))
}
