use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
///
/// The backend settings are optional: without them the session runs in demo mode.
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    /// Persisted refresh token used to restore a backend session at startup.
    pub supabase_refresh_token: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            supabase_url: optional_env(&["SUPABASE_URL", "VITE_SUPABASE_URL"]),
            supabase_anon_key: optional_env(&["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"]),
            supabase_refresh_token: optional_env(&["SUPABASE_REFRESH_TOKEN"]),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// First non-empty value among `keys`.
fn optional_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
