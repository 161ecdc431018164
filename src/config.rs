use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,

    // Managed backend (identity provider, storage, change feed)
    pub backend_url: String,
    pub backend_anon_key: String,

    // Authentication configuration
    pub auth_provider: String,
    pub auth_theme: String,

    // Frontend URLs
    pub site_origin: String,

    // Storage configuration
    pub bookmark_collection: String,

    // CORS configuration
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            backend_anon_key: env::var("BACKEND_ANON_KEY")
                .expect("BACKEND_ANON_KEY must be set"),

            auth_provider: env::var("AUTH_PROVIDER").unwrap_or_else(|_| "google".to_string()),
            auth_theme: env::var("AUTH_THEME").unwrap_or_else(|_| "default".to_string()),

            site_origin: env::var("SITE_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            bookmark_collection: env::var("BOOKMARK_COLLECTION")
                .unwrap_or_else(|_| "bookmarks".to_string()),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Post-authentication redirect target, derived from the site origin.
    pub fn redirect_target(&self) -> String {
        format!("{}/auth/callback", self.site_origin.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_target_trims_trailing_slash() {
        let mut config = Config::for_tests();
        config.site_origin = "https://bookmarks.example.com/".to_string();
        assert_eq!(
            config.redirect_target(),
            "https://bookmarks.example.com/auth/callback"
        );
    }
}

impl Config {
    /// Fixed configuration for unit tests; never reads the environment.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            backend_url: "http://localhost:8000".to_string(),
            backend_anon_key: "anon-key".to_string(),
            auth_provider: "google".to_string(),
            auth_theme: "default".to_string(),
            site_origin: "http://localhost:3000".to_string(),
            bookmark_collection: "bookmarks".to_string(),
            cors_allowed_origins: "http://localhost:3000".to_string(),
        }
    }
}
