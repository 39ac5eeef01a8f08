use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Base URLs of the third-party APIs the connectors talk to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiEndpoints {
    pub github: String,
    pub slack: String,
    pub google_drive: String,
    pub google_oauth_token: String,
    pub dropbox_api: String,
    pub dropbox_content: String,
    pub notion: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            github: "https://api.github.com".to_string(),
            slack: "https://slack.com/api".to_string(),
            google_drive: "https://www.googleapis.com/drive/v3".to_string(),
            google_oauth_token: "https://oauth2.googleapis.com/token".to_string(),
            dropbox_api: "https://api.dropboxapi.com/2".to_string(),
            dropbox_content: "https://content.dropboxapi.com/2".to_string(),
            notion: "https://api.notion.com/v1".to_string(),
        }
    }
}

/// OAuth application used when a stored Google token does not carry its own client
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GoogleOAuthApp {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorSettings {
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Root directory of uploaded files read by the file connector
    pub file_store_root: PathBuf,
    /// Upper bound on pages visited by a recursive web crawl
    pub web_max_pages: usize,
    pub endpoints: ApiEndpoints,
    pub google_oauth: GoogleOAuthApp,
    pub database: DatabaseSettings,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            user_agent: "Recap/1.0 (+https://github.com/recap-ai/recap)".to_string(),
            file_store_root: PathBuf::from("file_store"),
            web_max_pages: 500,
            endpoints: ApiEndpoints::default(),
            google_oauth: GoogleOAuthApp::default(),
            database: DatabaseSettings::default(),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

impl ConnectorSettings {
    /// Load settings from the process environment (and `.env` when present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let endpoints = ApiEndpoints {
            github: env_string("GITHUB_API_URL", defaults.endpoints.github),
            slack: env_string("SLACK_API_URL", defaults.endpoints.slack),
            google_drive: env_string("GOOGLE_DRIVE_API_URL", defaults.endpoints.google_drive),
            google_oauth_token: env_string(
                "GOOGLE_OAUTH_TOKEN_URL",
                defaults.endpoints.google_oauth_token,
            ),
            dropbox_api: env_string("DROPBOX_API_URL", defaults.endpoints.dropbox_api),
            dropbox_content: env_string("DROPBOX_CONTENT_URL", defaults.endpoints.dropbox_content),
            notion: env_string("NOTION_API_URL", defaults.endpoints.notion),
        };

        Ok(Self {
            request_timeout_secs: env_or("CONNECTOR_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            user_agent: env_string("CONNECTOR_USER_AGENT", defaults.user_agent),
            file_store_root: env_or("FILE_STORE_ROOT", defaults.file_store_root)?,
            web_max_pages: env_or("WEB_CONNECTOR_MAX_PAGES", defaults.web_max_pages)?,
            endpoints,
            google_oauth: GoogleOAuthApp {
                client_id: std::env::var("GOOGLE_OAUTH_CLIENT_ID").ok(),
                client_secret: std::env::var("GOOGLE_OAUTH_CLIENT_SECRET").ok(),
            },
            database: DatabaseSettings {
                url: std::env::var("DATABASE_URL").ok(),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.database.max_connections)?,
            },
        })
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_env_or_falls_back_on_missing_key() {
        let value: u64 = env_or("RECAP_TEST_SURELY_UNSET_KEY", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("RECAP_TEST_BAD_TIMEOUT", "soon");
        let result: Result<u64> = env_or("RECAP_TEST_BAD_TIMEOUT", 30);
        assert!(result.is_err());
        std::env::remove_var("RECAP_TEST_BAD_TIMEOUT");
    }

    #[test]
    fn test_defaults_point_at_public_apis() {
        let settings = ConnectorSettings::default();
        assert_eq!(settings.endpoints.github, "https://api.github.com");
        assert_eq!(settings.request_timeout(), std::time::Duration::from_secs(30));
        assert_eq!(settings.database.max_connections, 5);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("CONNECTOR_REQUEST_TIMEOUT_SECS", "5");
        std::env::set_var("SLACK_API_URL", "http://127.0.0.1:9999/api");
        std::env::set_var("FILE_STORE_ROOT", "/srv/recap/files");

        let settings = ConnectorSettings::from_env().unwrap();
        assert_eq!(settings.request_timeout_secs, 5);
        assert_eq!(settings.endpoints.slack, "http://127.0.0.1:9999/api");
        assert_eq!(settings.file_store_root, PathBuf::from("/srv/recap/files"));
        assert_eq!(settings.endpoints.github, "https://api.github.com");

        std::env::remove_var("CONNECTOR_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("SLACK_API_URL");
        std::env::remove_var("FILE_STORE_ROOT");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_number() {
        std::env::set_var("WEB_CONNECTOR_MAX_PAGES", "many");
        assert!(ConnectorSettings::from_env().is_err());
        std::env::remove_var("WEB_CONNECTOR_MAX_PAGES");
    }
}
