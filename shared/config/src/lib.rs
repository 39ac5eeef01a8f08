pub mod settings;

pub use settings::{ApiEndpoints, ConnectorSettings, DatabaseSettings, GoogleOAuthApp};

use parking_lot::RwLock;
use std::sync::Arc;

fn load_or_default() -> ConnectorSettings {
    match ConnectorSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid connector settings in environment, using defaults");
            ConnectorSettings::default()
        }
    }
}

// Process-wide settings, loaded once and reloadable
lazy_static::lazy_static! {
    static ref CACHED_SETTINGS: Arc<RwLock<Arc<ConnectorSettings>>> = {
        Arc::new(RwLock::new(Arc::new(load_or_default())))
    };
}

/// Current process-wide settings
pub fn get_cached_settings() -> Arc<ConnectorSettings> {
    CACHED_SETTINGS.read().clone()
}

/// Re-read settings from the environment
pub fn reload_settings() {
    let mut cache = CACHED_SETTINGS.write();
    *cache = Arc::new(load_or_default());
}
