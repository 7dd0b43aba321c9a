use std::{collections::HashMap, fs, path::Path};

use storage::DEFAULT_NAMESPACE;
use tracing::warn;

pub const SETTINGS_FILE: &str = "viewer.toml";
pub const DEFAULT_EXPORT_FILENAME: &str = "flow-progress.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base URL or directory holding `flows/index.json`.
    pub source: String,
    /// `sqlite:` url or plain path of the progress database.
    pub database_url: String,
    pub namespace: String,
    pub export_filename: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: "http://127.0.0.1:8000/".into(),
            database_url: default_database_url(),
            namespace: DEFAULT_NAMESPACE.into(),
            export_filename: DEFAULT_EXPORT_FILENAME.into(),
        }
    }
}

fn default_database_url() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("flow_viewer").join("progress.db"))
        .unwrap_or_else(|| Path::new("./data/progress.db").to_path_buf())
        .to_string_lossy()
        .into_owned()
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |name| std::env::var(name).ok())
}

/// Defaults, then the settings file, then environment variables. Later
/// layers win; CLI flags are applied by the caller.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("source") {
                    settings.source = v.clone();
                }
                if let Some(v) = file_cfg.get("database_url") {
                    settings.database_url = v.clone();
                }
                if let Some(v) = file_cfg.get("namespace") {
                    settings.set_namespace(v);
                }
                if let Some(v) = file_cfg.get("export_filename") {
                    settings.export_filename = v.clone();
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring unreadable settings file");
            }
        }
    }

    for name in ["FLOW_VIEWER_SOURCE", "APP__SOURCE"] {
        if let Some(v) = env(name) {
            settings.source = v;
        }
    }
    for name in ["FLOW_VIEWER_DATABASE_URL", "APP__DATABASE_URL"] {
        if let Some(v) = env(name) {
            settings.database_url = v;
        }
    }
    for name in ["FLOW_VIEWER_NAMESPACE", "APP__NAMESPACE"] {
        if let Some(v) = env(name) {
            settings.set_namespace(&v);
        }
    }
    for name in ["FLOW_VIEWER_EXPORT_FILENAME", "APP__EXPORT_FILENAME"] {
        if let Some(v) = env(name) {
            settings.export_filename = v;
        }
    }

    settings
}

impl Settings {
    /// Keeps the current namespace when `value` could collide with other keys.
    pub fn set_namespace(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() || value.contains(':') {
            warn!(namespace = value, "namespace must be non-empty and free of ':'; keeping '{}'", self.namespace);
            return;
        }
        self.namespace = value.to_string();
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
