use std::{fs, path::PathBuf};

use serde::Deserialize;

pub const SETTINGS_FILE: &str = "relay.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub server_url: String,
    pub sensation_file: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".into(),
            sensation_file: None,
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    sensation_file: Option<PathBuf>,
    log_filter: Option<String>,
}

pub fn load_settings() -> RelaySettings {
    let mut settings = RelaySettings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

pub(crate) fn apply_file(settings: &mut RelaySettings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<FileSettings>(raw) else {
        return;
    };

    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.sensation_file {
        settings.sensation_file = Some(v);
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
}

pub(crate) fn apply_env(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("RELAY_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = lookup("RELAY_SENSATION_FILE") {
        settings.sensation_file = non_empty_path(v);
    }
    if let Some(v) = lookup("APP__SENSATION_FILE") {
        settings.sensation_file = non_empty_path(v);
    }

    if let Some(v) = lookup("RELAY_LOG") {
        settings.log_filter = v;
    }
}

fn non_empty_path(raw: String) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
