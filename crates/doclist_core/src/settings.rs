use std::{fs, io, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "doclist.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}': {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("lookahead must be at least 1")]
    ZeroLookahead,
    #[error("page_size must be at least 1")]
    ZeroPageSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub debounce_ms: u64,
    /// Items from the end of the list at which the next page is requested.
    pub lookahead: usize,
    pub page_size: u32,
    pub suggestion_limit: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            lookahead: 10,
            page_size: 25,
            suggestion_limit: 10,
        }
    }
}

impl ControllerSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.lookahead == 0 {
            return Err(SettingsError::ZeroLookahead);
        }
        if self.page_size == 0 {
            return Err(SettingsError::ZeroPageSize);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    debounce_ms: Option<u64>,
    lookahead: Option<usize>,
    page_size: Option<u32>,
    suggestion_limit: Option<usize>,
}

/// Defaults, then the TOML file at `path` when it exists, then environment
/// overrides.
pub fn load_settings(path: impl AsRef<Path>) -> Result<ControllerSettings, SettingsError> {
    let path = path.as_ref();
    let mut settings = ControllerSettings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings =
                toml::from_str(&raw).map_err(|source| SettingsError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            if let Some(v) = file_cfg.debounce_ms {
                settings.debounce_ms = v;
            }
            if let Some(v) = file_cfg.lookahead {
                settings.lookahead = v;
            }
            if let Some(v) = file_cfg.page_size {
                settings.page_size = v;
            }
            if let Some(v) = file_cfg.suggestion_limit {
                settings.suggestion_limit = v;
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

fn apply_env_overrides(
    settings: &mut ControllerSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = parse_env(&lookup, "DOCLIST_DEBOUNCE_MS") {
        settings.debounce_ms = v;
    }
    if let Some(v) = parse_env(&lookup, "APP__DEBOUNCE_MS") {
        settings.debounce_ms = v;
    }
    if let Some(v) = parse_env(&lookup, "APP__LOOKAHEAD") {
        settings.lookahead = v;
    }
    if let Some(v) = parse_env(&lookup, "APP__PAGE_SIZE") {
        settings.page_size = v;
    }
    if let Some(v) = parse_env(&lookup, "APP__SUGGESTION_LIMIT") {
        settings.suggestion_limit = v;
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("settings: ignoring unparsable override key={key} value={raw}");
            None
        }
    }
}
