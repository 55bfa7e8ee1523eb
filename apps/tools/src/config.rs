use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use engine::{ConcurrencyPolicy, CrashReporter, DumpReporter, EngineConfig, Languages, LogReporter};
use serde::Deserialize;
use shared::domain::{LocaleTag, UserId};

pub const SETTINGS_FILE: &str = "tools.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub debug: bool,
    pub admin_id: Option<i64>,
    pub locales_dir: Option<PathBuf>,
    pub default_locale: String,
    pub crash_dump_dir: Option<PathBuf>,
    pub game_code: String,
    pub game_title: String,
    pub concurrency: ConcurrencyPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/sessions.db".into(),
            debug: false,
            admin_id: None,
            locales_dir: None,
            default_locale: engine::DEFAULT_LOCALE.into(),
            crash_dump_dir: None,
            game_code: "game".into(),
            game_title: "Game".into(),
            concurrency: ConcurrencyPolicy::default(),
        }
    }
}

impl Settings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            debug_mode: self.debug,
            admin_id: self.admin_id.map(UserId),
            concurrency: self.concurrency,
            ..EngineConfig::default()
        }
    }

    pub fn languages(&self) -> anyhow::Result<Languages> {
        let default = LocaleTag::new(self.default_locale.clone());
        match &self.locales_dir {
            Some(dir) => Languages::from_dir(dir, default),
            None => Ok(Languages::new(default)),
        }
    }

    pub fn crash_reporter(&self) -> Arc<dyn CrashReporter> {
        match &self.crash_dump_dir {
            Some(dir) => Arc::new(DumpReporter::new(dir)),
            None => Arc::new(LogReporter),
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = read_settings_file(Path::new(SETTINGS_FILE))?;
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// Missing file means defaults; a file that does not parse is an error.
pub fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    toml::from_str(&raw).with_context(|| format!("failed to parse '{}'", path.display()))
}

/// Later keys win: `APP__*` overrides the short legacy names.
pub fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("DEBUG") {
        settings.debug = parse_flag(&v);
    }
    if let Some(v) = var("APP__DEBUG") {
        settings.debug = parse_flag(&v);
    }

    for key in ["BOT_ADMIN", "APP__ADMIN_ID"] {
        if let Some(v) = var(key) {
            if let Ok(parsed) = v.trim().parse::<i64>() {
                settings.admin_id = Some(parsed);
            }
        }
    }

    if let Some(v) = var("APP__LOCALES_DIR") {
        settings.locales_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = var("APP__DEFAULT_LOCALE") {
        settings.default_locale = v;
    }
    if let Some(v) = var("APP__CRASH_DUMP_DIR") {
        settings.crash_dump_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = var("APP__GAME_CODE") {
        settings.game_code = v;
    }
    if let Some(v) = var("APP__GAME_TITLE") {
        settings.game_title = v;
    }
    if let Some(v) = var("APP__CONCURRENCY") {
        match v.parse() {
            Ok(policy) => settings.concurrency = policy,
            Err(err) => tracing::warn!(error = %err, "ignoring APP__CONCURRENCY"),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Accepts bare file paths and `sqlite:` URLs. The store creates the parent
/// directory when it opens the file.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
