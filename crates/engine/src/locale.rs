//! Locale collaborator: supported languages, display names and the message
//! catalog used for every player-facing string.
//!
//! Message ids are the English source strings. A locale without a
//! translation for an id falls back to the id itself, so the default English
//! catalog can stay empty.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use shared::domain::LocaleTag;
use tracing::debug;

pub const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    messages: HashMap<LocaleTag, HashMap<String, String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        locale: impl Into<LocaleTag>,
        msgid: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.messages
            .entry(locale.into())
            .or_default()
            .insert(msgid.into(), text.into());
    }

    pub fn lookup(&self, locale: &LocaleTag, msgid: &str) -> Option<&str> {
        self.messages
            .get(locale)
            .and_then(|messages| messages.get(msgid))
            .map(String::as_str)
    }

    pub fn locales(&self) -> impl Iterator<Item = &LocaleTag> {
        self.messages.keys()
    }

    /// Reads every `<tag>.toml` file in `dir`; each file is a flat table of
    /// `"message id" = "translation"` pairs.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read locales directory '{}'", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            let Some(tag) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read catalog '{}'", path.display()))?;
            let messages: HashMap<String, String> = toml::from_str(&raw)
                .with_context(|| format!("failed to parse catalog '{}'", path.display()))?;

            debug!(locale = tag, entries = messages.len(), "loaded catalog");
            catalog
                .messages
                .entry(LocaleTag::new(tag))
                .or_default()
                .extend(messages);
        }

        Ok(catalog)
    }
}

#[derive(Debug, Clone)]
pub struct Languages {
    supported: Vec<LocaleTag>,
    default: LocaleTag,
    catalog: Catalog,
}

impl Default for Languages {
    fn default() -> Self {
        Self::new(LocaleTag::new(DEFAULT_LOCALE))
    }
}

impl Languages {
    pub fn new(default: LocaleTag) -> Self {
        Self {
            supported: vec![default.clone()],
            default,
            catalog: Catalog::new(),
        }
    }

    /// Supported list in the given order; the default is prepended when missing.
    pub fn with_locales(default: LocaleTag, locales: impl IntoIterator<Item = LocaleTag>) -> Self {
        let mut supported: Vec<LocaleTag> = Vec::new();
        for locale in locales {
            if !supported.contains(&locale) {
                supported.push(locale);
            }
        }
        if !supported.contains(&default) {
            supported.insert(0, default.clone());
        }

        Self {
            supported,
            default,
            catalog: Catalog::new(),
        }
    }

    /// Default locale first, then every catalog found in `dir`, sorted.
    pub fn from_dir(dir: &Path, default: LocaleTag) -> Result<Self> {
        let catalog = Catalog::load_dir(dir)?;
        let mut others: Vec<LocaleTag> = catalog
            .locales()
            .filter(|locale| **locale != default)
            .cloned()
            .collect();
        others.sort();

        let mut languages = Self::with_locales(default.clone(), std::iter::once(default).chain(others));
        languages.catalog = catalog;
        Ok(languages)
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn list(&self) -> &[LocaleTag] {
        &self.supported
    }

    pub fn count(&self) -> usize {
        self.supported.len()
    }

    pub fn default_locale(&self) -> &LocaleTag {
        &self.default
    }

    pub fn is_supported(&self, locale: &LocaleTag) -> bool {
        self.supported.contains(locale)
    }

    pub fn resolve(&self, requested: Option<&LocaleTag>) -> LocaleTag {
        requested
            .filter(|locale| self.is_supported(locale))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Entry following `current` in the supported list, wrapping around.
    /// An unknown `current` selects the first entry.
    pub fn next_after(&self, current: &LocaleTag) -> LocaleTag {
        let next = self
            .supported
            .iter()
            .position(|locale| locale == current)
            .map(|index| (index + 1) % self.supported.len())
            .unwrap_or(0);
        self.supported
            .get(next)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Name of the language in that language, capitalized.
    pub fn display_name(&self, locale: &LocaleTag) -> String {
        let primary = locale
            .as_str()
            .split(|c| c == '-' || c == '_')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let name = native_name(&primary)
            .map(str::to_string)
            .unwrap_or_else(|| locale.as_str().to_uppercase());
        capitalize(&name)
    }

    pub fn translator(&self, locale: &LocaleTag) -> Translator<'_> {
        Translator {
            locale: locale.clone(),
            catalog: &self.catalog,
        }
    }
}

/// Catalog view bound to one locale for the duration of an action.
#[derive(Debug, Clone)]
pub struct Translator<'a> {
    locale: LocaleTag,
    catalog: &'a Catalog,
}

impl Translator<'_> {
    pub fn locale(&self) -> &LocaleTag {
        &self.locale
    }

    pub fn tr(&self, msgid: &str) -> String {
        self.catalog
            .lookup(&self.locale, msgid)
            .unwrap_or(msgid)
            .to_string()
    }

    pub fn tr_with(&self, msgid: &str, replacements: &[(&str, &str)]) -> String {
        replacements
            .iter()
            .fold(self.tr(msgid), |text, (placeholder, value)| {
                text.replace(placeholder, value)
            })
    }
}

fn native_name(primary: &str) -> Option<&'static str> {
    Some(match primary {
        "en" => "English",
        "pl" => "polski",
        "de" => "Deutsch",
        "fr" => "français",
        "es" => "español",
        "it" => "italiano",
        "pt" => "português",
        "nl" => "Nederlands",
        "ru" => "русский",
        "uk" => "українська",
        "cs" => "čeština",
        "tr" => "Türkçe",
        "id" => "Indonesia",
        "fa" => "فارسی",
        "ar" => "العربية",
        "zh" => "中文",
        "ja" => "日本語",
        "ko" => "한국어",
        _ => return None,
    })
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "tests/locale_tests.rs"]
mod tests;
