//! Configuration loaded from the environment.

use std::{env, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use tally_engine::{
    Catalog, CountSessionItem, RetryPolicy, ScanSettings, SessionId, Timing, TrackedItem,
};

use crate::error::Result;

/// Session configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Engine settings for the configured count
    pub settings: ScanSettings,
    /// JSON catalog file for the console
    pub catalog_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let count_id = lookup("TALLY_COUNT_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingCountId)?;

        let defaults = ScanSettings::new(count_id.clone());
        let timing = Timing {
            debounce_ms: parse(&lookup, "TALLY_DEBOUNCE_MS", defaults.timing.debounce_ms)?,
            confirm_delay_ms: parse(
                &lookup,
                "TALLY_CONFIRM_DELAY_MS",
                defaults.timing.confirm_delay_ms,
            )?,
            ..defaults.timing
        };
        let retry = RetryPolicy {
            max_attempts: parse(&lookup, "TALLY_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
            base_delay_ms: parse(&lookup, "TALLY_RETRY_BASE_MS", defaults.retry.base_delay_ms)?,
            ..defaults.retry
        };

        let settings = ScanSettings {
            count_id,
            attach_first_scan: flag(&lookup, "TALLY_ATTACH_FIRST_SCAN", defaults.attach_first_scan)?,
            auto_select_by_barcode: flag(
                &lookup,
                "TALLY_AUTO_SELECT_BY_BARCODE",
                defaults.auto_select_by_barcode,
            )?,
            auto_switch_on_match: flag(
                &lookup,
                "TALLY_AUTO_SWITCH_ON_MATCH",
                defaults.auto_switch_on_match,
            )?,
            qty_per_scan: parse(&lookup, "TALLY_QTY_PER_SCAN", defaults.qty_per_scan)?,
            dedupe_ms: parse(&lookup, "TALLY_DEDUPE_MS", defaults.dedupe_ms)?,
            timing,
            retry,
        };
        settings
            .validate()
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;

        Ok(Self {
            settings,
            catalog_path: lookup("TALLY_CATALOG_PATH").map(PathBuf::from),
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> std::result::Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            name,
            value: value.clone(),
        }),
        None => Ok(default),
    }
}

fn flag<F>(lookup: &F, name: &'static str, default: bool) -> std::result::Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { name, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TALLY_COUNT_ID environment variable is required")]
    MissingCountId,

    #[error("TALLY_CATALOG_PATH environment variable is required")]
    MissingCatalogPath,

    #[error("Invalid {name} value: {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Invalid {name} value: {value:?}, expected true or false")]
    InvalidFlag { name: &'static str, value: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

/// On-disk form of a count's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFile {
    pub count_id: SessionId,
    pub items: Vec<TrackedItem>,
    #[serde(default)]
    pub count_items: Vec<CountSessionItem>,
}

impl CatalogFile {
    pub fn into_catalog(self) -> Catalog {
        Catalog::new(self.count_id, self.items, self.count_items)
    }
}

/// Read a catalog file.
pub fn load_catalog(path: &Path) -> Result<CatalogFile> {
    let raw = std::fs::read_to_string(path)?;
    let file: CatalogFile = serde_json::from_str(&raw)?;
    tracing::info!(
        path = %path.display(),
        items = file.items.len(),
        count_items = file.count_items.len(),
        "catalog loaded"
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_need_only_count_id() {
        let config = Config::from_lookup(lookup(&[("TALLY_COUNT_ID", "count-1")])).unwrap();
        assert_eq!(config.settings, ScanSettings::new("count-1"));
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn missing_count_id() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::MissingCountId)
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("TALLY_COUNT_ID", "count-1"),
            ("TALLY_AUTO_SWITCH_ON_MATCH", "off"),
            ("TALLY_QTY_PER_SCAN", "12"),
            ("TALLY_DEBOUNCE_MS", "500"),
            ("TALLY_RETRY_ATTEMPTS", "5"),
            ("TALLY_CATALOG_PATH", "/tmp/catalog.json"),
        ]))
        .unwrap();
        assert!(!config.settings.auto_switch_on_match);
        assert_eq!(config.settings.qty_per_scan, 12);
        assert_eq!(config.settings.timing.debounce_ms, 500);
        assert_eq!(config.settings.timing.confirm_delay_ms, 1500);
        assert_eq!(config.settings.retry.max_attempts, 5);
        assert_eq!(config.settings.retry.base_delay_ms, 1000);
        assert_eq!(config.catalog_path, Some(PathBuf::from("/tmp/catalog.json")));
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = Config::from_lookup(lookup(&[
            ("TALLY_COUNT_ID", "count-1"),
            ("TALLY_DEDUPE_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { name: "TALLY_DEDUPE_MS", .. }));

        let err = Config::from_lookup(lookup(&[
            ("TALLY_COUNT_ID", "count-1"),
            ("TALLY_ATTACH_FIRST_SCAN", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFlag { .. }));

        let err = Config::from_lookup(lookup(&[
            ("TALLY_COUNT_ID", "count-1"),
            ("TALLY_QTY_PER_SCAN", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings(_)));

        let err = Config::from_lookup(lookup(&[
            ("TALLY_COUNT_ID", "count-1"),
            ("TALLY_RETRY_BASE_MS", "18446744073709551615"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings(_)));
    }

    #[test]
    fn catalog_file_format() {
        let file: CatalogFile = serde_json::from_str(
            r#"{
                "countId": "count-1",
                "items": [
                    {"id": "milk", "name": "Milk 1L", "barcode": "111"},
                    {"id": "sugar", "name": "Sugar 1kg"}
                ],
                "countItems": [
                    {"sessionId": "count-1", "itemId": "milk", "actualQuantity": 4},
                    {"sessionId": "count-1", "itemId": "sugar"}
                ]
            }"#,
        )
        .unwrap();
        let catalog = file.into_catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.actual_quantity("milk"), 4);
        assert_eq!(catalog.find_in_session("111").unwrap().id, "milk");
    }
}
