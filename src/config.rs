use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::animation::Easing;
use crate::navigation::NavigatorConfig;
use crate::prefs::DEFAULT_POST_HISTORY_DAYS;
use crate::session::DEFAULT_POST_URL_PATTERN;
use crate::store::{StoreOptions, MIN_WRITE_THROTTLE};

const DEFAULT_ENV_PREFIX: &str = "READMARK";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_write_throttle", with = "humantime_serde")]
    pub write_throttle: Duration,
    #[serde(default)]
    pub incognito: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            write_throttle: default_write_throttle(),
            incognito: false,
        }
    }
}

fn default_write_throttle() -> Duration {
    Duration::from_millis(1500)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigationConfig {
    #[serde(default = "default_scroll_throttle", with = "humantime_serde")]
    pub scroll_throttle: Duration,
    #[serde(default = "default_scroll_padding")]
    pub scroll_padding: f64,
    #[serde(default = "default_scroll_speed")]
    pub scroll_speed: f64,
    #[serde(default = "default_min_scroll", with = "humantime_serde")]
    pub min_scroll: Duration,
    #[serde(default = "default_max_scroll", with = "humantime_serde")]
    pub max_scroll: Duration,
    #[serde(default)]
    pub easing: Easing,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            scroll_throttle: default_scroll_throttle(),
            scroll_padding: default_scroll_padding(),
            scroll_speed: default_scroll_speed(),
            min_scroll: default_min_scroll(),
            max_scroll: default_max_scroll(),
            easing: Easing::default(),
        }
    }
}

fn default_scroll_throttle() -> Duration {
    Duration::from_millis(150)
}

fn default_scroll_padding() -> f64 {
    8.0
}

fn default_scroll_speed() -> f64 {
    1600.0
}

fn default_min_scroll() -> Duration {
    Duration::from_millis(250)
}

fn default_max_scroll() -> Duration {
    Duration::from_millis(750)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferencesConfig {
    #[serde(default = "default_post_history_days")]
    pub post_history_days: u32,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            post_history_days: default_post_history_days(),
        }
    }
}

fn default_post_history_days() -> u32 {
    DEFAULT_POST_HISTORY_DAYS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    #[serde(default = "default_post_url_pattern")]
    pub post_url_pattern: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            post_url_pattern: default_post_url_pattern(),
        }
    }
}

fn default_post_url_pattern() -> String {
    DEFAULT_POST_URL_PATTERN.to_string()
}

impl Config {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            write_throttle: self.storage.write_throttle.max(MIN_WRITE_THROTTLE),
            incognito: self.storage.incognito,
            default_post_history: self.preferences.post_history_days.max(1),
        }
    }

    pub fn navigator_config(&self) -> NavigatorConfig {
        let nav = &self.navigation;
        NavigatorConfig {
            scroll_throttle: nav.scroll_throttle,
            scroll_padding: nav.scroll_padding,
            scroll_speed: nav.scroll_speed,
            min_scroll: nav.min_scroll,
            max_scroll: nav.max_scroll,
            easing: nav.easing,
        }
    }

    pub fn post_url_regex(&self) -> Result<Regex> {
        Regex::new(&self.site.post_url_pattern).with_context(|| {
            format!(
                "config: invalid site.post_url_pattern {:?}",
                self.site.post_url_pattern
            )
        })
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage.path.clone().or_else(crate::storage::default_path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }
    if !other.storage.write_throttle.is_zero() {
        base.storage.write_throttle = other.storage.write_throttle;
    }
    base.storage.incognito = other.storage.incognito;

    base.navigation = other.navigation;

    if other.preferences.post_history_days != 0 {
        base.preferences.post_history_days = other.preferences.post_history_days;
    }

    if !other.site.post_url_pattern.is_empty() {
        base.site.post_url_pattern = other.site.post_url_pattern;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        "storage.write_throttle" => set_duration(&mut cfg.storage.write_throttle, &value),
        "storage.incognito" => cfg.storage.incognito = parse_flag(&value),
        "navigation.scroll_throttle" => {
            set_duration(&mut cfg.navigation.scroll_throttle, &value)
        }
        "navigation.scroll_padding" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.navigation.scroll_padding = parsed;
            }
        }
        "navigation.scroll_speed" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.navigation.scroll_speed = parsed;
            }
        }
        "navigation.min_scroll" => set_duration(&mut cfg.navigation.min_scroll, &value),
        "navigation.max_scroll" => set_duration(&mut cfg.navigation.max_scroll, &value),
        "navigation.easing" => {
            if let Ok(easing) = value.parse::<Easing>() {
                cfg.navigation.easing = easing;
            }
        }
        "preferences.post_history_days" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.preferences.post_history_days = parsed;
            }
        }
        "site.post_url_pattern" => cfg.site.post_url_pattern = value,
        _ => log::debug!("config: ignoring unknown variable {key}"),
    }
}

fn set_duration(target: &mut Duration, value: &str) {
    if let Ok(duration) = humantime::parse_duration(value) {
        *target = duration;
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True")
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("readmark").join("config.yaml"))
}
