//! Configuration file management for aprs-prop.
//!
//! Reads/writes `~/.aprs-prop/config.yaml` with the operator identity,
//! feed address, database path, dashboard address, and propagation tunables.

use std::path::{Path, PathBuf};

use crate::propagation::{
    PropagationParams, DEFAULT_FALLBACK_ROUND_DECIMALS, DEFAULT_MIN_SEPARATION_KM,
};
use crate::types::{AprsError, DEFAULT_WINDOW_HOURS};

/// Full-feed relay host.
pub const DEFAULT_FEED_HOST: &str = "rotate.aprs.net";
/// Full-feed TCP port (no server-side filter).
pub const DEFAULT_FEED_PORT: u16 = 10152;
/// SSID appended to the callsign when none is configured.
pub const DEFAULT_SSID: &str = "01";

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub station: StationConfig,
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
    pub dashboard: DashboardConfig,
    pub propagation: PropagationConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    /// Empty means ingestion never starts.
    pub callsign: String,
    pub ssid: String,
    /// `None` logs in read-only.
    pub passcode: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropagationConfig {
    pub default_hours: f64,
    pub min_separation_km: f64,
    pub fallback_round_decimals: u32,
}

impl PropagationConfig {
    pub fn params(&self) -> PropagationParams {
        PropagationParams {
            min_separation_km: self.min_separation_km,
            fallback_round_decimals: self.fallback_round_decimals,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            station: StationConfig {
                callsign: String::new(),
                ssid: DEFAULT_SSID.into(),
                passcode: None,
            },
            feed: FeedConfig {
                host: DEFAULT_FEED_HOST.into(),
                port: DEFAULT_FEED_PORT,
            },
            database: DatabaseConfig {
                path: default_db_path().to_string_lossy().into_owned(),
            },
            dashboard: DashboardConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            propagation: PropagationConfig {
                default_hours: DEFAULT_WINDOW_HOURS,
                min_separation_km: DEFAULT_MIN_SEPARATION_KM,
                fallback_round_decimals: DEFAULT_FALLBACK_ROUND_DECIMALS,
            },
        }
    }
}

/// Get the config directory path (`~/.aprs-prop/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".aprs-prop")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

/// Packet store location when none is configured.
pub fn default_db_path() -> PathBuf {
    config_dir().join("cache").join("aprs.db")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.aprs-prop/config.yaml`.
///
/// Returns default config if the file doesn't exist or can't be read.
pub fn load_config() -> Config {
    let path = config_file();
    if !path.exists() {
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(text) => parse_config(&text),
        Err(_) => Config::default(),
    }
}

/// Save config to `~/.aprs-prop/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, AprsError> {
    let path = config_file();
    save_config_to(&path, config)?;
    Ok(path)
}

/// Write `config` to `path`, creating the parent directory.
pub fn save_config_to(path: &Path, config: &Config) -> Result<(), AprsError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serialize_config(config))?;
    Ok(())
}

/// Parse simple YAML-like config text. Unknown keys and bad values keep
/// their defaults.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = strip_comment(line).trim();
        if stripped.is_empty() {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');
        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }
        let Some(section) = current_section.as_deref() else {
            continue;
        };

        match (section, key) {
            ("station", "callsign") => {
                config.station.callsign = parse_string_value(val).unwrap_or_default();
            }
            ("station", "ssid") => {
                if let Some(v) = parse_string_value(val) {
                    config.station.ssid = v;
                }
            }
            ("station", "passcode") => {
                config.station.passcode = parse_string_value(val).and_then(|v| v.parse().ok());
            }
            ("feed", "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.feed.host = v;
                }
            }
            ("feed", "port") => {
                if let Ok(v) = val.parse() {
                    config.feed.port = v;
                }
            }
            ("database", "path") => {
                if let Some(v) = parse_string_value(val) {
                    config.database.path = v;
                }
            }
            ("dashboard", "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.dashboard.host = v;
                }
            }
            ("dashboard", "port") => {
                if let Ok(v) = val.parse() {
                    config.dashboard.port = v;
                }
            }
            ("propagation", "default_hours") => {
                if let Some(v) = parse_float_value(val) {
                    config.propagation.default_hours = v;
                }
            }
            ("propagation", "min_separation_km") => {
                if let Some(v) = parse_float_value(val) {
                    config.propagation.min_separation_km = v;
                }
            }
            ("propagation", "fallback_round_decimals") => {
                if let Ok(v) = val.parse() {
                    config.propagation.fallback_round_decimals = v;
                }
            }
            _ => {}
        }
    }

    config
}

/// Drop a trailing `# comment` that sits outside quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            ('#', None) => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok().filter(|v: &f64| v.is_finite())
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# aprs-prop configuration".to_string(), String::new()];

    lines.push("station:".into());
    lines.push(format!("  callsign: \"{}\"", config.station.callsign));
    lines.push(format!("  ssid: \"{}\"", config.station.ssid));
    match config.station.passcode {
        Some(v) => lines.push(format!("  passcode: {v}")),
        None => lines.push("  passcode: null".into()),
    }
    lines.push(String::new());

    lines.push("feed:".into());
    lines.push(format!("  host: \"{}\"", config.feed.host));
    lines.push(format!("  port: {}", config.feed.port));
    lines.push(String::new());

    lines.push("database:".into());
    lines.push(format!("  path: \"{}\"", config.database.path));
    lines.push(String::new());

    lines.push("dashboard:".into());
    lines.push(format!("  host: \"{}\"", config.dashboard.host));
    lines.push(format!("  port: {}", config.dashboard.port));
    lines.push(String::new());

    lines.push("propagation:".into());
    lines.push(format!("  default_hours: {}", config.propagation.default_hours));
    lines.push(format!(
        "  min_separation_km: {}",
        config.propagation.min_separation_km
    ));
    lines.push(format!(
        "  fallback_round_decimals: {}",
        config.propagation.fallback_round_decimals
    ));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
