// Configuration loading and parsing (config/draftroom.toml).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use draftroom_core::draft::pick::DraftMode;
use draftroom_core::draft::session::DraftSettings;

/// Name of the config file under `config/` and `defaults/`.
pub const CONFIG_FILE: &str = "draftroom.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_port: u16,
    /// Resolved SQLite path. `:memory:` is passed through untouched.
    pub db_path: PathBuf,
    /// Ranked player CSV.
    pub players_path: PathBuf,
    pub draft: DraftRules,
    /// Position -> slot count applied to drafts created without explicit
    /// settings.
    pub roster: HashMap<String, usize>,
}

impl Config {
    /// Settings for a new draft of `mode` built from the configured rules.
    pub fn draft_settings(&self, mode: DraftMode) -> DraftSettings {
        DraftSettings {
            mode,
            total_rounds: self.draft.total_rounds,
            time_per_pick_seconds: self.draft.time_per_pick_seconds,
            salary_cap: self.draft.salary_cap,
            roster: self.roster.clone(),
            bid_timer_seconds: self.draft.bid_timer_seconds,
            min_bid_increment: self.draft.min_bid_increment,
            reserve_per_open_slot: self.draft.reserve_per_open_slot,
        }
    }

    pub fn grace_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.draft.grace_period_seconds)
    }
}

// ---------------------------------------------------------------------------
// draftroom.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire draftroom.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    server: ServerSection,
    database: DatabaseSection,
    catalog: CatalogSection,
    draft: DraftRules,
    roster: HashMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    /// Empty means the platform data directory.
    #[serde(default)]
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogSection {
    players: String,
}

/// League-wide draft rules from the `[draft]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct DraftRules {
    pub total_rounds: u32,
    pub time_per_pick_seconds: u64,
    /// Extra time after a snake deadline before the auto-pick fires.
    pub grace_period_seconds: u64,
    pub bid_timer_seconds: u64,
    pub min_bid_increment: u32,
    pub reserve_per_open_slot: u32,
    pub salary_cap: u32,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/draftroom.toml` relative to `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let roster = file
        .roster
        .into_iter()
        .map(|(pos, n)| (pos.to_uppercase(), n))
        .collect();

    let config = Config {
        ws_port: file.server.port,
        db_path: resolve_db_path(base_dir, &file.database.path)?,
        players_path: base_dir.join(&file.catalog.players),
        draft: file.draft,
        roster,
    };

    validate(&config, &file.catalog.players)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Local edits win.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Relative paths resolve against `base_dir`; an empty path lands in the
/// platform data directory.
fn resolve_db_path(base_dir: &Path, raw: &str) -> Result<PathBuf, ConfigError> {
    let raw = raw.trim();
    if raw == ":memory:" {
        return Ok(PathBuf::from(raw));
    }
    if raw.is_empty() {
        let dirs = directories::ProjectDirs::from("", "", "draftroom").ok_or_else(|| {
            ConfigError::ValidationError {
                field: "database.path".into(),
                message: "empty and no platform data directory is available".into(),
            }
        })?;
        return Ok(dirs.data_dir().join("draftroom.db"));
    }
    Ok(base_dir.join(raw))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config, players: &str) -> Result<(), ConfigError> {
    if config.ws_port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if players.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "catalog.players".into(),
            message: "must name a CSV file".into(),
        });
    }

    let rules = &config.draft;
    let positive: &[(&str, u64)] = &[
        ("draft.total_rounds", u64::from(rules.total_rounds)),
        ("draft.time_per_pick_seconds", rules.time_per_pick_seconds),
        ("draft.bid_timer_seconds", rules.bid_timer_seconds),
        ("draft.min_bid_increment", u64::from(rules.min_bid_increment)),
        ("draft.salary_cap", u64::from(rules.salary_cap)),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    let draftable: usize = config
        .roster
        .iter()
        .filter(|(pos, _)| pos.as_str() != "IL")
        .map(|(_, n)| *n)
        .sum();
    if draftable == 0 {
        return Err(ConfigError::ValidationError {
            field: "roster".into(),
            message: "must contain at least one draftable slot".into(),
        });
    }
    if rules.total_rounds as usize > draftable {
        return Err(ConfigError::ValidationError {
            field: "draft.total_rounds".into(),
            message: format!(
                "{} rounds cannot fit in {} draftable roster slots",
                rules.total_rounds, draftable
            ),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Helper: returns the path to the server crate root (works whether
    /// `cargo test` runs from the crate root or repo root).
    fn project_root() -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        if cwd.join("defaults").exists() {
            cwd
        } else if cwd.join("crates/draftroom-server/defaults").exists() {
            cwd.join("crates/draftroom-server")
        } else {
            panic!("Cannot locate defaults/ directory from CWD {:?}", cwd);
        }
    }

    /// Fresh temp dir holding `config/draftroom.toml` with `body`.
    fn temp_config(name: &str, body: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config").join(CONFIG_FILE), body).unwrap();
        tmp
    }

    fn defaults_text() -> String {
        fs::read_to_string(project_root().join("defaults").join(CONFIG_FILE)).unwrap()
    }

    #[test]
    fn load_defaults_through_config_dir() {
        let tmp = std::env::temp_dir().join("draftroom_config_defaults");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), defaults_text()).unwrap();
        fs::write(tmp.join("defaults").join("notes.toml.example"), "x = 1\n").unwrap();

        let copied = ensure_config_files(&tmp).unwrap();
        assert_eq!(copied, vec![tmp.join("config").join(CONFIG_FILE)]);
        assert!(!tmp.join("config/notes.toml.example").exists());
        // Second run copies nothing.
        assert!(ensure_config_files(&tmp).unwrap().is_empty());

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.ws_port, 9100);
        assert_eq!(config.db_path, tmp.join("draftroom.db"));
        assert_eq!(config.players_path, tmp.join("data/players.csv"));
        assert_eq!(config.draft.time_per_pick_seconds, 90);
        assert_eq!(config.draft.grace_period_seconds, 2);
        assert_eq!(config.grace_period(), std::time::Duration::from_secs(2));
        assert_eq!(config.roster.get("QB"), Some(&1));
        assert_eq!(config.roster.get("BE"), Some(&6));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn draft_settings_follow_rules() {
        let tmp = temp_config("draftroom_config_settings", &defaults_text());
        let config = load_config_from(&tmp).unwrap();

        let snake = config.draft_settings(DraftMode::Snake);
        assert_eq!(snake.mode, DraftMode::Snake);
        assert_eq!(snake.total_rounds, 15);
        assert_eq!(snake.salary_cap, 200);
        assert_eq!(snake.draftable_slots(), 15);
        assert!(snake.validate(10).is_ok());

        let auction = config.draft_settings(DraftMode::Auction);
        assert_eq!(auction.bid_timer_seconds, 30);
        assert_eq!(auction.reserve_per_open_slot, 1);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_file_reported_with_path() {
        let tmp = std::env::temp_dir().join("draftroom_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        match load_config_from(&tmp).unwrap_err() {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("config/draftroom.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }
        assert!(matches!(
            ensure_config_files(&tmp).unwrap_err(),
            ConfigError::DefaultsCopyError { .. }
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_time_per_pick() {
        let body = defaults_text().replace("time_per_pick_seconds = 90", "time_per_pick_seconds = 0");
        let tmp = temp_config("draftroom_config_zero_tpp", &body);
        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "draft.time_per_pick_seconds");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_more_rounds_than_slots() {
        let body = defaults_text().replace("total_rounds = 15", "total_rounds = 40");
        let tmp = temp_config("draftroom_config_rounds", &body);
        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ValidationError { field, message } => {
                assert_eq!(field, "draft.total_rounds");
                assert!(message.contains("40 rounds"));
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = temp_config("draftroom_config_malformed", "[server\nport = ");
        assert!(matches!(
            load_config_from(&tmp).unwrap_err(),
            ConfigError::ParseError { .. }
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn memory_and_empty_db_paths() {
        let base = Path::new("/srv/draftroom");
        assert_eq!(
            resolve_db_path(base, ":memory:").unwrap(),
            PathBuf::from(":memory:")
        );
        assert_eq!(
            resolve_db_path(base, "state/draft.db").unwrap(),
            base.join("state/draft.db")
        );
        if let Ok(path) = resolve_db_path(base, "") {
            assert!(path.ends_with("draftroom.db"));
            assert!(!path.starts_with(base));
        }
    }
}
