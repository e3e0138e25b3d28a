use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{CompanyId, DEFAULT_COMPANY_ID};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file (invalid TOML): {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for the chc server and CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChcConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub defaults: DefaultsSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    /// Allow any origin; otherwise localhost origins only
    pub cors_permissive: bool,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            cors_permissive: false,
            request_timeout_secs: 30,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/chc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub company_id: String,
    /// IANA zone used to split `date=` filters into days
    pub timezone: String,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            company_id: DEFAULT_COMPANY_ID.to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl ChcConfig {
    /// Load ~/.chc/config.toml (defaults when absent), then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a config file without env overrides. A missing file gives defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let expanded = expand_vars(&content, |key| env::var(key).ok());
        Ok(toml::from_str(&expanded)?)
    }

    /// Get config file path: ~/.chc/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chc/config.toml")
    }

    /// Override settings from DATABASE_URL, CHC_BIND, CHC_COMPANY_ID and CHC_TIMEZONE.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(bind) = non_empty("CHC_BIND") {
            self.server.bind = bind;
        }
        if let Some(company) = non_empty("CHC_COMPANY_ID") {
            self.defaults.company_id = company;
        }
        if let Some(tz) = non_empty("CHC_TIMEZONE") {
            self.defaults.timezone = tz;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        self.default_company()?;
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "database.max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.defaults
            .timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid {
                field: "defaults.timezone",
                reason: e.to_string(),
            })
    }

    pub fn default_company(&self) -> Result<CompanyId, ConfigError> {
        CompanyId::new(&self.defaults.company_id).map_err(|e| ConfigError::Invalid {
            field: "defaults.company_id",
            reason: e.to_string(),
        })
    }

    /// Write to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write a default config unless one exists (or `force`).
    pub fn init(path: &Path, force: bool) -> Result<Self, ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let config = Self::default();
        config.save_to(path)?;
        Ok(config)
    }

    /// Copy safe to print: the database password is replaced by `****`.
    pub fn masked(&self) -> Self {
        let mut shown = self.clone();
        shown.database.url = mask_url_password(&self.database.url);
        shown
    }
}

/// Expand ${VAR} references; unknown variables become empty.
fn expand_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn mask_url_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = url[authority_start..]
        .find('/')
        .map_or(url.len(), |i| authority_start + i);
    let authority = &url[authority_start..authority_end];
    let Some(at) = authority.rfind('@') else {
        return url.to_string();
    };
    let creds = &authority[..at];
    match creds.find(':') {
        Some(colon) => format!(
            "{}{}:****{}",
            &url[..authority_start],
            &creds[..colon],
            &url[authority_start + at..]
        ),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChcConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, ChcConfig::default());
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.defaults.company_id, "CHC001");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[defaults]\ntimezone = \"Asia/Kolkata\"\n").unwrap();
        let config = ChcConfig::load_from(&path).unwrap();
        assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Kolkata);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = ChcConfig::default();
        config.server.cors_permissive = true;
        config.save_to(&path).unwrap();
        assert_eq!(ChcConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        ChcConfig::init(&path, false).unwrap();
        assert!(matches!(
            ChcConfig::init(&path, false),
            Err(ConfigError::AlreadyExists(_))
        ));
        assert!(ChcConfig::init(&path, true).is_ok());
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://db/chc"),
            ("CHC_BIND", "0.0.0.0:9000"),
            ("CHC_TIMEZONE", ""),
        ]
        .into_iter()
        .collect();
        let mut config = ChcConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.database.url, "postgres://db/chc");
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.defaults.timezone, "UTC");
    }

    #[test]
    fn expands_variables() {
        let lookup = |k: &str| (k == "PGPASS").then(|| "hunter2".to_string());
        assert_eq!(
            expand_vars("postgres://chc:${PGPASS}@db/${MISSING}chc", lookup),
            "postgres://chc:hunter2@db/chc"
        );
        assert_eq!(expand_vars("no vars ${unterminated", lookup), "no vars ${unterminated");
    }

    #[test]
    fn rejects_bad_timezone() {
        let mut config = ChcConfig::default();
        config.defaults.timezone = "Mars/Olympus".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn masks_password() {
        let mut config = ChcConfig::default();
        config.database.url = "postgres://chc:secret@db:5432/chc".into();
        assert_eq!(config.masked().database.url, "postgres://chc:****@db:5432/chc");
        assert_eq!(mask_url_password("postgres://localhost/chc"), "postgres://localhost/chc");
    }
}
