use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Root directory of the record store. Record documents live at
    /// `<root>/<group>/<name>.json`; per-user documents at
    /// `<root>/users/<user>.json`.
    pub root: PathBuf,
    #[serde(default = "default_desired_list")]
    pub desired_list: PathBuf,
}

fn default_desired_list() -> PathBuf {
    PathBuf::from("config/desired.json")
}

/// One tracked group of records. `folder_name` is the top-level directory
/// used inside exported archives; `base_url` is prepended to root-relative
/// attachment locators when the group's media is hosted remotely.
#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub folder_name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl GroupConfig {
    /// Archive folder for this group, falling back to the group name.
    pub fn archive_folder(&self) -> &str {
        self.folder_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Number of concurrent fetch workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Attempts per attachment before the fetch is recorded as failed.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Download filename offered for archive exports.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    /// Hour offset applied to archive entry timestamps so listings sort
    /// in the viewer's local time.
    #[serde(default = "default_timezone_offset_hours")]
    pub timezone_offset_hours: i64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            fetch_retries: default_fetch_retries(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            archive_name: default_archive_name(),
            timezone_offset_hours: default_timezone_offset_hours(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_fetch_retries() -> u32 {
    3
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_archive_name() -> String {
    "DCIM.zip".to_string()
}
fn default_timezone_offset_hours() -> i64 {
    8
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// HMAC key for session cookies. Required once `users` is non-empty.
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:22350".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.groups.is_empty() {
        anyhow::bail!("At least one [[groups]] entry must be configured");
    }

    for (i, group) in config.groups.iter().enumerate() {
        if group.name.is_empty() {
            anyhow::bail!("groups[{}].name must not be empty", i);
        }
        if config.groups[..i].iter().any(|g| g.name == group.name) {
            anyhow::bail!("Duplicate group name: '{}'", group.name);
        }
    }

    if config.export.workers == 0 {
        anyhow::bail!("export.workers must be >= 1");
    }

    if config.export.fetch_retries == 0 {
        anyhow::bail!("export.fetch_retries must be >= 1");
    }

    if !config.auth.users.is_empty() && config.auth.secret.is_empty() {
        anyhow::bail!("auth.secret must be set when [[auth.users]] are configured");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), toml_str).unwrap();
        load_config(tmp.path())
    }

    #[test]
    fn minimal_config_applies_defaults() {
        let config = parse(
            r#"
            [store]
            root = "/tmp/vault"

            [[groups]]
            name = "G1"
            "#,
        )
        .unwrap();

        assert_eq!(config.export.fetch_retries, 3);
        assert_eq!(config.export.archive_name, "DCIM.zip");
        assert_eq!(config.export.timezone_offset_hours, 8);
        assert!(config.export.workers >= 1);
        assert_eq!(config.server.bind, "127.0.0.1:22350");
        assert_eq!(config.groups[0].archive_folder(), "G1");
    }

    #[test]
    fn rejects_empty_groups() {
        let err = parse(
            r#"
            [store]
            root = "/tmp/vault"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[[groups]]"));
    }

    #[test]
    fn rejects_zero_workers() {
        let err = parse(
            r#"
            [store]
            root = "/tmp/vault"

            [[groups]]
            name = "G1"

            [export]
            workers = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("export.workers"));
    }

    #[test]
    fn rejects_users_without_secret() {
        let err = parse(
            r#"
            [store]
            root = "/tmp/vault"

            [[groups]]
            name = "G1"

            [[auth.users]]
            name = "alice"
            password = "pw"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("auth.secret"));
    }
}
