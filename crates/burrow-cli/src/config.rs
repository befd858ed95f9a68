//! Configuration file management for burrow.
//!
//! Provides a TOML-based config file at `~/.config/burrow/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use burrow_core::backup::DEFAULT_DEBOUNCE;
use burrow_core::runtime::{McpServerConfig, PermissionMode};
use burrow_db::config::DbConfig;

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CLAUDE_BINARY: &str = "claude";
pub const DEFAULT_LOCAL_USER: &str = "local@localhost";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp: Option<McpServerConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Owner recorded for projects created without an `X-Forwarded-Email`
    /// header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_debounce_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<PermissionMode>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the burrow config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/burrow` or `~/.config/burrow`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("burrow");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("burrow")
}

/// Return the path to the burrow config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default root for per-project directories: `$XDG_DATA_HOME/burrow/projects`
/// or `~/.local/share/burrow/projects`.
pub fn default_projects_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        });
    data_home.join("burrow").join("projects")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<ConfigFile> {
    toml::from_str(contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix since the database URL may carry a
/// password.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub database_url: Option<String>,
    pub projects_dir: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct BurrowConfig {
    pub db_config: DbConfig,
    pub bind: String,
    pub port: u16,
    pub local_user: String,
    pub claude_binary: String,
    pub projects_dir: PathBuf,
    pub skills_dir: PathBuf,
    pub permission_mode: PermissionMode,
    pub mcp: Option<McpServerConfig>,
    pub backup_debounce: Duration,
}

impl BurrowConfig {
    /// Resolve configuration from the CLI, the environment and the config
    /// file, if one exists.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file_config = if config_path().exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };
        Ok(Self::resolve_with(cli, file_config))
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `--database-url` > `BURROW_DATABASE_URL` > `database.url`
    /// - Projects dir: `--projects-dir` > `BURROW_PROJECTS_DIR` > `agent.projects_dir`
    /// - Skills dir: `BURROW_SKILLS_DIR` > `agent.skills_dir` > `<config dir>/skills`
    /// - Claude binary: `BURROW_CLAUDE_BINARY` > `agent.claude_binary` > `claude`
    pub fn resolve_with(cli: &CliOverrides, file: ConfigFile) -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let db_url = cli
            .database_url
            .clone()
            .or_else(|| env("BURROW_DATABASE_URL"))
            .or(file.database.url)
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_string());

        let projects_dir = cli
            .projects_dir
            .clone()
            .or_else(|| env("BURROW_PROJECTS_DIR").map(PathBuf::from))
            .or(file.agent.projects_dir)
            .unwrap_or_else(default_projects_dir);

        let skills_dir = env("BURROW_SKILLS_DIR")
            .map(PathBuf::from)
            .or(file.agent.skills_dir)
            .unwrap_or_else(|| config_dir().join("skills"));

        let claude_binary = env("BURROW_CLAUDE_BINARY")
            .or(file.agent.claude_binary)
            .unwrap_or_else(|| DEFAULT_CLAUDE_BINARY.to_string());

        Self {
            db_config: DbConfig::new(db_url),
            bind: cli
                .bind
                .clone()
                .or(file.server.bind)
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            port: cli.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
            local_user: file
                .server
                .local_user
                .unwrap_or_else(|| DEFAULT_LOCAL_USER.to_string()),
            claude_binary,
            projects_dir,
            skills_dir,
            permission_mode: file.agent.permission_mode.unwrap_or_default(),
            mcp: file.mcp,
            backup_debounce: file
                .server
                .backup_debounce_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DEBOUNCE),
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
