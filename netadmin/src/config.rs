//! netadmin configuration loading and parsing

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::persist::PersistTarget;

const DEFAULT_CONFIG_PATH: &str = "/etc/netadmin/config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetAdminConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding index.html and static assets
    #[serde(default)]
    pub frontend_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    /// Configured frontend directory, else `<exe dir>/../frontend`
    pub fn frontend_path(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.frontend_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe.parent().unwrap_or_else(|| Path::new("."));
        Ok(exe_dir.join("..").join("frontend"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_true")]
    pub require_auth: bool,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
            require_auth: true,
            session_ttl_hours: default_session_ttl(),
        }
    }
}

/// External tools and logging
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_iptables")]
    pub iptables_path: String,
    #[serde(default = "default_iptables_save")]
    pub iptables_save_path: String,
    #[serde(default = "default_ip")]
    pub ip_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            iptables_path: default_iptables(),
            iptables_save_path: default_iptables_save(),
            ip_path: default_ip(),
            log_level: default_log_level(),
        }
    }
}

/// Save locations, tried in order
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_firewall_targets")]
    pub firewall_targets: Vec<PersistTarget>,
    #[serde(default = "default_route_targets")]
    pub route_targets: Vec<PersistTarget>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            firewall_targets: default_firewall_targets(),
            route_targets: default_route_targets(),
        }
    }
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8080 }
fn default_username() -> String { "admin".into() }
fn default_password() -> String { "admin123".into() }
fn default_true() -> bool { true }
fn default_session_ttl() -> i64 { 24 }
fn default_iptables() -> String { "iptables".into() }
fn default_iptables_save() -> String { "iptables-save".into() }
fn default_ip() -> String { "ip".into() }
fn default_log_level() -> String { "info".into() }

// Only the Debian rules directory is created on demand (iptables-persistent
// may not have run yet). The others must already exist.
fn default_firewall_targets() -> Vec<PersistTarget> {
    vec![
        PersistTarget::new("/etc/iptables/rules.v4").creating_parent(),
        PersistTarget::new("/etc/sysconfig/iptables"),
    ]
}

fn default_route_targets() -> Vec<PersistTarget> {
    vec![
        PersistTarget::new("/etc/network/routes"),
        PersistTarget::new("/etc/sysconfig/static-routes"),
    ]
}

impl NetAdminConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration")
    }
}

/// Load configuration from `$NETADMIN_CONFIG` or /etc/netadmin/config.toml
pub fn load_config() -> Result<NetAdminConfig> {
    let config_path =
        std::env::var("NETADMIN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_from(Path::new(&config_path))
}

pub fn load_config_from(path: &Path) -> Result<NetAdminConfig> {
    if !path.exists() {
        tracing::warn!("Config file not found at {}, using defaults", path.display());
        return Ok(NetAdminConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config = NetAdminConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;
    tracing::info!("Configuration loaded from {}", path.display());
    Ok(config)
}
