//! CLI argument definitions for the concierge shell.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Concierge: terminal client for the storefront's sales assistant.
#[derive(Parser, Debug)]
#[command(name = "concierge", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Storefront base url, without the `/api` suffix.
    #[arg(short = 'u', long = "base-url")]
    pub base_url: Option<String>,

    /// Bearer token for the storefront API.
    #[arg(short = 't', long = "token")]
    pub token: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Talk to an in-memory backend instead of the storefront.
    #[arg(long = "offline")]
    pub offline: bool,
}

impl CliArgs {
    /// Priority: --config flag > CONCIERGE_CONFIG env var > ~/.concierge/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CONCIERGE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --base-url flag > CONCIERGE_BASE_URL env var > config file value.
    pub fn resolve_base_url(&self, config_value: &str) -> String {
        pick(
            self.base_url.as_deref(),
            std::env::var("CONCIERGE_BASE_URL").ok().as_deref(),
            config_value,
        )
    }

    /// Priority: --token flag > CONCIERGE_TOKEN env var > config file value.
    pub fn resolve_token(&self, config_value: &str) -> String {
        pick(
            self.token.as_deref(),
            std::env::var("CONCIERGE_TOKEN").ok().as_deref(),
            config_value,
        )
    }

    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_value: &str) -> String {
        pick(self.log_level.as_deref(), None, config_value)
    }
}

/// First non-blank of flag, env, then the config value.
fn pick(flag: Option<&str>, env: Option<&str>, config_value: &str) -> String {
    [flag, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(config_value)
        .to_string()
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".concierge").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".concierge").join("config.toml");
    }
    PathBuf::from("config.toml")
}
