// streamctl - CLI for the Stream activity log
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::record::ArrayPolicy;
use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

pub const DEFAULT_RECORDS_PATH: &str = "/wp-json/wp-stream/v1/records";
pub const DEFAULT_AJAX_PATH: &str = "/wp-admin/admin-ajax.php";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: Option<String>,
    pub username: Option<String>,
    pub app_password: Option<String>,
    /// Nonce sent with `save_new_alert`
    pub nonce: Option<String>,
    pub records_path: Option<String>,
    pub ajax_path: Option<String>,
    pub timeout_secs: Option<u64>,
    pub query: Option<QueryConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    pub default_fields: Option<Vec<String>>,
    pub array_policy: Option<ArrayPolicy>,
    pub unknown_format: Option<UnknownFormatPolicy>,
}

/// What `query` does with a `--format` it does not recognise.
#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFormatPolicy {
    /// Run the query and print nothing.
    #[default]
    Ignore,
    /// Fail before contacting the store.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error("site URL is required; set it with `streamctl configure --url <url>`")]
    MissingUrl,
    #[error("both --username and --app-password are required for authentication")]
    IncompleteCredentials,
}

#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub url: String,
    pub credentials: Option<Credentials>,
    pub nonce: Option<String>,
    pub records_path: String,
    pub ajax_path: String,
    pub timeout: Duration,
    pub query: QuerySettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub app_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    pub default_fields: Vec<String>,
    pub array_policy: ArrayPolicy,
    pub unknown_format: UnknownFormatPolicy,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_fields: crate::schema::default_fields(),
            array_policy: ArrayPolicy::default(),
            unknown_format: UnknownFormatPolicy::default(),
        }
    }
}

/// Per-invocation values from the command line; they win over both files.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub url: Option<String>,
    pub username: Option<String>,
    pub app_password: Option<String>,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".streamctl.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("STREAMCTL_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("streamctl").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

pub fn resolve(cwd: &Path, overrides: Overrides) -> Result<EffectiveConfig> {
    let mut merged = load(cwd)?;

    if let Some(url) = overrides.url {
        merged.url = Some(url);
    }
    if let Some(username) = overrides.username {
        merged.username = Some(username);
    }
    if let Some(password) = overrides.app_password {
        merged.app_password = Some(password);
    }

    let url = merged
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::MissingUrl)?;

    let credentials = match (merged.username, merged.app_password) {
        (Some(username), Some(app_password)) => Some(Credentials {
            username,
            app_password,
        }),
        (None, None) => None,
        _ => return Err(ConfigError::IncompleteCredentials.into()),
    };

    let query = merged.query.unwrap_or_default();
    let defaults = QuerySettings::default();

    Ok(EffectiveConfig {
        url,
        credentials,
        nonce: merged.nonce,
        records_path: merged
            .records_path
            .unwrap_or_else(|| DEFAULT_RECORDS_PATH.to_string()),
        ajax_path: merged
            .ajax_path
            .unwrap_or_else(|| DEFAULT_AJAX_PATH.to_string()),
        timeout: Duration::from_secs(merged.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        query: QuerySettings {
            default_fields: query
                .default_fields
                .filter(|f| !f.is_empty())
                .unwrap_or(defaults.default_fields),
            array_policy: query.array_policy.unwrap_or(defaults.array_policy),
            unknown_format: query.unknown_format.unwrap_or(defaults.unknown_format),
        },
    })
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn merge(user: Config, local: Config) -> Config {
    Config {
        url: local.url.or(user.url),
        username: local.username.or(user.username),
        app_password: local.app_password.or(user.app_password),
        nonce: local.nonce.or(user.nonce),
        records_path: local.records_path.or(user.records_path),
        ajax_path: local.ajax_path.or(user.ajax_path),
        timeout_secs: local.timeout_secs.or(user.timeout_secs),
        query: match (user.query, local.query) {
            (Some(u), Some(l)) => Some(merge_query(u, l)),
            (Some(u), None) => Some(u),
            (None, Some(l)) => Some(l),
            (None, None) => None,
        },
    }
}

fn merge_query(user: QueryConfig, local: QueryConfig) -> QueryConfig {
    QueryConfig {
        default_fields: local.default_fields.or(user.default_fields),
        array_policy: local.array_policy.or(user.array_policy),
        unknown_format: local.unknown_format.or(user.unknown_format),
    }
}
