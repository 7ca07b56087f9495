// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `./recollect.toml` > `~/.config/recollect/recollect.toml` >
//! `/etc/recollect/recollect.toml`, with `RECOLLECT_` environment overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RecollectConfig;

const SYSTEM_CONFIG: &str = "/etc/recollect/recollect.toml";
const LOCAL_CONFIG: &str = "recollect.toml";

/// Env var sections, longest first so `provider_retry_` wins over `provider_`.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("provider_retry_", "provider.retry."),
    ("service_", "service."),
    ("boundary_", "boundary."),
    ("extraction_", "extraction."),
    ("retrieval_", "retrieval."),
    ("ranking_", "ranking."),
    ("budget_", "budget."),
    ("provider_", "provider."),
    ("storage_", "storage."),
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/recollect/recollect.toml`
/// 3. `~/.config/recollect/recollect.toml`
/// 4. `./recollect.toml`
/// 5. `RECOLLECT_*` environment variables
pub fn load_config() -> Result<RecollectConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<RecollectConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecollectConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RecollectConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecollectConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RecollectConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

pub(crate) fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("recollect").join(LOCAL_CONFIG))
}

pub(crate) fn config_search_paths() -> Vec<std::path::PathBuf> {
    let mut paths = vec![std::path::PathBuf::from(LOCAL_CONFIG)];
    paths.extend(user_config_path());
    paths.push(std::path::PathBuf::from(SYSTEM_CONFIG));
    paths
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `RECOLLECT_BOUNDARY_IDLE_TIMEOUT_SECS` must become
/// `boundary.idle_timeout_secs`, not `boundary.idle.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("RECOLLECT_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for (prefix, section) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}{rest}");
        }
    }
    key.to_string()
}
