// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order, later overrides earlier: compiled defaults,
//! `/etc/gavel/gavel.toml`, `~/.config/gavel/gavel.toml`, `./gavel.toml`,
//! then `GAVEL_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::GavelConfig;

/// Config sections addressable through environment variables.
const ENV_SECTIONS: &[&str] = &[
    "engine",
    "dedup",
    "dispatch",
    "classifier",
    "worker",
    "batch",
    "storage",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/gavel/gavel.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "gavel.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("gavel/gavel.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<GavelConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<GavelConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(GavelConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<GavelConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(GavelConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(GavelConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider mapping `GAVEL_<SECTION>_<KEY>` to `section.key`.
///
/// Only the section prefix is split off, so keys that contain underscores
/// (`GAVEL_DEDUP_RESULT_TTL_SECS` -> `dedup.result_ttl_secs`) stay intact.
fn env_provider() -> Env {
    Env::prefixed("GAVEL_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("dedup_result_ttl_secs"), "dedup.result_ttl_secs");
        assert_eq!(map_env_key("worker_bulk_item_delay_ms"), "worker.bulk_item_delay_ms");
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn env_overrides_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("gavel.toml", "[batch]\nflush_size = 20\n")?;
            jail.set_env("GAVEL_BATCH_FLUSH_SIZE", "30");
            jail.set_env("GAVEL_DISPATCH_REALTIME_TIMEOUT_MS", "750");
            let config = load_config_from_path(Path::new("gavel.toml"))?;
            assert_eq!(config.batch.flush_size, 30);
            assert_eq!(config.dispatch.realtime_timeout_ms, 750);
            Ok(())
        });
    }
}
