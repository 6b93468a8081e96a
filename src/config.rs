//! `BackendConfig` (SPEC_FULL.md §B.3): the ambient configuration layer a
//! library-shaped backend still needs, even with no CLI front end.
//!
//! Loadable from a TOML file located via `directories`, in the same
//! persisted-config shape the teacher's CLI config used, minus any
//! `clap` binding — this backend is constructed programmatically or
//! pointed at a path by the embedder.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Tunables for the core that have no single obviously-correct value
/// and are not part of spec.md's protocol surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
  /// How long `wait_for_event` may block in `sigsuspend` between drains
  /// before re-checking for a spuriously-missed wakeup, in milliseconds.
  /// Purely a liveness safety net; correctness never depends on it.
  pub sync_poll_interval_ms: u64,
  /// Whether newly attached/spawned inferiors start with every syscall
  /// caught (mirrors a seccomp-style default-catch policy) rather than
  /// none. Consulted by `Backend::create_inferior`/`attach`/`wait`
  /// (the latter for fork/vfork children) when seeding a new
  /// `Inferior`'s `syscalls_to_catch`.
  pub catch_all_syscalls_by_default: bool,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      sync_poll_interval_ms: 50,
      catch_all_syscalls_by_default: false,
    }
  }
}

impl BackendConfig {
  pub fn load(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).wrap_err_with(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&contents).wrap_err_with(|| format!("parsing config at {}", path.display()))
  }

  /// The conventional config path (`directories`' `ProjectDirs`), if the
  /// platform exposes one. No CLI binding reads this automatically; an
  /// embedder calls it explicitly if it wants the convention.
  pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "native-debug-backend").map(|dirs| dirs.config_dir().join("config.toml"))
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).wrap_err_with(|| format!("creating config dir {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(self).wrap_err("serializing config")?;
    std::fs::write(path, contents).wrap_err_with(|| format!("writing config to {}", path.display()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_does_not_catch_all_syscalls() {
    let config = BackendConfig::default();
    assert!(!config.catch_all_syscalls_by_default);
  }

  #[test]
  fn round_trips_through_a_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let mut config = BackendConfig::default();
    config.sync_poll_interval_ms = 7;
    config.save(&path).unwrap();
    let loaded = BackendConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
  }
}
