//! Runtime configuration, deserialised from `config.toml` and `CHARTA_*`
//! environment variables.

use std::{path::PathBuf, time::Duration};

use charta_engine::{autosave::AutoSaveConfig, interactions::InteractionRule};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:         String,
  pub port:         u16,
  pub store_path:   PathBuf,
  pub autosave:     AutoSaveSettings,
  /// Known interacting pairs used to screen new prescriptions.
  pub interactions: Vec<InteractionRule>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:         "127.0.0.1".to_owned(),
      port:         8080,
      store_path:   PathBuf::from("~/.local/share/charta/charta.db"),
      autosave:     AutoSaveSettings::default(),
      interactions: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AutoSaveSettings {
  pub debounce_ms:      u64,
  pub saved_display_ms: u64,
}

impl Default for AutoSaveSettings {
  fn default() -> Self {
    let defaults = AutoSaveConfig::default();
    Self {
      debounce_ms:      millis(defaults.debounce),
      saved_display_ms: millis(defaults.saved_display),
    }
  }
}

impl From<AutoSaveSettings> for AutoSaveConfig {
  fn from(settings: AutoSaveSettings) -> Self {
    Self {
      debounce:      Duration::from_millis(settings.debounce_ms),
      saved_display: Duration::from_millis(settings.saved_display_ms),
    }
  }
}

fn millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
