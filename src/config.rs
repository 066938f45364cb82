use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use vidshelf::SortOrder;
use vidshelf::constants::constants;

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub api_url: Option<String>,
  pub sort_order: Option<SortOrder>,
  pub available_only: Option<bool>,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "vidshelf")
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(config_file)
        && let Ok(config) = toml::from_str(&content)
      {
        return config;
      }
    }
    Self::default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = project_dirs() {
      let config_dir = proj_dirs.config_dir();
      if std::fs::create_dir_all(config_dir).is_ok() {
        let config_file = config_dir.join("prefs.toml");
        if let Ok(content) = toml::to_string(self) {
          let _ = std::fs::write(config_file, content);
        }
      }
    }
  }
}

/// Effective startup settings after layering CLI flags over saved prefs over
/// built-in constants.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub api_url: String,
  pub sort_order: SortOrder,
  pub available_only: bool,
  pub tags: Vec<String>,
}

/// Values given on the command line. `None` / `false` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
  pub api_url: Option<String>,
  pub sort_order: Option<SortOrder>,
  pub include_unavailable: bool,
  pub tags: Vec<String>,
}

impl Settings {
  pub fn resolve(overrides: Overrides, prefs: &Config) -> Self {
    let api_url = overrides
      .api_url
      .or_else(|| prefs.api_url.clone())
      .unwrap_or_else(|| constants().default_api_url.clone());
    let sort_order = overrides.sort_order.or(prefs.sort_order).unwrap_or_default();
    let available_only = !overrides.include_unavailable && prefs.available_only.unwrap_or(true);
    let tags = overrides.tags.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
    Self { api_url, sort_order, available_only, tags }
  }
}

/// Directory for the daily log files, falling back to the working directory.
pub fn log_dir() -> PathBuf {
  project_dirs().map_or_else(|| PathBuf::from("."), |dirs| dirs.data_dir().join("logs"))
}
