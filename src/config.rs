use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::database::{StoreOptions, DEFAULT_LEGACY_YEAR};
use crate::report::AddedWindow;
use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Name of the workspace created on first run
pub const DEFAULT_WORKSPACE: &str = "main";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_current_workspace")]
    pub current_workspace: String,
    /// Year given to rows of a store that predates the `year` column
    #[serde(default = "default_legacy_year")]
    pub legacy_default_year: i32,
    #[serde(default = "default_current_theme")]
    pub current_theme: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub workspaces: BTreeMap<String, Workspace>,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub key_bindings: KeyBindings,
    #[serde(default)]
    pub themes: HashMap<String, Theme>,
}

/// A named store file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub file_path: String,
    pub created_at: String,
    #[serde(default)]
    pub last_used: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default)]
    pub added_window: AddedWindow,
    /// How many weeks the report picker offers, counting back from the current one
    #[serde(default = "default_history_weeks")]
    pub history_weeks: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            added_window: AddedWindow::default(),
            history_weeks: default_history_weeks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBindings {
    #[serde(default = "default_quit")]
    pub quit: String,
    #[serde(default = "default_help")]
    pub help: String,
    #[serde(default = "default_list_up")]
    pub list_up: String,
    #[serde(default = "default_list_down")]
    pub list_down: String,
    #[serde(default = "default_previous_week")]
    pub previous_week: String,
    #[serde(default = "default_next_week")]
    pub next_week: String,
    #[serde(default = "default_current_week")]
    pub current_week: String,
    #[serde(default = "default_switch_tab")]
    pub switch_tab: String,
    #[serde(default = "default_cycle_status")]
    pub cycle_status: String,
    #[serde(default = "default_progress_up")]
    pub progress_up: String,
    #[serde(default = "default_progress_down")]
    pub progress_down: String,
    #[serde(default = "default_rollover")]
    pub rollover: String,
    #[serde(default = "default_copy_report")]
    pub copy_report: String,
    #[serde(default = "default_cycle_theme")]
    pub cycle_theme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default = "default_fg")]
    pub fg: String,
    #[serde(default = "default_bg")]
    pub bg: String,
    #[serde(default = "default_highlight_bg")]
    pub highlight_bg: String,
    #[serde(default = "default_highlight_fg")]
    pub highlight_fg: String,
    #[serde(default = "default_tab_bg")]
    pub tab_bg: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_data_dir(&default_data_dir(utils::Profile::Prod))
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            quit: default_quit(),
            help: default_help(),
            list_up: default_list_up(),
            list_down: default_list_down(),
            previous_week: default_previous_week(),
            next_week: default_next_week(),
            current_week: default_current_week(),
            switch_tab: default_switch_tab(),
            cycle_status: default_cycle_status(),
            progress_up: default_progress_up(),
            progress_down: default_progress_down(),
            rollover: default_rollover(),
            copy_report: default_copy_report(),
            cycle_theme: default_cycle_theme(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: default_fg(),
            bg: default_bg(),
            highlight_bg: default_highlight_bg(),
            highlight_fg: default_highlight_fg(),
            tab_bg: default_tab_bg(),
        }
    }
}

impl Theme {
    /// Get preset themes that are always available
    pub fn get_preset_themes() -> HashMap<String, Theme> {
        let mut themes = HashMap::new();

        themes.insert("default".to_string(), Theme::default());

        themes.insert("dark".to_string(), Theme {
            fg: "white".to_string(),
            bg: "black".to_string(),
            highlight_bg: "cyan".to_string(),
            highlight_fg: "black".to_string(),
            tab_bg: "gray".to_string(),
        });

        themes.insert("light".to_string(), Theme {
            fg: "black".to_string(),
            bg: "white".to_string(),
            highlight_bg: "blue".to_string(),
            highlight_fg: "white".to_string(),
            tab_bg: "gray".to_string(),
        });

        themes
    }
}

// Default value functions
fn default_current_workspace() -> String {
    DEFAULT_WORKSPACE.to_string()
}

fn default_legacy_year() -> i32 {
    DEFAULT_LEGACY_YEAR
}

fn default_history_weeks() -> usize {
    10
}

fn default_quit() -> String {
    "q".to_string()
}

fn default_help() -> String {
    "?".to_string()
}

fn default_list_up() -> String {
    "k".to_string()
}

fn default_list_down() -> String {
    "j".to_string()
}

fn default_previous_week() -> String {
    "h".to_string()
}

fn default_next_week() -> String {
    "l".to_string()
}

fn default_current_week() -> String {
    "c".to_string()
}

fn default_switch_tab() -> String {
    "Tab".to_string()
}

fn default_cycle_status() -> String {
    "Space".to_string()
}

fn default_progress_up() -> String {
    "+".to_string()
}

fn default_progress_down() -> String {
    "-".to_string()
}

fn default_rollover() -> String {
    "r".to_string()
}

fn default_copy_report() -> String {
    "y".to_string()
}

fn default_cycle_theme() -> String {
    "t".to_string()
}

fn default_current_theme() -> String {
    "default".to_string()
}

fn default_fg() -> String {
    "white".to_string()
}

fn default_bg() -> String {
    "black".to_string()
}

fn default_highlight_bg() -> String {
    "blue".to_string()
}

fn default_highlight_fg() -> String {
    "white".to_string()
}

fn default_tab_bg() -> String {
    "gray".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

/// Data directory for a profile, with the platform fallback when it cannot be resolved
pub fn default_data_dir(profile: utils::Profile) -> PathBuf {
    if let Some(data_dir) = utils::get_data_dir(profile) {
        return data_dir;
    }
    #[cfg(target_os = "macos")]
    {
        match profile {
            utils::Profile::Dev => utils::expand_path("~/Library/Application Support/wkr-dev"),
            utils::Profile::Prod => utils::expand_path("~/Library/Application Support/wkr"),
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        match profile {
            utils::Profile::Dev => utils::expand_path("~/.local/share/wkr-dev"),
            utils::Profile::Prod => utils::expand_path("~/.local/share/wkr"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Theme not found: {0}")]
    ThemeNotFound(String),
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),
    #[error("Workspace already exists: {0}")]
    WorkspaceExists(String),
    #[error("Cannot remove the workspace in use: {0}")]
    WorkspaceInUse(String),
    #[error("Invalid workspace name '{0}' (use letters, digits, '-' and '_')")]
    InvalidWorkspaceName(String),
}

impl Config {
    /// Default configuration whose main workspace lives in `data_dir`
    pub fn for_data_dir(data_dir: &Path) -> Self {
        let mut workspaces = BTreeMap::new();
        workspaces.insert(DEFAULT_WORKSPACE.to_string(), Workspace {
            display_name: "主工作空间".to_string(),
            description: "日常工作任务管理".to_string(),
            file_path: data_dir.join("wkr.db").to_string_lossy().to_string(),
            created_at: utils::now_rfc3339(),
            last_used: None,
        });

        Self {
            current_workspace: default_current_workspace(),
            workspaces,
            legacy_default_year: default_legacy_year(),
            report: ReportSettings::default(),
            key_bindings: KeyBindings::default(),
            current_theme: default_current_theme(),
            themes: HashMap::new(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }

    /// Load configuration from file, or create default if missing
    /// Uses the provided profile to determine config and database paths
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        Self::load_from(&config_path, &default_data_dir(profile))
    }

    /// Load configuration from an explicit file, creating it with defaults if missing.
    /// A fresh default workspace is placed in `data_dir`.
    pub fn load_from(config_path: &Path, data_dir: &Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let mut config: Config = toml::from_str(&contents)?;

            // A hand-edited file may have dropped every workspace
            if config.workspaces.is_empty() {
                let defaults = Config::for_data_dir(data_dir);
                config.workspaces = defaults.workspaces;
                config.current_workspace = default_current_workspace();
            }
            if !config.workspaces.contains_key(&config.current_workspace) {
                tracing::warn!(workspace = %config.current_workspace, "current workspace missing from config, falling back");
                config.current_workspace = config
                    .workspaces
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_else(default_current_workspace);
            }
            Ok(config)
        } else {
            // Create default config and save it
            let mut config = Config::for_data_dir(data_dir);
            if let Err(e) = config.save_to(config_path) {
                tracing::error!(path = %config_path.display(), error = %e, "failed to save config file");
                return Err(e);
            }
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save_with_profile(&mut self, profile: utils::Profile) -> Result<(), ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&mut self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile)
            .ok_or_else(|| ConfigError::ConfigDirError("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("config.toml"))
    }

    /// Options the store is opened with
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            legacy_default_year: self.legacy_default_year,
        }
    }

    /// Get the expanded database path of the current workspace (with ~ expansion)
    pub fn get_database_path(&self) -> Result<PathBuf, ConfigError> {
        self.workspace_path(&self.current_workspace)
    }

    pub fn workspace_path(&self, name: &str) -> Result<PathBuf, ConfigError> {
        self.workspaces
            .get(name)
            .map(|ws| utils::expand_path(&ws.file_path))
            .ok_or_else(|| ConfigError::WorkspaceNotFound(name.to_string()))
    }

    /// Workspaces, most recently used first
    pub fn list_workspaces(&self) -> Vec<(&String, &Workspace)> {
        let mut list: Vec<_> = self.workspaces.iter().collect();
        list.sort_by(|(a_name, a), (b_name, b)| {
            b.last_used.cmp(&a.last_used).then_with(|| a_name.cmp(b_name))
        });
        list
    }

    /// Register a new workspace whose store sits next to the current one
    pub fn add_workspace(
        &mut self,
        name: &str,
        display_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<PathBuf, ConfigError> {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ConfigError::InvalidWorkspaceName(name.to_string()));
        }
        if self.workspaces.contains_key(name) {
            return Err(ConfigError::WorkspaceExists(name.to_string()));
        }

        let dir = self
            .get_database_path()?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let path = dir.join(format!("{}.db", name));
        self.workspaces.insert(name.to_string(), Workspace {
            display_name: display_name.unwrap_or(name).to_string(),
            description: description.unwrap_or_default().to_string(),
            file_path: path.to_string_lossy().to_string(),
            created_at: utils::now_rfc3339(),
            last_used: None,
        });
        Ok(path)
    }

    /// Switch the current workspace
    pub fn use_workspace(&mut self, name: &str) -> Result<(), ConfigError> {
        let workspace = self
            .workspaces
            .get_mut(name)
            .ok_or_else(|| ConfigError::WorkspaceNotFound(name.to_string()))?;
        workspace.last_used = Some(utils::now_rfc3339());
        self.current_workspace = name.to_string();
        Ok(())
    }

    /// Change the display name and, when given, the description of a workspace
    pub fn rename_workspace(
        &mut self,
        name: &str,
        display_name: &str,
        description: Option<&str>,
    ) -> Result<(), ConfigError> {
        let workspace = self
            .workspaces
            .get_mut(name)
            .ok_or_else(|| ConfigError::WorkspaceNotFound(name.to_string()))?;
        workspace.display_name = display_name.to_string();
        if let Some(description) = description {
            workspace.description = description.to_string();
        }
        Ok(())
    }

    /// Forget a workspace and delete its store file. The current workspace cannot be removed.
    pub fn remove_workspace(&mut self, name: &str) -> Result<PathBuf, ConfigError> {
        if name == self.current_workspace {
            return Err(ConfigError::WorkspaceInUse(name.to_string()));
        }
        let path = self.workspace_path(name)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }
        self.workspaces.remove(name);
        Ok(path)
    }

    /// The current theme; unknown names fall back to the default colors.
    /// An empty `highlight_fg` means "pick a contrasting color" at render time.
    pub fn get_active_theme(&self) -> Theme {
        self.themes
            .get(&self.current_theme)
            .cloned()
            .or_else(|| Theme::get_preset_themes().get(&self.current_theme).cloned())
            .unwrap_or_default()
    }

    /// Set the active theme by name
    pub fn set_theme(&mut self, name: &str) -> Result<(), ConfigError> {
        if !self.themes.contains_key(name) && !Theme::get_preset_themes().contains_key(name) {
            return Err(ConfigError::ThemeNotFound(name.to_string()));
        }
        self.current_theme = name.to_string();
        Ok(())
    }

    /// Get all available theme names (presets + user-defined), sorted
    pub fn get_available_themes(&self) -> Vec<String> {
        let mut themes: Vec<String> = Theme::get_preset_themes().keys().cloned().collect();
        for theme_name in self.themes.keys() {
            if !themes.contains(theme_name) {
                themes.push(theme_name.clone());
            }
        }
        themes.sort();
        themes
    }

    /// Name of the theme after the current one, wrapping around
    pub fn next_theme(&self) -> String {
        let themes = self.get_available_themes();
        let index = themes.iter().position(|t| *t == self.current_theme).map(|i| i + 1).unwrap_or(0);
        themes[index % themes.len()].clone()
    }
}
