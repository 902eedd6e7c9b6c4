use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config directory not found")]
    NoConfigDir,
    #[error("config file not found at {0}")]
    NotFound(PathBuf),
    #[error("failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub picker: PickerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
            args: Vec::new(),
        }
    }
}

fn default_player_command() -> String {
    "mpv".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PickerConfig {
    #[serde(default = "default_picker_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            command: default_picker_command(),
            args: Vec::new(),
        }
    }
}

fn default_picker_command() -> String {
    "fzf".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub download_dir: Option<PathBuf>,
    /// Remove the `.part` file when a download fails
    #[serde(default = "default_cleanup_partial")]
    pub cleanup_partial: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            cleanup_partial: default_cleanup_partial(),
        }
    }
}

fn default_cleanup_partial() -> bool {
    true
}

impl StorageConfig {
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| {
            ProjectDirs::from("", "", "plexbrowse")
                .map(|dirs| dirs.data_dir().join("downloads"))
                .unwrap_or_else(|| std::env::temp_dir().join("plexbrowse"))
        })
    }
}

/// Server settings given on the command line or through the environment.
/// They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub url: Option<String>,
    pub token: Option<String>,
}

impl ServerOverrides {
    fn is_complete(&self) -> bool {
        self.url.is_some() && self.token.is_some()
    }

    fn apply(self, server: &mut ServerConfig) {
        if let Some(url) = self.url {
            server.url = url;
        }
        if let Some(token) = self.token {
            server.token = token;
        }
    }
}

impl Config {
    /// Load the config file (default location unless `path` is given), then
    /// apply overrides. A missing file is fine when the overrides alone
    /// describe the server.
    pub fn resolve(path: Option<PathBuf>, overrides: ServerOverrides) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => Self::config_path()?,
        };

        let mut config = if path.exists() {
            Self::parse_file(&path)?
        } else if overrides.is_complete() {
            Config::default()
        } else {
            return Err(ConfigError::NotFound(path));
        };

        overrides.apply(&mut config.server);
        config.server.url = config.server.url.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a file with no overrides applied
    #[cfg(test)]
    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "plexbrowse")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.url cannot be empty".to_string(),
            ));
        }

        let url = self.server.url.trim_end_matches('/');
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::ValidationError(
                "server.url must start with http:// or https://".to_string(),
            ));
        }

        if self.server.token.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.token cannot be empty".to_string(),
            ));
        }

        if self.player.command.is_empty() || self.picker.command.is_empty() {
            return Err(ConfigError::ValidationError(
                "player.command and picker.command cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
url = "http://plex.local:32400/"
token = "secret"

[player]
command = "vlc"
args = ["--fullscreen"]

[storage]
download_dir = "/media/plex"
cleanup_partial = false
"#,
        );

        let config = Config::resolve(Some(path), ServerOverrides::default()).unwrap();
        assert_eq!(config.server.url, "http://plex.local:32400");
        assert_eq!(config.player.command, "vlc");
        assert_eq!(config.player.args, vec!["--fullscreen"]);
        assert_eq!(config.picker.command, "fzf");
        assert_eq!(config.storage.download_dir(), PathBuf::from("/media/plex"));
        assert!(!config.storage.cleanup_partial);
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
url = "https://plex.example.com"
token = "secret"
"#,
        );

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.player.command, "mpv");
        assert!(config.storage.cleanup_partial);
    }

    #[test]
    fn test_overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
url = "http://old:32400"
token = "old"
"#,
        );

        let overrides = ServerOverrides {
            url: Some("http://new:32400".to_string()),
            token: None,
        };
        let config = Config::resolve(Some(path), overrides).unwrap();
        assert_eq!(config.server.url, "http://new:32400");
        assert_eq!(config.server.token, "old");
    }

    #[test]
    fn test_missing_file_with_complete_overrides() {
        let dir = TempDir::new().unwrap();
        let overrides = ServerOverrides {
            url: Some("http://plex:32400".to_string()),
            token: Some("t".to_string()),
        };
        let config = Config::resolve(Some(dir.path().join("none.toml")), overrides).unwrap();
        assert_eq!(config.server.token, "t");
    }

    #[test]
    fn test_missing_file_without_overrides() {
        let dir = TempDir::new().unwrap();
        let result = Config::resolve(Some(dir.path().join("none.toml")), ServerOverrides::default());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_validation_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
url = "plex:32400"
token = "secret"
"#,
        );
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        let path = write_config(
            &dir,
            r#"
[server]
url = "http://plex:32400"
"#,
        );
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
