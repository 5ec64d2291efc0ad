//! Server configuration, loaded once at startup.
//!
//! The loaded [`ServerConfig`] is an immutable snapshot: it is constructed
//! at process start and shared read-only into every request-handling
//! context. Hot reloading is out of scope.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Listener settings and the shared-secret policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret expected in the `X-API-Key` header.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// When false, any (or no) key is accepted.
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

const fn default_verify() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret_key: None,
            verify: default_verify(),
        }
    }
}

/// One game exposed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Stable id used in every endpoint path.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Optional human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Root directory holding the game's files.
    pub directory: PathBuf,
    /// Opaque value passed through verbatim to clients as `clientConfig`.
    #[serde(default)]
    pub client_config: Option<serde_json::Value>,
}

/// Complete configuration snapshot for the server binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener and auth settings.
    #[serde(default)]
    pub server: ServerSettings,
    /// Game registry.
    #[serde(default)]
    pub games: Vec<GameConfig>,
}

impl ServerConfig {
    /// Default configuration file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depot-dl")
            .join("config.toml")
    }

    /// Loads and validates a configuration file.
    ///
    /// A game directory that does not exist is a startup warning, not an
    /// error; the catalog for it will simply be empty until it appears.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, is not valid
    /// TOML, or contains duplicate game ids.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;

        let mut seen = std::collections::HashSet::new();
        for game in &config.games {
            if !seen.insert(game.id.as_str()) {
                return Err(Error::Config(format!("duplicate game id: {}", game.id)));
            }
            if !game.directory.exists() {
                log::warn!(
                    "game directory does not exist: {} ({})",
                    game.directory.display(),
                    game.id
                );
            }
        }
        if config.server.verify && config.server.secret_key.is_none() {
            log::warn!("verification enabled but no secret_key configured; accepting all keys");
        }

        log::info!("loaded {} game(s) from {}", config.games.len(), path.display());
        Ok(config)
    }

    /// Looks up a game by id.
    #[must_use]
    pub fn game(&self, id: &str) -> Option<&GameConfig> {
        self.games.iter().find(|g| g.id == id)
    }

    /// True when a presented key satisfies the configured policy: with
    /// verification disabled or no secret configured, anything passes;
    /// otherwise the key must match exactly.
    #[must_use]
    pub fn key_is_valid(&self, presented: Option<&str>) -> bool {
        if !self.server.verify {
            return true;
        }
        match &self.server.secret_key {
            Some(secret) => presented == Some(secret.as_str()),
            None => true,
        }
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
    fn load_minimal_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
port = 9000
secret_key = "hunter2"
"#,
        );
        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.secret_key.as_deref(), Some("hunter2"));
        assert!(config.server.verify);
        assert!(config.games.is_empty());
    }

    #[test]
    fn load_game_with_client_config() {
        let dir = TempDir::new().unwrap();
        let game_dir = dir.path().join("game");
        std::fs::create_dir(&game_dir).unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[[games]]
id = "demo"
name = "Demo Game"
version = "1.2"
directory = "{}"

[games.client_config]
launch_exe = "demo.exe"
fullscreen = true
"#,
                game_dir.display()
            ),
        );
        let config = ServerConfig::load(&path).unwrap();
        let game = config.game("demo").unwrap();
        assert_eq!(game.name, "Demo Game");
        let cc = game.client_config.as_ref().unwrap();
        assert_eq!(cc["launch_exe"], "demo.exe");
        assert_eq!(cc["fullscreen"], true);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = ServerConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[server\nport=");
        assert!(matches!(ServerConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn duplicate_game_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[[games]]
id = "demo"
name = "A"
version = "1"
directory = "/tmp/a"

[[games]]
id = "demo"
name = "B"
version = "1"
directory = "/tmp/b"
"#,
        );
        assert!(matches!(ServerConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn key_policy() {
        let mut config = ServerConfig::default();
        // No secret configured: everything passes.
        assert!(config.key_is_valid(None));
        assert!(config.key_is_valid(Some("whatever")));

        config.server.secret_key = Some("s3cret".to_string());
        assert!(config.key_is_valid(Some("s3cret")));
        assert!(!config.key_is_valid(Some("wrong")));
        assert!(!config.key_is_valid(None));

        // Verification disabled: everything passes again.
        config.server.verify = false;
        assert!(config.key_is_valid(None));
        assert!(config.key_is_valid(Some("wrong")));
    }
}
