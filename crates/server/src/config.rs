//! Server configuration
//!
//! Precedence, lowest first: built-in defaults, the TOML file named by
//! `MEMECARD_CONFIG` (or `./memecard.toml` when present), then the
//! `MEMECARD_DATABASE`, `MEMECARD_PORT` and `MEMECARD_LIBRARY` variables.
//!
//! ```toml
//! port = 3001
//! database = "/var/lib/memecard/memecard.db"
//! library = "library.toml"
//!
//! [game]
//! win_score = 5
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use memecard_core::GameConfig;
use memecard_net::DEFAULT_PORT;

pub const CONFIG_ENV: &str = "MEMECARD_CONFIG";
pub const DATABASE_ENV: &str = "MEMECARD_DATABASE";
pub const PORT_ENV: &str = "MEMECARD_PORT";
pub const LIBRARY_ENV: &str = "MEMECARD_LIBRARY";

const DEFAULT_CONFIG_FILE: &str = "memecard.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error(transparent)]
    Game(#[from] memecard_core::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// SQLite file; the platform data directory when unset
    pub database: Option<PathBuf>,
    /// Content library imported at startup
    pub library: Option<PathBuf>,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            database: None,
            library: None,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment and working directory
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let file = explicit.or_else(|| {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            local.exists().then_some(local)
        });

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.game.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from environment variables read through `get`
    pub fn apply_env<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = get(DATABASE_ENV).filter(|v| !v.is_empty()) {
            self.database = Some(PathBuf::from(path));
        }
        if let Some(path) = get(LIBRARY_ENV).filter(|v| !v.is_empty()) {
            self.library = Some(PathBuf::from(path));
        }
        if let Some(port) = get(PORT_ENV) {
            self.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: PORT_ENV,
                value: port,
            })?;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Configured database path, or `memecard.db` in the platform data
    /// directory
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("dev", "memecard", "memecard").ok_or(ConfigError::NoDataDir)?;
        Ok(dirs.data_dir().join("memecard.db"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.bind_addr().port(), 3001);
        assert!(config.database.is_none());
        assert_eq!(config.game, GameConfig::default());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = 4000
library = "cards.toml"

[game]
win_score = 3
submit_secs = 45
"#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.library, Some(PathBuf::from("cards.toml")));
        assert_eq!(config.game.win_score, 3);
        assert_eq!(config.game.submit_secs, 45);
        assert_eq!(config.game.vote_secs, GameConfig::default().vote_secs);
    }

    #[test]
    fn test_from_file_errors() {
        let missing = ServerConfig::from_file(Path::new("/nonexistent/memecard.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();
        let bad = ServerConfig::from_file(file.path());
        assert!(matches!(bad, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig {
            port: 4000,
            ..ServerConfig::default()
        };
        config
            .apply_env(env(&[
                (DATABASE_ENV, "/tmp/rooms.db"),
                (PORT_ENV, " 5000 "),
                (LIBRARY_ENV, ""),
            ]))
            .unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.database, Some(PathBuf::from("/tmp/rooms.db")));
        assert!(config.library.is_none());
    }

    #[test]
    fn test_bad_port_env() {
        let mut config = ServerConfig::default();
        let err = config.apply_env(env(&[(PORT_ENV, "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: PORT_ENV, .. }));
        assert_eq!(config.port, 3001);
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let config = ServerConfig {
            database: Some(PathBuf::from("/data/memecard.db")),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/data/memecard.db")
        );
    }
}
