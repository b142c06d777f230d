use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use uppe_engine::{EngineSettings, SiteDefinition};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {0}: {1}")]
    ReadFailed(path::PathBuf, #[source] std::io::Error),

    #[error("failed to write {0}: {1}")]
    WriteFailed(path::PathBuf, #[source] std::io::Error),

    #[error("failed to parse {0}: {1}")]
    ParseFailed(path::PathBuf, #[source] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config directory: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub logging: Logging,

    #[serde(default)]
    pub database: Database,

    #[serde(default)]
    pub sites: Vec<SiteDefinition>,

    /// File the config was loaded from
    #[serde(skip)]
    pub source: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    /// `compact` or `json`
    pub format: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    /// Relative paths resolve against the config file's directory
    pub path: path::PathBuf,
    pub max_connections: usize,
}

impl Default for Database {
    fn default() -> Self {
        Self { path: "history.db".into(), max_connections: 4 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uppe/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uppe/config.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            logging: Logging::default(),
            database: Database::default(),
            sites: Vec::new(),
            source: path::PathBuf::new(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Configuration ({}):", self.source.display())?;

        write_title_1(f, "Engine")?;
        write_1(f, "Monitoring Enabled", &self.engine.monitoring_enabled)?;
        write_1(f, "Worker Pool Size", &self.engine.worker_pool_size)?;
        write_1(f, "History Records Per Site", &self.engine.max_history_records_per_site)?;
        write_1(f, "Eviction Interval (s)", &self.engine.eviction_interval_secs)?;
        write_1(f, "Eviction Batch Size", &self.engine.eviction_batch_size)?;
        write_1(f, "Stop Grace Period (ms)", &self.engine.stop_grace_period_ms)?;
        write_1(f, "Max Body Bytes", &self.engine.max_body_bytes)?;
        write_1(f, "Default Retry Threshold", &self.engine.default_retry_threshold)?;

        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database_path().display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;

        write_title_1(f, "Sites")?;
        if self.sites.is_empty() {
            write_1(f, "(none)", &"add [[sites]] tables to start monitoring")?;
        }
        for site in &self.sites {
            write_title_2(f, &format!("{} ({})", site.name, site.id))?;
            for monitor in &site.monitors {
                let state = if monitor.enabled { "" } else { ", disabled" };
                let every = format!("{} every {}ms{}", monitor.monitor_type, monitor.interval_ms, state);
                write_2(f, &monitor.id, &every)?;
            }
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uppe/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            let raw_string =
                fs::read_to_string(&config_path).map_err(|err| Error::ReadFailed(config_path.clone(), err))?;
            toml::from_str(raw_string.as_str()).map_err(|err| Error::ParseFailed(config_path.clone(), err))?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.source = config_path;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::WriteFailed(parent.to_path_buf(), err))?;
        }

        std::fs::write(path, config_str).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))
    }

    pub fn database_path(&self) -> path::PathBuf {
        if self.database.path.is_absolute() {
            return self.database.path.clone();
        }
        match self.source.parent() {
            Some(dir) => dir.join(&self.database.path),
            None => self.database.path.clone(),
        }
    }

    pub fn site(&self, site_id: &str) -> Option<&SiteDefinition> {
        self.sites.iter().find(|site| site.id == site_id)
    }
}
