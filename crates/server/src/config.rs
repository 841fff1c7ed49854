use config::{Config, File, FileFormat, Source, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file read from the working directory.
pub const CONFIG_FILE: &str = "config.ini";

pub const DEFAULT_API_URL: &str = "https://api.xero.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("{message} (missing {key})")]
    MissingKey {
        key: &'static str,
        message: &'static str,
    },
}

/// Section of `config.ini` the application reads.
const APP_SECTION: &str = "app";

/// Raw `[APP]` section with option names folded to lower case.
///
/// Section and option names are matched without regard to case, so
/// `XERO_CONSUMER_KEY`, `xero_consumer_key` and `Xero_Consumer_Key` are the
/// same key.
#[derive(Debug, Default)]
pub struct AppSection {
    values: HashMap<String, String>,
}

impl AppSection {
    fn from_config(cfg: Config) -> Result<Self, ConfigError> {
        let sections: HashMap<String, Value> = cfg.try_deserialize()?;
        let mut values = HashMap::new();
        for (name, section) in sections {
            if !name.eq_ignore_ascii_case(APP_SECTION) {
                continue;
            }
            for (key, value) in section.into_table()? {
                values.insert(key.to_ascii_lowercase(), value.into_string()?);
            }
        }
        Ok(Self { values })
    }

    /// Remove and return the value for `key`, however it was spelled in the file.
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.values.remove(&key.to_ascii_lowercase())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub callback_url: String,
    /// Directory both export files are written into.
    pub files_path: String,
    pub vendors_file_name: String,
    pub accounts_file_name: String,
    /// Base URL of the accounting API, without a trailing slash.
    pub api_url: String,
    pub static_root: PathBuf,
}

impl AppConfig {
    pub fn vendors_file(&self) -> String {
        format!("{}/{}", self.files_path, self.vendors_file_name)
    }

    pub fn accounts_file(&self) -> String {
        format!("{}/{}", self.files_path, self.accounts_file_name)
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<AppSection> for AppConfig {
    type Error = ConfigError;

    fn try_from(mut app: AppSection) -> Result<Self, Self::Error> {
        const CREDENTIALS: &str = "Please define both XERO_CONSUMER_KEY and XERO_CONSUMER_SECRET variables in config.ini file";
        const CALLBACK: &str = "Please define callback_url in config.ini file";
        const FILES: &str =
            "Please define Account and Vendors file names and paths in config.ini file";

        let mut require = |key: &'static str, message: &'static str| {
            present(app.take(key)).ok_or(ConfigError::MissingKey { key, message })
        };
        let consumer_key = require("XERO_CONSUMER_KEY", CREDENTIALS)?;
        let consumer_secret = require("XERO_CONSUMER_SECRET", CREDENTIALS)?;
        let callback_url = require("CALLBACK_URL", CALLBACK)?;
        let files_path = require("ACCOUNTS_AND_VENDORS_FILES_PATH", FILES)?;
        let vendors_file_name = require("VENDORS_FILE_NAME", FILES)?;
        let accounts_file_name = require("ACCOUNTS_FILE_NAME", FILES)?;

        let api_url = present(app.take("XERO_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let static_root = present(app.take("STATIC_ROOT"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(AppConfig {
            consumer_key,
            consumer_secret,
            callback_url,
            files_path: files_path.trim_end_matches('/').to_string(),
            vendors_file_name,
            accounts_file_name,
            api_url,
            static_root,
        })
    }
}

fn from_source<S>(source: S) -> Result<AppConfig, ConfigError>
where
    S: Source + Send + Sync + 'static,
{
    let cfg = Config::builder().add_source(source).build()?;
    AppConfig::try_from(AppSection::from_config(cfg)?)
}

/// Parse configuration from INI text.
pub fn parse_config(ini: &str) -> Result<AppConfig, ConfigError> {
    from_source(File::from_str(ini, FileFormat::Ini))
}

/// Load application configuration from an INI file. The file is the only source.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    from_source(File::from(path.as_ref()).format(FileFormat::Ini))
}

/// Load `config.ini` from the working directory.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(CONFIG_FILE)
}
