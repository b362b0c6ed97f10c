use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory, relative to the working directory, holding configuration files.
const CONFIGURATION_DIR: &str = "configuration";

/// Extensions tried, in order, for every configuration file stem.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested keys in environment variables (`APP_FALLBACK__DIRECTORY`).
const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Implemented by top-level configuration structures.
pub trait Config {
    /// Keys whose environment variable values are parsed as comma-separated lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate `{stem}` configuration in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        stem: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to build configuration: {0}")]
    Builder(#[source] config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),
}

/// Loads configuration from `configuration/base.*`, `configuration/{environment}.*` and
/// `APP_`-prefixed environment variables, in increasing order of precedence.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load()?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads configuration from an explicit directory and environment.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let base_file = find_configuration_file(directory, "base")?;
    let environment_file = find_configuration_file(directory, environment.as_str())?;

    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in T::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(base_file))
        .add_source(config::File::from(environment_file))
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Returns the first existing file named `{stem}.{ext}` for the supported extensions.
fn find_configuration_file(directory: &Path, stem: &str) -> Result<PathBuf, LoadConfigError> {
    let mut attempted = Vec::with_capacity(CONFIG_FILE_EXTENSIONS.len());

    for extension in CONFIG_FILE_EXTENSIONS {
        let path = directory.join(format!("{stem}.{extension}"));
        if path.is_file() {
            return Ok(path);
        }
        attempted.push(format!("`{}`", path.display()));
    }

    Err(LoadConfigError::ConfigurationFileMissing {
        stem: stem.to_string(),
        directory: directory.to_path_buf(),
        attempted: attempted.join(", "),
    })
}
