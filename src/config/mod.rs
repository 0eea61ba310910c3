mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    ConnectionSettings, HubSettings, LoggingSettings, ServerSettings, Settings,
};

/// Prefix of the environment variables read by `load_config`, e.g.
/// `LINEAGE_HUB__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "LINEAGE_HUB";

const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Loads the configuration from `config/default.*` and environment variables,
/// merged onto the defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Same as `load_config` but reads the optional file source from `path`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge_onto(Settings::default());

    settings.validate().map_err(ConfigError::Message)?;
    Ok(settings)
}
