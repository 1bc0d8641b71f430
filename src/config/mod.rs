//! TOML-based configuration.

mod settings;

pub use settings::{
    ClassificationSettings, DiscoverySettings, OrchestratorSettings, Settings, SettingsError,
    StoreSettings,
};
