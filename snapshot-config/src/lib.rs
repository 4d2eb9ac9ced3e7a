//! Configuration for schema snapshots.
//!
//! Configuration is loaded from `configuration/base.*`, the environment specific file selected by
//! `APP_ENVIRONMENT` and finally `APP_`-prefixed environment variables. See [`load_config`].

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
pub use secret::SerializableSecretString;
