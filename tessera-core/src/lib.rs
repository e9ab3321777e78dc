//! Runtime support shared by the Tessera crates: layered configuration,
//! the contextual resource registry and tracing setup.

pub mod config;
pub mod logging;
pub mod resources;

pub use config::{
    ConfigError, ConfigValue, DefaultSecretResolver, FromConfigValue, SecretResolver,
    TesseraConfig,
};
pub use logging::{init_tracing, LogFormat, LoggingConfig};
pub use resources::{ResourceError, ResourceRegistry, ResourceResolver, SharedResource};
