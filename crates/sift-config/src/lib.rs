mod error;
mod manager;
mod model;

pub use error::ConfigError;
pub use manager::{apply_env_overrides, ConfigManager};
pub use model::*;
