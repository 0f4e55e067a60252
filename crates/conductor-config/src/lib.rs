//! Configuration system for the Conductor workflow engine.
//!
//! Provides TOML-based configuration with:
//! - Engine tuning (`[engine]`): output directory, timeouts, buffer limits
//! - Autopilot defaults (`[autopilot]`)
//! - Declarative workflows (`[[workflows]]`) and recurring schedules (`[[schedules]]`)
//! - Config file layering (user config dir + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, user_config_dir,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
