//! Configuration loading for vesper.
//!
//! Config files: `vesper.toml`, `vesper.yaml`, or `vesper.json`
//! Searched in `./` then `~/.config/vesper/`.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, load_config, to_toml_string},
    schema::{DirectivesConfig, LogFormat, LoggingConfig, VesperConfig},
};
