pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{CsvFeed, LocalStorage};
pub use config::toml_config::TomlConfig;
pub use core::{etl::EtlEngine, pipeline::SrimPipeline};
pub use utils::error::{EtlError, Result};
