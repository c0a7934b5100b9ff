#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;

use crate::domain::model::Stage;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_file_extensions, validate_path};

/// A full run needs all three feeds; a recompute needs none of them.
pub fn validate_feeds(
    stage: Stage,
    tickers: Option<&str>,
    fundamentals: Option<&str>,
    quotes: Option<&str>,
    baseline: Option<&str>,
) -> Result<()> {
    if stage == Stage::Full {
        for (field, value) in [
            ("feeds.tickers", tickers),
            ("feeds.fundamentals", fundamentals),
            ("feeds.quotes", quotes),
        ] {
            if value.is_none() {
                return Err(EtlError::MissingConfigError {
                    field: field.to_string(),
                });
            }
        }
    }

    let csv_files: Vec<&str> = [tickers, fundamentals, quotes].into_iter().flatten().collect();
    for file in &csv_files {
        validate_path("feeds", file)?;
    }
    validate_file_extensions("feeds", &csv_files, &["csv"])?;

    if let Some(baseline) = baseline {
        validate_path("feeds.baseline", baseline)?;
        validate_file_extensions("feeds.baseline", &[baseline], &["json"])?;
    }
    Ok(())
}
