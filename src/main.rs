use anyhow::Context;
use clap::Parser;
use srim_etl::utils::error::{EtlError, ErrorSeverity};
use srim_etl::utils::{logger, validation::Validate};
use srim_etl::{CliConfig, CsvFeed, EtlEngine, LocalStorage, SrimPipeline};

const SUMMARY_ROWS: usize = 20;

fn exit_code(e: &EtlError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn feed_for(config: &CliConfig) -> CsvFeed {
    let mut feed = CsvFeed::new();
    if let Some(path) = &config.tickers {
        feed = feed.with_tickers(path);
    }
    if let Some(path) = &config.fundamentals {
        feed = feed.with_fundamentals(path);
    }
    if let Some(path) = &config.quotes {
        feed = feed.with_quotes(path);
    }
    feed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    logger::init_logger(config.verbose, config.json_logs);

    tracing::info!("Starting srim-etl CLI");
    tracing::debug!("CLI config: {:?}", config);

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        tracing::error!("Suggestion: {}", e.recovery_suggestion());
        eprintln!("{}", e.user_friendly_message());
        std::process::exit(1);
    }

    let feed = feed_for(&config);
    let storage = LocalStorage::new(config.output_path.clone());
    let pipeline =
        SrimPipeline::new(feed, storage, config).context("failed to resolve run parameters")?;

    let engine = EtlEngine::new(pipeline);

    match engine.run().await {
        Ok(outcome) => {
            tracing::info!("Run completed, output saved to: {}", outcome.output_path);
            println!("{}", outcome.summary(SUMMARY_ROWS));
            println!("Output saved to: {}", outcome.output_path);
        }
        Err(e) => {
            tracing::error!(
                "Run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("{}", e.user_friendly_message());
            eprintln!("Suggestion: {}", e.recovery_suggestion());

            let code = exit_code(&e);
            if code > 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
