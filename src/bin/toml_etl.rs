use anyhow::Context;
use clap::Parser;
use srim_etl::config::toml_config::TomlConfig;
use srim_etl::core::ConfigProvider;
use srim_etl::utils::error::ErrorSeverity;
use srim_etl::utils::{logger, validation::Validate};
use srim_etl::{CsvFeed, EtlEngine, LocalStorage, SrimPipeline};

#[derive(Parser)]
#[command(name = "toml-etl")]
#[command(about = "S-RIM run driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "srim-config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override run.stages from config
    #[arg(long)]
    stages: Option<String>,

    /// Override run.as_of from config. Without it a recompute stops at the
    /// quarter end and ignores later quotes.
    #[arg(long)]
    as_of: Option<String>,

    /// Override run.top_n from config
    #[arg(long)]
    top_n: Option<usize>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config file '{}': {}", args.config, e);
            eprintln!("Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    logger::init_logger(args.verbose || config.verbose(), config.json_logs());
    tracing::info!("Loaded configuration from: {}", args.config);

    if let Some(stages) = args.stages.clone() {
        tracing::info!("Stages overridden to: {}", stages);
        config.run.stages = Some(stages);
    }
    if let Some(as_of) = args.as_of.clone() {
        tracing::info!("As-of date overridden to: {}", as_of);
        config.run.as_of = Some(as_of);
    }
    if let Some(top_n) = args.top_n {
        config.run.top_n = Some(top_n);
    }

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        tracing::error!("Suggestion: {}", e.recovery_suggestion());
        eprintln!("{}", e.user_friendly_message());
        std::process::exit(1);
    }

    display_config_summary(&config, &args)?;

    if args.dry_run {
        tracing::info!("DRY RUN MODE - No actual processing will occur");
        return Ok(());
    }

    let mut feed = CsvFeed::new();
    if let Some(path) = &config.feeds.tickers {
        feed = feed.with_tickers(path);
    }
    if let Some(path) = &config.feeds.fundamentals {
        feed = feed.with_fundamentals(path);
    }
    if let Some(path) = &config.feeds.quotes {
        feed = feed.with_quotes(path);
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let top_n = config.run.top_n.unwrap_or(20);
    let pipeline =
        SrimPipeline::new(feed, storage, config).context("failed to resolve run parameters")?;
    let engine = EtlEngine::new(pipeline);

    match engine.run().await {
        Ok(outcome) => {
            tracing::info!("Run completed, output saved to: {}", outcome.output_path);
            println!("{}", outcome.summary(top_n));
            println!("Output saved to: {}", outcome.output_path);
        }
        Err(e) => {
            tracing::error!(
                "Run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("{}", e.user_friendly_message());
            eprintln!("Suggestion: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) -> anyhow::Result<()> {
    let params = config.run_parameters()?;

    println!("Configuration Summary:");
    println!("  Stage: {}", config.stage()?);
    println!(
        "  Snapshot: {} (as of {})",
        params.snapshot_id, params.as_of_date
    );
    println!(
        "  Valuation: r = {}, persistence = {}, clamp negative RI = {}",
        params.valuation.required_return,
        params.valuation.persistence,
        params.valuation.clamp_negative_residual
    );
    println!(
        "  Weights: gap {} / roe {} / pbr {}, warn penalty {} ({:?})",
        params.weights.gap,
        params.weights.roe,
        params.weights.pbr,
        params.weights.warn_penalty,
        params.weights.warn_penalty_mode
    );
    println!(
        "  ROE band: [{}, {}], stale after {} period(s)",
        params.quality.roe_min, params.quality.roe_max, params.quality.stale_after_periods
    );
    println!("  Rank order: {:?}", params.rank_order);
    for (name, path) in [
        ("Tickers", &config.feeds.tickers),
        ("Fundamentals", &config.feeds.fundamentals),
        ("Quotes", &config.feeds.quotes),
        ("Baseline", &config.feeds.baseline),
    ] {
        if let Some(path) = path {
            println!("  {}: {}", name, path);
        }
    }
    println!("  Output: {}", config.output_path());

    if args.dry_run {
        println!("  DRY RUN MODE ENABLED");
    }
    println!();
    Ok(())
}
