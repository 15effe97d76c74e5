use clap::Parser;
use rust_leadgen_pipeline::config::{Config, RunOptions};
use rust_leadgen_pipeline::db::Database;
use rust_leadgen_pipeline::pipeline::{Pipeline, PipelineReport};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "leadgen-pipeline",
    about = "Discover, enrich, score, and import homeowner leads",
    version
)]
struct Cli {
    /// Target city for the property search
    #[arg(long, default_value = "Scottsdale")]
    city: String,
    /// Target state for the property search
    #[arg(long, default_value = "AZ")]
    state: String,
    /// Hard cap on records fetched from the search provider
    #[arg(long, default_value_t = 250)]
    max_results: usize,
    /// Drop records scoring below this before import
    #[arg(long, default_value_t = 0)]
    min_score: u32,
    /// Minimum lot size filter (square feet)
    #[arg(long)]
    min_lot_sqft: Option<f64>,
    /// Minimum estimated value filter (dollars)
    #[arg(long)]
    min_value: Option<f64>,
    /// Skip all destination-store writes but still report
    #[arg(long)]
    dry_run: bool,
    /// Page offset handed to the search provider on resume
    #[arg(long, default_value_t = 0)]
    resume_offset: usize,
    /// Bypass the region phone filter stage
    #[arg(long)]
    no_region_filter: bool,
    /// Checkpoint file path
    #[arg(long, default_value = "pipeline_progress.json")]
    checkpoint: PathBuf,
    /// CSV export path
    #[arg(long, default_value = "qualified_leads.csv")]
    export: PathBuf,
}

impl Cli {
    fn into_options(self) -> RunOptions {
        let defaults = RunOptions::default();
        RunOptions {
            city: self.city,
            state: self.state,
            max_results: self.max_results,
            min_score: self.min_score,
            min_lot_sqft: self.min_lot_sqft.or(defaults.min_lot_sqft),
            min_value: self.min_value.or(defaults.min_value),
            dry_run: self.dry_run,
            resume_offset: self.resume_offset,
            region_filter: !self.no_region_filter,
            checkpoint_path: self.checkpoint,
            export_path: self.export,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_leadgen_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let options = cli.into_options();

    let config = Config::from_env()?;

    // A dry run never touches the destination store, so skip the pool.
    let pool = if options.dry_run {
        tracing::info!("Dry run: skipping database connection");
        None
    } else {
        let db = Database::new(&config.database_url).await?;
        tracing::info!("Database connection pool established");
        Some(db.pool)
    };

    let pipeline = Pipeline::new(&config, options, pool)?;
    let report = pipeline.run().await?;

    render_report(&report);
    Ok(())
}

/// Human-readable rendering of the structured report. Kept out of the
/// library so callers can swap their own presentation.
fn render_report(report: &PipelineReport) {
    let c = &report.counters;

    println!("\n=== Pipeline Report ===");
    if report.dry_run {
        println!("(dry run: no records were written)");
        println!("Would import:        {}", report.would_import);
    }
    println!("Properties found:    {}", c.properties_found);
    println!("Homeowners found:    {}", c.homeowners_found);
    println!("With phone:          {}", c.with_phone);
    println!("With mobile:         {}", c.with_mobile);
    println!("Imported:            {}", c.imported);
    println!("Skipped (duplicate): {}", c.skipped);
    println!("Failed:              {}", c.failed);
    println!("Average score:       {:.1}", c.average_score);
    println!(
        "Priority tiers:      {} high / {} medium / {} low",
        c.high_priority, c.medium_priority, c.low_priority
    );
    println!(
        "Score buckets:       {} hot / {} warm / {} cold",
        report.score_distribution.hot, report.score_distribution.warm, report.score_distribution.cold
    );
    println!(
        "Region filter:       {} kept / {} dropped / {} no phone",
        report.filter_stats.kept, report.filter_stats.dropped, report.filter_stats.no_phone
    );
    println!(
        "API usage:           {} requests, ~{:.0} credits",
        c.api_requests, c.estimated_credits
    );

    if !report.area_codes.is_empty() {
        println!("\nArea codes:");
        for row in &report.area_codes {
            let marker = if row.allowed { "✓" } else { " " };
            println!("  {} {}  {}", marker, row.area_code, row.count);
        }
    }

    if !report.top_errors.is_empty() {
        println!("\nRecent errors:");
        for err in &report.top_errors {
            println!("  [{}] {}", err.context, err.message);
        }
    }

    println!(
        "\nExported {} records to {:?}",
        report.records_exported, report.export_path
    );
}
