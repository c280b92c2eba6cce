use chrono::Local;
use clap::{Parser, Subcommand};
use segment_tracker::{
    CsvLogStore, Settings, StravaClient,
    config::DEFAULT_CONFIG_PATH,
    errors::AppError,
    models::{ExploredSegment, RunSummary},
    strava::{ActivityType, ExploreQuery},
    tracker,
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt};

const MAX_NAME_LEN: usize = 48;

#[derive(Debug, Parser)]
#[command(version, about = "Records daily attempts on Strava segments and charts the trend")]
struct Args {
    /// TOML config file; STRAVA_* environment variables override it
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long)]
    chart_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch every configured segment, append today's record and redraw charts (default)
    Track,
    /// List segments inside a bounding box
    Explore(ExploreArgs),
}

#[derive(Debug, clap::Args)]
#[command(allow_negative_numbers = true)]
struct ExploreArgs {
    sw_lat: f64,
    sw_lng: f64,
    ne_lat: f64,
    ne_lng: f64,

    #[arg(long, value_enum, default_value_t = ActivityType::Riding)]
    activity: ActivityType,

    /// Minimum climb category (0-5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    min_cat: Option<u8>,

    /// Maximum climb category (0-5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    max_cat: Option<u8>,
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let mut settings = Settings::load(&args.config)?;
    if let Some(log_file) = args.log_file {
        settings.output.log_file = log_file;
    }
    if let Some(chart_dir) = args.chart_dir {
        settings.output.chart_dir = chart_dir;
    }

    match args.command.unwrap_or(Command::Track) {
        Command::Track => {
            let summary = track(settings).await?;
            print_summary(&summary);
            Ok(())
        }
        Command::Explore(explore_args) => explore(settings, explore_args).await,
    }
}

async fn track(settings: Settings) -> Result<RunSummary, AppError> {
    let started = Local::now();
    let config = settings.into_config()?;
    info!(
        "{} segment(s) to process: {:?}",
        config.segment_ids.len(),
        config.segment_ids
    );

    let client = StravaClient::new(config.api.clone())?;
    let token = client.refresh_token(&config.credentials).await?;

    let mut store = CsvLogStore::open(&config.log_file);
    let summary = tracker::run(
        &client,
        &token,
        &config.segment_ids,
        &mut store,
        &config.chart_dir,
        started.date_naive(),
    )
    .await;

    info!("total execution time: {}s", (Local::now() - started).num_seconds());
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    println!("Segments processed successfully: {}", summary.processed);
    println!("Segments failed/skipped: {}", summary.failed);
    println!("Charts written: {}", summary.charts_written);
}

async fn explore(settings: Settings, args: ExploreArgs) -> Result<(), AppError> {
    let credentials = settings.credentials()?;
    let client = StravaClient::new(settings.api())?;
    let token = client.refresh_token(&credentials).await?;

    let query = ExploreQuery {
        sw_lat: args.sw_lat,
        sw_lng: args.sw_lng,
        ne_lat: args.ne_lat,
        ne_lng: args.ne_lng,
        activity: args.activity,
        min_cat: args.min_cat,
        max_cat: args.max_cat,
    };
    let segments = client.explore_segments(&token, &query).await?;
    print_segments(&query, &segments);
    Ok(())
}

fn print_segments(query: &ExploreQuery, segments: &[ExploredSegment]) {
    let activity = query.activity.as_str();
    if segments.is_empty() {
        println!("No '{activity}' segments found within bounds {}", query.bounds());
        return;
    }

    println!(
        "Found {} '{activity}' segment(s) within bounds {}",
        segments.len(),
        query.bounds()
    );
    println!(
        "{:<12} {:<50} {:<10} {:<15} {:<15}",
        "ID", "Name", "Climb Cat", "Distance (m)", "Avg Grade (%)"
    );
    println!("{}", "-".repeat(106));
    for segment in segments {
        let climb_cat = if segment.climb_category >= 0 {
            segment.climb_category.to_string()
        } else {
            "N/A".to_string()
        };
        println!(
            "{:<12} {:<50} {:<10} {:<15.1} {:<15.1}",
            segment.id,
            display_name(&segment.name),
            climb_cat,
            segment.distance,
            segment.avg_grade
        );
    }
}

fn display_name(name: &str) -> String {
    if name.chars().count() > MAX_NAME_LEN {
        let truncated: String = name.chars().take(MAX_NAME_LEN).collect();
        format!("{truncated}..")
    } else {
        name.to_string()
    }
}
