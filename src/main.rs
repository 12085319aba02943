use clap::{Parser, Subcommand};
use log::{error, info};
use time::OffsetDateTime;
use tokio::time::Duration;

use sensor_event_log::ingest::{ingest, IngestBatch};
use sensor_event_log::query::load_chart_data;
use sensor_event_log::simulate::{self, SimulationSettings};
use sensor_event_log::utils::format_datetime;
use sensor_event_log::{AppConfig, AppContext, Error};

#[derive(Parser, Debug)]
#[command(name = "sensor-event-log", about = "Sensor readings and open/close sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the measurement and event tables if missing (every command does this first)
    Init,
    /// Ingest one form-encoded batch, e.g. "apiKey=...&d=1345678910&t=21.5&h=60"
    Add { query: String },
    /// Print temperature, humidity and session series as JSON
    View {
        /// Only include rows at or after this epoch second
        #[arg(long)]
        since: Option<i64>,
        #[arg(long)]
        pretty: bool,
    },
    /// Submit a random walk of test readings
    Simulate {
        /// Epoch second of the first reading (default: now)
        #[arg(short = 't', long)]
        start: Option<i64>,
        /// Minutes between readings
        #[arg(short = 'i', long, default_value_t = 5)]
        interval: i64,
        #[arg(short = 'n', long, default_value_t = 12)]
        count: usize,
        /// Attach an alternating open/close event to every n-th reading
        #[arg(long, default_value_t = 0)]
        door_every: usize,
        /// Milliseconds to wait between submissions
        #[arg(long, default_value_t = 0)]
        pace_ms: u64,
    },
}

async fn run(command: Command, ctx: AppContext) -> Result<(), Error> {
    match command {
        Command::Init => Ok(()),
        Command::Add { query } => {
            let batch = IngestBatch::from_query(&query);
            let counts = ingest(&ctx, &batch).await?;
            println!("{}", counts);
            Ok(())
        }
        Command::View { since, pretty } => {
            let since = since
                .map(OffsetDateTime::from_unix_timestamp)
                .transpose()
                .map_err(|e| Error::Config(format!("Invalid --since: {}", e)))?;
            let data = load_chart_data(&ctx, since).await?;
            let json = if pretty {
                serde_json::to_string_pretty(&data)?
            } else {
                serde_json::to_string(&data)?
            };
            println!("{}", json);
            Ok(())
        }
        Command::Simulate {
            start,
            interval,
            count,
            door_every,
            pace_ms,
        } => {
            let start = start.unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp());
            let settings = SimulationSettings {
                start,
                interval_minutes: interval,
                count,
                door_every,
                pace: Duration::from_millis(pace_ms),
            };
            let total = simulate::run(&ctx, &settings).await?;
            println!("{}", total);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    let ctx = match AppContext::open_postgres(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "Starting at {}",
        format_datetime(&OffsetDateTime::now_utc())
    );

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = tx.send(());
    });

    tokio::select! {
        result = run(cli.command, ctx) => {
            if let Err(e) = result {
                error!("Fatal error: {}", e);
                return Err(e.into());
            }
        }
        Ok(()) = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
