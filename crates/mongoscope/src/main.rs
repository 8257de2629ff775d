//! mongoscope - MongoDB cluster statistics collector.
//!
//! Connects to a cluster, collects database/collection statistics with
//! index and document-structure analysis, evaluates cluster health and
//! prints the snapshot as JSON on stdout.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use mongoscope_core::client::mongo::MongoClusterClient;
use mongoscope_core::collector::{CollectOptions, StatsCollector};
use mongoscope_core::fmt::format_bytes;
use mongoscope_core::model::ClusterSnapshot;

/// MongoDB cluster statistics collector.
#[derive(Parser)]
#[command(name = "mongoscope", about = "MongoDB cluster statistics collector", version)]
struct Args {
    /// MongoDB connection string.
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    uri: String,

    /// Collect only the named databases (repeatable).
    #[arg(long = "db", value_name = "NAME")]
    databases: Vec<String>,

    /// Skip index usage, structure analysis and health evaluation.
    #[arg(long)]
    fast: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("mongoscope={}", level).parse().unwrap())
        .add_directive(format!("mongoscope_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Describes the contents of a snapshot for logging.
fn describe_snapshot(snapshot: &ClusterSnapshot) -> String {
    let total_objects: i64 = snapshot.databases.iter().map(|db| db.objects).sum();
    let total_storage: i64 = snapshot.databases.iter().map(|db| db.storage_size).sum();

    let mut parts = vec![
        format!("{} databases", snapshot.databases.len()),
        format!("{} collections", snapshot.collections.len()),
        format!("{} objects", total_objects),
        format_bytes(total_storage.max(0) as u64),
    ];
    if let Some(health) = &snapshot.health {
        parts.push(format!("health {:?}", health.status).to_lowercase());
    }
    parts.join(", ")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("mongoscope {} starting", env!("CARGO_PKG_VERSION"));

    let client = match MongoClusterClient::connect(&args.uri).await {
        Ok(client) => client,
        Err(e) => {
            error!("Connection failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = CollectOptions {
        include_databases: args.databases,
        fast_mode: args.fast,
    };
    let collector = StatsCollector::new(client, options);

    let snapshot = match collector.collect().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Collection failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Snapshot: {}", describe_snapshot(&snapshot));
    if let Some(health) = &snapshot.health {
        for issue in &health.issues {
            info!("Issue: {}", issue);
        }
    }

    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize snapshot: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
