//! Dashsync CLI
//!
//! Runs the dashboard against the in-memory gateway and prints the widgets.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dashsync::config::generate_default_config;
use dashsync::widgets::parse_amount;
use dashsync::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dashsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live dashboard feeds over a real-time document backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard against the in-memory gateway
    Demo {
        /// Revenue to add once signed in
        #[arg(short, long, default_value = "250.00")]
        revenue: String,
        /// Show the extended activity feed
        #[arg(short, long)]
        extended: bool,
        /// Print widget state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration file
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => Config::load_default(),
    };

    init_logging(&config.logging);

    match cli.command {
        Commands::Config => {
            print!("{}", generate_default_config());
            Ok(())
        }
        Commands::Demo {
            revenue,
            extended,
            json,
        } => run_demo(config, &revenue, extended, json).await,
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dashsync={}", logging.level).into());
    let json = logging.format == "json";

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn run_demo(config: Config, revenue: &str, extended: bool, json: bool) -> anyhow::Result<()> {
    let amount = parse_amount(revenue)?;
    tracing::info!("Dashsync v{}", env!("CARGO_PKG_VERSION"));

    let gateway = Arc::new(MemoryGateway::new());
    let sessions = Arc::new(SessionStore::new());
    let dashboard = Arc::new(Dashboard::new(
        gateway.clone(),
        sessions.clone(),
        config.feeds.clone(),
        &config.dashboard,
    )?);
    let follower = dashboard.follow_sessions(config.dashboard.release_on_sign_out);

    // Signed out: widgets fall back to their defaults
    let (stats_state, activity_state) = dashboard.mount().await;
    println!("Signed out: stats {}, activity {}", stats_state, activity_state);

    sessions.sign_in(Session::new("demo-user").email("demo@example.com"));

    // The stats feed creates its document on first delivery
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match dashboard.add_revenue(amount).await {
                Ok(()) => break,
                Err(WidgetError::Gateway(GatewayError::NotFound(_))) => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to add revenue");
                    break;
                }
            }
        }
    })
    .await
    .context("stats document was never initialized")?;

    dashboard
        .log_activity("Profile Updated", "Your profile information was updated", ActivityKind::User)
        .await;
    dashboard
        .log_activity("Calendar Event", "Added a new calendar event", ActivityKind::Calendar)
        .await;

    if extended || config.dashboard.extended_activity {
        dashboard.set_extended_activity(true).await;
    }

    // Wait for both widgets to reflect the writes
    let (mut stats_rx, mut activity_rx) = dashboard.watch().await;
    tokio::time::timeout(Duration::from_secs(2), async {
        let _ = stats_rx.wait_for(|v| v.stat.revenue >= amount).await;
        let _ = activity_rx.wait_for(|a| a.len() >= 3).await;
    })
    .await
    .ok();

    let stats = dashboard.stats().await;
    let activity = dashboard.activity().await;

    if json {
        let out = serde_json::json!({ "stats": stats, "activity": activity });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_widgets(&stats, &activity);
    }

    sessions.sign_out();
    dashboard.shutdown().await;
    follower.abort();

    Ok(())
}

fn print_widgets(stats: &StatsView, activity: &[ActivityLog]) {
    println!();
    for card in &stats.cards {
        println!("{:<16} {:>14}   {}", card.title, card.value, card.description);
    }

    println!();
    println!("Recent activity:");
    let now = chrono::Utc::now();
    for entry in activity {
        println!(
            "  [{:<8}] {:<16} {:<40} {}",
            entry.kind,
            entry.title,
            entry.description,
            entry.age(now)
        );
    }
}
