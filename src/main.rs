//! formbot - Entry Point
//!
//! Runs the Discord gateway client. Configuration comes from the
//! environment (see --help).

use formbot::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("formbot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: formbot");
        println!();
        println!("Environment variables:");
        println!("  DISCORD_TOKEN           Discord bot token (required)");
        println!("  FORMBOT_DB_PATH         SQLite database path");
        println!("  FORMBOT_CACHE_TTL       Alias cache TTL in seconds (default: 300)");
        println!("  FORMBOT_COMMAND_PREFIX  Management command prefix (default: fp!)");
        println!("  RUST_LOG                Log level (trace/debug/info/warn/error)");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("formbot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    formbot::discord::run_bot(config).await?;

    Ok(())
}
