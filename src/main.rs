use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vatsim_state::config::Config;
use vatsim_state::db;
use vatsim_state::scheduler::Scheduler;
use vatsim_state::telemetry;
use vatsim_state::web::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "vatsim-state", about = "VATSIM live-state ingestion and session reconstruction")]
struct Cli {
    /// Interface the dashboard REST shell binds to.
    #[arg(long, env = "WEB_INTERFACE", default_value = "0.0.0.0")]
    interface: String,

    /// Port the dashboard REST shell binds to.
    #[arg(long, env = "WEB_PORT", default_value_t = 8080)]
    port: u16,

    /// Port the standalone Prometheus exporter binds to.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration invalid: {e}");
            std::process::exit(1);
        }
    };

    let pool = match db::build_pool(&config.database_url) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("failed to build database pool: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = db::migrations::run(&pool) {
        eprintln!("failed to run migrations: {e}");
        std::process::exit(1);
    }

    let scheduler = match Scheduler::new(config.clone(), pool.clone()) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            eprintln!("failed to assemble scheduler: {e}");
            std::process::exit(1);
        }
    };

    let filter_stats = scheduler.filter_stats();
    let health = scheduler.health();
    let cancel = CancellationToken::new();

    let scheduler_handle = tokio::spawn(scheduler.run(cancel.clone()));

    let app_state = AppState::new(pool, config, filter_stats, health);
    let web_handle = tokio::spawn(web::serve(cli.interface, cli.port, app_state));

    tokio::spawn(vatsim_state::metrics::start_metrics_server(cli.metrics_port));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    cancel.cancel();
    let _ = scheduler_handle.await;
    web_handle.abort();
}
