use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use hazard_watch::{
    config::Config,
    database::Database,
    events::{alert::TcpAlertDispatcher, sink::StoreEventSink},
    gst_utils,
    inference,
    manager::{Collaborators, Orchestrator, OrchestratorSettings},
    service,
    stream::GstBackend,
    HazardWatchError,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/hazard-watch/config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Run under systemd (no timestamps, journald adds its own)
    #[arg(long)]
    service: bool,

    /// Check available GStreamer plugins and exit
    #[arg(long)]
    check_plugins: bool,

    /// Camera registry and event store
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Hazard classifier model file
    #[arg(long, env = "MODEL_PATH")]
    model: Option<PathBuf>,
}

fn init_logging(args: &Args) {
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if args.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else if args.service {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .without_time()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting Hazard Watch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {:?}", args.config);

    let gst_capabilities = gst_utils::initialize()?;
    if args.check_plugins {
        gst_utils::print_plugin_info(&gst_capabilities);
        return Ok(());
    }

    let mut config = Config::load(&args.config).await?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if let Some(model) = args.model {
        config.detection.model_path = model;
    }
    config.validate().map_err(HazardWatchError::ConfigError)?;
    info!("App name: {}", config.app.name);

    // Nothing starts without a usable detector
    config.check_model_artifact()?;
    let detector = inference::build_detector(&config.detection)?;

    let db = Database::new(&config.database).await?;
    info!("Event store ready at {}", config.database.url);

    let alerts = TcpAlertDispatcher::new(
        config.events.alert_endpoint.clone(),
        Duration::from_millis(config.events.alert_timeout_ms),
    );
    info!("Alerts go to {}", alerts.endpoint());

    let collaborators = Collaborators {
        registry: Arc::new(db.clone()),
        backend: Arc::new(GstBackend::from_config(&config.stream)),
        detector,
        sink: Arc::new(StoreEventSink::new(db.clone())),
        alerts: Arc::new(alerts),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorSettings::from_config(&config),
        collaborators,
    ));

    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let signal = service::wait_for_shutdown().await;
            info!("Shutting down on {:?}", signal);
            orchestrator.stop();
        });
    }

    match orchestrator.ensure_started().await {
        Ok(count) if count == 0 => warn!("No enabled cameras to watch"),
        Ok(_) => {}
        Err(HazardWatchError::Stopped) => {
            info!("Stopped before any camera was started");
            db.close().await;
            return Ok(());
        }
        Err(e) => {
            error!("Startup failed: {}", e);
            return Err(e.into());
        }
    }

    let stop = orchestrator.stop_signal();
    let status_interval = Duration::from_secs(config.app.status_interval_seconds.max(1));
    while stop.sleep(status_interval).await {
        let status = orchestrator.status();
        match serde_json::to_string(&status) {
            Ok(json) => info!(status = %json, "Orchestrator status"),
            Err(e) => warn!("Failed to serialize status: {}", e),
        }
    }

    let report = orchestrator
        .shutdown(Duration::from_secs(config.app.shutdown_timeout_seconds))
        .await;
    db.close().await;

    if !report.stragglers.is_empty() {
        // Blocked workers are not cancelled; leave them to process exit
        warn!("Exiting with {} workers still busy", report.stragglers.len());
        std::process::exit(0);
    }

    info!("Hazard Watch stopped");
    Ok(())
}
