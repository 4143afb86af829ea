use std::error::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

mod app_metrics;
mod config;
mod host;
mod humidity_panel;
mod report_sink;
mod runner;
mod service;
mod state_file;
mod storage;
mod threshold_store;

use config::Config;
use humidity_panel::HumidityPanel;
use report_sink::JsonFileSink;
use runner::PanelRunner;
use state_file::StateFile;
use storage::JsonFileStore;
use threshold_store::{STORAGE_KEY, STORAGE_VERSION, ThresholdStore};

// ========== Logging Setup ==========

fn init_logging(log_config: &config::LogConfig) -> Result<(), Box<dyn Error>> {
    use tracing_appender::rolling;
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    std::fs::create_dir_all(&log_config.directory)?;

    let file_appender = rolling::daily(&log_config.directory, &log_config.file_prefix);

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_timer(fmt::time::OffsetTime::local_rfc_3339().unwrap_or_else(|_| fmt::time::OffsetTime::new(
            time::UtcOffset::UTC,
            time::format_description::well_known::Rfc3339,
        )));

    // stdout is left to the report and service traffic, so the console layer writes to stderr
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::OffsetTime::local_rfc_3339().unwrap_or_else(|_| fmt::time::OffsetTime::new(
            time::UtcOffset::UTC,
            time::format_description::well_known::Rfc3339,
        )));

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn print_help() {
    println!("Humidity Panel");
    println!();
    println!("USAGE:");
    println!("    humidity_panel [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>                      Configuration file (default: config.json)");
    println!("    --validate-config, --validate, -v    Validate configuration and exit");
    println!("    --help, -h                           Show this help message");
    println!();
    println!("Service calls are read from stdin, one JSON object per line:");
    println!(r#"    {{"domain": "aggregate_humidity_sensor", "service": "set_threshold", "data": {{"threshold": 75}}}}"#);
}

// ========== Main Application ==========

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_help();
        std::process::exit(0);
    }

    let validate_only = args.contains(&"--validate-config".to_string())
                     || args.contains(&"--validate".to_string())
                     || args.contains(&"-v".to_string());

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or("config.json");

    let config = match Config::from_file(config_path) {
        Ok(cfg) => {
            if validate_only {
                println!("✓ Configuration validation successful");
                println!("  Entities: {}.*{}*", cfg.panel.domain, cfg.panel.entity_filter);
                println!("  Default threshold: {}", cfg.panel.default_threshold);
                println!("  Poll interval: {}s", cfg.panel.poll_interval_seconds);
                println!("  States file: {}", cfg.host.states_file);
                println!("  Storage directory: {}", cfg.host.storage_directory);
                println!("  Report file: {}", cfg.host.report_file);
                std::process::exit(0);
            }
            cfg
        }
        Err(e) => {
            if validate_only {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
            eprintln!("Warning: Could not load {}: {}", config_path, e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    init_logging(&config.logging)?;
    info!("Humidity panel starting...");

    let store = JsonFileStore::new(&config.host.storage_directory, STORAGE_KEY, STORAGE_VERSION);
    info!(path = %store.path().display(), "Using threshold storage");
    let threshold_store = ThresholdStore::new(Box::new(store), config.panel.default_threshold);
    let panel = HumidityPanel::new(&config.panel, threshold_store);

    let states = StateFile::new(&config.host.states_file);
    if !states.path().exists() {
        warn!(path = %states.path().display(), "State snapshot not found yet, panel will report off");
    }
    let sink = JsonFileSink::new(&config.host.report_file);

    let mut runner = PanelRunner::new(
        panel,
        Box::new(states),
        Box::new(sink),
        config.panel.metrics_interval(),
    );

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(service::read_service_calls(
        tokio::io::BufReader::new(tokio::io::stdin()),
        tx,
    ));

    info!(
        interval_s = config.panel.poll_interval_seconds,
        filter = %config.panel.entity_filter,
        "Polling {} entities",
        config.panel.domain
    );
    runner.run(rx, config.panel.poll_interval()).await;

    info!("Humidity panel stopped");
    Ok(())
}
