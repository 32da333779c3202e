//! DevPilot - Entry Point
//!
//! Without client flags the binary runs the deployment server. With
//! `--deploy=<config.json>` or `--project=<id> --action=<action>` it acts as a
//! client of a running server and renders the stream in the terminal.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use devpilot::app::options::AppOptions;
use devpilot::app::run::run;
use devpilot::client::{render, ClientAction, DeployClient};
use devpilot::deploy::config::DeploymentConfig;
use devpilot::errors::PilotError;
use devpilot::filesys::file::File;
use devpilot::logs::{init_logging, LogLevel, LogOptions};
use devpilot::protocol::consumer::DeployOutcome;
use devpilot::protocol::DeployStatus;
use devpilot::storage::layout::StorageLayout;
use devpilot::storage::settings::Settings;
use devpilot::utils::version_info;

use colored::Colorize;
use tracing::{error, info, warn};

const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let mut cli_args: HashMap<String, String> = HashMap::new();
    for arg in env::args().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to render version: {}", e),
        }
        return ExitCode::SUCCESS;
    }

    // Client mode
    if cli_args.contains_key("deploy") || cli_args.contains_key("action") {
        let log_options = LogOptions {
            log_level: LogLevel::Warn,
            ..Default::default()
        };
        let _guard = init_logging(log_options).ok().flatten();

        return match run_client(&cli_args).await {
            Ok(outcome) if outcome.status.is_none_or(|s| s == DeployStatus::Success) => {
                ExitCode::SUCCESS
            }
            Ok(_) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                ExitCode::FAILURE
            }
        };
    }

    // Run the server starting here

    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file
    let settings_file = layout.settings_file();
    let settings_missing = !settings_file.exists().await;
    let settings = match settings_file.read_json_or_default::<Settings>().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_to_file.then(|| layout.logs_dir()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };
    if settings_missing {
        warn!(
            "No settings file at {}, using defaults",
            settings_file.path().display()
        );
    }

    let options = AppOptions::from_settings(&settings, layout);
    info!("Running DevPilot with options: {:?}", options);

    match run(options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run DevPilot: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_client(cli_args: &HashMap<String, String>) -> Result<DeployOutcome, PilotError> {
    let server = cli_args
        .get("server")
        .map(String::as_str)
        .unwrap_or(DEFAULT_SERVER_URL);
    let user = cli_args
        .get("user")
        .ok_or_else(|| PilotError::ConfigError("--user=<id> is required".to_string()))?;
    let client = DeployClient::new(server, user)?;

    let outcome = if let Some(path) = cli_args.get("deploy") {
        let config: DeploymentConfig = File::new(path).read_json().await?;
        client.deploy(&config, render).await?
    } else {
        let project = cli_args
            .get("project")
            .ok_or_else(|| PilotError::ConfigError("--project=<id> is required".to_string()))?;
        let action = cli_args
            .get("action")
            .map(|action| action.parse::<ClientAction>())
            .transpose()
            .map_err(PilotError::ConfigError)?
            .ok_or_else(|| PilotError::ConfigError("--action=<action> is required".to_string()))?;
        client.action(action, project, render).await?
    };

    if let Some(url) = outcome.redirect() {
        println!("{} {}", "Deployment recorded, continue at".green(), url);
    }
    Ok(outcome)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    warn!("Unable to install signal handlers, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
