use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use map_controller::{ControllerState, MapController, Pin};
use report_store::{load_settings, SheetsReportStore};
use serde::Serialize;
use shared::error::ApiError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Report map locations to the shared sheet")]
struct Cli {
    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    /// Upper bound for each network-driven step, in seconds.
    #[arg(long, global = true, default_value_t = 90)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every reported location.
    List,
    /// Report a location, asking for confirmation first.
    Report {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Exchange the service account credentials for a token.
    CheckAuth,
}

#[derive(Serialize)]
struct PinsOutput<'a> {
    pins: &'a [Pin],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let store = SheetsReportStore::new(load_settings()?)?;
    let timeout = Duration::from_secs(cli.timeout_secs.max(1));

    match cli.command {
        Command::CheckAuth => {
            let token = store.access_token().await?;
            match token.expires_at() {
                Some(expires_at) => println!("credentials ok; token valid until {expires_at}"),
                None => println!("credentials ok"),
            }
        }
        Command::List => {
            let controller = start_controller(store, timeout, cli.json).await?;
            print_pins(&controller.pins(), cli.json)?;
        }
        Command::Report { lat, lng, yes } => {
            let mut controller = start_controller(store, timeout, cli.json).await?;
            controller.click(lat, lng)?;
            if yes || confirm_prompt(lat, lng).await? {
                controller.confirm().await?;
                ensure_no_error(&controller, cli.json)?;
                if cli.json {
                    print_pins(&controller.pins(), true)?;
                } else {
                    println!("reported; {} pins on the map", controller.pins().len());
                }
            } else {
                controller.cancel()?;
                println!("cancelled");
            }
        }
    }

    Ok(())
}

async fn start_controller(
    store: SheetsReportStore,
    timeout: Duration,
    json: bool,
) -> Result<MapController<SheetsReportStore>> {
    let mut controller = MapController::new(store).with_operation_timeout(timeout);
    controller.load().await?;
    ensure_no_error(&controller, json)?;
    info!(pins = controller.reports().len(), "reports loaded");
    Ok(controller)
}

async fn confirm_prompt(lat: f64, lng: f64) -> Result<bool> {
    println!("Report at ({lat:.5}, {lng:.5})? [y/N]");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_pins(pins: &[Pin], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&PinsOutput { pins })?);
        return Ok(());
    }
    for pin in pins {
        println!("{}  {:>10.5}  {:>11.5}", pin.timestamp, pin.latitude, pin.longitude);
    }
    println!("{} pins", pins.len());
    Ok(())
}

fn ensure_no_error(controller: &MapController<SheetsReportStore>, json: bool) -> Result<()> {
    let ControllerState::Error(err) = controller.state() else {
        return Ok(());
    };
    if json {
        let api_error = ApiError {
            code: err.code(),
            message: err.message().to_string(),
        };
        println!("{}", serde_json::to_string(&api_error)?);
    }
    if err.requires_reauth() {
        bail!("{} (check the service account credentials)", err.message());
    }
    bail!("{}", err.message());
}
