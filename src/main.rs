use std::process::ExitCode;
use std::time::Duration;

use antenna_control::geometry::generate_rotator_angle_table;
use antenna_control::{Config, Station};
use clap::{Parser, Subcommand};

const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "antenna-control")]
#[command(about = "Ground station antenna control core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate { config: String },
    /// Run the ICD link and tracking core until Ctrl-C
    Run { config: String },
    /// Print the mount-frame pointing for every rotator setting
    RotatorTable {
        #[arg(long)]
        az: f64,
        #[arg(long, allow_hyphen_values = true)]
        el: f64,
        #[arg(long, allow_hyphen_values = true)]
        tilt: f64,
        #[arg(long, default_value_t = 10.0)]
        step: f64,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Run { config } => run(&config),
        Commands::RotatorTable { az, el, tilt, step } => rotator_table(az, el, tilt, step),
    }
}

fn validate(path: &str) -> ExitCode {
    match Config::from_file(path) {
        Ok(config) => {
            println!("Configuration is valid");
            println!(
                "  station: {}",
                config.station.name.as_deref().unwrap_or("(unnamed)")
            );
            println!("  icd: {} -> {}", config.icd.bind, config.icd.controller);
            println!(
                "  mount: tilt {} deg, north offset {} deg, rotator {} deg",
                config.station.mount.tilt_angle_deg,
                config.station.mount.true_north_offset_deg,
                config.station.mount.rotator_angle_deg
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let station = Station::new(config);
        match station.start().await {
            Ok(addr) => log::info!(
                "Station {} listening on {}",
                station.name().unwrap_or("(unnamed)"),
                addr
            ),
            Err(e) => {
                log::error!("Failed to start ICD link: {}", e);
                return ExitCode::FAILURE;
            }
        }

        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Ctrl-C received, stopping");
                    break;
                }
                _ = ticker.tick() => match serde_json::to_string(&station.report()) {
                    Ok(json) => log::info!("status {}", json),
                    Err(e) => log::warn!("Status report not serialisable: {}", e),
                },
            }
        }

        station.shutdown().await;
        ExitCode::SUCCESS
    })
}

fn rotator_table(az: f64, el: f64, tilt: f64, step: f64) -> ExitCode {
    let table = generate_rotator_angle_table(az, el, tilt, step);
    if table.is_empty() {
        eprintln!("Step must be a positive number of degrees");
        return ExitCode::FAILURE;
    }
    println!("{:>10} {:>12} {:>12}", "rotator", "azimuth", "elevation");
    for entry in table {
        println!(
            "{:>10.3} {:>12.6} {:>12.6}",
            entry.rotator_deg, entry.azimuth_deg, entry.elevation_deg
        );
    }
    ExitCode::SUCCESS
}
