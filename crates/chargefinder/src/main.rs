mod app_state;
mod commands;
mod config;
mod file_store;

use std::path::PathBuf;

use anyhow::Context;
use app_state::AppState;
use clap::{Args, Parser, Subcommand};
use commands::StationQuery;
use config::ClientConfig;
use finder_core::{Availability, ConnectorType, UserCar};
use tracing_subscriber::EnvFilter;

/// Command line arguments for the chargefinder client
#[derive(Parser, Debug)]
#[command(name = "chargefinder")]
#[command(about = "Find EV charging stations and simulate charging sessions")]
struct Cli {
    /// Path to the client configuration JSON file
    #[arg(short, long, env = "CHARGEFINDER_CONFIG", default_value = "chargefinder.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stations matching the filters, nearest first
    Stations(StationsArgs),
    /// Buy a ticket and charge at a station
    Charge {
        station_id: String,
        /// Payment method: ewallet, card or bank-transfer
        #[arg(long, default_value = "ewallet")]
        method: String,
    },
    /// Address of a map position
    Address {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Manage saved vehicles
    #[command(subcommand)]
    Car(CarCommand),
    /// Store a login session
    Login {
        /// Token issued by the backend
        #[arg(long, env = "CHARGEFINDER_TOKEN")]
        token: String,
        /// User profile JSON returned with the token
        #[arg(long)]
        profile: PathBuf,
    },
    Logout,
    /// List users from an admin users payload
    Users { payload: PathBuf },
}

#[derive(Args, Debug)]
struct StationsArgs {
    /// Matches station name or address
    #[arg(short, long, default_value = "")]
    query: String,
    #[arg(long)]
    status: Option<Availability>,
    /// CCS2, Type2 or CHAdeMO; repeat for several
    #[arg(long)]
    connector: Vec<ConnectorType>,
    #[arg(long, default_value_t = 0.0)]
    min_kw: f64,
    #[arg(long, default_value_t = 0.0)]
    radius_km: f64,
    /// Only show stations that fit the active car
    #[arg(long)]
    use_car: bool,
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
    /// Keep polling the station you are charging at
    #[arg(short, long)]
    watch: bool,
}

#[derive(Subcommand, Debug)]
enum CarCommand {
    Add {
        id: String,
        name: String,
        #[arg(long, required = true)]
        connector: Vec<ConnectorType>,
        #[arg(long, default_value_t = 0.0)]
        min_kw: f64,
        /// Battery capacity in kWh
        #[arg(long)]
        battery: Option<f64>,
        /// Make it the active car
        #[arg(long)]
        active: bool,
    },
    List,
    Use { id: String },
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::load(&cli.config).await?;
    let mut state = AppState::open(config).context("Failed to open the user profile")?;

    match cli.command {
        Command::Stations(args) => {
            let query = StationQuery {
                query: args.query,
                status: args.status,
                connectors: args.connector,
                min_kw: args.min_kw,
                radius_km: args.radius_km,
                use_car: args.use_car,
                position: args.lat.zip(args.lng),
                watch: args.watch,
            };
            commands::stations(&state, query).await
        }
        Command::Charge { station_id, method } => {
            commands::charge(&state, &station_id, &method).await
        }
        Command::Address { lat, lng } => commands::address(&state, lat, lng).await,
        Command::Car(CarCommand::Add {
            id,
            name,
            connector,
            min_kw,
            battery,
            active,
        }) => {
            let car = UserCar {
                id,
                name,
                connector_types: connector,
                min_kw,
                battery_capacity: battery,
            };
            commands::add_car(&mut state, car, active)
        }
        Command::Car(CarCommand::List) => commands::list_cars(&state),
        Command::Car(CarCommand::Use { id }) => {
            state.profile_mut().set_active_car(&id)?;
            println!("Active car is now {id}");
            Ok(())
        }
        Command::Car(CarCommand::Remove { id }) => {
            state.profile_mut().remove_car(&id)?;
            println!("Removed car {id}");
            Ok(())
        }
        Command::Login { token, profile } => commands::login(&mut state, token, &profile).await,
        Command::Logout => commands::logout(&mut state),
        Command::Users { payload } => commands::admin_users(&state, &payload).await,
    }
}
