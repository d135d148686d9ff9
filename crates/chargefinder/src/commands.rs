use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use finder_api::AddressLookup;
use finder_core::charging::{delivered_kwh, remaining_minutes};
use finder_core::payload::{parse_admin_user, parse_admin_users};
use finder_core::{
    Availability, AuthAction, ChargeContext, ChargingSimulator, ChargingStatus, ConnectorType,
    FilterSpec, LatLng, PaymentMethod, Station, StationWithDistance, UserCar,
};
use finder_engine::{
    ChargingPoller, ChargingRun, FixedLocation, PollEvent, SourceError, StationFinder,
    StationListView, StationSource, locate,
};

use crate::app_state::AppState;

/// Battery size assumed for the delivered energy estimate when the active car
/// has none recorded.
const DEFAULT_TICKET_KWH: f64 = 40.0;

pub const PAYMENT_METHODS: [(&str, &str); 3] = [
    ("ewallet", "E-wallet"),
    ("card", "Credit card"),
    ("bank-transfer", "Bank transfer"),
];

pub struct StationQuery {
    pub query: String,
    pub status: Option<Availability>,
    pub connectors: Vec<ConnectorType>,
    pub min_kw: f64,
    pub radius_km: f64,
    pub use_car: bool,
    pub position: Option<(f64, f64)>,
    /// Keep refreshing the station the user is charging at.
    pub watch: bool,
}

/// Resolve the user's position, falling back to the configured origin.
async fn resolve_origin(state: &AppState, position: Option<(f64, f64)>) -> Option<LatLng> {
    let (lat, lng) = position?;
    match locate(&FixedLocation(LatLng { lat, lng }), state.config.geolocation_timeout()).await {
        Ok(origin) => Some(origin),
        Err(err) => {
            tracing::warn!("Could not use the given position: {}", err);
            println!(
                "Location unavailable ({err}), using {}",
                state.config.fallback_origin
            );
            None
        }
    }
}

pub async fn stations(state: &AppState, query: StationQuery) -> anyhow::Result<()> {
    let client = Arc::new(state.backend()?);
    let finder = StationFinder::new(client, state.config.fallback_origin);
    finder.set_origin(resolve_origin(state, query.position).await);
    finder.set_filters(FilterSpec {
        query: query.query,
        status: query.status,
        connector_set: query.connectors.into_iter().collect(),
        min_kw: query.min_kw,
        radius_km: query.radius_km,
    });
    let car = state.profile().active_car()?;
    if query.use_car && car.is_none() {
        println!("No active car, showing all connectors");
    }
    finder.set_car(car.clone());
    finder.set_use_car(query.use_car);

    finder.reload().await;
    let view = finder.view();
    let StationListView::Stations(visible) = &view else {
        if let Some(message) = view.message() {
            println!("{message}");
        }
        return Ok(());
    };

    let bounds = finder.bounds();
    println!(
        "{} stations around {} (map centred on {}, {:.4} x {:.4} degrees)",
        visible.len(),
        finder.origin(),
        bounds.center(),
        bounds.lat_span,
        bounds.lng_span
    );
    for station in visible {
        println!("{}", station_row(station, car.as_ref()));
    }

    if query.watch {
        watch_charging_station(&finder, state.config.poll_interval()).await?;
    }
    Ok(())
}

/// Follow the station flagged `isChargingHere` until it is no longer flagged,
/// disappears, or the user presses Ctrl-C.
async fn watch_charging_station<S: StationSource>(
    finder: &StationFinder<S>,
    period: Duration,
) -> anyhow::Result<()> {
    let (Some(station_id), Some(mut poller)) = (
        finder.charging_station_id(),
        finder.poll_charging_station(period),
    ) else {
        println!("You are not charging anywhere");
        return Ok(());
    };
    println!("Watching {station_id}, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = poller.next() => match event {
                Some(PollEvent::Refreshed(refreshed)) => {
                    finder.apply_refresh(refreshed);
                    if let Some(station) = finder.station(&station_id) {
                        println!("{}", station_status_line(&station));
                    }
                }
                Some(PollEvent::Failed(err)) => println!("Could not refresh station: {err}"),
                Some(PollEvent::Stopped) | None => {
                    println!("Stopped watching {station_id}");
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Could not listen for Ctrl-C")?;
                break;
            }
        }
    }
    Ok(())
}

pub fn station_status_line(station: &Station) -> String {
    let charging = if station.is_charging_here {
        ", charging here"
    } else {
        ""
    };
    format!(
        "{} is {}, {} ports free{}",
        station.name,
        station.status,
        station.available_ports(),
        charging
    )
}

/// Minutes a full ticket takes at the station's fastest connector.
pub fn session_minutes(ticket_kwh: f64, station: &Station) -> Option<f64> {
    let power_kw = station
        .max_power_kw()
        .filter(|kw| kw.is_finite() && *kw > 0.0)?;
    Some(ticket_kwh / power_kw * 60.0)
}

/// One block of the station list.
pub fn station_row(station: &StationWithDistance, car: Option<&UserCar>) -> String {
    let mut row = format!(
        "{} {} [{}] {:.1} km\n    {}",
        if station.is_charging_here { "*" } else { "-" },
        station.name,
        station.status,
        station.distance_km,
        station.address
    );
    let connectors: Vec<String> = station
        .connectors
        .iter()
        .map(|c| {
            format!(
                "{} {} kW ({}/{} free)",
                c.connector_type, c.power_kw, c.available_ports, c.ports
            )
        })
        .collect();
    if !connectors.is_empty() {
        row.push_str(&format!("\n    {}", connectors.join(", ")));
    }
    row.push_str(&format!("\n    {}", station.pricing.label()));
    if let Some(car) = car {
        let fit = if car.is_compatible_with(station) {
            "fits"
        } else {
            "does not fit"
        };
        row.push_str(&format!("\n    {} {}", car.name, fit));
    }
    row
}

/// Why charging cannot start, in the order the detail page checks.
pub fn start_blocker(context: &ChargeContext) -> Option<&'static str> {
    if !context.authenticated {
        Some("You need to log in first")
    } else if context.station_status != Availability::Available {
        Some("This station is not available right now")
    } else if context.vehicle_compatible == Some(false) {
        Some("Your car is not compatible with this station")
    } else if !context.has_ticket {
        Some("Buy a ticket first")
    } else {
        None
    }
}

fn payment_method(id: &str) -> anyhow::Result<PaymentMethod> {
    let Some((id, label)) = PAYMENT_METHODS.iter().find(|(known, _)| *known == id) else {
        let known: Vec<&str> = PAYMENT_METHODS.iter().map(|(id, _)| *id).collect();
        bail!("Unknown payment method {id:?}, expected one of {}", known.join(", "));
    };
    Ok(PaymentMethod {
        id: id.to_string(),
        label: label.to_string(),
    })
}

async fn next_poll<E: SourceError>(
    poller: &mut Option<ChargingPoller<E>>,
) -> Option<PollEvent<E>> {
    match poller {
        Some(poller) => poller.next().await,
        None => std::future::pending().await,
    }
}

/// Buy a ticket and charge at `station_id` until done or stopped.
///
/// The first Ctrl-C asks for confirmation, the second one stops the session.
pub async fn charge(state: &AppState, station_id: &str, method: &str) -> anyhow::Result<()> {
    let method = payment_method(method)?;
    let client = Arc::new(state.backend()?);
    let station = client.fetch_station(station_id).await?;
    let car = state.profile().active_car()?;
    let compatible = car.as_ref().map(|car| car.is_compatible_with(&station));

    let mut run = ChargingRun::new(ChargingSimulator::new(state.session().is_authenticated()));
    let ticket = run.buy_ticket(&method, station.pricing.label())?;
    println!(
        "Ticket {} bought with {} ({})",
        ticket.id, ticket.method_label, ticket.price_label
    );

    let context = run.context(station.status, compatible);
    if !run.start(&context) {
        bail!(start_blocker(&context).unwrap_or("Charging could not start"));
    }
    println!("Charging at {}", station.name);

    let ticket_kwh = car
        .and_then(|car| car.battery_capacity)
        .unwrap_or(DEFAULT_TICKET_KWH);
    let total_minutes = session_minutes(ticket_kwh, &station);
    let mut snapshots = run.subscribe();
    let mut poller = station.is_charging_here.then(|| {
        ChargingPoller::spawn(
            Arc::clone(&client),
            station.id.clone(),
            state.config.poll_interval(),
        )
    });

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                match snapshot.status {
                    ChargingStatus::Charging => {
                        let left = total_minutes
                            .map(|total| {
                                format!("  {} min left", remaining_minutes(total, snapshot.progress))
                            })
                            .unwrap_or_default();
                        println!(
                            "{:>3}%  {:>3} kWh{}",
                            snapshot.progress,
                            delivered_kwh(ticket_kwh, snapshot.progress),
                            left
                        );
                    }
                    ChargingStatus::Done => {
                        println!(
                            "Charging complete, {} kWh delivered",
                            delivered_kwh(ticket_kwh, snapshot.progress)
                        );
                        if let Some(ticket) = run.ticket() {
                            println!("Ticket {} is still active", ticket.id);
                        }
                        run.dismiss_completion();
                        break;
                    }
                    ChargingStatus::Idle => break,
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Could not listen for Ctrl-C")?;
                if run.snapshot().confirming_stop {
                    run.confirm_stop();
                    println!("Charging stopped");
                    break;
                }
                run.request_stop();
                println!("Stop charging? Press Ctrl-C again to confirm");
            }
            event = next_poll(&mut poller) => match event {
                Some(PollEvent::Refreshed(refreshed)) => {
                    println!("{}", station_status_line(&refreshed));
                }
                Some(PollEvent::Failed(err)) => println!("Could not refresh station: {err}"),
                Some(PollEvent::Stopped) | None => poller = None,
            },
        }
    }
    Ok(())
}

pub async fn address(state: &AppState, lat: f64, lng: f64) -> anyhow::Result<()> {
    let point = LatLng::new(lat, lng)?;
    let lookup = AddressLookup::new(Arc::new(state.backend()?));
    if let Some(address) = lookup.lookup(point).await {
        println!("{}", address?);
    }
    Ok(())
}

pub fn add_car(state: &mut AppState, car: UserCar, activate: bool) -> anyhow::Result<()> {
    let id = car.id.clone();
    state.profile_mut().save_car(car)?;
    if activate || state.profile().active_car_id()?.is_none() {
        state.profile_mut().set_active_car(&id)?;
    }
    println!("Saved car {id}");
    Ok(())
}

pub fn list_cars(state: &AppState) -> anyhow::Result<()> {
    let cars = state.profile().cars()?;
    if cars.is_empty() {
        println!("No cars saved");
        return Ok(());
    }
    let active = state.profile().active_car_id()?;
    for car in cars {
        let marker = if active.as_deref() == Some(car.id.as_str()) {
            "*"
        } else {
            " "
        };
        let plugs: Vec<&str> = car.connector_types.iter().map(|c| c.as_str()).collect();
        println!(
            "{marker} {} {} ({}, min {} kW)",
            car.id,
            car.name,
            plugs.join("/"),
            car.min_kw
        );
    }
    Ok(())
}

/// Store a session for `token`, with the profile the backend returned for it.
pub async fn login(state: &mut AppState, token: String, profile: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(profile)
        .await
        .with_context(|| format!("Failed to read user profile '{}'", profile.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let user = parse_admin_user(&value)?.profile;
    println!("Logged in as {} <{}>", user.name, user.email);
    state.dispatch(AuthAction::LoggedIn { token, user })?;
    Ok(())
}

pub fn logout(state: &mut AppState) -> anyhow::Result<()> {
    state.dispatch(AuthAction::LoggedOut)?;
    println!("Logged out");
    Ok(())
}

pub async fn admin_users(state: &AppState, payload: &Path) -> anyhow::Result<()> {
    if !state.session().is_admin() {
        bail!("Admin access required");
    }
    let raw = tokio::fs::read_to_string(payload)
        .await
        .with_context(|| format!("Failed to read users '{}'", payload.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    for user in parse_admin_users(&value)? {
        let created = user
            .created_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{} {} <{}> {:?} {}",
            user.profile.id, user.profile.name, user.profile.email, user.profile.role, created
        );
    }
    Ok(())
}
