//! Client-side domain of ChargeFinder: station model, filtering and ranking,
//! the charging session simulator and the persisted user profile.

pub mod charging;
mod filter;
pub mod geo;
mod models;
pub mod payload;
mod session;
pub mod storage;

pub use crate::charging::{ChargeContext, ChargingSimulator, ChargingStatus, TickOutcome};
pub use crate::filter::{FilterSpec, apply_vehicle_overlay, filter_stations};
pub use crate::geo::{Bounds, bounds_from_stations, haversine_km};
pub use crate::models::*;
pub use crate::session::{AppSession, AuthAction, Role, UserProfile};

pub use enumset::EnumSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid coordinates ({lat}, {lng})")]
    InvalidCoordinates { lat: f64, lng: f64 },
    #[error("Unknown connector type {0:?}")]
    UnknownConnectorType(String),
    #[error("Unknown station status {0:?}")]
    UnknownAvailability(String),
    #[error("You need to log in first")]
    NotAuthenticated,
}
