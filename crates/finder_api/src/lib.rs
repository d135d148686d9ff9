//! HTTP access to the ChargeFinder backend and the reverse geocoding
//! service.

mod client;
mod error;
mod geocode;

pub use client::{BackendClient, BackendConfig, find_station};
pub use error::ApiError;
pub use geocode::AddressLookup;
