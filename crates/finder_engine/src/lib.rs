//! Asynchronous runtime around `finder_core`: timers, request ordering,
//! polling and the station list page model.

mod charging;
mod finder;
mod location;
mod poller;
mod sequence;

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub use charging::{ChargingRun, ChargingSnapshot};
pub use finder::{StationFinder, StationListView};
pub use location::{FixedLocation, GEOLOCATION_TIMEOUT, Geolocator, locate};
pub use poller::{ChargingPoller, POLL_INTERVAL, PollEvent};
pub use sequence::{LatestOnly, Liveness, RequestSequencer, RequestTicket, ViewScope};

use finder_core::{CoreError, Station};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Location request timed out after {} seconds", .0.as_secs())]
    GeolocationTimeout(Duration),
    #[error("Location unavailable: {0}")]
    GeolocationUnavailable(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Failure of a [`StationSource`]. `Display` is the user-facing message.
pub trait SourceError: std::error::Error + Send + Sync + 'static {
    /// The requested station does not exist (any more).
    fn is_not_found(&self) -> bool;
}

/// Where station data comes from, usually the backend.
pub trait StationSource: Send + Sync + 'static {
    type Error: SourceError;

    fn fetch_stations(&self) -> impl Future<Output = Result<Vec<Station>, Self::Error>> + Send;

    fn fetch_station(&self, id: &str) -> impl Future<Output = Result<Station, Self::Error>> + Send;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
