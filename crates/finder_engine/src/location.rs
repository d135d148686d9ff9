use std::future::Future;
use std::time::Duration;

use finder_core::LatLng;

use crate::EngineError;

/// How long to wait for a position before giving up.
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the user's current position.
pub trait Geolocator: Send + Sync {
    fn current_position(&self) -> impl Future<Output = Result<LatLng, EngineError>> + Send;
}

/// A position configured up front, for clients without a positioning device.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub LatLng);

impl Geolocator for FixedLocation {
    async fn current_position(&self) -> Result<LatLng, EngineError> {
        Ok(LatLng::new(self.0.lat, self.0.lng)?)
    }
}

/// Ask `geolocator` for a validated position within `timeout`.
pub async fn locate<G: Geolocator>(geolocator: &G, timeout: Duration) -> Result<LatLng, EngineError> {
    let position = tokio::time::timeout(timeout, geolocator.current_position())
        .await
        .map_err(|_| EngineError::GeolocationTimeout(timeout))??;
    Ok(LatLng::new(position.lat, position.lng)?)
}
