use enumset::EnumSet;

use crate::geo::haversine_km;
use crate::{Availability, ConnectorType, LatLng, Station, StationWithDistance, UserCar};

/// Search and filter state of the station list.
///
/// Every field has a "no constraint" value: an empty query or connector set,
/// no status, and `0` for the numeric bounds. Non-finite or negative numbers
/// are also read as "no constraint" so half-typed form input never fails.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSpec {
    pub query: String,
    pub status: Option<Availability>,
    pub connector_set: EnumSet<ConnectorType>,
    pub min_kw: f64,
    pub radius_km: f64,
}

/// `Some(value)` if the bound is active.
fn active_bound(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

impl FilterSpec {
    /// `query` is the already lowercased search text. It is not trimmed.
    fn matches_query(query: &str, station: &Station) -> bool {
        query.is_empty()
            || station.name.to_lowercase().contains(query)
            || station.address.to_lowercase().contains(query)
    }

    fn matches_status(&self, station: &Station) -> bool {
        self.status.is_none_or(|status| station.status == status)
    }

    fn matches_connectors(&self, station: &Station) -> bool {
        self.connector_set.is_empty()
            || station
                .connectors
                .iter()
                .any(|c| self.connector_set.contains(c.connector_type))
    }

    fn matches_power(&self, station: &Station) -> bool {
        active_bound(self.min_kw)
            .is_none_or(|min_kw| station.connectors.iter().any(|c| c.power_kw >= min_kw))
    }

    fn matches_radius(&self, distance_km: f64) -> bool {
        active_bound(self.radius_km).is_none_or(|radius_km| distance_km <= radius_km)
    }

    /// All active filters, AND-combined.
    pub fn matches(&self, station: &StationWithDistance) -> bool {
        self.matches_lowered(&self.query.to_lowercase(), station)
    }

    fn matches_lowered(&self, query: &str, station: &StationWithDistance) -> bool {
        Self::matches_query(query, station)
            && self.matches_status(station)
            && self.matches_connectors(station)
            && self.matches_power(station)
            && self.matches_radius(station.distance_km)
    }
}

/// Annotate, filter and rank stations around `origin`.
///
/// The station the user is currently charging at comes first, everything else
/// is ordered by ascending distance. Stations with non-finite coordinates are
/// placed at an infinite distance.
pub fn filter_stations(
    stations: &[Station],
    filters: &FilterSpec,
    origin: LatLng,
) -> Vec<StationWithDistance> {
    let query = filters.query.to_lowercase();
    // Distances are computed for every station first: the radius filter
    // depends on them.
    let mut out: Vec<StationWithDistance> = stations
        .iter()
        .map(|station| {
            let distance_km = haversine_km(origin, station.position());
            StationWithDistance {
                distance_km: if distance_km.is_finite() {
                    distance_km
                } else {
                    f64::INFINITY
                },
                station: station.clone(),
            }
        })
        .filter(|station| filters.matches_lowered(&query, station))
        .collect();

    out.sort_by(|a, b| {
        b.is_charging_here
            .cmp(&a.is_charging_here)
            .then(a.distance_km.total_cmp(&b.distance_km))
    });

    tracing::debug!(
        "{} of {} stations match around {}",
        out.len(),
        stations.len(),
        origin
    );
    out
}

/// Derive the effective filters when "use my car to filter" is on.
///
/// The car's connector types replace the manual selection and the power bound
/// becomes the larger of the manual and the car's minimum. A car without
/// connector types leaves the filters untouched.
pub fn apply_vehicle_overlay(filters: &FilterSpec, car: Option<&UserCar>, enabled: bool) -> FilterSpec {
    let Some(car) = car.filter(|car| enabled && !car.connector_types.is_empty()) else {
        return filters.clone();
    };

    let manual_min_kw = active_bound(filters.min_kw).unwrap_or(0.0);
    let car_min_kw = active_bound(car.min_kw).unwrap_or(0.0);

    FilterSpec {
        connector_set: car.connector_types.iter().copied().collect(),
        min_kw: manual_min_kw.max(car_min_kw),
        ..filters.clone()
    }
}
