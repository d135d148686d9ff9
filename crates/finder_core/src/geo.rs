use crate::{LatLng, Station};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Map center used when the stations do not describe a usable area (Jakarta).
pub const DEFAULT_CENTER: LatLng = LatLng {
    lat: -6.2088,
    lng: 106.8456,
};

/// Span in degrees of the fallback map area around [`DEFAULT_CENTER`].
pub const DEFAULT_SPAN: f64 = 0.05;

/// Smallest span a [`Bounds`] may have, in degrees.
pub const MIN_SPAN: f64 = 0.00001;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().clamp(0.0, 1.0).asin()
}

/// Bounding box of a set of stations, used to lay out map markers.
///
/// Spans are never below [`MIN_SPAN`], so dividing by them is always safe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
    pub lat_span: f64,
    pub lng_span: f64,
}

impl Bounds {
    fn around(center: LatLng, span: f64) -> Self {
        let half = span / 2.0;
        Bounds {
            min_lat: center.lat - half,
            max_lat: center.lat + half,
            min_lng: center.lng - half,
            max_lng: center.lng + half,
            lat_span: span,
            lng_span: span,
        }
    }

    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lng: (self.min_lng + self.max_lng) / 2.0,
        }
    }

    /// Position of `point` inside the box as `(x, y)` fractions, with `y`
    /// growing southwards like screen coordinates. Points outside the box are
    /// clamped to its edge.
    pub fn normalize(&self, point: LatLng) -> (f64, f64) {
        let x = (point.lng - self.min_lng) / self.lng_span;
        let y = (self.max_lat - point.lat) / self.lat_span;
        (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0))
    }
}

/// Compute the map area covering every station with finite coordinates.
///
/// Zero or one usable station, or stations all sharing the same coordinates,
/// fall back to a fixed area around [`DEFAULT_CENTER`].
pub fn bounds_from_stations<'a, I>(stations: I) -> Bounds
where
    I: IntoIterator<Item = &'a Station>,
{
    let mut positions = stations
        .into_iter()
        .map(Station::position)
        .filter(|p| p.lat.is_finite() && p.lng.is_finite());

    let Some(first) = positions.next() else {
        return Bounds::around(DEFAULT_CENTER, DEFAULT_SPAN);
    };

    let (mut min_lat, mut max_lat, mut min_lng, mut max_lng) =
        (first.lat, first.lat, first.lng, first.lng);
    for p in positions {
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
        min_lng = min_lng.min(p.lng);
        max_lng = max_lng.max(p.lng);
    }

    if min_lat == max_lat && min_lng == max_lng {
        return Bounds::around(DEFAULT_CENTER, DEFAULT_SPAN);
    }

    Bounds {
        min_lat,
        max_lat,
        min_lng,
        max_lng,
        lat_span: (max_lat - min_lat).max(MIN_SPAN),
        lng_span: (max_lng - min_lng).max(MIN_SPAN),
    }
}
