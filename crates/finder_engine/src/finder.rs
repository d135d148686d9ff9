use std::sync::{Arc, Mutex};
use std::time::Duration;

use finder_core::{
    Bounds, FilterSpec, LatLng, Station, StationWithDistance, UserCar, apply_vehicle_overlay,
    bounds_from_stations, filter_stations,
};

use crate::{ChargingPoller, LatestOnly, Liveness, StationSource, ViewScope, lock};

/// What the station list shows.
#[derive(Debug, Clone, PartialEq)]
pub enum StationListView {
    Loading,
    Failed(String),
    /// Stations are loaded but none passes the filters.
    Empty,
    Stations(Vec<StationWithDistance>),
}

impl StationListView {
    /// Status line for the non-list states.
    pub fn message(&self) -> Option<String> {
        match self {
            StationListView::Loading => Some("Loading stations…".to_string()),
            StationListView::Failed(error) => Some(format!("Could not load stations: {error}")),
            StationListView::Empty => Some("No stations match your filters".to_string()),
            StationListView::Stations(_) => None,
        }
    }
}

#[derive(Debug, Default)]
enum LoadState {
    #[default]
    Loading,
    Loaded(Vec<Station>),
    Failed(String),
}

#[derive(Debug, Default)]
struct FinderState {
    load: LoadState,
    filters: FilterSpec,
    use_car: bool,
    car: Option<UserCar>,
    origin: Option<LatLng>,
}

/// State of the main map/list page.
///
/// Owns the station list and the user's filter inputs; the visible list is
/// derived from them on every [`view`](Self::view).
pub struct StationFinder<S> {
    source: Arc<S>,
    fallback_origin: LatLng,
    loads: LatestOnly,
    scope: ViewScope,
    state: Mutex<FinderState>,
}

impl<S: StationSource> StationFinder<S> {
    pub fn new(source: Arc<S>, fallback_origin: LatLng) -> Self {
        StationFinder {
            source,
            fallback_origin,
            loads: LatestOnly::new(),
            scope: ViewScope::new(),
            state: Mutex::new(FinderState::default()),
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.scope.liveness()
    }

    /// Tear the page down: pending loads are cancelled and never applied.
    pub fn close(&self) {
        self.scope.close();
        self.loads.cancel();
    }

    /// Fetch the station list. A reload started while another is pending
    /// supersedes it. Returns whether this call's result was applied.
    pub async fn reload(&self) -> bool {
        let liveness = self.liveness();
        let source = Arc::clone(&self.source);
        let Some(result) = self
            .loads
            .run(async move { source.fetch_stations().await })
            .await
        else {
            return false;
        };
        if !liveness.is_alive() {
            tracing::debug!("Station list loaded after the page closed");
            return false;
        }

        let mut state = lock(&self.state);
        state.load = match result {
            Ok(stations) => {
                tracing::info!("Loaded {} stations", stations.len());
                LoadState::Loaded(stations)
            }
            Err(err) => {
                tracing::warn!("Could not load stations: {}", err);
                LoadState::Failed(err.to_string())
            }
        };
        true
    }

    /// Replace one station of the list with a fresher copy.
    pub fn apply_refresh(&self, station: Station) {
        if !self.scope.liveness().is_alive() {
            return;
        }
        if let LoadState::Loaded(stations) = &mut lock(&self.state).load {
            match stations.iter_mut().find(|stored| stored.id == station.id) {
                Some(stored) => *stored = station,
                None => stations.push(station),
            }
        }
    }

    pub fn filters(&self) -> FilterSpec {
        lock(&self.state).filters.clone()
    }

    pub fn set_filters(&self, filters: FilterSpec) {
        lock(&self.state).filters = filters;
    }

    pub fn update_filters(&self, f: impl FnOnce(&mut FilterSpec)) {
        f(&mut lock(&self.state).filters);
    }

    pub fn set_car(&self, car: Option<UserCar>) {
        lock(&self.state).car = car;
    }

    pub fn set_use_car(&self, use_car: bool) {
        lock(&self.state).use_car = use_car;
    }

    /// Set the user's position; `None` falls back to the default origin.
    pub fn set_origin(&self, origin: Option<LatLng>) {
        lock(&self.state).origin = origin;
    }

    pub fn origin(&self) -> LatLng {
        lock(&self.state).origin.unwrap_or(self.fallback_origin)
    }

    /// Filters after the vehicle overlay.
    pub fn effective_filters(&self) -> FilterSpec {
        let state = lock(&self.state);
        apply_vehicle_overlay(&state.filters, state.car.as_ref(), state.use_car)
    }

    pub fn view(&self) -> StationListView {
        let filters = self.effective_filters();
        let origin = self.origin();
        match &lock(&self.state).load {
            LoadState::Loading => StationListView::Loading,
            LoadState::Failed(error) => StationListView::Failed(error.clone()),
            LoadState::Loaded(stations) => {
                let visible = filter_stations(stations, &filters, origin);
                if visible.is_empty() {
                    StationListView::Empty
                } else {
                    StationListView::Stations(visible)
                }
            }
        }
    }

    /// Map area of the visible stations.
    pub fn bounds(&self) -> Bounds {
        match self.view() {
            StationListView::Stations(visible) => {
                bounds_from_stations(visible.iter().map(|s| &s.station))
            }
            _ => bounds_from_stations(std::iter::empty::<&Station>()),
        }
    }

    /// Id of the loaded station the user is charging at, if any.
    pub fn charging_station_id(&self) -> Option<String> {
        match &lock(&self.state).load {
            LoadState::Loaded(stations) => stations
                .iter()
                .find(|s| s.is_charging_here)
                .map(|s| s.id.clone()),
            _ => None,
        }
    }

    /// Start refreshing the station the user is charging at, if one is
    /// flagged. Feed the refreshed copies back through
    /// [`apply_refresh`](Self::apply_refresh).
    pub fn poll_charging_station(&self, period: Duration) -> Option<ChargingPoller<S::Error>> {
        let station_id = self.charging_station_id()?;
        tracing::info!("Polling station {} every {:?}", station_id, period);
        Some(ChargingPoller::spawn(
            Arc::clone(&self.source),
            station_id,
            period,
        ))
    }

    /// Look a station up in the loaded list.
    pub fn station(&self, id: &str) -> Option<Station> {
        match &lock(&self.state).load {
            LoadState::Loaded(stations) => stations.iter().find(|s| s.id == id).cloned(),
            _ => None,
        }
    }
}

impl<S> Drop for StationFinder<S> {
    fn drop(&mut self) {
        self.loads.cancel();
    }
}
