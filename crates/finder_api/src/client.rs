use std::time::Duration;

use finder_core::{LatLng, Station};
use finder_engine::StationSource;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::ApiError;

/// Where the backend lives.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base of the station API, e.g. `https://api.example.com/api`.
    pub base_url: Option<String>,
    /// Base of the reverse geocoding service.
    pub geocode_url: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_url: None,
            geocode_url: None,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Deserialize)]
struct StationList {
    #[serde(default)]
    stations: Vec<serde_json::Value>,
}

impl StationList {
    /// Decode entry by entry so one malformed station does not hide the rest.
    fn into_stations(self) -> Vec<Station> {
        self.stations
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match Station::deserialize(&entry) {
                Ok(station) => Some(station),
                Err(err) => {
                    tracing::warn!("Skipping station #{}: {}", index, err);
                    None
                }
            })
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StationPayload {
    Wrapped { station: Station },
    Bare(Station),
}

impl From<StationPayload> for Station {
    fn from(payload: StationPayload) -> Self {
        match payload {
            StationPayload::Wrapped { station } | StationPayload::Bare(station) => station,
        }
    }
}

#[derive(Deserialize)]
struct ReverseGeocode {
    display_name: Option<String>,
}

/// HTTP client for the ChargeFinder backend.
///
/// A missing base URL is only reported when a request needs it.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Option<String>,
    geocode_url: Option<String>,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chargefinder/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        let trim = |url: String| url.trim_end_matches('/').to_string();
        Ok(BackendClient {
            http,
            base_url: config.base_url.map(trim),
            geocode_url: config.geocode_url.map(trim),
            token: None,
        })
    }

    /// Authenticate subsequent requests with `token`.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(base: Option<&str>, what: &'static str, path: &str) -> Result<Url, ApiError> {
        let base = base.ok_or(ApiError::NotConfigured(what))?;
        let raw = format!("{base}/{path}");
        Url::parse(&raw).map_err(|_| ApiError::InvalidUrl { what, url: raw })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        resource: impl FnOnce() -> String,
    ) -> Result<T, ApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(ApiError::NotFound(resource())),
            StatusCode::UNAUTHORIZED => return Err(ApiError::Unauthorized),
            status => return Err(ApiError::Status(status)),
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn fetch_stations(&self) -> Result<Vec<Station>, ApiError> {
        let url = Self::url(self.base_url.as_deref(), "backend", "stations")?;
        tracing::debug!("Fetching stations from {}", url);
        let list: StationList = self
            .get_json(self.http.get(url), || "Station list".to_string())
            .await?;
        Ok(list.into_stations())
    }

    pub async fn fetch_station(&self, id: &str) -> Result<Station, ApiError> {
        let mut url = Self::url(self.base_url.as_deref(), "backend", "stations")?;
        let pushed = url
            .path_segments_mut()
            .map(|mut segments| {
                segments.push(id);
            })
            .is_ok();
        if !pushed {
            return Err(ApiError::InvalidUrl {
                what: "backend",
                url: url.to_string(),
            });
        }
        tracing::debug!("Fetching station from {}", url);
        let payload: StationPayload = self
            .get_json(self.http.get(url), || format!("Station {id}"))
            .await?;
        Ok(payload.into())
    }

    /// Address of `point`. Falls back to the formatted coordinates when the
    /// service knows no address.
    pub async fn reverse_geocode(&self, point: LatLng) -> Result<String, ApiError> {
        let url = Self::url(self.geocode_url.as_deref(), "geocoding", "reverse")?;
        let request = self.http.get(url).query(&[
            ("format", "json".to_string()),
            ("lat", point.lat.to_string()),
            ("lon", point.lng.to_string()),
        ]);
        let result: ReverseGeocode = self
            .get_json(request, || format!("Address for {point}"))
            .await?;
        Ok(result.display_name.unwrap_or_else(|| point.to_string()))
    }
}

impl StationSource for BackendClient {
    type Error = ApiError;

    async fn fetch_stations(&self) -> Result<Vec<Station>, ApiError> {
        BackendClient::fetch_stations(self).await
    }

    async fn fetch_station(&self, id: &str) -> Result<Station, ApiError> {
        BackendClient::fetch_station(self, id).await
    }
}

/// Find `id` in an already fetched list.
pub fn find_station<'a>(stations: &'a [Station], id: &str) -> Result<&'a Station, ApiError> {
    stations
        .iter()
        .find(|station| station.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("Station {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{client_for, serve};

    #[tokio::test]
    async fn test_missing_base_url_is_a_configuration_error() {
        let client = BackendClient::new(BackendConfig::default()).unwrap();
        let error = client.fetch_stations().await.unwrap_err();
        assert!(matches!(error, ApiError::NotConfigured("backend")));
        assert_eq!(error.to_string(), "The backend URL is not configured");
    }

    #[tokio::test]
    async fn test_fetch_stations() {
        let base = serve().await;
        let stations = client_for(&base).fetch_stations().await.unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].id, "st-1");
    }

    #[tokio::test]
    async fn test_partial_stations_do_not_hide_valid_ones() {
        let base = serve().await;
        let client = BackendClient::new(BackendConfig {
            base_url: Some(format!("{base}/partial")),
            ..Default::default()
        })
        .unwrap();
        let stations = client.fetch_stations().await.unwrap();
        let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["st-1", "st-3"]);
        assert_eq!(stations[1].status, finder_core::Availability::Offline);
        assert_eq!(stations[1].pricing.per_kwh, 2466.0);
    }

    #[tokio::test]
    async fn test_fetch_station_wrapped_and_bare() {
        let base = serve().await;
        let client = client_for(&base);
        assert_eq!(client.fetch_station("st-1").await.unwrap().name, "Grand Indonesia");
        assert_eq!(client.fetch_station("st-2").await.unwrap().name, "Kota Kasablanka");
    }

    #[tokio::test]
    async fn test_unknown_station_is_not_found() {
        let base = serve().await;
        let error = client_for(&base).fetch_station("nope").await.unwrap_err();
        assert!(finder_engine::SourceError::is_not_found(&error));
        assert_eq!(error.to_string(), "Station nope not found");
    }

    #[tokio::test]
    async fn test_server_error_and_bad_payload() {
        let base = serve().await;
        let client = BackendClient::new(BackendConfig {
            base_url: Some(format!("{base}/broken")),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            client.fetch_stations().await,
            Err(ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        ));
        assert!(matches!(
            client.fetch_station("st-1").await,
            Err(ApiError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_token_is_sent() {
        let base = serve().await;
        let client = BackendClient::new(BackendConfig {
            base_url: Some(format!("{base}/private")),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            client.fetch_stations().await,
            Err(ApiError::Unauthorized)
        ));
        let client = client.with_token(Some("secret".into()));
        assert_eq!(client.fetch_stations().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reverse_geocode() {
        let base = serve().await;
        let client = client_for(&base);
        let address = client
            .reverse_geocode(LatLng::new(-6.2, 106.82).unwrap())
            .await
            .unwrap();
        assert_eq!(address, "Jl. M.H. Thamrin, Jakarta");

        let address = client
            .reverse_geocode(LatLng::new(0.0, 0.0).unwrap())
            .await
            .unwrap();
        assert_eq!(address, "0.00000, 0.00000");
    }

    #[test]
    fn test_find_station() {
        let stations: Vec<Station> =
            serde_json::from_value(crate::tests::stations_json()["stations"].clone()).unwrap();
        assert!(find_station(&stations, "st-2").is_ok());
        assert!(matches!(find_station(&stations, "x"), Err(ApiError::NotFound(_))));
    }
}
