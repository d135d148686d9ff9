use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use finder_core::LatLng;
use finder_core::geo::DEFAULT_CENTER;
use serde::{Deserialize, Serialize};

/// Client configuration, read from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the station API. Only required once a command talks to it.
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub geocode_url: Option<String>,
    /// Origin used when the user's position is unknown
    #[serde(default = "default_origin")]
    pub fallback_origin: LatLng,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_geolocation_timeout_secs")]
    pub geolocation_timeout_secs: u64,
    /// Where vehicles and the login session are persisted
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,
}

fn default_origin() -> LatLng {
    DEFAULT_CENTER
}

fn default_poll_interval_secs() -> u64 {
    finder_engine::POLL_INTERVAL.as_secs()
}

fn default_geolocation_timeout_secs() -> u64 {
    finder_engine::GEOLOCATION_TIMEOUT.as_secs()
}

fn default_profile_path() -> PathBuf {
    PathBuf::from(".chargefinder/profile.json")
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            backend_url: None,
            geocode_url: None,
            fallback_origin: default_origin(),
            poll_interval_secs: default_poll_interval_secs(),
            geolocation_timeout_secs: default_geolocation_timeout_secs(),
            profile_path: default_profile_path(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a config document.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = serde_json::from_str(raw)?;
        let origin = config.fallback_origin;
        LatLng::new(origin.lat, origin.lng).context("Invalid fallbackOrigin")?;
        anyhow::ensure!(
            config.poll_interval_secs > 0,
            "pollIntervalSecs must be greater than zero"
        );
        Ok(config)
    }

    /// Load the config file at `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}, using defaults", path.display());
                return Ok(ClientConfig::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read config file '{}'", path.display()));
            }
        };
        let config = ClientConfig::from_json(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        tracing::info!(
            "Loaded config from {}: backend {}",
            path.display(),
            config.backend_url.as_deref().unwrap_or("<not configured>")
        );
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_deserialization() {
        let json = r#"
        {
          "backendUrl": "https://api.chargefinder.example/api",
          "geocodeUrl": "https://nominatim.example",
          "fallbackOrigin": {"lat": -6.9175, "lng": 107.6191},
          "pollIntervalSecs": 30,
          "profilePath": "/tmp/profile.json"
        }
        "#;

        let config = ClientConfig::from_json(json).unwrap();
        assert_eq!(
            config.backend_url.as_deref(),
            Some("https://api.chargefinder.example/api")
        );
        assert_eq!(config.fallback_origin.lat, -6.9175);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.geolocation_timeout(), Duration::from_secs(10));
        assert_eq!(config.profile_path, PathBuf::from("/tmp/profile.json"));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ClientConfig::from_json("{}").unwrap();
        assert!(config.backend_url.is_none());
        assert_eq!(config.fallback_origin, DEFAULT_CENTER);
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let error = ClientConfig::from_json(r#"{"fallbackOrigin": {"lat": 95.0, "lng": 0.0}}"#)
            .unwrap_err();
        assert_eq!(error.to_string(), "Invalid fallbackOrigin");
        assert!(ClientConfig::from_json(r#"{"pollIntervalSecs": 0}"#).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("chargefinder-missing-config.json");
        let config = ClientConfig::load(&path).await.unwrap();
        assert_eq!(config.poll_interval_secs, 60);
    }
}
