use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Physical plug standard of a connector.
#[derive(Debug, Hash, PartialOrd, Ord, Serialize, Deserialize, enumset::EnumSetType)]
pub enum ConnectorType {
    #[serde(rename = "CCS2")]
    Ccs2,
    #[serde(rename = "Type2")]
    Type2,
    #[serde(rename = "CHAdeMO")]
    Chademo,
}

impl ConnectorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorType::Ccs2 => "CCS2",
            ConnectorType::Type2 => "Type2",
            ConnectorType::Chademo => "CHAdeMO",
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ccs2" => Ok(ConnectorType::Ccs2),
            "type2" => Ok(ConnectorType::Type2),
            "chademo" => Ok(ConnectorType::Chademo),
            _ => Err(CoreError::UnknownConnectorType(s.to_string())),
        }
    }
}

/// Station status as reported by the backend. A station without one is
/// treated as offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Available,
    Busy,
    #[default]
    Offline,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Availability::Available => "AVAILABLE",
            Availability::Busy => "BUSY",
            Availability::Offline => "OFFLINE",
        })
    }
}

impl FromStr for Availability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AVAILABLE" => Ok(Availability::Available),
            "BUSY" => Ok(Availability::Busy),
            "OFFLINE" => Ok(Availability::Offline),
            _ => Err(CoreError::UnknownAvailability(s.to_string())),
        }
    }
}

/// A single plug group of a station.
///
/// `available_ports` is expected to stay within `0..=ports`; the backend owns
/// that invariant and nothing here corrects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    #[serde(rename = "type")]
    pub connector_type: ConnectorType,
    #[serde(rename = "powerKW")]
    pub power_kw: f64,
    pub ports: u32,
    pub available_ports: u32,
}

/// Missing fields fall back to their defaults, like an absent `pricing`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pricing {
    pub currency: String,
    pub per_kwh: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_minute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parking_fee: Option<String>,
}

impl Pricing {
    /// Short price label shown on tickets, e.g. `IDR 2500/kWh + IDR 500/min`.
    pub fn label(&self) -> String {
        let mut label = format!("{}/kWh", self.amount(self.per_kwh));
        if let Some(per_minute) = self.per_minute {
            label.push_str(&format!(" + {}/min", self.amount(per_minute)));
        }
        label
    }

    fn amount(&self, value: f64) -> String {
        if self.currency.is_empty() {
            value.to_string()
        } else {
            format!("{} {}", self.currency, value)
        }
    }
}

/// A charging station as supplied by the backend. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    #[serde(default)]
    pub status: Availability,
    #[serde(rename = "lastUpdatedISO", default)]
    pub last_updated_iso: String,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub is_charging_here: bool,
}

impl Station {
    pub fn position(&self) -> LatLng {
        LatLng {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Parsed `lastUpdatedISO`, if the backend sent a valid timestamp.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.last_updated_iso)
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc))
    }

    pub fn available_ports(&self) -> u32 {
        self.connectors.iter().map(|c| c.available_ports).sum()
    }

    pub fn max_power_kw(&self) -> Option<f64> {
        self.connectors
            .iter()
            .map(|c| c.power_kw)
            .max_by(f64::total_cmp)
    }
}

/// A station annotated with its distance to the reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationWithDistance {
    #[serde(flatten)]
    pub station: Station,
    pub distance_km: f64,
}

impl Deref for StationWithDistance {
    type Target = Station;

    fn deref(&self) -> &Station {
        &self.station
    }
}

/// WGS84 coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Validating constructor used for anything coming from outside
    /// (geolocation, user input).
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoreError> {
        if !lat.is_finite() || !lng.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
            return Err(CoreError::InvalidCoordinates { lat, lng });
        }
        Ok(LatLng { lat, lng })
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

/// The user's vehicle profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCar {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub connector_types: Vec<ConnectorType>,
    #[serde(rename = "minKW", default)]
    pub min_kw: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_capacity: Option<f64>,
}

impl UserCar {
    /// True when one connector of the station accepts this car's plug at the
    /// car's minimum power.
    pub fn is_compatible_with(&self, station: &Station) -> bool {
        let min_kw = if self.min_kw.is_finite() && self.min_kw > 0.0 {
            self.min_kw
        } else {
            0.0
        };
        station.connectors.iter().any(|connector| {
            self.connector_types.contains(&connector.connector_type)
                && connector.power_kw >= min_kw
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: String,
    pub label: String,
}

/// Simulated proof of payment for one charging session. Never sent to the
/// backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: uuid::Uuid,
    pub method_id: String,
    pub method_label: String,
    pub price_label: String,
    pub purchased_at: DateTime<Utc>,
}

impl Ticket {
    pub(crate) fn new(method: &PaymentMethod, price_label: String) -> Self {
        Ticket {
            id: uuid::Uuid::new_v4(),
            method_id: method.id.clone(),
            method_label: method.label.clone(),
            price_label,
            purchased_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_json_deserialization() {
        let json = r#"
        {
          "id": "st-1",
          "name": "Grand Indonesia",
          "address": "Jl. M.H. Thamrin No.1",
          "lat": -6.195,
          "lng": 106.822,
          "connectors": [
            {"type": "CCS2", "powerKW": 100, "ports": 2, "availablePorts": 1},
            {"type": "CHAdeMO", "powerKW": 50, "ports": 1, "availablePorts": 0}
          ],
          "status": "BUSY",
          "lastUpdatedISO": "2024-05-01T10:00:00+07:00",
          "pricing": {"currency": "IDR", "perKwh": 2466, "perMinute": 500},
          "amenities": ["Cafe", "Toilet"]
        }
        "#;

        let station: Station = serde_json::from_str(json).unwrap();
        assert_eq!(station.status, Availability::Busy);
        assert_eq!(station.connectors.len(), 2);
        assert_eq!(station.connectors[1].connector_type, ConnectorType::Chademo);
        assert_eq!(station.available_ports(), 1);
        assert_eq!(station.max_power_kw(), Some(100.0));
        assert!(!station.is_charging_here);
        assert_eq!(
            station.last_updated().map(|t| t.to_rfc3339()),
            Some("2024-05-01T03:00:00+00:00".to_string())
        );
        assert_eq!(station.pricing.label(), "IDR 2466/kWh + IDR 500/min");
    }

    #[test]
    fn test_station_defaults_for_missing_collections() {
        let json = r#"{"id": "x", "name": "Bare", "lat": 0, "lng": 0, "status": "OFFLINE"}"#;
        let station: Station = serde_json::from_str(json).unwrap();
        assert!(station.connectors.is_empty());
        assert!(station.amenities.is_empty());
        assert!(station.last_updated().is_none());
        assert_eq!(station.max_power_kw(), None);
    }

    #[test]
    fn test_partial_station_gets_defaults() {
        let json = r#"{"id": "x", "name": "Partial", "lat": 0, "lng": 0, "pricing": {"perKwh": 2466}}"#;
        let station: Station = serde_json::from_str(json).unwrap();
        assert_eq!(station.status, Availability::Offline);
        assert_eq!(station.pricing.currency, "");
        assert_eq!(station.pricing.per_kwh, 2466.0);
        assert_eq!(station.pricing.per_minute, None);
        assert_eq!(station.pricing.label(), "2466/kWh");
    }

    #[test]
    fn test_station_with_distance_is_flat() {
        let json = r#"{"id": "x", "name": "Bare", "lat": 1, "lng": 2, "status": "AVAILABLE"}"#;
        let station: Station = serde_json::from_str(json).unwrap();
        let annotated = StationWithDistance {
            station,
            distance_km: 1.5,
        };
        let value = serde_json::to_value(&annotated).unwrap();
        assert_eq!(value["distanceKm"], 1.5);
        assert_eq!(value["id"], "x");
        assert_eq!(annotated.name, "Bare");
    }

    #[test]
    fn test_lat_lng_validation() {
        assert!(LatLng::new(-6.2, 106.8).is_ok());
        assert!(LatLng::new(f64::NAN, 106.8).is_err());
        assert!(LatLng::new(91.0, 0.0).is_err());
        assert!(LatLng::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_connector_type_parsing() {
        assert_eq!("ccs2".parse::<ConnectorType>().unwrap(), ConnectorType::Ccs2);
        assert_eq!("CHAdeMO".parse::<ConnectorType>().unwrap(), ConnectorType::Chademo);
        assert!("tesla".parse::<ConnectorType>().is_err());
        assert_eq!(ConnectorType::Type2.to_string(), "Type2");
    }

    #[test]
    fn test_car_compatibility() {
        let json = r#"{"id": "x", "name": "S", "lat": 0, "lng": 0, "status": "AVAILABLE",
            "connectors": [{"type": "Type2", "powerKW": 22, "ports": 1, "availablePorts": 1}]}"#;
        let station: Station = serde_json::from_str(json).unwrap();
        let mut car = UserCar {
            id: "car-1".into(),
            name: "Ioniq 5".into(),
            connector_types: vec![ConnectorType::Type2, ConnectorType::Ccs2],
            min_kw: 0.0,
            battery_capacity: Some(72.6),
        };
        assert!(car.is_compatible_with(&station));

        car.min_kw = 50.0;
        assert!(!car.is_compatible_with(&station));

        car.min_kw = f64::NAN;
        car.connector_types = vec![ConnectorType::Chademo];
        assert!(!car.is_compatible_with(&station));
    }
}
