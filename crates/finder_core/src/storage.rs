//! Typed access to the client's persisted profile.
//!
//! All keys live here. The layout is versioned by [`SCHEMA_VERSION_KEY`];
//! opening a [`ProfileStore`] migrates older layouts in place.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{AppSession, UserCar};

pub const SCHEMA_VERSION_KEY: &str = "chargefinder.schemaVersion";
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Version 1 stored a single car under this key.
const LEGACY_CAR_KEY: &str = "chargefinder.car";
const CARS_KEY: &str = "chargefinder.cars";
const ACTIVE_CAR_KEY: &str = "chargefinder.activeCarId";
const SESSION_KEY: &str = "chargefinder.session";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Value under {key} is not valid: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Profile schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("Car {car_id} is not in the profile")]
    CarNotFound { car_id: String },
    #[error("Storage backend failed: {0}")]
    Backend(String),
}

/// Raw string key-value storage, the equivalent of browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Vehicle profiles, active vehicle and auth session on top of a
/// [`KeyValueStore`].
#[derive(Debug)]
pub struct ProfileStore<S> {
    store: S,
}

impl<S: KeyValueStore> ProfileStore<S> {
    /// Wrap `store`, migrating it to the current schema first.
    pub fn open(store: S) -> Result<Self, StorageError> {
        let mut profile = ProfileStore { store };
        profile.migrate()?;
        Ok(profile)
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.store
            .get(key)?
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, raw)
    }

    fn schema_version(&self) -> Result<u32, StorageError> {
        if let Some(version) = self.read::<u32>(SCHEMA_VERSION_KEY)? {
            return Ok(version);
        }
        // Unversioned layouts are version 1.
        Ok(1)
    }

    fn migrate(&mut self) -> Result<(), StorageError> {
        let version = self.schema_version()?;
        if version > CURRENT_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        if version < 2 {
            if let Some(legacy) = self.read::<UserCar>(LEGACY_CAR_KEY)? {
                tracing::info!("Migrating legacy car {} to the car list", legacy.id);
                let mut cars = self.cars()?;
                if !cars.iter().any(|car| car.id == legacy.id) {
                    cars.push(legacy.clone());
                }
                self.write(CARS_KEY, &cars)?;
                if self.active_car_id()?.is_none() {
                    self.write(ACTIVE_CAR_KEY, &legacy.id)?;
                }
            }
            self.store.remove(LEGACY_CAR_KEY)?;
        }

        if version != CURRENT_SCHEMA_VERSION {
            self.write(SCHEMA_VERSION_KEY, &CURRENT_SCHEMA_VERSION)?;
        }
        Ok(())
    }

    pub fn cars(&self) -> Result<Vec<UserCar>, StorageError> {
        Ok(self.read(CARS_KEY)?.unwrap_or_default())
    }

    /// Insert `car`, or replace the stored car with the same id.
    pub fn save_car(&mut self, car: UserCar) -> Result<(), StorageError> {
        let mut cars = self.cars()?;
        match cars.iter_mut().find(|stored| stored.id == car.id) {
            Some(stored) => *stored = car,
            None => cars.push(car),
        }
        self.write(CARS_KEY, &cars)
    }

    pub fn remove_car(&mut self, car_id: &str) -> Result<(), StorageError> {
        let mut cars = self.cars()?;
        cars.retain(|car| car.id != car_id);
        self.write(CARS_KEY, &cars)?;
        if self.active_car_id()?.as_deref() == Some(car_id) {
            self.store.remove(ACTIVE_CAR_KEY)?;
        }
        Ok(())
    }

    pub fn active_car_id(&self) -> Result<Option<String>, StorageError> {
        self.read(ACTIVE_CAR_KEY)
    }

    /// The active car, if it is still in the car list.
    pub fn active_car(&self) -> Result<Option<UserCar>, StorageError> {
        let Some(active_id) = self.active_car_id()? else {
            return Ok(None);
        };
        Ok(self.cars()?.into_iter().find(|car| car.id == active_id))
    }

    pub fn set_active_car(&mut self, car_id: &str) -> Result<(), StorageError> {
        if !self.cars()?.iter().any(|car| car.id == car_id) {
            return Err(StorageError::CarNotFound {
                car_id: car_id.to_string(),
            });
        }
        self.write(ACTIVE_CAR_KEY, &car_id)
    }

    pub fn session(&self) -> Result<AppSession, StorageError> {
        Ok(self.read(SESSION_KEY)?.unwrap_or_default())
    }

    /// Persist `session`; an unauthenticated session clears the stored one.
    pub fn save_session(&mut self, session: &AppSession) -> Result<(), StorageError> {
        if session.is_authenticated() {
            self.write(SESSION_KEY, session)
        } else {
            self.store.remove(SESSION_KEY)
        }
    }
}
