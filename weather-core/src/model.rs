use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AcquisitionError;

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// What the user asked for: a typed place name or a position.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceQuery {
    Name(String),
    Coordinates(Coordinates),
}

/// A query normalized to coordinates plus the label shown for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlace {
    pub coordinates: Coordinates,
    pub label: String,
}

/// Unit system requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Imperial,
    Metric,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Imperial => "imperial",
            Units::Metric => "metric",
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One condition descriptor, e.g. `Rain / light rain / 10d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub main: String,
    pub description: String,
    pub icon: String,
}

/// A single point-in-time observation (current conditions or one forecast hour).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub dew_point: f64,
    pub wind_speed: f64,
    /// Probability of precipitation in `0.0..=1.0`, only when the provider sends one.
    pub precipitation_probability: Option<f64>,
    pub conditions: Vec<Condition>,
}

impl Observation {
    pub fn primary_condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }
}

impl Default for Observation {
    fn default() -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            temperature: 0.0,
            feels_like: 0.0,
            humidity: 0,
            dew_point: 0.0,
            wind_speed: 0.0,
            precipitation_probability: None,
            conditions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

/// Aggregate for one forecast day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAggregate {
    pub timestamp: DateTime<Utc>,
    pub temperature: TemperatureRange,
    pub humidity: u8,
    pub dew_point: f64,
    pub wind_speed: f64,
    pub precipitation_probability: Option<f64>,
    pub conditions: Vec<Condition>,
}

impl DayAggregate {
    pub fn primary_condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }
}

/// Current, hourly and daily weather for one place at one moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub units: Units,
    pub current: Observation,
    pub hourly: Vec<Observation>,
    pub daily: Vec<DayAggregate>,
}

impl WeatherSnapshot {
    /// Placeholder published before the first successful fetch.
    pub fn empty() -> Self {
        Self {
            units: Units::default(),
            current: Observation::default(),
            hourly: Vec::new(),
            daily: Vec::new(),
        }
    }

    /// A fetched snapshot always has at least one current condition descriptor.
    pub fn is_empty(&self) -> bool {
        self.current.conditions.is_empty()
    }
}

/// The single published aggregate observed by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionState {
    pub active_place: String,
    /// Replaced wholesale on commit, never patched.
    pub snapshot: Arc<WeatherSnapshot>,
    pub is_invalid_place: bool,
    pub last_error: Option<AcquisitionError>,
    pub is_loading: bool,
    /// Latest generation token issued by the orchestrator.
    pub generation: u64,
}

impl AcquisitionState {
    pub fn new(default_place: impl Into<String>) -> Self {
        Self {
            active_place: default_place.into(),
            snapshot: Arc::new(WeatherSnapshot::empty()),
            is_invalid_place: false,
            last_error: None,
            is_loading: false,
            generation: 0,
        }
    }
}
