use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::{
    error::{AcquisitionError, DecodeFailure},
    model::{
        Condition, Coordinates, DayAggregate, Observation, TemperatureRange, Units,
        WeatherSnapshot,
    },
};

use super::WeatherProvider;

pub const HOURLY_LIMIT: usize = 24;
pub const DAILY_LIMIT: usize = 8;

/// OpenWeatherMap One Call client. The unit system is fixed at construction.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    units: Units,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, base_url: &str, units: Units) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            units,
            http,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwObservation {
    dt: i64,
    temp: f64,
    feels_like: f64,
    humidity: u8,
    dew_point: f64,
    wind_speed: f64,
    #[serde(default)]
    pop: Option<f64>,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwDailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    temp: OwDailyTemp,
    humidity: u8,
    dew_point: f64,
    wind_speed: f64,
    #[serde(default)]
    pop: Option<f64>,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwOneCallResponse {
    current: OwObservation,
    #[serde(default)]
    hourly: Vec<OwObservation>,
    #[serde(default)]
    daily: Vec<OwDaily>,
}

impl From<OwWeather> for Condition {
    fn from(w: OwWeather) -> Self {
        Condition {
            main: w.main,
            description: w.description,
            icon: w.icon,
        }
    }
}

impl TryFrom<OwObservation> for Observation {
    type Error = AcquisitionError;

    fn try_from(o: OwObservation) -> Result<Self, Self::Error> {
        Ok(Observation {
            timestamp: unix_to_utc(o.dt)?,
            temperature: o.temp,
            feels_like: o.feels_like,
            humidity: o.humidity,
            dew_point: o.dew_point,
            wind_speed: o.wind_speed,
            precipitation_probability: o.pop,
            conditions: o.weather.into_iter().map(Condition::from).collect(),
        })
    }
}

impl TryFrom<OwDaily> for DayAggregate {
    type Error = AcquisitionError;

    fn try_from(d: OwDaily) -> Result<Self, Self::Error> {
        Ok(DayAggregate {
            timestamp: unix_to_utc(d.dt)?,
            temperature: TemperatureRange {
                min: d.temp.min,
                max: d.temp.max,
            },
            humidity: d.humidity,
            dew_point: d.dew_point,
            wind_speed: d.wind_speed,
            precipitation_probability: d.pop,
            conditions: d.weather.into_iter().map(Condition::from).collect(),
        })
    }
}

/// Decode a One Call body into a snapshot.
pub fn decode_snapshot(body: &str, units: Units) -> Result<WeatherSnapshot, AcquisitionError> {
    let parsed: OwOneCallResponse = serde_json::from_str(body)
        .map_err(|e| AcquisitionError::decoding(&e))?;

    if parsed.current.weather.is_empty() {
        return Err(AcquisitionError::DecodingError {
            kind: DecodeFailure::Schema,
            message: "current observation has no condition descriptor".to_string(),
        });
    }

    let hourly = parsed
        .hourly
        .into_iter()
        .take(HOURLY_LIMIT)
        .map(Observation::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let daily = parsed
        .daily
        .into_iter()
        .take(DAILY_LIMIT)
        .map(DayAggregate::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WeatherSnapshot {
        units,
        current: parsed.current.try_into()?,
        hourly,
        daily,
    })
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch(&self, coords: Coordinates) -> Result<WeatherSnapshot, AcquisitionError> {
        let url = format!("{}/onecall", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("exclude", "minutely".to_string()),
                ("appid", self.api_key.clone()),
                ("units", self.units.as_str().to_string()),
            ])
            .send()
            .await
            .map_err(|e| AcquisitionError::TransportError(e.to_string()))?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            tracing::debug!(
                status = status.as_u16(),
                body = %truncate_body(&body),
                "OpenWeather request rejected"
            );
            return Err(AcquisitionError::InvalidResponse {
                status: status.as_u16(),
            });
        }

        let body = res
            .text()
            .await
            .map_err(|e| AcquisitionError::TransportError(e.to_string()))?;

        let snapshot = decode_snapshot(&body, self.units)?;
        tracing::debug!(
            latitude = coords.latitude,
            longitude = coords.longitude,
            hourly = snapshot.hourly.len(),
            daily = snapshot.daily.len(),
            "Fetched weather snapshot"
        );
        Ok(snapshot)
    }
}

fn unix_to_utc(ts: i64) -> Result<DateTime<Utc>, AcquisitionError> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| AcquisitionError::DecodingError {
        kind: DecodeFailure::Schema,
        message: format!("timestamp {ts} is out of range"),
    })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
