//! Formatting helpers for presenting snapshots.

use chrono::{DateTime, Utc};

use crate::model::{Observation, Units, WeatherSnapshot};

/// Temperature in Celsius with one decimal.
pub fn temperature(value: f64, units: Units) -> String {
    let celsius = match units {
        Units::Imperial => (value - 32.0) * 5.0 / 9.0,
        Units::Metric => value,
    };
    format!("{celsius:.1}°C")
}

pub fn wind_speed(value: f64, units: Units) -> String {
    match units {
        Units::Imperial => format!("{value:.1} mph"),
        Units::Metric => format!("{value:.1} m/s"),
    }
}

pub fn humidity(percent: u8) -> String {
    format!("{percent}%")
}

pub fn dew_point(value: f64, units: Units) -> String {
    format!("Dew point {}", temperature(value, units))
}

/// Chance of precipitation, `None` when the provider sent no probability.
pub fn precipitation(probability: Option<f64>) -> Option<String> {
    probability.map(|p| format!("{:.0}%", (p * 100.0).clamp(0.0, 100.0)))
}

/// e.g. `Monday, October 19, 2026`
pub fn full_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%A, %B %-d, %Y").to_string()
}

/// e.g. `Mon`
pub fn short_weekday(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a").to_string()
}

/// e.g. `14:00`
pub fn hour(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%H:%M").to_string()
}

/// Symbolic icon name for a provider icon code.
pub fn icon_name(code: &str) -> &'static str {
    match code {
        "01d" => "sun",
        "01n" => "moon",
        "02d" => "cloud_sun",
        "02n" => "cloud_moon",
        _ => match code.get(..2) {
            Some("03" | "04") => "cloud",
            Some("09") => "cloud_drizzle",
            Some("10") => "cloud_rain",
            Some("11") => "cloud_lightning",
            Some("13") => "cloud_snow",
            Some("50") => "cloud_fog",
            _ => "sun",
        },
    }
}

/// Headline condition, empty for the placeholder snapshot.
pub fn headline(observation: &Observation) -> &str {
    observation
        .primary_condition()
        .map(|c| c.main.as_str())
        .unwrap_or_default()
}

pub fn current_icon(snapshot: &WeatherSnapshot) -> &'static str {
    snapshot
        .current
        .primary_condition()
        .map(|c| icon_name(&c.icon))
        .unwrap_or("sun")
}
