//! Plain-text rendering of the published state.

use std::fmt::Write;

use weather_core::{AcquisitionState, display, model::Observation};

const HOURS_SHOWN: usize = 6;

pub fn state(state: &AcquisitionState) -> String {
    let mut out = String::new();
    let snapshot = &state.snapshot;

    let _ = writeln!(out, "{}", state.active_place);
    if state.is_invalid_place {
        let _ = writeln!(out, "  (last search did not match a place)");
    }
    if let Some(err) = &state.last_error {
        let _ = writeln!(out, "  ! {err}");
    }

    if snapshot.is_empty() {
        let _ = writeln!(out, "No weather data yet.");
        return out;
    }

    let units = snapshot.units;
    let current = &snapshot.current;
    let _ = writeln!(out, "{}", display::full_date(current.timestamp));
    let _ = writeln!(
        out,
        "{} [{}] {}, feels like {}",
        display::headline(current),
        display::current_icon(snapshot),
        display::temperature(current.temperature, units),
        display::temperature(current.feels_like, units),
    );
    let _ = writeln!(out, "{}", details(current, units));

    if !snapshot.hourly.is_empty() {
        let _ = writeln!(out, "Hourly:");
        for hour in snapshot.hourly.iter().take(HOURS_SHOWN) {
            let _ = writeln!(
                out,
                "  {}  {:>7}  {}",
                display::hour(hour.timestamp),
                display::temperature(hour.temperature, units),
                display::headline(hour),
            );
        }
    }

    if !snapshot.daily.is_empty() {
        let _ = writeln!(out, "Daily:");
        for day in &snapshot.daily {
            let headline = day
                .primary_condition()
                .map(|c| c.main.as_str())
                .unwrap_or_default();
            let mut line = format!(
                "  {}  {:>7} / {:>7}  {}",
                display::short_weekday(day.timestamp),
                display::temperature(day.temperature.min, units),
                display::temperature(day.temperature.max, units),
                headline,
            );
            if let Some(pop) = display::precipitation(day.precipitation_probability) {
                let _ = write!(line, "  precipitation {pop}");
            }
            let _ = writeln!(out, "{line}");
        }
    }

    out
}

fn details(observation: &Observation, units: weather_core::Units) -> String {
    let mut line = format!(
        "Humidity {}  Wind {}  {}",
        display::humidity(observation.humidity),
        display::wind_speed(observation.wind_speed, units),
        display::dew_point(observation.dew_point, units),
    );
    if let Some(pop) = display::precipitation(observation.precipitation_probability) {
        let _ = write!(line, "  Precipitation {pop}");
    }
    line
}
