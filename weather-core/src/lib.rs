//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Place resolution (forward/reverse geocoding) and device location
//! - Abstraction over weather providers
//! - The acquisition orchestrator that publishes a single observable state
//! - Shared domain models and display helpers
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod display;
pub mod error;
pub mod geocode;
pub mod location;
pub mod model;
pub mod orchestrator;
pub mod provider;

pub use config::{Config, StartupSource};
pub use error::{AcquisitionError, DecodeFailure};
pub use geocode::{CoordinateResolver, Geocoder, Nominatim};
pub use location::{DeviceLocationProvider, LocationPlatform, NetworkLocation, PermissionState};
pub use model::{AcquisitionState, Coordinates, PlaceQuery, ResolvedPlace, Units, WeatherSnapshot};
pub use orchestrator::{Orchestrator, OrchestratorSettings, Pipeline};
pub use provider::{WeatherProvider, provider_from_config};

