//! Forward and reverse geocoding.
//!
//! [`Geocoder`] is the substitutable provider capability; [`CoordinateResolver`]
//! layers the pipeline's policy on top of it: forward lookups fail loudly,
//! reverse lookups degrade to [`UNKNOWN_PLACE`].

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::AcquisitionError,
    model::{Coordinates, PlaceQuery, ResolvedPlace},
};

pub mod nominatim;

pub use nominatim::Nominatim;

/// Label used when reverse geocoding cannot name a locality.
pub const UNKNOWN_PLACE: &str = "Unknown";

#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    /// Name to coordinates. `PlaceNotFound` when nothing matches.
    async fn forward(&self, name: &str) -> Result<Coordinates, AcquisitionError>;

    /// Coordinates to a locality name, `None` when there is none.
    async fn reverse(&self, coords: Coordinates) -> Result<Option<String>, AcquisitionError>;
}

#[derive(Debug, Clone)]
pub struct CoordinateResolver {
    geocoder: Arc<dyn Geocoder>,
}

impl CoordinateResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    /// Forward geocoding. Never substitutes a default location.
    pub async fn resolve(&self, name: &str) -> Result<Coordinates, AcquisitionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AcquisitionError::PlaceNotFound(String::new()));
        }

        let coords = self.geocoder.forward(name).await?;
        tracing::debug!(
            place = name,
            latitude = coords.latitude,
            longitude = coords.longitude,
            "Resolved place"
        );
        Ok(coords)
    }

    /// Reverse geocoding; any failure yields [`UNKNOWN_PLACE`].
    pub async fn describe(&self, coords: Coordinates) -> String {
        match self.geocoder.reverse(coords).await {
            Ok(Some(name)) if !name.trim().is_empty() => name,
            Ok(_) => {
                tracing::debug!(%coords, "No locality for coordinates");
                UNKNOWN_PLACE.to_string()
            }
            Err(e) => {
                tracing::debug!(%coords, error = %e, "Reverse geocode failed");
                UNKNOWN_PLACE.to_string()
            }
        }
    }

    /// Normalize a query to coordinates plus a display label.
    pub async fn normalize(&self, query: &PlaceQuery) -> Result<ResolvedPlace, AcquisitionError> {
        match query {
            PlaceQuery::Name(name) => {
                let coordinates = self.resolve(name).await?;
                Ok(ResolvedPlace {
                    coordinates,
                    label: name.trim().to_string(),
                })
            }
            PlaceQuery::Coordinates(coords) => {
                let label = self.describe(*coords).await;
                Ok(ResolvedPlace {
                    coordinates: *coords,
                    label,
                })
            }
        }
    }
}
