use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{config::GeocodingConfig, error::AcquisitionError, model::Coordinates};

use super::Geocoder;

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
}

/// OpenStreetMap Nominatim client.
#[derive(Debug, Clone)]
pub struct Nominatim {
    base_url: String,
    http: Client,
}

impl Nominatim {
    pub fn new(config: &GeocodingConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, AcquisitionError> {
        let res = self
            .http
            .get(format!("{}/{endpoint}", self.base_url))
            .query(query)
            .send()
            .await
            .map_err(|e| AcquisitionError::ResolverUnavailable(e.to_string()))?;

        if !res.status().is_success() {
            return Err(AcquisitionError::ResolverUnavailable(format!(
                "{endpoint} returned status {}",
                res.status()
            )));
        }

        Ok(res)
    }
}

#[async_trait]
impl Geocoder for Nominatim {
    async fn forward(&self, name: &str) -> Result<Coordinates, AcquisitionError> {
        let query = [
            ("q", name.to_string()),
            ("format", "json".into()),
            ("limit", "1".into()),
        ];
        let res = self.get("search", &query).await?;

        let places: Vec<NominatimPlace> = res
            .json()
            .await
            .map_err(|e| AcquisitionError::ResolverUnavailable(e.to_string()))?;

        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| AcquisitionError::PlaceNotFound(name.to_string()))?;

        let latitude = place.lat.parse::<f64>();
        let longitude = place.lon.parse::<f64>();
        match (latitude, longitude) {
            (Ok(latitude), Ok(longitude)) => Ok(Coordinates::new(latitude, longitude)),
            _ => Err(AcquisitionError::ResolverUnavailable(format!(
                "unparsable coordinates '{}', '{}'",
                place.lat, place.lon
            ))),
        }
    }

    async fn reverse(&self, coords: Coordinates) -> Result<Option<String>, AcquisitionError> {
        let query = [
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
            ("format", "json".into()),
            ("zoom", "10".into()),
        ];
        let res = self.get("reverse", &query).await?;

        let body: NominatimReverse = res
            .json()
            .await
            .map_err(|e| AcquisitionError::ResolverUnavailable(e.to_string()))?;

        // Prefer city > town > village > municipality
        Ok(body
            .address
            .and_then(|a| a.city.or(a.town).or(a.village).or(a.municipality)))
    }
}
