use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{config::LocationConfig, error::AcquisitionError, model::Coordinates};

use super::{Authorization, LocationDelegate, LocationPlatform};

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    loc: String,
}

/// Approximates the device position from the public IP address.
///
/// Consent is the `allow_network_lookup` setting; it is reported through the
/// delegate when authorization is requested.
#[derive(Debug, Clone)]
pub struct NetworkLocation {
    lookup_url: String,
    allowed: bool,
    decided: Arc<Mutex<Authorization>>,
    http: Client,
}

impl NetworkLocation {
    pub fn new(config: &LocationConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            lookup_url: config.lookup_url.clone(),
            allowed: config.allow_network_lookup,
            decided: Arc::new(Mutex::new(Authorization::NotDetermined)),
            http,
        })
    }
}

fn parse_loc(loc: &str) -> Option<Coordinates> {
    let (lat, lon) = loc.split_once(',')?;
    let latitude = lat.trim().parse::<f64>().ok()?;
    let longitude = lon.trim().parse::<f64>().ok()?;
    Some(Coordinates {
        latitude,
        longitude,
    })
}

#[async_trait]
impl LocationPlatform for NetworkLocation {
    fn authorization(&self) -> Authorization {
        *self.decided.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn services_enabled(&self) -> bool {
        true
    }

    fn request_authorization(&self, delegate: LocationDelegate) {
        let status = if self.allowed {
            Authorization::Authorized
        } else {
            Authorization::Denied
        };
        *self.decided.lock().unwrap_or_else(PoisonError::into_inner) = status;
        delegate.authorization_changed(status);
    }

    async fn request_fix(&self) -> Result<Coordinates, AcquisitionError> {
        let res = self
            .http
            .get(&self.lookup_url)
            .send()
            .await
            .map_err(|e| AcquisitionError::LocationUnavailable(e.to_string()))?;

        if !res.status().is_success() {
            return Err(AcquisitionError::LocationUnavailable(format!(
                "lookup returned status {}",
                res.status()
            )));
        }

        let info: IpInfoResponse = res
            .json()
            .await
            .map_err(|e| AcquisitionError::LocationUnavailable(e.to_string()))?;

        parse_loc(&info.loc).ok_or_else(|| {
            AcquisitionError::LocationUnavailable(format!("invalid location format '{}'", info.loc))
        })
    }
}
