//! Device location.
//!
//! [`LocationPlatform`] is what the operating system (or a stand-in) offers.
//! [`DeviceLocationProvider`] turns it into a single-shot, time-bounded request
//! that concurrent callers share, and republishes the platform's authorization
//! changes and failures as latest-value state.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;

use crate::{config::LocationConfig, error::AcquisitionError, model::Coordinates};

pub mod network;

pub use network::NetworkLocation;

/// Authorization as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

/// Permission as observed by the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    NotDetermined,
    Denied,
    Authorized,
}

impl From<Authorization> for PermissionState {
    fn from(value: Authorization) -> Self {
        match value {
            Authorization::NotDetermined => PermissionState::NotDetermined,
            Authorization::Restricted | Authorization::Denied => PermissionState::Denied,
            Authorization::Authorized => PermissionState::Authorized,
        }
    }
}

/// A position and when it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinates: Coordinates,
    pub taken_at: DateTime<Utc>,
}

impl Fix {
    pub fn now(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            taken_at: Utc::now(),
        }
    }

    fn is_fresh(&self, max_age: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.taken_at);
        age.to_std().map(|age| age <= max_age).unwrap_or(true)
    }
}

/// Channel through which a platform reports asynchronous events.
#[derive(Debug, Clone)]
pub struct LocationDelegate {
    permission: Arc<watch::Sender<PermissionState>>,
    error: Arc<watch::Sender<Option<AcquisitionError>>>,
}

impl LocationDelegate {
    pub fn authorization_changed(&self, status: Authorization) {
        let next = PermissionState::from(status);
        let changed = self.permission.send_if_modified(|current| {
            // Once decided, a permission never goes back to undetermined.
            if next == PermissionState::NotDetermined
                && *current != PermissionState::NotDetermined
            {
                return false;
            }
            let changed = *current != next;
            *current = next;
            changed
        });

        if changed {
            tracing::info!(?status, "Location authorization changed");
        }

        match next {
            PermissionState::Denied => {
                self.error
                    .send_replace(Some(AcquisitionError::PermissionDenied));
            }
            PermissionState::Authorized => {
                self.error.send_replace(None);
            }
            PermissionState::NotDetermined => {}
        }
    }

    pub fn failed(&self, error: AcquisitionError) {
        tracing::warn!(error = %error, "Location platform reported a failure");
        self.error.send_replace(Some(error));
    }
}

/// Platform location services.
#[async_trait]
pub trait LocationPlatform: Send + Sync + Debug {
    fn authorization(&self) -> Authorization;

    fn services_enabled(&self) -> bool;

    /// Start the permission flow. The outcome arrives through `delegate`, possibly never.
    fn request_authorization(&self, delegate: LocationDelegate);

    /// Cached fix the platform already holds, if any.
    fn last_known(&self) -> Option<Fix> {
        None
    }

    /// One active location request. May never complete on its own.
    async fn request_fix(&self) -> Result<Coordinates, AcquisitionError>;
}

type PendingFix = Shared<BoxFuture<'static, Result<Coordinates, AcquisitionError>>>;

#[derive(Default)]
struct Inflight {
    next_id: u64,
    pending: Option<(u64, PendingFix)>,
}

pub struct DeviceLocationProvider {
    platform: Arc<dyn LocationPlatform>,
    timeout: Duration,
    max_fix_age: Duration,
    delegate: LocationDelegate,
    last_fix: Mutex<Option<Fix>>,
    inflight: Mutex<Inflight>,
}

impl Debug for DeviceLocationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLocationProvider")
            .field("platform", &self.platform)
            .field("timeout", &self.timeout)
            .field("max_fix_age", &self.max_fix_age)
            .field("permission", &*self.delegate.permission.borrow())
            .finish()
    }
}

impl DeviceLocationProvider {
    pub fn new(platform: Arc<dyn LocationPlatform>, config: &LocationConfig) -> Self {
        Self::with_limits(platform, config.timeout(), config.max_fix_age())
    }

    pub fn with_limits(
        platform: Arc<dyn LocationPlatform>,
        timeout: Duration,
        max_fix_age: Duration,
    ) -> Self {
        let (permission, _) = watch::channel(PermissionState::from(platform.authorization()));
        let (error, _) = watch::channel(None);

        Self {
            platform,
            timeout,
            max_fix_age,
            delegate: LocationDelegate {
                permission: Arc::new(permission),
                error: Arc::new(error),
            },
            last_fix: Mutex::new(None),
            inflight: Mutex::new(Inflight::default()),
        }
    }

    /// Handle for platform code that reports events outside of a request.
    pub fn delegate(&self) -> LocationDelegate {
        self.delegate.clone()
    }

    pub fn permission(&self) -> PermissionState {
        *self.delegate.permission.borrow()
    }

    pub fn subscribe_permission(&self) -> watch::Receiver<PermissionState> {
        self.delegate.permission.subscribe()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<AcquisitionError>> {
        self.delegate.error.subscribe()
    }

    /// Idempotent: only an undecided permission triggers the platform flow.
    pub fn request_permission(&self) {
        if self.permission() == PermissionState::NotDetermined {
            tracing::debug!("Requesting location authorization");
            self.platform.request_authorization(self.delegate.clone());
        }
    }

    /// Current position. Concurrent callers share one platform request.
    pub async fn get_current_location(&self) -> Result<Coordinates, AcquisitionError> {
        if !self.platform.services_enabled() {
            let err =
                AcquisitionError::LocationUnavailable("location services are disabled".into());
            self.delegate.error.send_replace(Some(err.clone()));
            return Err(err);
        }

        if self.permission() != PermissionState::Authorized {
            return Err(AcquisitionError::PermissionDenied);
        }

        if let Some(fix) = self.fresh_fix() {
            tracing::debug!(coords = %fix.coordinates, "Using remembered location fix");
            return Ok(fix.coordinates);
        }

        let (id, pending) = self.join_or_start();
        let result = pending.await;
        self.finish(id, &result);
        result
    }

    fn fresh_fix(&self) -> Option<Fix> {
        let own = *self.last_fix.lock().unwrap_or_else(PoisonError::into_inner);
        [own, self.platform.last_known()]
            .into_iter()
            .flatten()
            .filter(|fix| fix.is_fresh(self.max_fix_age))
            .max_by_key(|fix| fix.taken_at)
    }

    fn join_or_start(&self) -> (u64, PendingFix) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((id, pending)) = &inflight.pending {
            tracing::debug!("Joining in-flight location request");
            return (*id, pending.clone());
        }

        let platform = Arc::clone(&self.platform);
        let timeout = self.timeout;
        let pending = async move {
            match tokio::time::timeout(timeout, platform.request_fix()).await {
                Ok(result) => result,
                Err(_) => Err(AcquisitionError::Timeout(timeout)),
            }
        }
        .boxed()
        .shared();

        inflight.next_id += 1;
        let id = inflight.next_id;
        inflight.pending = Some((id, pending.clone()));
        tracing::debug!(request = id, "Issued platform location request");
        (id, pending)
    }

    fn finish(&self, id: u64, result: &Result<Coordinates, AcquisitionError>) {
        {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(&inflight.pending, Some((current, _)) if *current == id) {
                inflight.pending = None;
            }
        }

        match result {
            Ok(coords) => {
                let mut last_fix = self.last_fix.lock().unwrap_or_else(PoisonError::into_inner);
                *last_fix = Some(Fix::now(*coords));
            }
            Err(err) => {
                self.delegate.error.send_replace(Some(err.clone()));
            }
        }
    }
}
