//! Acquisition orchestration.
//!
//! One actor task owns [`AcquisitionState`]. Triggers from the presentation
//! layer and completions from attempt workers both arrive over channels, so
//! every mutation happens on that task. Each attempt is stamped with a
//! generation token when it starts; a completion whose token is no longer the
//! latest is dropped without touching state.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, Interval},
};
use tracing::Instrument;

use crate::{
    config::{Config, StartupSource},
    error::AcquisitionError,
    geocode::{CoordinateResolver, Nominatim},
    location::{DeviceLocationProvider, NetworkLocation},
    model::{AcquisitionState, Coordinates, PlaceQuery, ResolvedPlace, WeatherSnapshot},
    provider::{WeatherProvider, provider_from_config},
};

/// The three collaborators an attempt sequences.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub resolver: CoordinateResolver,
    pub location: Arc<DeviceLocationProvider>,
    pub weather: Arc<dyn WeatherProvider>,
}

impl Pipeline {
    /// Wire the production collaborators described by the config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let geocoder = Nominatim::new(&config.geocoding)?;
        let platform = NetworkLocation::new(&config.location)?;
        let location = DeviceLocationProvider::new(Arc::new(platform), &config.location);

        Ok(Self {
            resolver: CoordinateResolver::new(Arc::new(geocoder)),
            location: Arc::new(location),
            weather: provider_from_config(config)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_place: String,
    pub default_coordinates: Coordinates,
    /// Source of the bootstrap attempt issued on spawn; `None` skips it.
    pub startup: Option<StartupSource>,
    pub refresh_interval: Option<Duration>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_place: config.default_place.clone(),
            default_coordinates: config.default_coordinates,
            startup: Some(config.startup),
            refresh_interval: config.refresh_interval(),
        }
    }

    fn fallback(&self) -> ResolvedPlace {
        ResolvedPlace {
            coordinates: self.default_coordinates,
            label: self.default_place.clone(),
        }
    }
}

/// What `refresh()` repeats.
#[derive(Debug, Clone, PartialEq)]
enum Target {
    Place(String),
    CurrentLocation,
    Pinned(ResolvedPlace),
}

#[derive(Debug, Clone)]
enum Attempt {
    Startup(StartupSource),
    Target(Target),
}

#[derive(Debug)]
enum Trigger {
    SetPlace(String),
    UseCurrentLocation,
    Refresh,
}

#[derive(Debug)]
enum Command {
    Trigger(Trigger),
    WhenSettled(oneshot::Sender<()>),
}

#[derive(Debug)]
enum Outcome {
    Committed {
        place: ResolvedPlace,
        target: Target,
        snapshot: WeatherSnapshot,
    },
    InvalidPlace(AcquisitionError),
    Failed(AcquisitionError),
}

#[derive(Debug)]
struct Completion {
    generation: u64,
    outcome: Outcome,
}

/// Handle used by the presentation layer: three triggers plus observation.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<AcquisitionState>,
}

impl Orchestrator {
    /// Start the actor. It runs until every handle is dropped and in-flight
    /// attempts have reported back.
    pub fn spawn(pipeline: Pipeline, settings: OrchestratorSettings) -> (Self, JoinHandle<()>) {
        let initial = AcquisitionState::new(settings.default_place.clone());
        let (state_tx, state_rx) = watch::channel(initial);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let actor = Acquisition {
            pipeline: Arc::new(pipeline),
            settings,
            state: state_tx,
            generation: 0,
            in_flight: 0,
            waiters: Vec::new(),
            committed: None,
            completions: completions_tx,
        };
        let task = tokio::spawn(actor.run(commands_rx, completions_rx));

        let handle = Self {
            commands: commands_tx,
            state: state_rx,
        };
        (handle, task)
    }

    pub fn set_place(&self, name: impl Into<String>) {
        self.send(Command::Trigger(Trigger::SetPlace(name.into())));
    }

    pub fn use_current_location(&self) {
        self.send(Command::Trigger(Trigger::UseCurrentLocation));
    }

    pub fn refresh(&self) {
        self.send(Command::Trigger(Trigger::Refresh));
    }

    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.state.clone()
    }

    pub fn state(&self) -> AcquisitionState {
        self.state.borrow().clone()
    }

    /// Wait until every attempt issued so far, stale ones included, has reported back.
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::WhenSettled(tx));
        let _ = rx.await;
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Acquisition task has stopped; command ignored");
        }
    }
}

struct Acquisition {
    pipeline: Arc<Pipeline>,
    settings: OrchestratorSettings,
    state: watch::Sender<AcquisitionState>,
    generation: u64,
    in_flight: usize,
    waiters: Vec<oneshot::Sender<()>>,
    /// Target of the last committed attempt.
    committed: Option<Target>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Acquisition {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        if let Some(source) = self.settings.startup {
            self.begin(Attempt::Startup(source));
        }

        let mut ticker = self.settings.refresh_interval.map(first_tick_after);
        let mut accepting = true;

        loop {
            tokio::select! {
                command = commands.recv(), if accepting => match command {
                    Some(Command::Trigger(trigger)) => self.trigger(trigger),
                    Some(Command::WhenSettled(waiter)) => self.when_settled(waiter),
                    None => accepting = false,
                },
                Some(done) = completions.recv() => self.complete(done),
                () = tick(&mut ticker), if accepting => {
                    tracing::debug!("Periodic refresh");
                    self.trigger(Trigger::Refresh);
                }
            }

            if !accepting && self.in_flight == 0 {
                break;
            }
        }

        tracing::debug!("Acquisition task finished");
    }

    fn trigger(&mut self, trigger: Trigger) {
        let target = match trigger {
            Trigger::SetPlace(name) => Target::Place(name),
            Trigger::UseCurrentLocation => Target::CurrentLocation,
            Trigger::Refresh => self.committed.clone().unwrap_or(Target::CurrentLocation),
        };
        self.begin(Attempt::Target(target));
    }

    fn begin(&mut self, attempt: Attempt) {
        self.generation += 1;
        let generation = self.generation;
        self.in_flight += 1;
        self.state.send_modify(|s| {
            s.generation = generation;
            s.is_loading = true;
        });

        tracing::debug!(generation, ?attempt, "Starting acquisition attempt");

        let pipeline = Arc::clone(&self.pipeline);
        let fallback = self.settings.fallback();
        let completions = self.completions.clone();
        let span = tracing::info_span!("acquisition", generation);

        tokio::spawn(
            async move {
                let outcome = pipeline.acquire(attempt, fallback).await;
                let _ = completions.send(Completion {
                    generation,
                    outcome,
                });
            }
            .instrument(span),
        );
    }

    fn complete(&mut self, done: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);

        if done.generation == self.generation {
            self.apply(done.outcome);
        } else {
            tracing::debug!(
                generation = done.generation,
                latest = self.generation,
                "Discarding superseded acquisition result"
            );
        }

        if self.in_flight == 0 {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Committed {
                place,
                target,
                snapshot,
            } => {
                tracing::info!(
                    place = %place.label,
                    coords = %place.coordinates,
                    "Committed weather snapshot"
                );
                let snapshot = Arc::new(snapshot);
                self.state.send_modify(|s| {
                    s.snapshot = snapshot;
                    s.active_place = place.label;
                    s.is_invalid_place = false;
                    s.last_error = None;
                    s.is_loading = false;
                });
                self.committed = Some(target);
            }
            Outcome::InvalidPlace(err) => {
                tracing::warn!(error = %err, "Place could not be resolved");
                self.state.send_modify(|s| {
                    s.is_invalid_place = true;
                    s.last_error = Some(err);
                    s.is_loading = false;
                });
            }
            Outcome::Failed(err) => {
                tracing::warn!(error = %err, "Acquisition failed; keeping previous snapshot");
                self.state.send_modify(|s| {
                    s.last_error = Some(err);
                    s.is_loading = false;
                });
            }
        }
    }

    fn when_settled(&mut self, waiter: oneshot::Sender<()>) {
        if self.in_flight == 0 {
            let _ = waiter.send(());
        } else {
            self.waiters.push(waiter);
        }
    }
}

/// Ticks every `period`, starting one period from now.
fn first_tick_after(period: Duration) -> Interval {
    tokio::time::interval_at(Instant::now() + period, period)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Pipeline {
    async fn acquire(&self, attempt: Attempt, fallback: ResolvedPlace) -> Outcome {
        let located = match attempt {
            Attempt::Target(Target::Place(name)) => match self.place(&name).await {
                Ok(located) => located,
                Err(err) => return Outcome::InvalidPlace(err),
            },
            Attempt::Target(Target::CurrentLocation) => match self.current_location().await {
                Ok(located) => located,
                Err(err) => return Outcome::Failed(err),
            },
            Attempt::Target(Target::Pinned(place)) => (place.clone(), Target::Pinned(place)),
            Attempt::Startup(source) => {
                let located = match source {
                    StartupSource::Place => self.place(&fallback.label).await,
                    StartupSource::CurrentLocation => self.current_location().await,
                };
                match located {
                    Ok(located) => located,
                    Err(err) if err.is_location_failure() => {
                        tracing::warn!(
                            error = %err,
                            place = %fallback.label,
                            "Startup location unresolved; using default coordinates"
                        );
                        (fallback.clone(), Target::Pinned(fallback))
                    }
                    Err(err) => return Outcome::Failed(err),
                }
            }
        };

        let (place, target) = located;
        match self.weather.fetch(place.coordinates).await {
            Ok(snapshot) => Outcome::Committed {
                place,
                target,
                snapshot,
            },
            Err(err) => Outcome::Failed(err),
        }
    }

    async fn place(&self, name: &str) -> Result<(ResolvedPlace, Target), AcquisitionError> {
        let query = PlaceQuery::Name(name.to_string());
        let place = self.resolver.normalize(&query).await?;
        let target = Target::Place(place.label.clone());
        Ok((place, target))
    }

    async fn current_location(&self) -> Result<(ResolvedPlace, Target), AcquisitionError> {
        self.location.request_permission();
        let coords = self.location.get_current_location().await?;
        let query = PlaceQuery::Coordinates(coords);
        let place = self.resolver.normalize(&query).await?;
        Ok((place, Target::CurrentLocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geocode::{Geocoder, UNKNOWN_PLACE},
        location::{Authorization, LocationDelegate, LocationPlatform},
        model::{Condition, Units},
    };
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tokio::sync::Notify;

    const FREMONT: Coordinates = Coordinates::new(37.5485, -121.9886);
    const NOIDA: Coordinates = Coordinates::new(28.5355, 77.391);
    const SLOW: Coordinates = Coordinates::new(10.0, 10.0);
    const FAST: Coordinates = Coordinates::new(20.0, 20.0);
    const DEFAULTS: Coordinates = Coordinates::new(1.5, 2.5);

    #[derive(Debug, Default)]
    struct StubGeocoder {
        places: HashMap<String, Coordinates>,
        locality: Option<String>,
        forwards: AtomicUsize,
    }

    impl StubGeocoder {
        fn with_places(places: &[(&str, Coordinates)]) -> Self {
            Self {
                places: places.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn forward(&self, name: &str) -> Result<Coordinates, AcquisitionError> {
            self.forwards.fetch_add(1, Ordering::SeqCst);
            self.places
                .get(name)
                .copied()
                .ok_or_else(|| AcquisitionError::PlaceNotFound(name.to_string()))
        }

        async fn reverse(&self, _coords: Coordinates) -> Result<Option<String>, AcquisitionError> {
            self.locality
                .clone()
                .map(Some)
                .ok_or_else(|| AcquisitionError::ResolverUnavailable("offline".into()))
        }
    }

    fn key(coords: Coordinates) -> String {
        format!("{:.4},{:.4}", coords.latitude, coords.longitude)
    }

    /// Weather stub; the snapshot's temperature echoes the requested latitude.
    #[derive(Debug, Default)]
    struct StubWeather {
        failures: HashMap<String, AcquisitionError>,
        gates: HashMap<String, Arc<Notify>>,
        calls: Mutex<Vec<Coordinates>>,
    }

    impl StubWeather {
        fn gate(&mut self, coords: Coordinates) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates.insert(key(coords), gate.clone());
            gate
        }

        fn fail(&mut self, coords: Coordinates, err: AcquisitionError) {
            self.failures.insert(key(coords), err);
        }

        fn calls(&self) -> Vec<Coordinates> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn snapshot_for(coords: Coordinates) -> WeatherSnapshot {
        let mut snapshot = WeatherSnapshot::empty();
        snapshot.units = Units::Imperial;
        snapshot.current.temperature = coords.latitude;
        snapshot.current.conditions.push(Condition {
            main: "Clear".into(),
            description: "clear sky".into(),
            icon: "01d".into(),
        });
        snapshot
    }

    #[async_trait]
    impl WeatherProvider for StubWeather {
        async fn fetch(&self, coords: Coordinates) -> Result<WeatherSnapshot, AcquisitionError> {
            self.calls.lock().unwrap().push(coords);
            if let Some(gate) = self.gates.get(&key(coords)) {
                gate.notified().await;
            }
            match self.failures.get(&key(coords)) {
                Some(err) => Err(err.clone()),
                None => Ok(snapshot_for(coords)),
            }
        }
    }

    #[derive(Debug)]
    struct StubPlatform {
        authorization: Authorization,
        fix: Coordinates,
        gate: Option<Arc<Notify>>,
        requests: AtomicUsize,
    }

    impl StubPlatform {
        fn at(fix: Coordinates) -> Self {
            Self {
                authorization: Authorization::Authorized,
                fix,
                gate: None,
                requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LocationPlatform for StubPlatform {
        fn authorization(&self) -> Authorization {
            self.authorization
        }

        fn services_enabled(&self) -> bool {
            true
        }

        fn request_authorization(&self, _delegate: LocationDelegate) {}

        async fn request_fix(&self) -> Result<Coordinates, AcquisitionError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(self.fix)
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        geocoder: Arc<StubGeocoder>,
        weather: Arc<StubWeather>,
        platform: Arc<StubPlatform>,
    }

    fn harness(
        geocoder: StubGeocoder,
        weather: StubWeather,
        platform: StubPlatform,
        startup: Option<StartupSource>,
    ) -> Harness {
        let geocoder = Arc::new(geocoder);
        let weather = Arc::new(weather);
        let platform = Arc::new(platform);
        let location = DeviceLocationProvider::with_limits(
            platform.clone(),
            Duration::from_secs(10),
            Duration::from_secs(300),
        );
        let pipeline = Pipeline {
            resolver: CoordinateResolver::new(geocoder.clone()),
            location: Arc::new(location),
            weather: weather.clone(),
        };
        let settings = OrchestratorSettings {
            default_place: "Noida".into(),
            default_coordinates: DEFAULTS,
            startup,
            refresh_interval: None,
        };
        let (orchestrator, _task) = Orchestrator::spawn(pipeline, settings);
        Harness {
            orchestrator,
            geocoder,
            weather,
            platform,
        }
    }

    /// Known cities, a working weather stub and an authorized platform; no startup attempt.
    fn basic() -> Harness {
        harness(
            cities(),
            StubWeather::default(),
            StubPlatform::at(FREMONT),
            None,
        )
    }

    fn cities() -> StubGeocoder {
        StubGeocoder::with_places(&[
            ("Fremont", FREMONT),
            ("Noida", NOIDA),
            ("Slow", SLOW),
            ("Fast", FAST),
        ])
    }

    async fn wait_for(
        orchestrator: &Orchestrator,
        predicate: impl FnMut(&AcquisitionState) -> bool,
    ) {
        let mut rx = orchestrator.subscribe();
        rx.wait_for(predicate).await.unwrap();
    }

    #[tokio::test]
    async fn initial_state_is_empty_with_default_place() {
        let h = basic();
        let state = h.orchestrator.state();
        assert_eq!(state.active_place, "Noida");
        assert!(state.snapshot.is_empty());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn typed_place_commits_full_snapshot() {
        let h = basic();

        h.orchestrator.set_place("Fremont");
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert_eq!(state.active_place, "Fremont");
        assert_eq!(*state.snapshot, snapshot_for(FREMONT));
        assert!(!state.is_loading);
        assert!(state.last_error.is_none());
        assert_eq!(state.generation, 1);
    }

    #[tokio::test]
    async fn slower_earlier_trigger_never_overwrites_newer_result() {
        let mut weather = StubWeather::default();
        let slow = weather.gate(SLOW);
        let h = harness(cities(), weather, StubPlatform::at(FREMONT), None);

        h.orchestrator.set_place("Slow");
        h.orchestrator.set_place("Fast");
        wait_for(&h.orchestrator, |s| s.active_place == "Fast").await;

        slow.notify_one();
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert_eq!(h.weather.calls().len(), 2);
        assert_eq!(state.active_place, "Fast");
        assert_eq!(*state.snapshot, snapshot_for(FAST));
        assert_eq!(state.generation, 2);
    }

    #[tokio::test]
    async fn latest_trigger_wins_even_when_it_finishes_last() {
        let mut weather = StubWeather::default();
        let slow = weather.gate(SLOW);
        let h = harness(cities(), weather, StubPlatform::at(FREMONT), None);

        h.orchestrator.set_place("Fast");
        h.orchestrator.set_place("Slow");
        slow.notify_one();
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert_eq!(state.active_place, "Slow");
        assert_eq!(*state.snapshot, snapshot_for(SLOW));
    }

    #[tokio::test]
    async fn superseded_failure_is_discarded() {
        let mut weather = StubWeather::default();
        let slow = weather.gate(SLOW);
        weather.fail(SLOW, AcquisitionError::InvalidResponse { status: 500 });
        let h = harness(cities(), weather, StubPlatform::at(FREMONT), None);

        h.orchestrator.set_place("Slow");
        h.orchestrator.set_place("Fast");
        wait_for(&h.orchestrator, |s| s.active_place == "Fast").await;
        slow.notify_one();
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert!(state.last_error.is_none());
        assert_eq!(*state.snapshot, snapshot_for(FAST));
    }

    #[tokio::test]
    async fn loading_flag_tracks_authoritative_attempt() {
        let mut weather = StubWeather::default();
        let gate = weather.gate(FREMONT);
        let h = harness(cities(), weather, StubPlatform::at(FREMONT), None);

        h.orchestrator.set_place("Fremont");
        wait_for(&h.orchestrator, |s| s.is_loading).await;

        gate.notify_one();
        h.orchestrator.settled().await;
        assert!(!h.orchestrator.state().is_loading);
    }

    #[tokio::test]
    async fn rapid_current_location_requests_share_one_fix() {
        let gate = Arc::new(Notify::new());
        let platform = StubPlatform {
            gate: Some(gate.clone()),
            ..StubPlatform::at(FREMONT)
        };
        let geocoder = StubGeocoder {
            locality: Some("Fremont".into()),
            ..cities()
        };
        let h = harness(geocoder, StubWeather::default(), platform, None);

        h.orchestrator.use_current_location();
        h.orchestrator.use_current_location();
        wait_for(&h.orchestrator, |s| s.generation == 2).await;
        gate.notify_one();
        h.orchestrator.settled().await;

        assert_eq!(h.platform.requests.load(Ordering::SeqCst), 1);
        let state = h.orchestrator.state();
        assert_eq!(state.active_place, "Fremont");
        assert_eq!(*state.snapshot, snapshot_for(FREMONT));
    }

    #[tokio::test]
    async fn invalid_city_flags_place_and_keeps_snapshot() {
        let h = basic();
        h.orchestrator.set_place("Fremont");
        h.orchestrator.settled().await;
        let before = h.orchestrator.state();

        h.orchestrator.set_place("###notacity###");
        h.orchestrator.settled().await;

        let after = h.orchestrator.state();
        assert!(after.is_invalid_place);
        assert!(!after.is_loading);
        let expected = AcquisitionError::PlaceNotFound("###notacity###".into());
        assert_eq!(after.last_error, Some(expected));
        assert!(Arc::ptr_eq(&before.snapshot, &after.snapshot));
        assert_eq!(after.active_place, "Fremont");
        assert_eq!(h.weather.calls().len(), 1);
    }

    #[tokio::test]
    async fn valid_place_after_invalid_clears_flag() {
        let h = basic();
        h.orchestrator.set_place("###notacity###");
        h.orchestrator.settled().await;
        assert!(h.orchestrator.state().is_invalid_place);

        h.orchestrator.set_place("Noida");
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert!(!state.is_invalid_place);
        assert!(state.last_error.is_none());
        assert_eq!(state.active_place, "Noida");
    }

    #[tokio::test]
    async fn reverse_geocode_failure_still_fetches() {
        let geocoder = StubGeocoder {
            locality: None,
            ..cities()
        };
        let h = harness(
            geocoder,
            StubWeather::default(),
            StubPlatform::at(FREMONT),
            None,
        );

        h.orchestrator.use_current_location();
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert_eq!(state.active_place, UNKNOWN_PLACE);
        assert_eq!(h.weather.calls(), vec![FREMONT]);
        assert_eq!(*state.snapshot, snapshot_for(FREMONT));
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn server_error_keeps_previous_snapshot() {
        let mut weather = StubWeather::default();
        weather.fail(NOIDA, AcquisitionError::InvalidResponse { status: 500 });
        let h = harness(cities(), weather, StubPlatform::at(FREMONT), None);
        h.orchestrator.set_place("Fremont");
        h.orchestrator.settled().await;
        let before = h.orchestrator.state();

        h.orchestrator.set_place("Noida");
        h.orchestrator.settled().await;

        let after = h.orchestrator.state();
        let expected = AcquisitionError::InvalidResponse { status: 500 };
        assert_eq!(after.last_error, Some(expected));
        assert!(!after.is_loading);
        assert!(!after.is_invalid_place);
        assert!(Arc::ptr_eq(&before.snapshot, &after.snapshot));
        assert_eq!(after.active_place, "Fremont");
    }

    #[tokio::test]
    async fn denied_permission_surfaces_mid_session() {
        let platform = StubPlatform {
            authorization: Authorization::Denied,
            ..StubPlatform::at(FREMONT)
        };
        let h = harness(cities(), StubWeather::default(), platform, None);

        h.orchestrator.use_current_location();
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert_eq!(state.last_error, Some(AcquisitionError::PermissionDenied));
        assert!(state.snapshot.is_empty());
        assert!(h.weather.calls().is_empty());
    }

    #[tokio::test]
    async fn startup_resolves_default_place() {
        let h = harness(
            cities(),
            StubWeather::default(),
            StubPlatform::at(FREMONT),
            Some(StartupSource::Place),
        );
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert_eq!(state.active_place, "Noida");
        assert_eq!(h.weather.calls(), vec![NOIDA]);
    }

    #[tokio::test]
    async fn startup_falls_back_to_default_coordinates() {
        let h = harness(
            StubGeocoder::default(),
            StubWeather::default(),
            StubPlatform::at(FREMONT),
            Some(StartupSource::Place),
        );
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert_eq!(h.weather.calls(), vec![DEFAULTS]);
        assert_eq!(state.active_place, "Noida");
        assert!(!state.is_invalid_place);
        assert!(state.last_error.is_none());
        assert!(!state.snapshot.is_empty());
    }

    #[tokio::test]
    async fn startup_without_location_permission_falls_back() {
        let platform = StubPlatform {
            authorization: Authorization::NotDetermined,
            ..StubPlatform::at(FREMONT)
        };
        let h = harness(
            cities(),
            StubWeather::default(),
            platform,
            Some(StartupSource::CurrentLocation),
        );
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        assert_eq!(h.weather.calls(), vec![DEFAULTS]);
        assert!(state.last_error.is_none());
        assert_eq!(h.platform.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn startup_fetch_failure_is_not_masked() {
        let mut weather = StubWeather::default();
        weather.fail(DEFAULTS, AcquisitionError::TransportError("offline".into()));
        let h = harness(
            StubGeocoder::default(),
            weather,
            StubPlatform::at(FREMONT),
            Some(StartupSource::Place),
        );
        h.orchestrator.settled().await;

        let state = h.orchestrator.state();
        let expected = AcquisitionError::TransportError("offline".into());
        assert_eq!(state.last_error, Some(expected));
        assert!(state.snapshot.is_empty());
    }

    #[tokio::test]
    async fn refresh_repeats_committed_place() {
        let h = basic();
        h.orchestrator.set_place("Noida");
        h.orchestrator.settled().await;
        h.orchestrator.set_place("###notacity###");
        h.orchestrator.settled().await;

        h.orchestrator.refresh();
        h.orchestrator.settled().await;

        assert_eq!(h.weather.calls(), vec![NOIDA, NOIDA]);
        assert_eq!(h.geocoder.forwards.load(Ordering::SeqCst), 3);
        let state = h.orchestrator.state();
        assert!(!state.is_invalid_place);
        assert_eq!(state.active_place, "Noida");
    }

    #[tokio::test]
    async fn refresh_after_fallback_reuses_pinned_coordinates() {
        let h = harness(
            StubGeocoder::default(),
            StubWeather::default(),
            StubPlatform::at(FREMONT),
            Some(StartupSource::Place),
        );
        h.orchestrator.settled().await;
        let lookups = h.geocoder.forwards.load(Ordering::SeqCst);

        h.orchestrator.refresh();
        h.orchestrator.settled().await;

        assert_eq!(h.weather.calls(), vec![DEFAULTS, DEFAULTS]);
        assert_eq!(h.geocoder.forwards.load(Ordering::SeqCst), lookups);
    }

    #[tokio::test]
    async fn refresh_with_nothing_committed_uses_device_location() {
        let geocoder = StubGeocoder {
            locality: Some("Fremont".into()),
            ..cities()
        };
        let h = harness(
            geocoder,
            StubWeather::default(),
            StubPlatform::at(FREMONT),
            None,
        );

        h.orchestrator.refresh();
        h.orchestrator.settled().await;

        assert_eq!(h.platform.requests.load(Ordering::SeqCst), 1);
        assert_eq!(h.orchestrator.state().active_place, "Fremont");
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_fires_on_interval() {
        let geocoder = Arc::new(cities());
        let weather = Arc::new(StubWeather::default());
        let location = DeviceLocationProvider::with_limits(
            Arc::new(StubPlatform::at(FREMONT)),
            Duration::from_secs(10),
            Duration::ZERO,
        );
        let pipeline = Pipeline {
            resolver: CoordinateResolver::new(geocoder),
            location: Arc::new(location),
            weather: weather.clone(),
        };
        let settings = OrchestratorSettings {
            default_place: "Noida".into(),
            default_coordinates: DEFAULTS,
            startup: Some(StartupSource::Place),
            refresh_interval: Some(Duration::from_secs(600)),
        };
        let (orchestrator, _task) = Orchestrator::spawn(pipeline, settings);
        orchestrator.settled().await;
        assert_eq!(weather.calls().len(), 1);

        tokio::time::advance(Duration::from_secs(601)).await;
        wait_for(&orchestrator, |s| s.generation == 2).await;
        orchestrator.settled().await;

        assert_eq!(weather.calls(), vec![NOIDA, NOIDA]);
    }

    #[tokio::test]
    async fn actor_stops_when_handles_are_dropped() {
        let geocoder = Arc::new(cities());
        let pipeline = Pipeline {
            resolver: CoordinateResolver::new(geocoder),
            location: Arc::new(DeviceLocationProvider::with_limits(
                Arc::new(StubPlatform::at(FREMONT)),
                Duration::from_secs(10),
                Duration::ZERO,
            )),
            weather: Arc::new(StubWeather::default()),
        };
        let settings = OrchestratorSettings {
            default_place: "Noida".into(),
            default_coordinates: DEFAULTS,
            startup: None,
            refresh_interval: None,
        };
        let (orchestrator, task) = Orchestrator::spawn(pipeline, settings);
        orchestrator.set_place("Fremont");
        drop(orchestrator);

        task.await.unwrap();
    }
}
