use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, Select, Text};
use weather_core::{
    AcquisitionState, Config, Orchestrator, OrchestratorSettings, Pipeline, StartupSource,
    model::Units,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set the API key, default place and location consent.
    Configure,

    /// Show weather for a place name.
    Show {
        /// City or place name.
        place: String,
    },

    /// Show weather for the current (approximate) location.
    Here,

    /// Keep printing the weather as it changes until Ctrl+C.
    Watch {
        /// Start with this place instead of the configured startup source.
        #[arg(long)]
        place: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { place } => {
                let orchestrator = start(&Config::load()?, None)?;
                orchestrator.set_place(place);
                orchestrator.settled().await;
                report(&orchestrator.state())
            }
            Command::Here => {
                let orchestrator = start(&Config::load()?, None)?;
                orchestrator.use_current_location();
                orchestrator.settled().await;
                report(&orchestrator.state())
            }
            Command::Watch { place } => watch(place).await,
        }
    }
}

fn start(config: &Config, startup: Option<StartupSource>) -> anyhow::Result<Orchestrator> {
    let pipeline = Pipeline::from_config(config)?;
    let settings = OrchestratorSettings {
        startup,
        ..OrchestratorSettings::from_config(config)
    };
    let (orchestrator, _task) = Orchestrator::spawn(pipeline, settings);
    Ok(orchestrator)
}

/// Print the final state; a failed or invalid acquisition is an error exit.
fn report(state: &AcquisitionState) -> anyhow::Result<()> {
    print!("{}", render::state(state));

    if let Some(err) = &state.last_error {
        if state.is_invalid_place {
            bail!("{err}");
        }
        return Err(err.clone()).context("Could not fetch weather");
    }
    if state.is_invalid_place {
        bail!("Place not found");
    }
    Ok(())
}

async fn watch(place: Option<String>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let startup = if place.is_some() {
        None
    } else {
        Some(config.startup)
    };
    let orchestrator = start(&config, startup)?;
    if let Some(place) = place {
        orchestrator.set_place(place);
    }

    let mut states = orchestrator.subscribe();
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if state.is_loading {
                    println!("Loading...");
                } else {
                    print!("{}", render::state(&state));
                    println!();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                break;
            }
        }
    }

    Ok(())
}

fn configure() -> anyhow::Result<()> {
    let path = Config::config_file_path()?;
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key")
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.set_api_key(api_key.trim().to_string());
    }

    config.default_place = Text::new("Default place:")
        .with_default(&config.default_place)
        .prompt()?;

    let units = Select::new("Units:", vec![Units::Imperial, Units::Metric])
        .with_starting_cursor(if config.units == Units::Metric { 1 } else { 0 })
        .prompt()?;
    config.units = units;

    config.location.allow_network_lookup =
        Confirm::new("Allow approximating your location from your IP address?")
            .with_default(config.location.allow_network_lookup)
            .prompt()?;

    config.startup = if config.location.allow_network_lookup
        && Confirm::new("Start `watch` from your current location?")
            .with_default(config.startup == StartupSource::CurrentLocation)
            .prompt()?
    {
        StartupSource::CurrentLocation
    } else {
        StartupSource::Place
    };

    config.save()?;
    println!("Configuration saved to {}", path.display());
    tracing::debug!(path = %path.display(), "Config written");
    Ok(())
}
