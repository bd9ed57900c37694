use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use dashboard_cli::{Services, server};
use dashboard_core::{
    Config, DEFAULT_HOUR_COUNT, LocationQuery, PrecipitationUnit, ResolvedLocation,
    TemperatureUnit, UnitPreference, WindUnit, config::DefaultLocation,
};
use inquire::{Select, Text};
use serde::Serialize;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-dash", version, about = "U.S. weather dashboard: lookups, forecasts and a JSON server")]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively choose default units and location.
    Configure,

    /// Resolve a location to coordinates.
    Locate {
        /// ZIP code (e.g. "27511") or "City, ST".
        location: String,
    },

    /// Show current conditions.
    Current {
        location: String,

        /// Temperature unit, "C" or "F"; defaults to the configured unit.
        #[arg(long)]
        unit: Option<TemperatureUnit>,
    },

    /// Show the next few hours.
    Hourly {
        location: String,

        #[arg(long, default_value_t = DEFAULT_HOUR_COUNT)]
        hours: usize,

        #[arg(long)]
        unit: Option<TemperatureUnit>,
    },

    /// Show the seven-day outlook.
    Forecast {
        location: String,

        #[arg(long)]
        unit: Option<TemperatureUnit>,
    },

    /// Run the JSON dashboard server.
    Serve {
        /// Listen address; overrides `bind` from the config file.
        #[arg(long)]
        bind: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;

        match self.command {
            Command::Configure => configure(config).await,
            Command::Locate { location } => {
                let services = Services::from_config(&config)?;
                print_json(&locate(&services, &location).await?)
            }
            Command::Current { location, unit } => {
                let services = Services::from_config(&config)?;
                let loc = locate(&services, &location).await?;
                let units = preferred_units(&config, unit);
                let view = services.normalizer.current(&loc, &units).await?;
                print_json(&view)
            }
            Command::Hourly {
                location,
                hours,
                unit,
            } => {
                let services = Services::from_config(&config)?;
                let loc = locate(&services, &location).await?;
                let units = preferred_units(&config, unit);
                let view = services.normalizer.hourly(&loc, &units, hours).await?;
                print_json(&view)
            }
            Command::Forecast { location, unit } => {
                let services = Services::from_config(&config)?;
                let loc = locate(&services, &location).await?;
                let units = preferred_units(&config, unit);
                let view = services.normalizer.daily(&loc, &units).await?;
                print_json(&view)
            }
            Command::Serve { bind } => {
                let mut config = config;
                if let Some(bind) = bind {
                    config.bind = bind;
                }
                let addr = config.bind_addr()?;
                let services = Services::from_config(&config)?;
                let (app, _state) = server::build_app(services, config.defaults.clone());
                server::serve(app, addr).await
            }
        }
    }
}

fn preferred_units(config: &Config, unit: Option<TemperatureUnit>) -> UnitPreference {
    let units = config.defaults.units();
    match unit {
        Some(unit) => units.with_temperature(unit),
        None => units,
    }
}

async fn locate(services: &Services, input: &str) -> Result<ResolvedLocation> {
    let query = LocationQuery::parse(input).ok_or_else(|| {
        anyhow!("Could not read '{input}' as a location. Use a ZIP code like 27511 or \"City, ST\".")
    })?;

    services
        .resolver
        .resolve(&query)
        .await
        .ok_or_else(|| anyhow!("No U.S. location found for '{query}'"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}

async fn configure(mut config: Config) -> Result<()> {
    let defaults = &mut config.defaults;

    defaults.temperature = pick("Temperature unit:", TemperatureUnit::all(), defaults.temperature)?;
    defaults.wind = pick("Wind speed unit:", WindUnit::all(), defaults.wind)?;
    defaults.precipitation = pick(
        "Precipitation unit:",
        PrecipitationUnit::all(),
        defaults.precipitation,
    )?;

    let current = format!(
        "{}, {} {}",
        defaults.location.city, defaults.location.state, defaults.location.postal_code
    );
    let answer = Text::new("Default location (ZIP or \"City, ST\"):")
        .with_help_message(&format!("Leave empty to keep {}", current.trim()))
        .prompt()?;

    if !answer.trim().is_empty() {
        let services = Services::from_config(&config)?;
        let resolved = locate(&services, &answer).await?;
        println!("Default location set to {}", resolved.city_state);
        config.defaults.location = DefaultLocation::from(&resolved);
    }

    let path = config.save()?;
    println!("Configuration saved to {}", path.display());

    Ok(())
}

fn pick<T>(prompt: &str, options: &[T], current: T) -> Result<T>
where
    T: Copy + PartialEq + std::fmt::Display,
{
    let cursor = options.iter().position(|o| *o == current).unwrap_or(0);
    let choice = Select::new(prompt, options.to_vec())
        .with_starting_cursor(cursor)
        .prompt()?;
    Ok(choice)
}
