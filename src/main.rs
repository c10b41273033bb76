//! `PollenCast` CLI - personalized pollen risk forecasts

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use pollencast::config::PollenCastConfig;
use pollencast::geo::format_distance;
use pollencast::location_manager::LocationManager;
use pollencast::logging::init_tracing;
use pollencast::models::{PollenCategory, RiskResult};
use pollencast::providers::{
    GooglePollenClient, OpenMeteoGeocoder, PlaceSearch, RangeValidator, UnsupportedDetector,
};
use pollencast::storage::FjallStore;
use pollencast::{ForecastOrchestrator, PollenSession, SensitivityManager, distance_meters};

#[derive(Parser)]
#[command(name = "pollencast")]
#[command(about = "Personalized pollen risk forecasts")]
#[command(version)]
struct Cli {
    /// Path to config file (default: pollencast.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the personalized forecast for the current location
    Forecast {
        /// Use these coordinates ("lat,lon") instead of the stored location
        #[arg(long)]
        at: Option<String>,

        /// Number of days (1-5)
        #[arg(long)]
        days: Option<u32>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the sensitivity profile
    Sensitivity {
        #[command(subcommand)]
        action: SensitivityAction,
    },
    /// Manage the current and saved locations
    Location {
        #[command(subcommand)]
        action: LocationAction,
    },
}

#[derive(Subcommand)]
enum SensitivityAction {
    /// Show the stored profile
    Show,
    /// Update one or more categories (1-10)
    Set {
        #[arg(long)]
        tree: Option<String>,
        #[arg(long)]
        grass: Option<String>,
        #[arg(long)]
        weed: Option<String>,
    },
    /// Restore the default profile
    Reset,
}

#[derive(Subcommand)]
enum LocationAction {
    /// Set the current location from coordinates
    Set {
        /// Coordinates as "lat,lon"
        coordinates: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Search for a place by name
    Search {
        query: String,
        /// Use the Nth result (1-based) as the current location
        #[arg(long)]
        select: Option<usize>,
    },
    /// Save the current location
    Save {
        #[arg(long)]
        name: Option<String>,
    },
    /// List saved locations
    List,
    /// Remove a saved location by its list number
    Remove { number: usize },
    /// Use a saved location by its list number
    Use { number: usize },
    /// Toggle automatic location detection
    Auto,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PollenCastConfig::load_from_path(cli.config)?;
    init_tracing(&config.logging)?;
    // A one-shot process saves explicitly
    config.sensitivity.auto_save = false;

    let store = Arc::new(
        FjallStore::open(&config.storage.path)
            .with_context(|| format!("Failed to open settings store at {}", config.storage.path))?,
    );
    let location = Arc::new(LocationManager::new(
        config.location.clone(),
        Arc::new(UnsupportedDetector),
        store.clone(),
    ));
    let sensitivity = SensitivityManager::new(config.sensitivity.clone(), store, Arc::new(RangeValidator));

    match cli.command {
        Commands::Forecast { at, days, json } => {
            let provider = GooglePollenClient::new(&config.provider)?;
            let forecast = Arc::new(ForecastOrchestrator::new(
                config.forecast.clone(),
                Arc::new(provider),
            ));
            let session = PollenSession::new(location, sensitivity, forecast);
            run_forecast(&session, at.as_deref(), days, json).await
        }
        Commands::Sensitivity { action } => run_sensitivity(&sensitivity, action).await,
        Commands::Location { action } => run_location(&location, &config, action).await,
    }
}

async fn run_forecast(
    session: &PollenSession,
    at: Option<&str>,
    days: Option<u32>,
    json: bool,
) -> Result<()> {
    let profile = session.sensitivity().load().await;
    session.location().load().await;

    if let Some(input) = at {
        session.location().set_manual(input, None).await?;
    }
    let Some(location) = session.location().current_location() else {
        anyhow::bail!("No location set. Use `pollencast location set <lat,lon>` or pass --at.");
    };

    let outcome = match days {
        Some(days) => session.forecast().fetch_days(&location, &profile, days).await,
        None => session.forecast().fetch_data(&location, &profile).await,
    }
    .map_err(|err| anyhow::anyhow!("{} ({})", err.user_message(), err.code()))?;
    debug!("Forecast outcome: {:?}", outcome);

    let forecast = session.forecast().forecast();
    if json {
        println!("{}", serde_json::to_string_pretty(&forecast)?);
        return Ok(());
    }

    println!(
        "Pollen forecast for {} (sensitivity {})",
        location.display_label(),
        profile.request_key()
    );
    for (index, day) in forecast.iter().enumerate() {
        print_day(day);
        if let Some(trend) = session.forecast().trend(index) {
            println!("  Trend: {}", trend.description());
        }
        if let Some(recommendation) = session.forecast().activity_recommendation(index) {
            match &recommendation.best_time {
                Some(best_time) => println!(
                    "  Outdoors: {} ({}), best time: {}",
                    recommendation.activity, recommendation.reason, best_time
                ),
                None => println!(
                    "  Outdoors: {} ({})",
                    recommendation.activity, recommendation.reason
                ),
            }
        }
    }
    Ok(())
}

fn print_day(day: &RiskResult) {
    println!();
    println!(
        "{}: {} ({:.1})",
        day.date.format("%a %Y-%m-%d"),
        day.aggregate_level,
        day.aggregate_score
    );
    for category in &day.categories {
        let season = if category.in_season { "" } else { ", out of season" };
        println!(
            "  {:<6} index {:.0} -> {:.1} {}{}",
            category.category.to_string(),
            category.raw_index, category.score, category.level, season
        );
    }
    for advisory in &day.advisories {
        println!("  - {advisory}");
    }
}

async fn run_sensitivity(sensitivity: &SensitivityManager, action: SensitivityAction) -> Result<()> {
    sensitivity.load().await;

    match action {
        SensitivityAction::Show => {}
        SensitivityAction::Set { tree, grass, weed } => {
            let edits = [
                (PollenCategory::Tree, tree),
                (PollenCategory::Grass, grass),
                (PollenCategory::Weed, weed),
            ];
            if edits.iter().all(|(_, value)| value.is_none()) {
                anyhow::bail!("Nothing to set. Pass --tree, --grass or --weed.");
            }
            for (category, value) in edits {
                if let Some(value) = value {
                    sensitivity.set_category_input(category, &value)?;
                }
            }
            sensitivity.save().await?;
        }
        SensitivityAction::Reset => {
            sensitivity.reset_to_defaults();
            sensitivity.save().await?;
        }
    }

    let profile = sensitivity.profile();
    for category in PollenCategory::ALL {
        println!("{:<6} {}", category.to_string(), profile.get(category));
    }
    Ok(())
}

async fn run_location(
    location: &LocationManager,
    config: &PollenCastConfig,
    action: LocationAction,
) -> Result<()> {
    location.load().await;

    match action {
        LocationAction::Set { coordinates, name } => {
            let current = location.set_manual(&coordinates, name.as_deref()).await?;
            println!("Current location: {}", current.display_label());
        }
        LocationAction::Search { query, select } => {
            let geocoder = OpenMeteoGeocoder::new(&config.provider)?;
            let places = geocoder
                .search(&query, 5)
                .await
                .with_context(|| format!("Place search for '{query}' failed"))?;
            if places.is_empty() {
                println!("No places found for '{query}'");
                return Ok(());
            }
            match select {
                Some(number) => {
                    let place = number
                        .checked_sub(1)
                        .and_then(|index| places.get(index))
                        .with_context(|| format!("No search result number {number}"))?;
                    let current = location.set_from_place_selection(place).await?;
                    println!("Current location: {}", current.display_label());
                }
                None => {
                    for (index, place) in places.iter().enumerate() {
                        println!(
                            "{:>2}. {} ({:.4}, {:.4})",
                            index + 1,
                            place.address.as_deref().unwrap_or(&place.name),
                            place.latitude,
                            place.longitude
                        );
                    }
                }
            }
        }
        LocationAction::Save { name } => {
            let Some(current) = location.current_location() else {
                anyhow::bail!("No current location to save");
            };
            let saved = location.save_location(current, name.as_deref()).await?;
            println!("Saved {}", saved.display_label());
        }
        LocationAction::List => {
            let snapshot = location.snapshot();
            let current = snapshot.current();
            match current {
                Some(current) => println!("Current: {}", current.display_label()),
                None => println!("Current: not set"),
            }
            println!(
                "Auto-detect: {}",
                if snapshot.settings.auto_detect { "on" } else { "off" }
            );
            for (index, saved) in snapshot.settings.saved.iter().enumerate() {
                let distance = current
                    .map(|c| format!(" [{}]", format_distance(distance_meters(c.coordinates(), saved.coordinates()))))
                    .unwrap_or_default();
                println!(
                    "{:>2}. {} ({}){}",
                    index + 1,
                    saved.display_label(),
                    saved.format_coordinates(),
                    distance
                );
            }
        }
        LocationAction::Remove { number } => {
            let index = number.checked_sub(1).context("Location numbers start at 1")?;
            let removed = location.remove_location(index).await?;
            println!("Removed {}", removed.display_label());
        }
        LocationAction::Use { number } => {
            let index = number.checked_sub(1).context("Location numbers start at 1")?;
            let snapshot = location.snapshot();
            let saved = snapshot
                .settings
                .saved
                .get(index)
                .with_context(|| format!("No saved location number {number}"))?;
            location.select_saved_location(saved).await?;
            println!("Current location: {}", saved.display_label());
        }
        LocationAction::Auto => {
            let enabled = location.toggle_auto_detection().await;
            println!("Auto-detect: {}", if enabled { "on" } else { "off" });
        }
    }
    Ok(())
}
