// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! smugvision: AI caption and keyword enrichment for SmugMug galleries

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use smugvision::config::{expand_path, AppConfig};
use smugvision::faces::references::load_identities;
use smugvision::faces::remote::RemoteFaceDetector;
use smugvision::faces::FaceMatcher;
use smugvision::formatter::MetadataFormatter;
use smugvision::geo::Coordinate;
use smugvision::history::History;
use smugvision::location::{
    load_custom_locations, CustomLocation, GeocodeLimiter, Geocoder, LocationResolver, NominatimGeocoder,
    ResolverSettings,
};
use smugvision::processor::{BatchStats, ImageProcessor, Outcome, ProcessOptions, ProcessorSettings};
use smugvision::relationships::RelationshipGraph;
use smugvision::smugmug::{PhotoHost, SmugMugClient};
use smugvision::vision::{OllamaClient, VisionModel};

const DEFAULT_CONFIG: &str = "~/.smugvision/config.yaml";

/// smugvision CLI - caption and tag SmugMug albums with a local vision model
#[derive(Parser, Debug)]
#[command(name = "smugvision")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "AI caption and keyword enrichment for SmugMug galleries", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (YAML, or JSON by extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG, global = true)]
    config: String,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Caption and tag every image in an album
    Process {
        /// SmugMug album key
        album_key: String,

        /// Reprocess images that already carry the marker tag
        #[arg(long)]
        force: bool,

        /// Run the pipeline but don't write anything to SmugMug
        #[arg(long)]
        dry_run: bool,

        /// Process videos even when configured to skip them
        #[arg(long)]
        include_videos: bool,
    },

    /// Show vision model and collaborator status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Custom locations and geocoding
    Locations {
        #[command(subcommand)]
        action: LocationCommands,
    },

    /// History and undo operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path (defaults to --config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,
}

#[derive(Subcommand, Debug)]
enum LocationCommands {
    /// List custom locations
    List,

    /// Resolve a coordinate to a place name
    Resolve {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent metadata writes
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Restore the metadata that recent writes replaced
    Undo {
        /// Number of writes to undo
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Show what would be undone
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = expand_path(&cli.config);
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    match cli.command {
        Commands::Process {
            album_key,
            force,
            dry_run,
            include_videos,
        } => {
            let options = ProcessOptions {
                force,
                dry_run,
                include_videos,
            };
            run_process(config, &album_key, options, &cli.format).await
        }
        Commands::Status => run_status(config).await,
        Commands::Config { action } => run_config_command(config, action, &config_path),
        Commands::Locations { action } => run_locations_command(config, action, &cli.format).await,
        Commands::History { action } => run_history_command(config, action).await,
    }
}

fn build_resolver(config: &AppConfig) -> anyhow::Result<LocationResolver> {
    let location = &config.location;

    let custom = load_custom_locations_file(config)?;

    let geocoder: Option<Arc<dyn Geocoder>> = if location.geocoding.enabled {
        let geocoder = NominatimGeocoder::new(&location.geocoding, &location.venue_search)
            .context("creating geocoding client")?;
        Some(Arc::new(geocoder))
    } else {
        None
    };

    let limiter = Arc::new(GeocodeLimiter::new(Duration::from_millis(
        location.geocoding.min_interval_ms,
    )));

    Ok(LocationResolver::new(
        custom,
        geocoder,
        limiter,
        ResolverSettings::from_config(location),
    ))
}

fn load_custom_locations_file(config: &AppConfig) -> anyhow::Result<Vec<CustomLocation>> {
    let file = &config.location.custom_locations_file;
    if file.trim().is_empty() {
        return Ok(Vec::new());
    }
    let path = expand_path(file);
    if !path.exists() {
        warn!("Custom locations file not found: {}", path.display());
        return Ok(Vec::new());
    }
    let custom = load_custom_locations(&path)
        .with_context(|| format!("loading custom locations from {}", path.display()))?;
    info!("Loaded {} custom locations", custom.len());
    Ok(custom)
}

fn load_relationships(config: &AppConfig) -> anyhow::Result<RelationshipGraph> {
    let file = &config.relationships_file;
    if file.trim().is_empty() {
        return Ok(RelationshipGraph::default());
    }
    let path = expand_path(file);
    if !path.exists() {
        return Ok(RelationshipGraph::default());
    }
    RelationshipGraph::load(&path).with_context(|| format!("loading relationships from {}", path.display()))
}

async fn build_face_matcher(config: &AppConfig) -> anyhow::Result<Option<(Arc<RemoteFaceDetector>, FaceMatcher)>> {
    let faces = &config.face_recognition;
    if !faces.enabled {
        return Ok(None);
    }

    let detector = RemoteFaceDetector::new(faces).context("creating face detector client")?;
    let cache = faces.use_cache.then(|| expand_path(&faces.cache_file));
    let identities = match load_identities(
        &expand_path(&faces.reference_faces_dir),
        &detector,
        cache.as_deref(),
    )
    .await
    {
        Ok(identities) => identities,
        Err(e) => {
            warn!("Face recognition disabled: {}", e);
            return Ok(None);
        }
    };

    let matcher = FaceMatcher::new(identities, faces.tolerance, faces.min_confidence);
    info!("Loaded {} reference identities", matcher.identities().len());
    Ok(Some((Arc::new(detector), matcher)))
}

/// Process an album
async fn run_process(config: AppConfig, album_key: &str, options: ProcessOptions, format: &str) -> anyhow::Result<()> {
    config.validate_for_processing()?;

    if options.dry_run {
        warn!("DRY RUN MODE - no metadata will be written to SmugMug");
    }

    let vision = OllamaClient::new(&config.vision)?;
    match vision.model_available().await {
        Ok(true) => info!("Vision model '{}' available", vision.model_name()),
        Ok(false) => warn!("Vision model '{}' not found on the Ollama server", vision.model_name()),
        Err(e) => warn!("Could not query Ollama models: {}", e),
    }

    let host: Arc<dyn PhotoHost> = Arc::new(SmugMugClient::new(&config.smugmug)?);
    let mut processor = ImageProcessor::new(
        host,
        Arc::new(vision),
        MetadataFormatter::from_config(&config.processing),
        ProcessorSettings::from_config(&config),
    )
    .with_location(Arc::new(build_resolver(&config)?))
    .with_relationships(load_relationships(&config)?)
    .with_history(History::new(expand_path(&config.history_file)));

    if let Some((detector, matcher)) = build_face_matcher(&config).await? {
        processor = processor.with_faces(detector, matcher);
    }

    let stats = processor
        .process_album(album_key, options)
        .await
        .with_context(|| format!("processing album {}", album_key))?;

    print_stats(&stats, format)?;

    if let Some(reason) = &stats.aborted {
        anyhow::bail!("batch aborted: {}", reason);
    }
    Ok(())
}

fn print_stats(stats: &BatchStats, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(stats)?),
        "jsonl" => {
            for result in &stats.results {
                println!("{}", serde_json::to_string(result)?);
            }
        }
        _ => {
            for result in &stats.results {
                let status = match &result.outcome {
                    Outcome::Processed { written: true } => "updated".to_string(),
                    Outcome::Processed { written: false } => "proposed".to_string(),
                    Outcome::Skipped { reason } => format!("skipped ({:?})", reason),
                    Outcome::Errored { stage, message } => format!("error at {:?}: {}", stage, message),
                };
                println!("{}: {}", result.file_name, status);
                if let Some(update) = &result.proposed {
                    println!("    Caption:  {}", update.caption);
                    println!("    Keywords: {}", update.keywords_string());
                }
            }

            println!();
            println!("Album summary{}", if stats.dry_run { " (dry run)" } else { "" });
            println!("  Total:     {}", stats.total);
            println!("  Processed: {}", stats.processed);
            println!("  Skipped:   {}", stats.skipped);
            println!("  Errors:    {}", stats.errored);
            if stats.not_attempted > 0 {
                println!("  Not attempted: {}", stats.not_attempted);
            }
            println!("  Faces: {} detected, {} identified", stats.faces_detected, stats.people_identified);
            println!("  Locations resolved: {}", stats.locations_resolved);
            println!("  Duration: {:.1}s ({:.0}% success)", stats.duration_secs(), stats.success_rate());
            for failure in &stats.failures {
                println!("  ! {} ({}) at {:?}: {}", failure.file_name, failure.image_key, failure.stage, failure.message);
            }
        }
    }
    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> anyhow::Result<()> {
    let client = OllamaClient::new(&config.vision)?;

    println!("smugvision v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");

    match client.health_check().await {
        Ok(()) => println!("Ollama: Running ({})", config.vision.endpoint),
        Err(e) => println!("Ollama: Error - {}", e),
    }

    match client.list_models().await {
        Ok(models) => {
            println!("\nAvailable models:");
            for m in &models {
                let marker = if m.starts_with(config.vision.model.as_str()) { "→" } else { " " };
                println!("  {} {}", marker, m);
            }
        }
        Err(e) => println!("  Error listing models: {}", e),
    }

    println!("\nConfiguration:");
    println!("  Vision model: {}", config.vision.model);
    println!(
        "  SmugMug credentials: {}",
        if config.validate_for_processing().is_ok() { "configured" } else { "missing" }
    );
    println!(
        "  Face recognition: {}",
        if config.face_recognition.enabled { config.face_recognition.endpoint.as_str() } else { "disabled" }
    );
    match load_custom_locations_file(&config) {
        Ok(custom) => println!("  Custom locations: {}", custom.len()),
        Err(e) => println!("  Custom locations: Error - {:#}", e),
    }
    println!(
        "  Geocoding: {}",
        if config.location.geocoding.enabled { config.location.geocoding.reverse_url.as_str() } else { "disabled" }
    );

    let history = History::new(expand_path(&config.history_file));
    println!("  History entries: {}", history.read_all()?.len());

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_yaml::to_string(&config)?);
        }
        ConfigCommands::Generate { output, force } => {
            let output = output.unwrap_or_else(|| config_path.to_path_buf());
            if output.exists() && !force {
                anyhow::bail!("{} already exists. Use --force to overwrite", output.display());
            }
            AppConfig::default().save(&output)?;
            println!("Generated config at {}", output.display());
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {} is valid", config_path.display());
            if let Err(e) = config.validate_for_processing() {
                println!("  Note: {}", e);
            }
            println!("  Vision model: {}", config.vision.model);
            println!("  Marker tag: {}", config.processing.marker_tag);
        }
    }

    Ok(())
}

/// Run location commands
async fn run_locations_command(config: AppConfig, action: LocationCommands, format: &str) -> anyhow::Result<()> {
    match action {
        LocationCommands::List => {
            let resolver = build_resolver(&config)?;
            let custom = resolver.custom_locations();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(custom)?);
                return Ok(());
            }
            println!("Custom locations ({}):", custom.len());
            for location in custom {
                println!("  {} ({}, {:.0}m)", location.name, location.center, location.radius_m);
                if !location.aliases.is_empty() {
                    println!("    aliases: {}", location.aliases.join(", "));
                }
            }
        }
        LocationCommands::Resolve { latitude, longitude } => {
            let coordinate = Coordinate::new(latitude, longitude)?;
            let resolver = build_resolver(&config)?;
            let found = resolver.resolve(coordinate).await;
            match format {
                "json" | "jsonl" => println!("{}", serde_json::to_string(&found)?),
                _ => {
                    println!("{} -> {} ({:?})", coordinate, found.name, found.source);
                    if let Some(distance) = found.distance_m.filter(|_| found.is_custom()) {
                        println!("  {:.1}m from the custom location center", distance);
                    }
                    let tags = found.tags(config.location.use_aliases_as_tags);
                    if !tags.is_empty() {
                        println!("  tags: {}", tags.join(", "));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Run history commands
async fn run_history_command(config: AppConfig, action: HistoryCommands) -> anyhow::Result<()> {
    let history = History::new(expand_path(&config.history_file));

    match action {
        HistoryCommands::List { count } => {
            let entries = history.get_recent(count)?;
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                let status = if entry.undone { "[UNDONE]" } else { "" };
                println!(
                    "  {} {} ({}) {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.file_name,
                    entry.image_key,
                    status
                );
                println!("    {}", entry.new_caption);
            }
        }
        HistoryCommands::Undo { count, dry_run } => {
            let to_undo: Vec<_> = history.get_undoable()?.into_iter().take(count).collect();
            if to_undo.is_empty() {
                println!("No metadata writes to undo");
                return Ok(());
            }

            let host = if dry_run {
                None
            } else {
                config.validate_for_processing()?;
                Some(SmugMugClient::new(&config.smugmug)?)
            };

            for entry in to_undo {
                let restore = entry.restore_update();
                match &host {
                    None => println!("Would restore {}: {:?}", entry.file_name, restore.caption),
                    Some(host) => {
                        host.update_metadata(&entry.image_key, &restore)
                            .await
                            .with_context(|| format!("restoring {}", entry.file_name))?;
                        history.mark_undone(&entry.id)?;
                        println!("Restored {} ({})", entry.file_name, entry.image_key);
                    }
                }
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["smugvision"]).is_err());
    }

    #[test]
    fn test_cli_process_command() {
        let cli = Cli::try_parse_from(["smugvision", "process", "abc123", "--dry-run", "--force", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, DEFAULT_CONFIG);

        match cli.command {
            Commands::Process {
                album_key,
                force,
                dry_run,
                include_videos,
            } => {
                assert_eq!(album_key, "abc123");
                assert!(force && dry_run);
                assert!(!include_videos);
            }
            _ => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_cli_resolve_negative_coordinates() {
        let cli = Cli::try_parse_from(["smugvision", "locations", "resolve", "38.12", "-85.65"]).unwrap();
        match cli.command {
            Commands::Locations {
                action: LocationCommands::Resolve { latitude, longitude },
            } => {
                assert_eq!(latitude, 38.12);
                assert_eq!(longitude, -85.65);
            }
            _ => panic!("Expected locations resolve"),
        }
    }

    #[test]
    fn test_cli_history_undo_and_format() {
        let cli = Cli::try_parse_from(["smugvision", "--format", "json", "history", "undo", "--count", "3"]).unwrap();
        assert_eq!(cli.format, "json");
        match cli.command {
            Commands::History {
                action: HistoryCommands::Undo { count, dry_run },
            } => {
                assert_eq!(count, 3);
                assert!(!dry_run);
            }
            _ => panic!("Expected history undo"),
        }

        assert!(Cli::try_parse_from(["smugvision", "--format", "xml", "status"]).is_err());
    }
}
