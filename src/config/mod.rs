// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for smugvision
//!
//! Configuration is read from YAML by default, or JSON when the file
//! extension is `.json`. Every section has defaults so a minimal file only
//! needs the SmugMug credentials.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, SmugvisionError};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// SmugMug API credentials
    #[serde(default)]
    pub smugmug: SmugMugConfig,

    /// Vision model settings
    #[serde(default)]
    pub vision: VisionConfig,

    /// Face recognition settings
    #[serde(default)]
    pub face_recognition: FaceConfig,

    /// Per-image processing rules
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Location resolution settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Relationship graph file
    #[serde(default = "default_relationships_file")]
    pub relationships_file: String,

    /// Prompt templates
    #[serde(default)]
    pub prompts: PromptConfig,

    /// Metadata write history
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SmugMugConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub user_token: String,
    #[serde(default)]
    pub user_secret: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VisionConfig {
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FaceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reference_faces_dir")]
    pub reference_faces_dir: String,
    /// Face detection service that turns image bytes into encodings
    #[serde(default = "default_face_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_face_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_face_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_marker_tag")]
    pub marker_tag: String,
    #[serde(default = "default_true")]
    pub generate_captions: bool,
    #[serde(default = "default_true")]
    pub generate_tags: bool,
    /// Add identified people's names as keywords
    #[serde(default = "default_true")]
    pub tag_people: bool,
    #[serde(default = "default_true")]
    pub preserve_existing: bool,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_true")]
    pub use_exif_location: bool,
    #[serde(default = "default_true")]
    pub skip_videos: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocationConfig {
    #[serde(default = "default_locations_file")]
    pub custom_locations_file: String,
    #[serde(default = "default_true")]
    pub use_aliases_as_tags: bool,
    /// Decimal places used for the resolution cache key
    #[serde(default = "default_cache_precision")]
    pub cache_precision: u32,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub venue_search: VenueSearchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeocodingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reverse_url")]
    pub reverse_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Minimum gap between two geocoding requests, process-wide
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_geocode_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VenueSearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_overpass_url")]
    pub url: String,
    #[serde(default = "default_venue_radius")]
    pub radius_m: f64,
    /// OSM keys a POI must carry to be considered a venue
    #[serde(default = "default_venue_categories")]
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_caption_prompt")]
    pub caption: String,
    #[serde(default = "default_tags_prompt")]
    pub tags: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_vision_model() -> String { "llama3.2-vision".to_string() }
fn default_vision_endpoint() -> String { "http://localhost:11434".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 150 }
fn default_vision_timeout() -> u64 { 120 }
fn default_reference_faces_dir() -> String { "~/.smugvision/reference_faces".to_string() }
fn default_face_endpoint() -> String { "http://localhost:8765/encode".to_string() }
fn default_tolerance() -> f64 { 0.6 }
fn default_min_confidence() -> f64 { 0.25 }
fn default_face_cache_file() -> String { "~/.smugvision/cache/face_encodings.json".to_string() }
fn default_face_timeout() -> u64 { 60 }
fn default_marker_tag() -> String { "smugvision".to_string() }
fn default_image_size() -> String { "Medium".to_string() }
fn default_locations_file() -> String { "~/.smugvision/locations.yaml".to_string() }
fn default_relationships_file() -> String { "~/.smugvision/relationships.yaml".to_string() }
fn default_history_file() -> String { "~/.smugvision/history.jsonl".to_string() }
fn default_cache_precision() -> u32 { 5 }
fn default_reverse_url() -> String { "https://nominatim.openstreetmap.org/reverse".to_string() }
fn default_user_agent() -> String { format!("smugvision/{}", env!("CARGO_PKG_VERSION")) }
fn default_min_interval_ms() -> u64 { 1000 }
fn default_geocode_timeout() -> u64 { 5 }
fn default_overpass_url() -> String { "https://overpass-api.de/api/interpreter".to_string() }
fn default_venue_radius() -> f64 { 200.0 }

fn default_venue_categories() -> Vec<String> {
    vec!["amenity", "tourism", "leisure", "shop", "historic", "building"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_caption_prompt() -> String {
    "Analyze this image and provide a concise, descriptive caption (1-2 sentences) \
     that describes the main subject, setting, and any notable activities or features.\
     {context}".to_string()
}

fn default_tags_prompt() -> String {
    "Generate 5-10 simple, single-word or short-phrase keyword tags for this image. \
     Focus on subjects, activities, setting, colors and mood. \
     Provide ONLY a comma-separated list of simple tags, nothing else.\
     {context}".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            smugmug: SmugMugConfig::default(),
            vision: VisionConfig::default(),
            face_recognition: FaceConfig::default(),
            processing: ProcessingConfig::default(),
            location: LocationConfig::default(),
            relationships_file: default_relationships_file(),
            prompts: PromptConfig::default(),
            history_file: default_history_file(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: default_vision_model(),
            endpoint: default_vision_endpoint(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_vision_timeout(),
        }
    }
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reference_faces_dir: default_reference_faces_dir(),
            endpoint: default_face_endpoint(),
            tolerance: default_tolerance(),
            min_confidence: default_min_confidence(),
            use_cache: true,
            cache_file: default_face_cache_file(),
            timeout_secs: default_face_timeout(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            marker_tag: default_marker_tag(),
            generate_captions: true,
            generate_tags: true,
            tag_people: true,
            preserve_existing: true,
            image_size: default_image_size(),
            use_exif_location: true,
            skip_videos: true,
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            custom_locations_file: default_locations_file(),
            use_aliases_as_tags: true,
            cache_precision: default_cache_precision(),
            geocoding: GeocodingConfig::default(),
            venue_search: VenueSearchConfig::default(),
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reverse_url: default_reverse_url(),
            user_agent: default_user_agent(),
            min_interval_ms: default_min_interval_ms(),
            timeout_secs: default_geocode_timeout(),
        }
    }
}

impl Default for VenueSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_overpass_url(),
            radius_m: default_venue_radius(),
            categories: default_venue_categories(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            caption: default_caption_prompt(),
            tags: default_tags_prompt(),
        }
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl AppConfig {
    /// Load configuration from a YAML or JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = if is_json(path) {
                serde_json::from_str(&content)
                    .map_err(|e| SmugvisionError::Config(format!("Failed to parse config: {}", e)))?
            } else {
                serde_yaml::from_str(&content)
                    .map_err(|e| SmugvisionError::Config(format!("Failed to parse config: {}", e)))?
            };
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration, choosing the format from the file extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check ranges of numeric settings
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let faces = &self.face_recognition;
        if !(0.0..=1.0).contains(&faces.tolerance) {
            problems.push(format!("face_recognition.tolerance must be within 0..1, got {}", faces.tolerance));
        }
        if !(0.0..=1.0).contains(&faces.min_confidence) {
            problems.push(format!(
                "face_recognition.min_confidence must be within 0..1, got {}",
                faces.min_confidence
            ));
        }
        if self.location.cache_precision > 10 {
            problems.push(format!(
                "location.cache_precision must be at most 10, got {}",
                self.location.cache_precision
            ));
        }
        if self.location.venue_search.radius_m <= 0.0 {
            problems.push("location.venue_search.radius_m must be positive".to_string());
        }
        if self.processing.marker_tag.trim().is_empty() {
            problems.push("processing.marker_tag must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SmugvisionError::Config(problems.join("; ")))
        }
    }

    /// Validate everything `process` needs, including credentials
    pub fn validate_for_processing(&self) -> Result<()> {
        self.validate()?;

        let missing: Vec<&str> = [
            ("smugmug.api_key", &self.smugmug.api_key),
            ("smugmug.api_secret", &self.smugmug.api_secret),
            ("smugmug.user_token", &self.smugmug.user_token),
            ("smugmug.user_secret", &self.smugmug.user_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SmugvisionError::Config(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}
