// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Album processing orchestrator
//!
//! Images are processed one at a time. Each walks the stages
//! `Unprocessed -> Downloading -> ContextExtracting -> Captioning ->
//! Formatting -> Updating -> Processed`, or goes straight from `Unprocessed`
//! to `Skipped`. A failure at any stage ends that image as errored without
//! stopping the batch, unless the host rejects our credentials.

mod stats;

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, PromptConfig};
use crate::exif;
use crate::faces::{unique_names, FaceDetector, FaceMatcher};
use crate::formatter::{parse_ai_tags, MetadataFormatter, MetadataUpdate};
use crate::history::{create_entry, History};
use crate::location::{LocationMatch, LocationResolver};
use crate::prompt::{render, PromptContext};
use crate::relationships::RelationshipGraph;
use crate::smugmug::{Album, AlbumImage, PhotoHost};
use crate::vision::VisionModel;
use crate::{Result, SmugvisionError};

pub use stats::{BatchStats, ImageFailure};

/// Where an image is in its processing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessingStage {
    Unprocessed,
    Downloading,
    ContextExtracting,
    Captioning,
    Formatting,
    Updating,
    Processed,
    Skipped,
}

impl ProcessingStage {
    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(self, next: ProcessingStage) -> bool {
        use ProcessingStage::*;
        matches!(
            (self, next),
            (Unprocessed, Downloading)
                | (Unprocessed, Skipped)
                | (Downloading, ContextExtracting)
                | (ContextExtracting, Captioning)
                | (Captioning, Formatting)
                | (Formatting, Updating)
                | (Formatting, Processed)
                | (Updating, Processed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStage::Processed | ProcessingStage::Skipped)
    }
}

/// Why an image was not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyProcessed,
    Video,
}

/// How an image's processing ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// `written` is false for dry runs
    Processed { written: bool },
    Skipped { reason: SkipReason },
    Errored { stage: ProcessingStage, message: String },
}

/// Per-image result
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub image_key: String,
    pub file_name: String,
    pub stages: Vec<ProcessingStage>,
    pub outcome: Outcome,
    pub existing_caption: Option<String>,
    pub existing_keywords: Vec<String>,
    pub proposed: Option<MetadataUpdate>,
    pub location: Option<LocationMatch>,
    pub people: Vec<String>,
    pub faces_detected: usize,
    pub ai_tags: usize,
    pub elapsed_ms: u64,
    /// Set when the error means no further image can succeed
    #[serde(skip)]
    pub fatal: bool,
}

impl ProcessingResult {
    fn new(image: &AlbumImage) -> Self {
        Self {
            image_key: image.image_key.clone(),
            file_name: image.file_name.clone(),
            stages: vec![ProcessingStage::Unprocessed],
            outcome: Outcome::Processed { written: false },
            existing_caption: image.caption.clone(),
            existing_keywords: image.keywords.clone(),
            proposed: None,
            location: None,
            people: Vec::new(),
            faces_detected: 0,
            ai_tags: 0,
            elapsed_ms: 0,
            fatal: false,
        }
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stages.last().copied().unwrap_or(ProcessingStage::Unprocessed)
    }

    fn advance(&mut self, next: ProcessingStage) {
        debug_assert!(self.stage().can_transition_to(next), "{:?} -> {:?}", self.stage(), next);
        self.stages.push(next);
    }
}

/// Per-run switches from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub force: bool,
    pub dry_run: bool,
    pub include_videos: bool,
}

/// Processing rules taken from configuration
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub image_size: String,
    pub generate_captions: bool,
    pub generate_tags: bool,
    pub use_location: bool,
    pub skip_videos: bool,
    pub use_aliases_as_tags: bool,
    pub prompts: PromptConfig,
}

impl ProcessorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            image_size: config.processing.image_size.clone(),
            generate_captions: config.processing.generate_captions,
            generate_tags: config.processing.generate_tags,
            use_location: config.processing.use_exif_location,
            skip_videos: config.processing.skip_videos,
            use_aliases_as_tags: config.location.use_aliases_as_tags,
            prompts: config.prompts.clone(),
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

struct StageError {
    stage: ProcessingStage,
    error: SmugvisionError,
}

trait AtStage<T> {
    fn at(self, stage: ProcessingStage) -> std::result::Result<T, StageError>;
}

impl<T, E: Into<SmugvisionError>> AtStage<T> for std::result::Result<T, E> {
    fn at(self, stage: ProcessingStage) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError { stage, error: e.into() })
    }
}

/// Sequences location, faces, captioning and formatting for each image
pub struct ImageProcessor {
    host: Arc<dyn PhotoHost>,
    vision: Arc<dyn VisionModel>,
    formatter: MetadataFormatter,
    settings: ProcessorSettings,
    resolver: Option<Arc<LocationResolver>>,
    faces: Option<(Arc<dyn FaceDetector>, FaceMatcher)>,
    relationships: RelationshipGraph,
    history: Option<History>,
}

impl ImageProcessor {
    pub fn new(
        host: Arc<dyn PhotoHost>,
        vision: Arc<dyn VisionModel>,
        formatter: MetadataFormatter,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            host,
            vision,
            formatter,
            settings,
            resolver: None,
            faces: None,
            relationships: RelationshipGraph::default(),
            history: None,
        }
    }

    pub fn with_location(mut self, resolver: Arc<LocationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_faces(mut self, detector: Arc<dyn FaceDetector>, matcher: FaceMatcher) -> Self {
        self.faces = Some((detector, matcher));
        self
    }

    pub fn with_relationships(mut self, relationships: RelationshipGraph) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    /// Process every image in an album.
    ///
    /// Only failing to read the album itself is returned as an error; per
    /// image failures are recorded in the returned stats.
    pub async fn process_album(&self, album_key: &str, options: ProcessOptions) -> Result<BatchStats> {
        let album = self.host.fetch_album(album_key).await?;
        let images = self.host.fetch_album_images(album_key).await?;
        info!("Processing album '{}' ({} images)", album.name, images.len());

        let mut stats = BatchStats::new(options.dry_run);
        let total = images.len();

        for (index, image) in images.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, total, image.file_name);
            let result = self.process_image(image, &album, options).await;
            let fatal = result.fatal;
            stats.record(&result);

            if fatal {
                let message = match &result.outcome {
                    Outcome::Errored { message, .. } => message.clone(),
                    _ => "host rejected the request".to_string(),
                };
                error!("Aborting batch: {}", message);
                stats.abort(message, total - index - 1);
                break;
            }
        }

        stats.finish();
        Ok(stats)
    }

    /// Process one image; never fails, the result carries any error
    pub async fn process_image(&self, image: &AlbumImage, album: &Album, options: ProcessOptions) -> ProcessingResult {
        let started = Instant::now();
        let mut result = ProcessingResult::new(image);

        let skip = if !options.force && image.has_marker_tag(self.formatter.marker_tag()) {
            Some(SkipReason::AlreadyProcessed)
        } else if image.is_video && self.settings.skip_videos && !options.include_videos {
            Some(SkipReason::Video)
        } else {
            None
        };

        if let Some(reason) = skip {
            debug!("Skipping {} ({:?})", image.file_name, reason);
            result.advance(ProcessingStage::Skipped);
            result.outcome = Outcome::Skipped { reason };
            result.elapsed_ms = started.elapsed().as_millis() as u64;
            return result;
        }

        if let Err(StageError { stage, error }) = self.run(image, album, options, &mut result).await {
            error!("Error processing {} ({}) at {:?}: {}", image.file_name, image.image_key, stage, error);
            result.fatal = error.is_fatal_for_batch();
            result.outcome = Outcome::Errored {
                stage,
                message: error.to_string(),
            };
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn run(
        &self,
        image: &AlbumImage,
        album: &Album,
        options: ProcessOptions,
        result: &mut ProcessingResult,
    ) -> std::result::Result<(), StageError> {
        use ProcessingStage::*;

        result.advance(Downloading);
        let bytes = self
            .host
            .download(image, &self.settings.image_size)
            .await
            .at(Downloading)?;

        result.advance(ContextExtracting);
        let location = self.locate(image, &bytes).await;
        let people = self.identify(&bytes, result).await;
        result.people = people.clone();
        result.location = location.clone();

        let location_name = location.as_ref().and_then(|m| m.resolved_name()).map(String::from);
        let context = PromptContext {
            album: Some(album.name.clone()).filter(|n| !n.is_empty()),
            location: location_name.clone(),
            relationships: self.relationships.prompt_context(&people),
            people: people.clone(),
            date: image.date.clone(),
            total_faces: result.faces_detected,
        };

        result.advance(Captioning);
        let ai_caption = if self.settings.generate_captions {
            let prompt = render(&self.settings.prompts.caption, &context);
            debug!("Caption prompt: {}", prompt);
            self.vision.generate(&bytes, &prompt).await.at(Captioning)?
        } else {
            String::new()
        };
        let ai_tags = if self.settings.generate_tags {
            let prompt = render(&self.settings.prompts.tags, &context);
            let response = self.vision.generate(&bytes, &prompt).await.at(Captioning)?;
            parse_ai_tags(&response)
        } else {
            Vec::new()
        };
        result.ai_tags = ai_tags.len();

        result.advance(Formatting);
        let caption = if self.settings.generate_captions {
            self.formatter.format_caption(
                &ai_caption,
                image.caption.as_deref(),
                location_name.as_deref(),
                &people,
                &self.relationships,
            )
        } else {
            image.caption.clone().unwrap_or_default()
        };
        let location_tags = location
            .as_ref()
            .map(|m| m.tags(self.settings.use_aliases_as_tags))
            .unwrap_or_default();
        let keywords = self
            .formatter
            .format_tags(&ai_tags, &image.keywords, &people, &location_tags);
        let update = self.formatter.update(caption, keywords);
        result.proposed = Some(update.clone());

        if options.dry_run {
            info!("[DRY RUN] {}: caption: {}", image.file_name, update.caption);
            info!("[DRY RUN] {}: keywords: {}", image.file_name, update.keywords_string());
            result.advance(Processed);
            result.outcome = Outcome::Processed { written: false };
            return Ok(());
        }

        result.advance(Updating);
        self.host
            .update_metadata(&image.image_key, &update)
            .await
            .at(Updating)?;

        if let Some(history) = &self.history {
            let entry = create_entry(
                &album.album_key,
                &image.image_key,
                &image.file_name,
                image.caption.clone(),
                image.keywords.clone(),
                &update,
            );
            if let Err(e) = history.append(&entry) {
                warn!("Failed to record history for {}: {}", image.file_name, e);
            }
        }

        result.advance(Processed);
        result.outcome = Outcome::Processed { written: true };
        Ok(())
    }

    /// Host GPS first, then EXIF from the downloaded bytes
    async fn locate(&self, image: &AlbumImage, bytes: &[u8]) -> Option<LocationMatch> {
        if !self.settings.use_location {
            return None;
        }
        let resolver = self.resolver.as_ref()?;

        let coordinate = match image.coordinate() {
            Some(c) => {
                debug!("GPS from host: {}", c);
                c
            }
            None => {
                let c = exif::extract_coordinate(bytes)?;
                debug!("GPS from EXIF: {}", c);
                c
            }
        };

        let found = resolver.resolve(coordinate).await;
        match found.resolved_name() {
            Some(name) => info!("  Location ({:?}): {}", found.source, name),
            None => info!("  Location: could not resolve {}", coordinate),
        }
        Some(found)
    }

    async fn identify(&self, bytes: &[u8], result: &mut ProcessingResult) -> Vec<String> {
        let Some((detector, matcher)) = &self.faces else {
            return Vec::new();
        };
        if matcher.is_empty() {
            return Vec::new();
        }

        let encodings = match detector.detect_faces(bytes).await {
            Ok(encodings) => encodings,
            Err(e) => {
                warn!("Face detection failed, continuing without people: {}", e);
                return Vec::new();
            }
        };
        result.faces_detected = encodings.len();

        let names = unique_names(&matcher.match_faces(&encodings));
        if !names.is_empty() {
            info!("  Identified: {}", names.join(", "));
        }
        names
    }
}
