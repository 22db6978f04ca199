// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Reference identities from a folder-per-person layout
//!
//! ```text
//! reference_faces/
//!   John_Doe/
//!     beach.jpg
//!     profile.png
//!   Jane_Smith/
//!     wedding.jpg
//! ```
//!
//! Encodings are cached in a JSON file keyed by the blake3 hash of each
//! reference image, so unchanged images are never sent to the detector twice.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{display_name, Encoding, FaceDetector, Identity};
use crate::Result;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "heif"];

/// Reference images found for one person
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFolder {
    /// Folder name, in storage form
    pub person: String,
    pub images: Vec<PathBuf>,
}

/// List person folders and their image files, sorted for stable output
pub fn scan_reference_dir(dir: &Path) -> Result<Vec<ReferenceFolder>> {
    let mut folders = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(person) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };
        if person.starts_with('.') {
            continue;
        }

        let mut images: Vec<PathBuf> = std::fs::read_dir(&path)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        images.sort();

        folders.push(ReferenceFolder { person, images });
    }

    folders.sort_by(|a, b| a.person.cmp(&b.person));
    Ok(folders)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEncoding {
    person: String,
    encoding: Encoding,
}

/// On-disk cache of reference encodings
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EncodingCache {
    #[serde(default)]
    entries: HashMap<String, CachedEncoding>,
}

impl EncodingCache {
    /// Load the cache; a missing or unreadable file starts an empty one
    pub fn load(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            debug!("No face encoding cache at {:?}", path);
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Ignoring corrupt face encoding cache {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    fn get(&self, hash: &str, person: &str) -> Option<&Encoding> {
        self.entries
            .get(hash)
            .filter(|cached| cached.person == person)
            .map(|cached| &cached.encoding)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load every identity under `dir`, encoding reference images as needed.
///
/// A missing directory yields no identities. Reference images in which the
/// detector finds no face are skipped with a warning.
pub async fn load_identities(
    dir: &Path,
    detector: &dyn FaceDetector,
    cache_path: Option<&Path>,
) -> Result<Vec<Identity>> {
    if !dir.is_dir() {
        warn!("Reference faces directory not found: {:?}", dir);
        return Ok(Vec::new());
    }

    let folders = scan_reference_dir(dir)?;
    let cache = cache_path.map(EncodingCache::load).unwrap_or_default();
    let mut fresh = EncodingCache::default();
    let (mut from_cache, mut encoded) = (0usize, 0usize);
    let mut identities = Vec::new();

    for folder in folders {
        let mut encodings = Vec::new();

        for image in &folder.images {
            let bytes = match std::fs::read(image) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read reference image {:?}: {}", image, e);
                    continue;
                }
            };
            let hash = blake3::hash(&bytes).to_hex().to_string();

            let encoding = if let Some(cached) = cache.get(&hash, &folder.person) {
                from_cache += 1;
                cached.clone()
            } else {
                match detector.detect_faces(&bytes).await {
                    Ok(faces) => match faces.into_iter().next() {
                        Some(encoding) => {
                            encoded += 1;
                            encoding
                        }
                        None => {
                            warn!("No face found in reference image: {:?}", image);
                            continue;
                        }
                    },
                    Err(e) => {
                        warn!("Failed to encode reference image {:?}: {}", image, e);
                        continue;
                    }
                }
            };

            fresh.entries.insert(
                hash,
                CachedEncoding {
                    person: folder.person.clone(),
                    encoding: encoding.clone(),
                },
            );
            encodings.push(encoding);
        }

        if encodings.is_empty() {
            debug!("No usable reference faces for {}", folder.person);
            continue;
        }
        debug!("Loaded {} reference face(s) for {}", encodings.len(), folder.person);
        identities.push(Identity::new(display_name(&folder.person), encodings));
    }

    if let Some(path) = cache_path {
        if encoded > 0 || fresh.len() != cache.len() {
            if let Err(e) = fresh.save(path) {
                warn!("Failed to save face encoding cache: {}", e);
            }
        }
    }

    info!(
        "Loaded {} reference identities ({} from cache, {} newly encoded)",
        identities.len(),
        from_cache,
        encoded
    );
    Ok(identities)
}
