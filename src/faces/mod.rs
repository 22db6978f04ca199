// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Face identity matching against known reference encodings
//!
//! Detection is delegated to a [`FaceDetector`]; this module only compares
//! the encodings it produces with the reference identities loaded at startup
//! (see [`references`]).

pub mod references;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// A face encoding vector
pub type Encoding = Vec<f64>;

/// A known person with zero or more reference encodings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Display form, with spaces
    pub name: String,
    pub encodings: Vec<Encoding>,
}

impl Identity {
    pub fn new(name: impl Into<String>, encodings: Vec<Encoding>) -> Self {
        Self {
            name: name.into(),
            encodings,
        }
    }

    /// Build from the underscore form used for folder names
    pub fn from_storage_name(storage: &str, encodings: Vec<Encoding>) -> Self {
        Self::new(display_name(storage), encodings)
    }

    /// Underscore form used for folder names
    pub fn storage_name(&self) -> String {
        self.name.split_whitespace().collect::<Vec<_>>().join("_")
    }

    /// Smallest distance from `encoding` to any reference encoding
    pub fn min_distance(&self, encoding: &[f64]) -> Option<f64> {
        self.encodings
            .iter()
            .filter_map(|reference| euclidean_distance(reference, encoding))
            .min_by(f64::total_cmp)
    }
}

/// Convert a storage name (`John_Doe`) to its display form (`John Doe`)
pub fn display_name(storage: &str) -> String {
    storage
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First word of a display name
pub fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}

/// The identity a detected face was matched to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    pub name: String,
    pub confidence: f64,
    pub distance: f64,
}

/// Euclidean distance, or `None` when dimensions differ
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt())
}

/// Turns image bytes into face encodings; knows nothing about identities
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<Encoding>>;
}

/// Matches detected encodings against known identities
pub struct FaceMatcher {
    identities: Vec<Identity>,
    tolerance: f64,
    min_confidence: f64,
}

impl FaceMatcher {
    pub fn new(identities: Vec<Identity>, tolerance: f64, min_confidence: f64) -> Self {
        Self {
            identities,
            tolerance,
            min_confidence,
        }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn is_empty(&self) -> bool {
        self.identities.iter().all(|i| i.encodings.is_empty())
    }

    /// Best identity for each detected face, in input order.
    ///
    /// Faces with no identity under the tolerance, or whose confidence falls
    /// below the minimum, are dropped.
    pub fn match_faces(&self, detected: &[Encoding]) -> Vec<FaceMatch> {
        let mut matches = Vec::new();

        for (index, encoding) in detected.iter().enumerate() {
            let mut best: Option<(&Identity, f64)> = None;
            for identity in &self.identities {
                let Some(distance) = identity.min_distance(encoding) else {
                    continue;
                };
                if distance < self.tolerance && best.map_or(true, |(_, d)| distance < d) {
                    best = Some((identity, distance));
                }
            }

            let Some((identity, distance)) = best else {
                debug!("Face {} matched no known identity", index + 1);
                continue;
            };

            let confidence = (1.0 - distance).clamp(0.0, 1.0);
            if confidence < self.min_confidence {
                debug!(
                    "Face {} matched {} with confidence {:.2}, below minimum {:.2}",
                    index + 1,
                    identity.name,
                    confidence,
                    self.min_confidence
                );
                continue;
            }

            debug!("Face {} identified as {} ({:.2})", index + 1, identity.name, confidence);
            matches.push(FaceMatch {
                name: identity.name.clone(),
                confidence,
                distance,
            });
        }

        matches
    }
}

/// Names of matched people, deduplicated, in first-seen order
pub fn unique_names(matches: &[FaceMatch]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for m in matches {
        if !names.contains(&m.name) {
            names.push(m.name.clone());
        }
    }
    names
}
