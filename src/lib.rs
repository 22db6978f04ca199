// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! smugvision: AI caption and keyword enrichment for SmugMug galleries
//!
//! Images are captioned by a local vision model, enriched with the people
//! recognised in them, their relationships and where the photo was taken,
//! then written back to SmugMug with a marker tag so reruns skip them.

pub mod config;
pub mod error;
pub mod exif;
pub mod faces;
pub mod formatter;
pub mod geo;
pub mod history;
pub mod location;
pub mod processor;
pub mod prompt;
pub mod relationships;
pub mod smugmug;
pub mod vision;

pub use config::AppConfig;
pub use error::{Result, SmugvisionError};
