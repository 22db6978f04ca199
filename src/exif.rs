// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! GPS extraction from image EXIF data
//!
//! Unreadable or incomplete EXIF is not an error: the image is simply
//! processed without location context.

use exif::{In, Reader, Tag, Value};
use std::io::Cursor;
use tracing::debug;

use crate::geo::Coordinate;

/// Divisors for converting degrees/minutes/seconds to decimal degrees
const DMS_DIVISION: [f64; 3] = [1.0, 60.0, 3600.0];

/// Extract GPS coordinates from raw image bytes
pub fn extract_coordinate(bytes: &[u8]) -> Option<Coordinate> {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(e) => {
            debug!("No readable EXIF data: {}", e);
            return None;
        }
    };

    let latitude = read_dms(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
    let longitude = read_dms(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef)?;

    match Coordinate::new(latitude, longitude) {
        Ok(coordinate) => {
            debug!("Extracted GPS coordinates from EXIF: {}", coordinate);
            Some(coordinate)
        }
        Err(e) => {
            debug!("Discarding EXIF GPS data: {}", e);
            None
        }
    }
}

fn read_dms(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let parts: Vec<f64> = match &field.value {
        Value::Rational(values) => values.iter().map(|r| r.to_f64()).collect(),
        _ => return None,
    };
    let reference = exif
        .get_field(ref_tag, In::PRIMARY)
        .map(|f| f.display_value().to_string())
        .unwrap_or_default();

    dms_to_decimal(&parts, &reference)
}

/// Convert a DMS triple and N/S/E/W reference to signed decimal degrees
pub fn dms_to_decimal(parts: &[f64], reference: &str) -> Option<f64> {
    if parts.len() != 3 || parts.iter().any(|p| !p.is_finite()) {
        return None;
    }
    let decimal: f64 = parts.iter().zip(DMS_DIVISION.iter()).map(|(x, d)| x / d).sum();
    let reference = reference.trim().trim_matches('"').to_ascii_uppercase();
    if reference.starts_with('S') || reference.starts_with('W') {
        Some(-decimal)
    } else {
        Some(decimal)
    }
}
