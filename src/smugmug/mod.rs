// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SmugMug photo host: models and the host trait

pub mod client;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::formatter::MetadataUpdate;
use crate::geo::Coordinate;
use crate::Result;

pub use client::SmugMugClient;

/// Everything the processor needs from a photo host
#[async_trait]
pub trait PhotoHost: Send + Sync {
    async fn fetch_album(&self, album_key: &str) -> Result<Album>;

    /// All images in an album, across every page
    async fn fetch_album_images(&self, album_key: &str) -> Result<Vec<AlbumImage>>;

    /// Raw bytes of `image` at the named size (`Medium`, `Large`, `Original`, ...)
    async fn download(&self, image: &AlbumImage, size: &str) -> Result<Vec<u8>>;

    async fn update_metadata(&self, image_key: &str, update: &MetadataUpdate) -> Result<()>;
}

/// A SmugMug album
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Album {
    pub album_key: String,
    pub name: String,
    pub url_name: String,
    pub web_uri: String,
    pub image_count: u64,
    pub description: Option<String>,
}

/// An image (or video) in an album
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlbumImage {
    pub image_key: String,
    pub album_key: String,
    pub file_name: String,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub keywords: Vec<String>,
    pub date: Option<String>,
    pub is_video: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub archived_uri: Option<String>,
    /// `Uris.ImageSizes.Uri`, the endpoint listing download URLs per size
    pub image_sizes_uri: Option<String>,
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Numbers sometimes arrive as strings
fn float_field(data: &Value, key: &str) -> Option<f64> {
    match data.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Split the host's keyword field, which may be a string or a list
pub fn parse_keywords(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

impl Album {
    pub fn from_api(data: &Value) -> Self {
        Self {
            album_key: string_field(data, "AlbumKey").unwrap_or_default(),
            name: string_field(data, "Name").unwrap_or_default(),
            url_name: string_field(data, "UrlName").unwrap_or_default(),
            web_uri: string_field(data, "WebUri").unwrap_or_default(),
            image_count: data.get("ImageCount").and_then(Value::as_u64).unwrap_or(0),
            description: string_field(data, "Description"),
        }
    }
}

impl AlbumImage {
    pub fn from_api(data: &Value, album_key: &str) -> Self {
        Self {
            image_key: string_field(data, "ImageKey").unwrap_or_default(),
            album_key: string_field(data, "AlbumKey").unwrap_or_else(|| album_key.to_string()),
            file_name: string_field(data, "FileName").unwrap_or_default(),
            title: string_field(data, "Title"),
            caption: string_field(data, "Caption"),
            keywords: parse_keywords(data.get("Keywords")),
            date: string_field(data, "DateTimeOriginal").or_else(|| string_field(data, "Date")),
            is_video: data.get("IsVideo").and_then(Value::as_bool).unwrap_or(false),
            latitude: float_field(data, "Latitude"),
            longitude: float_field(data, "Longitude"),
            archived_uri: string_field(data, "ArchivedUri"),
            image_sizes_uri: data
                .pointer("/Uris/ImageSizes/Uri")
                .and_then(Value::as_str)
                .map(String::from),
        }
    }

    /// Case-insensitive check for the processing marker
    pub fn has_marker_tag(&self, marker: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(marker))
    }

    /// Host-provided GPS position, if any.
    ///
    /// The host reports images without a position as (0, 0).
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => Coordinate::new(lat, lon).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_album_image_from_api() {
        let data = json!({
            "ImageKey": "abc123",
            "FileName": "IMG_0001.JPG",
            "Caption": "",
            "Keywords": "beach; Sunset, smugvision",
            "Latitude": "37.8199",
            "Longitude": -122.4783,
            "IsVideo": false,
            "Uris": {"ImageSizes": {"Uri": "/api/v2/image/abc123-0!sizes"}}
        });
        let image = AlbumImage::from_api(&data, "album1");
        assert_eq!(image.album_key, "album1");
        assert!(image.caption.is_none());
        assert_eq!(image.keywords, vec!["beach", "Sunset", "smugvision"]);
        assert!(image.has_marker_tag("SmugVision"));
        let coordinate = image.coordinate().unwrap();
        assert!((coordinate.latitude() - 37.8199).abs() < 1e-9);
        assert_eq!(image.image_sizes_uri.as_deref(), Some("/api/v2/image/abc123-0!sizes"));
    }

    #[test]
    fn test_keywords_as_list_and_missing_gps() {
        let data = json!({"ImageKey": "k", "Keywords": ["a", " b ", ""], "Latitude": 0, "Longitude": 0});
        let image = AlbumImage::from_api(&data, "album1");
        assert_eq!(image.keywords, vec!["a", "b"]);
        assert!(image.coordinate().is_none());
        assert!(!image.has_marker_tag("smugvision"));
    }

    #[test]
    fn test_album_from_api() {
        let album = Album::from_api(&json!({"AlbumKey": "x1", "Name": "Summer", "ImageCount": 42}));
        assert_eq!(album.name, "Summer");
        assert_eq!(album.image_count, 42);
    }
}
