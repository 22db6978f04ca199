// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Geocoding provider: Nominatim reverse lookups and Overpass venue search

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::{GeocodingConfig, VenueSearchConfig};
use crate::geo::Coordinate;
use crate::{Result, SmugvisionError};

/// Structured address returned by a reverse lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    /// Building or venue name
    pub venue: Option<String>,
    pub locality: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postcode: Option<String>,
}

/// A named point of interest near a coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub name: String,
    pub coordinate: Coordinate,
    pub category: Option<String>,
}

impl Address {
    /// Whether the address names something more specific than a country or postcode
    pub fn is_usable(&self) -> bool {
        self.venue.is_some() || self.locality.is_some() || self.county.is_some()
    }

    /// Parts from most to least specific, without repeats
    pub fn parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = Vec::new();
        let county = self
            .county
            .as_ref()
            .map(|c| c.replace(" County", "").trim().to_string());

        for part in [&self.venue, &self.locality, &county, &self.state, &self.country]
            .into_iter()
            .flatten()
        {
            if !part.is_empty() && !parts.contains(part) {
                parts.push(part.clone());
            }
        }
        parts
    }

    /// Human-readable place name, or `None` when the address is empty
    pub fn place_name(&self) -> Option<String> {
        let parts = self.parts();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// External geocoding collaborator
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Reverse-geocode a coordinate to a structured address
    async fn reverse(&self, coordinate: Coordinate) -> Result<Option<Address>>;

    /// Find named POIs within `radius_m` carrying any of `categories`, in one request
    async fn search_nearby(
        &self,
        coordinate: Coordinate,
        radius_m: f64,
        categories: &[String],
    ) -> Result<Vec<Poi>>;
}

#[derive(Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: HashMap<String, String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

fn first_of(map: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(String::from)
}

/// Convert a Nominatim `jsonv2` reverse response into an [`Address`]
pub fn parse_reverse(body: &str) -> Result<Option<Address>> {
    let response: ReverseResponse = serde_json::from_str(body)?;
    if let Some(err) = response.error {
        debug!("Nominatim returned no result: {}", err);
        return Ok(None);
    }

    let address = &response.address;
    let venue = response
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .or_else(|| first_of(address, &["building", "amenity", "school", "university", "college"]));

    Ok(Some(Address {
        venue,
        locality: first_of(address, &["city", "town", "village", "hamlet", "municipality"]),
        county: first_of(address, &["county"]),
        state: first_of(address, &["state", "region"]),
        country: first_of(address, &["country"]),
        postcode: first_of(address, &["postcode"]),
    }))
}

/// Build a single Overpass query covering every category
pub fn overpass_query(coordinate: Coordinate, radius_m: f64, categories: &[String], timeout_secs: u64) -> String {
    let keys = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == ':'))
        .collect::<Vec<_>>()
        .join("|");

    let key_filter = if keys.is_empty() {
        String::new()
    } else {
        format!("[~\"^({})$\"~\".\"]", keys)
    };

    format!(
        "[out:json][timeout:{}];nwr(around:{:.0},{:.6},{:.6})[\"name\"]{};out center 50;",
        timeout_secs.max(1),
        radius_m,
        coordinate.latitude(),
        coordinate.longitude(),
        key_filter
    )
}

/// Convert an Overpass response into POIs, skipping unnamed or unlocated elements
pub fn parse_overpass(body: &str, categories: &[String]) -> Result<Vec<Poi>> {
    let response: OverpassResponse = serde_json::from_str(body)?;

    let pois = response
        .elements
        .into_iter()
        .filter_map(|element| {
            let (lat, lon) = match (element.lat, element.lon, element.center) {
                (Some(lat), Some(lon), _) => (lat, lon),
                (_, _, Some(center)) => (center.lat, center.lon),
                _ => return None,
            };
            let coordinate = Coordinate::new(lat, lon).ok()?;
            let name = element.tags.get("name")?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let category = categories
                .iter()
                .find(|c| element.tags.contains_key(c.as_str()))
                .cloned();
            Some(Poi { name, coordinate, category })
        })
        .collect();

    Ok(pois)
}

/// HTTP geocoder backed by Nominatim and Overpass
pub struct NominatimGeocoder {
    client: Client,
    reverse_url: String,
    overpass_url: String,
    timeout_secs: u64,
}

impl NominatimGeocoder {
    pub fn new(geocoding: &GeocodingConfig, venues: &VenueSearchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(geocoding.user_agent.clone())
            .timeout(Duration::from_secs(geocoding.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            reverse_url: geocoding.reverse_url.clone(),
            overpass_url: venues.url.clone(),
            timeout_secs: geocoding.timeout_secs,
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, coordinate: Coordinate) -> Result<Option<Address>> {
        let lat = coordinate.latitude().to_string();
        let lon = coordinate.longitude().to_string();

        debug!("Reverse geocoding {}", coordinate);
        let response = self
            .client
            .get(&self.reverse_url)
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", "18"),
                ("addressdetails", "1"),
                ("accept-language", "en"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SmugvisionError::Geocoding(format!(
                "Nominatim returned status {}",
                response.status()
            )));
        }

        parse_reverse(&response.text().await?)
    }

    async fn search_nearby(
        &self,
        coordinate: Coordinate,
        radius_m: f64,
        categories: &[String],
    ) -> Result<Vec<Poi>> {
        let query = overpass_query(coordinate, radius_m, categories, self.timeout_secs);
        debug!("Venue search near {} ({}m)", coordinate, radius_m);

        let response = self
            .client
            .post(&self.overpass_url)
            .form(&[("data", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SmugvisionError::Geocoding(format!(
                "Overpass returned status {}",
                response.status()
            )));
        }

        parse_overpass(&response.text().await?, categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reverse_with_venue() {
        let body = r#"{
            "name": "Golden Gate Bridge",
            "address": {
                "road": "US 101",
                "city": "San Francisco",
                "county": "San Francisco County",
                "state": "California",
                "country": "United States"
            }
        }"#;
        let address = parse_reverse(body).unwrap().unwrap();
        assert!(address.is_usable());
        assert_eq!(
            address.place_name().unwrap(),
            "Golden Gate Bridge, San Francisco, California, United States"
        );
    }

    #[test]
    fn test_parse_reverse_falls_back_to_address_building() {
        let body = r#"{"name": "", "address": {"amenity": "Palace Theater", "town": "Louisville"}}"#;
        let address = parse_reverse(body).unwrap().unwrap();
        assert_eq!(address.venue.as_deref(), Some("Palace Theater"));
        assert_eq!(address.place_name().unwrap(), "Palace Theater, Louisville");
    }

    #[test]
    fn test_country_only_is_not_usable() {
        let body = r#"{"address": {"country": "Iceland", "postcode": "101"}}"#;
        let address = parse_reverse(body).unwrap().unwrap();
        assert!(!address.is_usable());
        assert_eq!(address.place_name().unwrap(), "Iceland");
    }

    #[test]
    fn test_parse_reverse_error() {
        assert!(parse_reverse(r#"{"error": "Unable to geocode"}"#).unwrap().is_none());
    }

    #[test]
    fn test_overpass_query_is_single_statement() {
        let c = Coordinate::new(38.1, -85.6).unwrap();
        let cats = vec!["amenity".to_string(), "shop".to_string(), "bad\"key".to_string()];
        let q = overpass_query(c, 200.0, &cats, 5);
        assert_eq!(q.matches("nwr(").count(), 1);
        assert!(q.contains("around:200,38.100000,-85.600000"));
        assert!(q.contains("^(amenity|shop)$"));
        assert!(!q.contains("bad"));
    }

    #[test]
    fn test_parse_overpass_elements() {
        let body = r#"{"elements": [
            {"type": "node", "lat": 38.1001, "lon": -85.6001, "tags": {"name": "Corner Cafe", "amenity": "cafe"}},
            {"type": "way", "center": {"lat": 38.1002, "lon": -85.6002}, "tags": {"name": "Town Park", "leisure": "park"}},
            {"type": "node", "lat": 38.1003, "lon": -85.6003, "tags": {"amenity": "bench"}}
        ]}"#;
        let cats = vec!["amenity".to_string(), "leisure".to_string()];
        let pois = parse_overpass(body, &cats).unwrap();
        assert_eq!(pois.len(), 2);
        assert_eq!(pois[0].category.as_deref(), Some("amenity"));
        assert_eq!(pois[1].name, "Town Park");
    }
}
