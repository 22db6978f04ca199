// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Location resolution: custom places, reverse geocoding, venue search
//!
//! Resolution order for a coordinate:
//! 1. in-memory cache keyed by the rounded coordinate
//! 2. nearest user-defined [`CustomLocation`] whose radius contains it
//! 3. reverse geocoding (rate limited, bounded by a timeout)
//! 4. a single nearby-POI query when the address is too coarse
//! 5. the raw coordinate, with [`LocationSource::None`]
//!
//! Network failures at any step only move resolution on to the next step.

pub mod limiter;
pub mod nominatim;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LocationConfig;
use crate::geo::{Coordinate, CoordinateKey};
use crate::{Result, SmugvisionError};

pub use limiter::GeocodeLimiter;
pub use nominatim::{Address, Geocoder, NominatimGeocoder, Poi};

/// A user-defined named place
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomLocation {
    pub name: String,
    pub center: Coordinate,
    /// Match radius in meters
    pub radius_m: f64,
    pub address: Option<String>,
    pub aliases: Vec<String>,
}

/// Where a resolved name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Custom,
    Geocode,
    Venue,
    None,
}

/// Result of resolving a coordinate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationMatch {
    pub name: String,
    pub source: LocationSource,
    /// Distance to the custom location's center, in meters
    pub distance_m: Option<f64>,
    pub aliases: Vec<String>,
}

impl LocationMatch {
    fn unresolved(coordinate: Coordinate) -> Self {
        Self {
            name: coordinate.to_string(),
            source: LocationSource::None,
            distance_m: None,
            aliases: Vec::new(),
        }
    }

    /// The place name, unless resolution fell through to raw coordinates
    pub fn resolved_name(&self) -> Option<&str> {
        match self.source {
            LocationSource::None => None,
            _ => Some(self.name.as_str()),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.source == LocationSource::Custom
    }

    /// Keywords derived from the place name, plus aliases when requested
    pub fn tags(&self, include_aliases: bool) -> Vec<String> {
        let mut tags: Vec<String> = self
            .resolved_name()
            .map(|name| {
                name.split(',')
                    .map(str::trim)
                    .filter(|part| part.chars().count() > 2)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        if include_aliases {
            tags.extend(self.aliases.iter().cloned());
        }
        tags
    }
}

#[derive(Deserialize)]
struct LocationsFile {
    #[serde(default)]
    locations: Vec<LocationRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Aliases {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct LocationRecord {
    name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius: Option<f64>,
    address: Option<String>,
    aliases: Option<Aliases>,
}

const DEFAULT_RADIUS_M: f64 = 50.0;

/// Parse custom location records from YAML text
pub fn parse_custom_locations(content: &str) -> Result<Vec<CustomLocation>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: LocationsFile = serde_yaml::from_str(content)
        .map_err(|e| SmugvisionError::Config(format!("Failed to parse locations file: {}", e)))?;

    file.locations
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let invalid = |what: &str| {
                SmugvisionError::Config(format!("Custom location at index {}: {}", index, what))
            };
            let name = record
                .name
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| invalid("missing required 'name'"))?;
            let latitude = record.latitude.ok_or_else(|| invalid("missing required 'latitude'"))?;
            let longitude = record.longitude.ok_or_else(|| invalid("missing required 'longitude'"))?;
            let center = Coordinate::new(latitude, longitude).map_err(|e| invalid(&e.to_string()))?;
            let radius_m = record.radius.unwrap_or(DEFAULT_RADIUS_M);
            if !radius_m.is_finite() || radius_m <= 0.0 {
                return Err(invalid(&format!("radius must be positive, got {}", radius_m)));
            }
            let aliases = match record.aliases {
                Some(Aliases::One(alias)) => vec![alias],
                Some(Aliases::Many(aliases)) => aliases,
                None => Vec::new(),
            };
            Ok(CustomLocation {
                name,
                center,
                radius_m,
                address: record.address,
                aliases,
            })
        })
        .collect()
}

/// Load custom locations; a missing file means none are defined
pub fn load_custom_locations(path: &Path) -> Result<Vec<CustomLocation>> {
    if !path.exists() {
        debug!("Custom locations file not found: {:?}", path);
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let locations = parse_custom_locations(&content)?;
    info!("Loaded {} custom locations from {:?}", locations.len(), path);
    Ok(locations)
}

/// Nearest custom location containing `coordinate`; the first defined wins ties
pub fn find_custom_match(locations: &[CustomLocation], coordinate: Coordinate) -> Option<(&CustomLocation, f64)> {
    let mut best: Option<(&CustomLocation, f64)> = None;
    for location in locations {
        let distance = coordinate.distance_to(&location.center);
        if distance <= location.radius_m && best.map_or(true, |(_, d)| distance < d) {
            best = Some((location, distance));
        }
    }
    best
}

/// Tunables for [`LocationResolver`]
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub cache_precision: u32,
    pub request_timeout: Duration,
    pub venue_search: bool,
    pub venue_radius_m: f64,
    pub venue_categories: Vec<String>,
}

impl ResolverSettings {
    pub fn from_config(config: &LocationConfig) -> Self {
        Self {
            cache_precision: config.cache_precision,
            request_timeout: Duration::from_secs(config.geocoding.timeout_secs.max(1)),
            venue_search: config.venue_search.enabled,
            venue_radius_m: config.venue_search.radius_m,
            venue_categories: config.venue_search.categories.clone(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&LocationConfig::default())
    }
}

/// Resolves coordinates to place names
pub struct LocationResolver {
    custom: Vec<CustomLocation>,
    geocoder: Option<Arc<dyn Geocoder>>,
    limiter: Arc<GeocodeLimiter>,
    settings: ResolverSettings,
    cache: RwLock<HashMap<CoordinateKey, LocationMatch>>,
}

impl LocationResolver {
    /// `geocoder` may be `None` to resolve against custom locations only
    pub fn new(
        custom: Vec<CustomLocation>,
        geocoder: Option<Arc<dyn Geocoder>>,
        limiter: Arc<GeocodeLimiter>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            custom,
            geocoder,
            limiter,
            settings,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn custom_locations(&self) -> &[CustomLocation] {
        &self.custom
    }

    /// Resolve a coordinate; never fails, degrading to the raw coordinate
    pub async fn resolve(&self, coordinate: Coordinate) -> LocationMatch {
        let key = coordinate.cache_key(self.settings.cache_precision);
        if let Some(hit) = self.cached(&key) {
            debug!("Location cache hit for {}", coordinate);
            return hit;
        }

        let resolved = self.resolve_uncached(coordinate).await;

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, resolved.clone());
        }
        resolved
    }

    fn cached(&self, key: &CoordinateKey) -> Option<LocationMatch> {
        self.cache.read().ok().and_then(|cache| cache.get(key).cloned())
    }

    async fn resolve_uncached(&self, coordinate: Coordinate) -> LocationMatch {
        if let Some((location, distance)) = find_custom_match(&self.custom, coordinate) {
            debug!(
                "Matched {} to custom location '{}' ({:.1}m)",
                coordinate, location.name, distance
            );
            return LocationMatch {
                name: location.name.clone(),
                source: LocationSource::Custom,
                distance_m: Some(distance),
                aliases: location.aliases.clone(),
            };
        }

        let Some(geocoder) = self.geocoder.as_deref() else {
            return LocationMatch::unresolved(coordinate);
        };

        let address = self.reverse(geocoder, coordinate).await;
        if let Some(address) = address.as_ref().filter(|a| a.is_usable()) {
            if let Some(name) = address.place_name() {
                return LocationMatch {
                    name,
                    source: LocationSource::Geocode,
                    distance_m: None,
                    aliases: Vec::new(),
                };
            }
        }

        if self.settings.venue_search {
            if let Some(poi) = self.nearest_venue(geocoder, coordinate).await {
                let mut parts = vec![poi.name];
                for part in address.iter().flat_map(Address::parts) {
                    if !parts.contains(&part) {
                        parts.push(part);
                    }
                }
                return LocationMatch {
                    name: parts.join(", "),
                    source: LocationSource::Venue,
                    distance_m: None,
                    aliases: Vec::new(),
                };
            }
        }

        // A country or region is still better than bare numbers
        if let Some(name) = address.and_then(|a| a.place_name()) {
            return LocationMatch {
                name,
                source: LocationSource::Geocode,
                distance_m: None,
                aliases: Vec::new(),
            };
        }

        debug!("Could not resolve a name for {}", coordinate);
        LocationMatch::unresolved(coordinate)
    }

    async fn reverse(&self, geocoder: &dyn Geocoder, coordinate: Coordinate) -> Option<Address> {
        self.limiter.acquire().await;
        match tokio::time::timeout(self.settings.request_timeout, geocoder.reverse(coordinate)).await {
            Ok(Ok(address)) => address,
            Ok(Err(e)) => {
                warn!("Reverse geocoding failed for {}: {}", coordinate, e);
                None
            }
            Err(_) => {
                warn!(
                    "Reverse geocoding timed out after {:?} for {}",
                    self.settings.request_timeout, coordinate
                );
                None
            }
        }
    }

    async fn nearest_venue(&self, geocoder: &dyn Geocoder, coordinate: Coordinate) -> Option<Poi> {
        self.limiter.acquire().await;
        let search = geocoder.search_nearby(
            coordinate,
            self.settings.venue_radius_m,
            &self.settings.venue_categories,
        );
        let pois = match tokio::time::timeout(self.settings.request_timeout, search).await {
            Ok(Ok(pois)) => pois,
            Ok(Err(e)) => {
                warn!("Venue search failed for {}: {}", coordinate, e);
                return None;
            }
            Err(_) => {
                warn!("Venue search timed out for {}", coordinate);
                return None;
            }
        };

        let radius = self.settings.venue_radius_m;
        let mut candidates: Vec<(f64, Poi)> = pois
            .into_iter()
            .map(|poi| (coordinate.distance_to(&poi.coordinate), poi))
            .filter(|(distance, _)| *distance <= radius)
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        if candidates.len() > 1 {
            debug!(
                "Found {} venues near {}, using closest: {}",
                candidates.len(),
                coordinate,
                candidates[0].1.name
            );
        }
        candidates.into_iter().next().map(|(_, poi)| poi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Scripted geocoder recording every call
    #[derive(Default)]
    struct FakeGeocoder {
        address: Option<Address>,
        pois: Vec<Poi>,
        fail: bool,
        hang: bool,
        reverse_calls: AtomicUsize,
        search_calls: AtomicUsize,
        stamps: Mutex<Vec<Instant>>,
    }

    impl FakeGeocoder {
        fn calls(&self) -> usize {
            self.reverse_calls.load(Ordering::SeqCst) + self.search_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn reverse(&self, _coordinate: Coordinate) -> Result<Option<Address>> {
            self.reverse_calls.fetch_add(1, Ordering::SeqCst);
            self.stamps.lock().unwrap().push(Instant::now());
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(SmugvisionError::Geocoding("unreachable".into()));
            }
            Ok(self.address.clone())
        }

        async fn search_nearby(&self, _c: Coordinate, _r: f64, _cats: &[String]) -> Result<Vec<Poi>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.stamps.lock().unwrap().push(Instant::now());
            if self.fail {
                return Err(SmugvisionError::Geocoding("unreachable".into()));
            }
            Ok(self.pois.clone())
        }
    }

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn erics_house() -> CustomLocation {
        CustomLocation {
            name: "Eric's House".to_string(),
            center: coord(38.123450, -85.654320),
            radius_m: 50.0,
            address: None,
            aliases: vec!["home".to_string(), "Louisville".to_string()],
        }
    }

    fn resolver(custom: Vec<CustomLocation>, geocoder: Arc<FakeGeocoder>, interval_ms: u64) -> LocationResolver {
        let settings = ResolverSettings {
            request_timeout: Duration::from_millis(200),
            ..ResolverSettings::default()
        };
        LocationResolver::new(
            custom,
            Some(geocoder as Arc<dyn Geocoder>),
            Arc::new(GeocodeLimiter::new(Duration::from_millis(interval_ms))),
            settings,
        )
    }

    #[tokio::test]
    async fn test_custom_location_wins_even_when_geocoder_is_down() {
        let geocoder = Arc::new(FakeGeocoder { fail: true, ..Default::default() });
        let resolver = resolver(vec![erics_house()], geocoder.clone(), 0);

        let found = resolver.resolve(coord(38.123456, -85.654321)).await;
        assert_eq!(found.name, "Eric's House");
        assert_eq!(found.source, LocationSource::Custom);
        assert!(found.distance_m.unwrap() < 50.0);
        assert_eq!(found.aliases, vec!["home", "Louisville"]);
        assert_eq!(geocoder.calls(), 0);
    }

    #[test]
    fn test_nearest_custom_location_and_tie_break() {
        let mut a = erics_house();
        a.name = "First".to_string();
        a.radius_m = 500.0;
        let mut b = a.clone();
        b.name = "Second".to_string();
        let mut c = a.clone();
        c.name = "Closer".to_string();
        c.center = coord(38.123456, -85.654321);

        let point = coord(38.123456, -85.654321);
        let locations = vec![a.clone(), b.clone()];
        assert_eq!(find_custom_match(&locations, point).unwrap().0.name, "First");

        let locations = vec![a, b, c];
        assert_eq!(find_custom_match(&locations, point).unwrap().0.name, "Closer");

        assert!(find_custom_match(&[erics_house()], coord(38.2, -85.6)).is_none());
    }

    #[tokio::test]
    async fn test_same_cache_key_issues_one_lookup() {
        let geocoder = Arc::new(FakeGeocoder {
            address: Some(Address {
                locality: Some("Louisville".to_string()),
                state: Some("Kentucky".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let resolver = resolver(Vec::new(), geocoder.clone(), 0);

        let first = resolver.resolve(coord(38.2000001, -85.7000001)).await;
        let second = resolver.resolve(coord(38.2000004, -85.6999998)).await;
        assert_eq!(first, second);
        assert_eq!(first.name, "Louisville, Kentucky");
        assert_eq!(first.source, LocationSource::Geocode);
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_geocode_calls_respect_min_interval() {
        let geocoder = Arc::new(FakeGeocoder {
            address: Some(Address { locality: Some("Town".to_string()), ..Default::default() }),
            ..Default::default()
        });
        let resolver = resolver(Vec::new(), geocoder.clone(), 100);

        for i in 0..3 {
            resolver.resolve(coord(10.0 + i as f64, 20.0)).await;
        }

        let stamps = geocoder.stamps.lock().unwrap().clone();
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            // a few ms of slack for clock granularity between the limiter and std::time
            assert!(pair[1] - pair[0] >= Duration::from_millis(95), "gap {:?}", pair[1] - pair[0]);
        }
    }

    #[tokio::test]
    async fn test_venue_search_disabled_keeps_country() {
        let geocoder = Arc::new(FakeGeocoder {
            address: Some(Address { country: Some("Iceland".to_string()), ..Default::default() }),
            pois: vec![Poi { name: "Harpa".to_string(), coordinate: coord(64.1467, -21.9426), category: None }],
            ..Default::default()
        });
        let settings = ResolverSettings {
            venue_search: false,
            ..ResolverSettings::default()
        };
        let resolver = LocationResolver::new(
            Vec::new(),
            Some(geocoder.clone() as Arc<dyn Geocoder>),
            Arc::new(GeocodeLimiter::new(Duration::ZERO)),
            settings,
        );

        let found = resolver.resolve(coord(64.1466, -21.9426)).await;
        assert_eq!(found.name, "Iceland");
        assert_eq!(found.source, LocationSource::Geocode);
        assert!(!found.is_custom());
        assert_eq!(geocoder.reverse_calls.load(Ordering::SeqCst), 1);
        assert_eq!(geocoder.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_geocoding_disabled_uses_custom_or_raw_coordinate() {
        let resolver = LocationResolver::new(
            vec![erics_house()],
            None,
            Arc::new(GeocodeLimiter::new(Duration::ZERO)),
            ResolverSettings::default(),
        );
        assert_eq!(resolver.custom_locations().len(), 1);

        let found = resolver.resolve(coord(38.123456, -85.654321)).await;
        assert!(found.is_custom());

        let point = coord(10.5, 20.25);
        let found = resolver.resolve(point).await;
        assert_eq!(found.source, LocationSource::None);
        assert_eq!(found.name, point.to_string());
        assert!(found.resolved_name().is_none());
        assert!(found.tags(true).is_empty());
    }

    #[tokio::test]
    async fn test_coarse_address_triggers_single_venue_query() {
        let point = coord(64.1466, -21.9426);
        let geocoder = Arc::new(FakeGeocoder {
            address: Some(Address { country: Some("Iceland".to_string()), ..Default::default() }),
            pois: vec![
                Poi { name: "Far Hall".to_string(), coordinate: coord(64.1480, -21.9426), category: None },
                Poi { name: "Harpa".to_string(), coordinate: coord(64.1467, -21.9426), category: None },
                Poi { name: "Way Out".to_string(), coordinate: coord(64.2, -21.9), category: None },
            ],
            ..Default::default()
        });
        let resolver = resolver(Vec::new(), geocoder.clone(), 0);

        let found = resolver.resolve(point).await;
        assert_eq!(found.name, "Harpa, Iceland");
        assert_eq!(found.source, LocationSource::Venue);
        assert_eq!(geocoder.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_coarse_address_without_venues_keeps_country() {
        let geocoder = Arc::new(FakeGeocoder {
            address: Some(Address { country: Some("Iceland".to_string()), ..Default::default() }),
            ..Default::default()
        });
        let resolver = resolver(Vec::new(), geocoder, 0);
        let found = resolver.resolve(coord(64.1, -21.9)).await;
        assert_eq!(found.name, "Iceland");
        assert_eq!(found.source, LocationSource::Geocode);
    }

    #[tokio::test]
    async fn test_failures_fall_back_to_raw_coordinate() {
        let geocoder = Arc::new(FakeGeocoder { fail: true, ..Default::default() });
        let resolver = resolver(Vec::new(), geocoder.clone(), 0);

        let found = resolver.resolve(coord(1.5, 2.5)).await;
        assert_eq!(found.source, LocationSource::None);
        assert_eq!(found.name, "1.500000, 2.500000");
        assert!(found.resolved_name().is_none());
        assert!(found.tags(true).is_empty());
        assert_eq!(geocoder.calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_degrades_instead_of_hanging() {
        let geocoder = Arc::new(FakeGeocoder { hang: true, ..Default::default() });
        let resolver = resolver(Vec::new(), geocoder, 0);

        let found = tokio::time::timeout(Duration::from_secs(5), resolver.resolve(coord(3.0, 4.0)))
            .await
            .expect("resolve must not hang");
        assert_eq!(found.source, LocationSource::None);
    }

    #[test]
    fn test_match_tags() {
        let found = LocationMatch {
            name: "Golden Gate Bridge, San Francisco, CA".to_string(),
            source: LocationSource::Geocode,
            distance_m: None,
            aliases: vec!["bridge".to_string()],
        };
        assert_eq!(found.tags(false), vec!["Golden Gate Bridge", "San Francisco"]);
        assert_eq!(found.tags(true).last().unwrap(), "bridge");
    }

    #[test]
    fn test_parse_custom_locations() {
        let yaml = r#"
locations:
  - name: "Eric's House"
    latitude: 38.12345
    longitude: -85.65432
    radius: 75
    aliases: home
  - name: Lake Cabin
    latitude: 37.0
    longitude: -84.0
"#;
        let locations = parse_custom_locations(yaml).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].aliases, vec!["home"]);
        assert_eq!(locations[0].radius_m, 75.0);
        assert_eq!(locations[1].radius_m, 50.0);
        assert!(locations[1].aliases.is_empty());
    }

    #[test]
    fn test_malformed_custom_location_is_config_error() {
        let yaml = "locations:\n  - name: Nowhere\n    latitude: 123.0\n    longitude: 0.0\n";
        let err = parse_custom_locations(yaml).unwrap_err();
        assert!(matches!(err, SmugvisionError::Config(_)));
        assert!(err.to_string().contains("index 0"));

        let yaml = "locations:\n  - latitude: 1.0\n    longitude: 0.0\n";
        assert!(parse_custom_locations(yaml).is_err());
    }

    #[test]
    fn test_missing_locations_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_custom_locations(&dir.path().join("locations.yaml")).unwrap().is_empty());
    }
}
