//! Multi-strategy geographic resolution.
//!
//! Strategies run in a fixed order and the first hit wins: verified
//! hotspots, ambiguous-city disambiguation, curated landmarks, the base
//! city table, relative-offset parsing, then external geocoders. Whenever
//! a verified or ambiguity rule covers the name, the final coordinates
//! must agree with that rule's country; disagreement is overridden with
//! the verified coordinates.

pub mod geocode;
pub mod mappings;
pub mod verified;

use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

use crate::model::{LocationMethod, ResolvedLocation};

pub use geocode::{GeocodeHit, Geocoder, HttpGeocoder};
pub use mappings::{lookup, region_for_country, MappingRow, BASE_MAPPINGS, ENHANCED_MAPPINGS};
pub use verified::{disambiguate, lookup_hotspot, AMBIGUOUS_CITIES, VERIFIED_HOTSPOTS};

/// Kilometers per degree of latitude.
const KM_PER_DEGREE: f64 = 111.0;

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d+)\s*(?:km|kilometers?|miles?)\s+(north|south|east|west|northeast|northwest|southeast|southwest)\s+of\s+([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,2})",
    )
    .expect("relative offset pattern compiles")
});

/// Great-circle distance in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let r = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * r * a.sqrt().atan2((1.0 - a).sqrt())
}

fn strip_qualifier(name: &str) -> &str {
    let lowered = name.to_lowercase();
    for prefix in ["northern ", "southern ", "eastern ", "western ", "central "] {
        if lowered.starts_with(prefix) {
            return &name[prefix.len()..];
        }
    }
    name
}

fn from_row(name: &str, row: MappingRow, method: LocationMethod, confidence: f64) -> ResolvedLocation {
    let (_, lat, lng, country, region) = row;
    ResolvedLocation {
        lat,
        lng,
        name: name.to_string(),
        country: country.to_string(),
        region: region.to_string(),
        method,
        confidence,
    }
}

/// Resolves location hints to coordinates.
#[derive(Default)]
pub struct GeoResolver {
    geocoders: Vec<Arc<dyn Geocoder>>,
}

impl GeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fallback geocoder; declared order is resolution order.
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoders.push(geocoder);
        self
    }

    /// Resolve a location hint against the article text. Returns `None`
    /// when no strategy produces valid coordinates.
    pub async fn resolve(&self, text: &str, hint: Option<&str>) -> Option<ResolvedLocation> {
        let candidate = self.resolve_inner(text, hint).await;
        let candidate = enforce_verified(text, hint, candidate);
        candidate.filter(|loc| loc.is_valid())
    }

    async fn resolve_inner(&self, text: &str, hint: Option<&str>) -> Option<ResolvedLocation> {
        let cleaned = hint.map(|h| strip_qualifier(h.trim()));

        // 1. Verified hotspots, by hint then by text scan.
        if let Some(name) = cleaned {
            if let Some(row) = lookup_hotspot(name) {
                return Some(from_row(name, row, LocationMethod::VerifiedMatch, 1.0));
            }
        }
        let lowered = text.to_lowercase();
        for row in VERIFIED_HOTSPOTS {
            if lowered.contains(row.0) {
                return Some(from_row(row.0, *row, LocationMethod::VerifiedMatch, 1.0));
            }
        }

        // 2. Ambiguous city disambiguation.
        if let Some(name) = cleaned {
            if let Some((city, candidate)) = disambiguate(name, text) {
                return Some(ResolvedLocation {
                    lat: candidate.lat,
                    lng: candidate.lng,
                    name: city.name.to_string(),
                    country: candidate.country.to_string(),
                    region: candidate.region.to_string(),
                    method: LocationMethod::VerifiedCorrection,
                    confidence: 0.9,
                });
            }
        }

        // 3. Curated landmarks.
        if let Some(name) = cleaned {
            if let Some(row) = lookup(ENHANCED_MAPPINGS, name) {
                return Some(from_row(name, row, LocationMethod::EnhancedMapping, 0.9));
            }
        }
        for row in ENHANCED_MAPPINGS {
            if lowered.contains(row.0) {
                return Some(from_row(row.0, *row, LocationMethod::EnhancedMapping, 0.9));
            }
        }

        // 4. Base city table.
        if let Some(name) = cleaned {
            if let Some(row) = lookup(BASE_MAPPINGS, name) {
                return Some(from_row(name, row, LocationMethod::BaseMapping, 0.8));
            }
        }

        // 5. Relative offsets: "N km north of X".
        if let Some(loc) = resolve_relative(text) {
            return Some(loc);
        }

        // 6. External geocoders, in declared order.
        if let Some(name) = cleaned {
            for geocoder in &self.geocoders {
                match geocoder.geocode(name).await {
                    Ok(Some(hit)) => {
                        let country = hit.country.unwrap_or_default();
                        let region = region_for_country(&country).to_string();
                        return Some(ResolvedLocation {
                            lat: hit.lat,
                            lng: hit.lng,
                            name: name.to_string(),
                            country,
                            region,
                            method: LocationMethod::Geocoded,
                            confidence: 0.6,
                        });
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::debug!(geocoder = geocoder.name(), "geocode failed: {}", err);
                        continue;
                    }
                }
            }
        }

        None
    }
}

fn anchor_lookup(name: &str) -> Option<MappingRow> {
    lookup_hotspot(name)
        .or_else(|| lookup(ENHANCED_MAPPINGS, name))
        .or_else(|| lookup(BASE_MAPPINGS, name))
}

fn resolve_relative(text: &str) -> Option<ResolvedLocation> {
    let caps = RELATIVE_RE.captures(text)?;
    let mut distance_km: f64 = caps[1].parse().ok()?;
    if caps[0].contains("mile") {
        distance_km *= 1.609;
    }
    let direction = caps[2].to_lowercase();
    let anchor_name = caps[3].trim();

    let (_, lat, lng, country, region) = anchor_lookup(anchor_name)?;

    let (north, east): (f64, f64) = match direction.as_str() {
        "north" => (1.0, 0.0),
        "south" => (-1.0, 0.0),
        "east" => (0.0, 1.0),
        "west" => (0.0, -1.0),
        "northeast" => (0.707, 0.707),
        "northwest" => (0.707, -0.707),
        "southeast" => (-0.707, 0.707),
        _ => (-0.707, -0.707),
    };

    let new_lat = lat + north * distance_km / KM_PER_DEGREE;
    let new_lng = lng + east * distance_km / (KM_PER_DEGREE * lat.to_radians().cos().max(0.01));

    Some(ResolvedLocation {
        lat: new_lat,
        lng: new_lng,
        name: format!("{} km {} of {}", &caps[1], direction, anchor_name),
        country: country.to_string(),
        region: region.to_string(),
        method: LocationMethod::RelativeOffset,
        confidence: 0.7,
    })
}

/// Post-condition: when a verified or ambiguity rule covers the name, the
/// resolved coordinates must land in that rule's country (within 0.1
/// degrees of the verified point); otherwise the verified coordinates
/// replace them and the method records the correction.
fn enforce_verified(
    text: &str,
    hint: Option<&str>,
    candidate: Option<ResolvedLocation>,
) -> Option<ResolvedLocation> {
    let mut loc = candidate?;
    let rule_name = hint
        .map(|h| strip_qualifier(h.trim()).to_string())
        .unwrap_or_else(|| loc.name.clone());

    if let Some((expected_lat, expected_lng, country, region)) =
        verified::expectation(&rule_name, text)
    {
        if (loc.lat - expected_lat).abs() >= 0.1 || (loc.lng - expected_lng).abs() >= 0.1 {
            loc = ResolvedLocation {
                lat: expected_lat,
                lng: expected_lng,
                name: loc.name,
                country,
                region,
                method: LocationMethod::VerifiedCorrection,
                confidence: 0.9,
            };
        }
    }
    Some(loc)
}
