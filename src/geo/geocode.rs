//! External geocoding fallback.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{Error, Result};

/// A geocoder hit: coordinates plus the country the geocoder reports.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub lat: f64,
    pub lng: f64,
    pub country: Option<String>,
}

/// External geocoder capability. Resolvers run geocoders in declared
/// order; the first hit wins.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, name: &str) -> Result<Option<GeocodeHit>>;

    /// Identifier used in diagnostics.
    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct NominatimRow {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// Nominatim-style HTTP geocoder. The base URL is configurable so
/// deployments can point at their own instance.
pub struct HttpGeocoder {
    http: Client,
    base_url: String,
}

impl HttpGeocoder {
    const DEFAULT_BASE_URL: &'static str = "https://nominatim.openstreetmap.org";

    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, name: &str) -> Result<Option<GeocodeHit>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("user-agent", "vigil/0.1 (+https://github.com/rand/vigil)")
            .query(&[("q", name), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| Error::Geocode(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Geocode(format!("HTTP {}", status)));
        }

        let rows: Vec<NominatimRow> = response
            .json()
            .await
            .map_err(|e| Error::Geocode(format!("bad payload: {}", e)))?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let lat: f64 = row
            .lat
            .parse()
            .map_err(|_| Error::Geocode(format!("bad latitude {:?}", row.lat)))?;
        let lng: f64 = row
            .lon
            .parse()
            .map_err(|_| Error::Geocode(format!("bad longitude {:?}", row.lon)))?;

        // Nominatim display names end with the country.
        let country = row
            .display_name
            .rsplit(',')
            .next()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Some(GeocodeHit { lat, lng, country }))
    }

    fn name(&self) -> &str {
        "nominatim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_nominatim_row() {
        let body = r#"[{"lat": "49.9935", "lon": "36.2304", "display_name": "Kharkiv, Kharkiv Oblast, Ukraine"}]"#;
        let rows: Vec<NominatimRow> = serde_json::from_str(body).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lat, "49.9935");
        assert!(rows[0].display_name.ends_with("Ukraine"));
    }

    #[test]
    fn test_empty_result_is_none_shaped() {
        let rows: Vec<NominatimRow> = serde_json::from_str("[]").unwrap();
        assert!(rows.is_empty());
    }
}
