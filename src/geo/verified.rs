//! Verified event hotspots and ambiguous-city disambiguation.
//!
//! The hotspot table is a small, auditable list of locations that have
//! hosted recurring conflict activity; growing it is an operational task,
//! not a code change. Ambiguity rules cover city names shared across
//! countries, selecting the candidate whose contextual cues appear in the
//! article text.

use super::mappings::MappingRow;

/// Verified conflict hotspots. Matches here resolve with confidence 1.0.
pub const VERIFIED_HOTSPOTS: &[MappingRow] = &[
    ("bakhmut", 48.5956, 37.9999, "Ukraine", "eastern_europe"),
    ("avdiivka", 48.1394, 37.7497, "Ukraine", "eastern_europe"),
    ("robotyne", 47.4483, 35.8369, "Ukraine", "eastern_europe"),
    ("chasiv yar", 48.5923, 37.8205, "Ukraine", "eastern_europe"),
    ("rafah", 31.2968, 34.2435, "Palestine", "middle_east"),
    ("khan younis", 31.3402, 34.3063, "Palestine", "middle_east"),
    ("jabalia", 31.5272, 34.4832, "Palestine", "middle_east"),
    ("el fasher", 13.6288, 25.3493, "Sudan", "africa"),
    ("marib", 15.4542, 45.3233, "Yemen", "middle_east"),
    ("idlib", 35.9306, 36.6339, "Syria", "middle_east"),
];

/// One country candidate for an ambiguous city name.
#[derive(Debug, Clone, Copy)]
pub struct CityCandidate {
    pub lat: f64,
    pub lng: f64,
    pub country: &'static str,
    pub region: &'static str,
    /// Lowercase substrings that select this candidate
    pub cues: &'static [&'static str],
}

/// A city name shared across countries. The first candidate is the
/// default when no cue fires.
#[derive(Debug, Clone, Copy)]
pub struct AmbiguousCity {
    pub name: &'static str,
    pub candidates: &'static [CityCandidate],
}

/// Ambiguous city table.
pub const AMBIGUOUS_CITIES: &[AmbiguousCity] = &[
    AmbiguousCity {
        name: "tripoli",
        candidates: &[
            CityCandidate {
                lat: 32.8872,
                lng: 13.1913,
                country: "Libya",
                region: "africa",
                cues: &["libya", "libyan", "benghazi", "haftar", "lna", "gna", "misrata"],
            },
            CityCandidate {
                lat: 34.4346,
                lng: 35.8362,
                country: "Lebanon",
                region: "middle_east",
                cues: &[
                    "lebanon",
                    "lebanese",
                    "hezbollah",
                    "beirut",
                    "northern lebanon",
                ],
            },
        ],
    },
    AmbiguousCity {
        name: "hyderabad",
        candidates: &[
            CityCandidate {
                lat: 17.3850,
                lng: 78.4867,
                country: "India",
                region: "south_asia",
                cues: &["india", "indian", "telangana"],
            },
            CityCandidate {
                lat: 25.3960,
                lng: 68.3578,
                country: "Pakistan",
                region: "south_asia",
                cues: &["pakistan", "pakistani", "sindh", "karachi"],
            },
        ],
    },
];

/// Look up a verified hotspot by name.
pub fn lookup_hotspot(name: &str) -> Option<MappingRow> {
    super::mappings::lookup(VERIFIED_HOTSPOTS, name)
}

/// Disambiguate a city name against the article text. Returns the cue
/// match, or the default candidate when no cue fires.
pub fn disambiguate(name: &str, text: &str) -> Option<(AmbiguousCity, CityCandidate)> {
    let key = name.trim().to_lowercase();
    let city = AMBIGUOUS_CITIES.iter().find(|c| c.name == key)?;

    let haystack = text.to_lowercase();
    for candidate in city.candidates {
        if candidate.cues.iter().any(|cue| haystack.contains(cue)) {
            return Some((*city, *candidate));
        }
    }
    Some((*city, city.candidates[0]))
}

/// Expected coordinates for a name covered by a verified or ambiguity
/// rule, used to enforce the post-condition that resolved coordinates
/// agree with the selected country.
pub fn expectation(name: &str, text: &str) -> Option<(f64, f64, String, String)> {
    if let Some((_, lat, lng, country, region)) = lookup_hotspot(name) {
        return Some((lat, lng, country.to_string(), region.to_string()));
    }
    if let Some((_, candidate)) = disambiguate(name, text) {
        return Some((
            candidate.lat,
            candidate.lng,
            candidate.country.to_string(),
            candidate.region.to_string(),
        ));
    }
    None
}
