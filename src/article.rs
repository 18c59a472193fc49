use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized article as produced by the upstream normalization stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub article_id: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub source: String,
    pub published_at: DateTime<Utc>,

    // Raw embedding; empty when the embedding stage produced nothing
    #[serde(default)]
    pub embedding: Vec<f32>,

    #[serde(default)]
    pub entities: Vec<ArticleEntity>,
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// A named entity extracted from an article, with its mention count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

/// Location type, as classified by the location-resolution stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Country,
    Region,
    City,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKind::Country => write!(f, "country"),
            LocationKind::Region => write!(f, "region"),
            LocationKind::City => write!(f, "city"),
            LocationKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A geographic mention attached to an article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: LocationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_region: Option<String>,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub in_headline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

/// A location that can be placed in a country bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedLocation<'a> {
    Country { code: &'a str, name: &'a str },
    Region { code: &'a str, name: &'a str },
    City { code: &'a str, name: &'a str },
}

impl ResolvedLocation<'_> {
    pub fn country_code(&self) -> &str {
        match self {
            ResolvedLocation::Country { code, .. }
            | ResolvedLocation::Region { code, .. }
            | ResolvedLocation::City { code, .. } => code,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResolvedLocation::Country { name, .. }
            | ResolvedLocation::Region { name, .. }
            | ResolvedLocation::City { name, .. } => name,
        }
    }
}

impl Location {
    pub fn new(name: &str, country_code: Option<&str>, kind: LocationKind) -> Self {
        Location {
            name: name.to_string(),
            country_code: country_code.map(str::to_string),
            kind,
            parent_region: None,
            count: 1,
            in_headline: false,
            original: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_headline(mut self, in_headline: bool) -> Self {
        self.in_headline = in_headline;
        self
    }

    /// The country code, treating blanks and the literal "unknown" as absent.
    pub fn known_country_code(&self) -> Option<&str> {
        self.country_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty() && !code.eq_ignore_ascii_case("unknown"))
    }

    /// Classifies this mention for country bucketing.
    ///
    /// Returns `None` for unknown-type mentions, blank names and mentions
    /// without a country code; those never contribute to aggregation.
    pub fn resolve(&self) -> Option<ResolvedLocation<'_>> {
        let name = self.name.trim();
        if name.is_empty() {
            return None;
        }
        let code = self.known_country_code()?;
        match self.kind {
            LocationKind::Country => Some(ResolvedLocation::Country { code, name }),
            LocationKind::Region => Some(ResolvedLocation::Region { code, name }),
            LocationKind::City => Some(ResolvedLocation::City { code, name }),
            LocationKind::Unknown => None,
        }
    }
}

fn default_count() -> u32 {
    1
}

fn default_kind() -> LocationKind {
    LocationKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_discards_unknown_and_missing_codes() {
        let unknown = Location::new("Somewhere", Some("FR"), LocationKind::Unknown);
        assert!(unknown.resolve().is_none());

        let no_code = Location::new("Paris", None, LocationKind::City);
        assert!(no_code.resolve().is_none());

        let literal_unknown = Location::new("Paris", Some("unknown"), LocationKind::City);
        assert!(literal_unknown.resolve().is_none());

        let paris = Location::new("Paris", Some("FR"), LocationKind::City);
        assert_eq!(
            paris.resolve(),
            Some(ResolvedLocation::City {
                code: "FR",
                name: "Paris"
            })
        );
    }

    #[test]
    fn test_location_deserializes_with_defaults() {
        let json = r#"{"name": "Texas", "country_code": "US", "type": "region"}"#;
        let loc: Location = serde_json::from_str(json).unwrap();
        assert_eq!(loc.kind, LocationKind::Region);
        assert_eq!(loc.count, 1);
        assert!(!loc.in_headline);

        let json = r#"{"name": "Atlantis", "type": "mythical"}"#;
        let loc: Location = serde_json::from_str(json).unwrap();
        assert_eq!(loc.kind, LocationKind::Unknown);
    }

    #[test]
    fn test_article_deserializes_without_optional_fields() {
        let json = r#"{
            "article_id": "a1",
            "headline": "Storm hits coast",
            "published_at": "2025-01-02T03:04:05Z",
            "extra_field": 42
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert_eq!(article.article_id, "a1");
        assert!(article.embedding.is_empty());
        assert!(article.entities.is_empty());
        assert!(article.source.is_empty());
    }
}
