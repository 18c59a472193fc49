use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::countries::CountryNameLookup;
use crate::article::{Article, LocationKind, ResolvedLocation};
use crate::config::{
    DEFAULT_LOCATION_MAX_CITIES, DEFAULT_LOCATION_MAX_LOCATIONS, DEFAULT_LOCATION_MAX_REGIONS,
    DEFAULT_LOCATION_MIN_CONFIDENCE,
};
use crate::error::AggregationError;
use crate::TARGET_LOCATION;

/// Mentions at which the mention component of confidence saturates
pub const MENTION_SATURATION: f64 = 20.0;
pub const MENTION_WEIGHT: f64 = 0.6;
pub const COVERAGE_WEIGHT: f64 = 0.2;
pub const HEADLINE_WEIGHT: f64 = 0.2;

/// Thresholds and truncation limits for one aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationParams {
    pub min_confidence: f64,
    pub max_locations: usize,
    pub max_regions: usize,
    pub max_cities: usize,
}

impl Default for LocationParams {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_LOCATION_MIN_CONFIDENCE,
            max_locations: DEFAULT_LOCATION_MAX_LOCATIONS,
            max_regions: DEFAULT_LOCATION_MAX_REGIONS,
            max_cities: DEFAULT_LOCATION_MAX_CITIES,
        }
    }
}

/// A region or city nested under a country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubLocation {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LocationKind,
    pub mention_count: u32,
    pub in_headline_ratio: f64,
}

/// One country of a story, with its confidence and nested places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySummary {
    pub name: String,
    pub country_code: String,
    pub confidence: f64,
    /// Country, region and city mentions together
    pub mention_count: u32,
    pub in_headline_ratio: f64,
    pub regions: Vec<SubLocation>,
    pub cities: Vec<SubLocation>,
}

#[derive(Debug, Default)]
struct SubCounter {
    mentions: u32,
    headline_articles: BTreeSet<usize>,
}

#[derive(Debug, Default)]
struct CountryBucket {
    country_mentions: u32,
    country_names: BTreeMap<String, u32>,
    sub_locations: BTreeMap<(String, LocationKind), SubCounter>,
    articles: BTreeSet<usize>,
    headline_articles: BTreeSet<usize>,
}

impl CountryBucket {
    fn total_mentions(&self) -> u32 {
        self.sub_locations
            .values()
            .fold(self.country_mentions, |acc, sub| acc.saturating_add(sub.mentions))
    }

    /// Most frequent country-kind name, ties going to the lexically smallest.
    fn own_name(&self) -> Option<&str> {
        let mut best: Option<(&str, u32)> = None;
        for (name, count) in &self.country_names {
            match best {
                Some((_, best_count)) if best_count >= *count => {}
                _ => best = Some((name, *count)),
            }
        }
        best.map(|(name, _)| name)
    }
}

/// Weighted confidence that a story is about a country.
///
/// # Arguments
/// * `total_mentions` - Country, region and city mentions in the cluster
/// * `articles_with_mentions` - Distinct articles mentioning the country
/// * `headline_articles` - Distinct articles naming the country (or a place in it) in the headline
/// * `total_articles` - Cluster size
///
/// # Returns
/// * `f64` - Confidence within `[0, 1]`; 0 for an empty cluster
pub fn location_confidence(
    total_mentions: u32,
    articles_with_mentions: usize,
    headline_articles: usize,
    total_articles: usize,
) -> f64 {
    if total_articles == 0 {
        return 0.0;
    }
    let n = total_articles as f64;
    let mention_score = (total_mentions as f64 / MENTION_SATURATION).min(1.0) * MENTION_WEIGHT;
    let coverage_score = (articles_with_mentions as f64 / n) * COVERAGE_WEIGHT;
    let headline_score = (headline_articles as f64 / n) * HEADLINE_WEIGHT;
    (mention_score + coverage_score + headline_score).clamp(0.0, 1.0)
}

fn by_mentions_then_name(a: &SubLocation, b: &SubLocation) -> Ordering {
    b.mention_count
        .cmp(&a.mention_count)
        .then_with(|| a.name.cmp(&b.name))
}

/// Builds the ranked country → region → city summary of a cluster.
///
/// Unknown-type mentions and mentions without a country code are ignored.
/// Countries under `params.min_confidence` are dropped; the rest are ranked by
/// confidence, then mention count, then country code, and truncated.
///
/// # Arguments
/// * `articles` - The cluster's member articles
/// * `params` - Threshold and truncation limits
/// * `country_names` - Fallback for countries with no country-kind mention
///
/// # Returns
/// * `Ok(Vec<CountrySummary>)` - Possibly empty
/// * `Err(AggregationError::EmptyCluster)` - If `articles` is empty
pub fn aggregate_locations(
    articles: &[&Article],
    params: &LocationParams,
    country_names: &dyn CountryNameLookup,
) -> Result<Vec<CountrySummary>, AggregationError> {
    let total_articles = articles.len();
    if total_articles == 0 {
        return Err(AggregationError::EmptyCluster);
    }

    let mut buckets: BTreeMap<String, CountryBucket> = BTreeMap::new();

    for (idx, article) in articles.iter().enumerate() {
        let headline = article.headline.to_lowercase();

        for location in &article.locations {
            let Some(resolved) = location.resolve() else {
                continue;
            };
            let code = resolved.country_code().to_uppercase();
            let name = resolved.name();
            let in_headline = location.in_headline || headline.contains(&name.to_lowercase());

            let bucket = buckets.entry(code).or_default();
            bucket.articles.insert(idx);
            if in_headline {
                bucket.headline_articles.insert(idx);
            }

            let sub_kind = match resolved {
                ResolvedLocation::Country { .. } => {
                    bucket.country_mentions = bucket.country_mentions.saturating_add(location.count);
                    *bucket.country_names.entry(name.to_string()).or_insert(0) += location.count;
                    continue;
                }
                ResolvedLocation::Region { .. } => LocationKind::Region,
                ResolvedLocation::City { .. } => LocationKind::City,
            };

            let sub = bucket
                .sub_locations
                .entry((name.to_string(), sub_kind))
                .or_default();
            sub.mentions = sub.mentions.saturating_add(location.count);
            if in_headline {
                sub.headline_articles.insert(idx);
            }
        }
    }

    let mut summaries = Vec::new();

    for (code, bucket) in &buckets {
        let total_mentions = bucket.total_mentions();
        if total_mentions == 0 {
            continue;
        }

        let confidence = location_confidence(
            total_mentions,
            bucket.articles.len(),
            bucket.headline_articles.len(),
            total_articles,
        );

        if confidence < params.min_confidence {
            debug!(
                target: TARGET_LOCATION,
                "Dropping {} with confidence {:.4} (threshold {})",
                code,
                confidence,
                params.min_confidence
            );
            continue;
        }

        let name = match bucket.own_name() {
            Some(name) => name.to_string(),
            None => country_names
                .name_for(code)
                .unwrap_or_else(|| code.clone()),
        };

        let mut regions = Vec::new();
        let mut cities = Vec::new();
        for ((sub_name, kind), counter) in &bucket.sub_locations {
            let sub = SubLocation {
                name: sub_name.clone(),
                kind: *kind,
                mention_count: counter.mentions,
                in_headline_ratio: counter.headline_articles.len() as f64 / total_articles as f64,
            };
            match kind {
                LocationKind::Region => regions.push(sub),
                LocationKind::City => cities.push(sub),
                LocationKind::Country | LocationKind::Unknown => {}
            }
        }
        regions.sort_by(by_mentions_then_name);
        regions.truncate(params.max_regions);
        cities.sort_by(by_mentions_then_name);
        cities.truncate(params.max_cities);

        summaries.push(CountrySummary {
            name,
            country_code: code.clone(),
            confidence,
            mention_count: total_mentions,
            in_headline_ratio: bucket.headline_articles.len() as f64 / total_articles as f64,
            regions,
            cities,
        });
    }

    summaries.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.mention_count.cmp(&a.mention_count))
            .then_with(|| a.country_code.cmp(&b.country_code))
    });
    summaries.truncate(params.max_locations);

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Location;
    use crate::location::countries::IsoCountryNames;
    use chrono::{TimeZone, Utc};

    fn article(id: &str, headline: &str, locations: Vec<Location>) -> Article {
        Article {
            article_id: id.to_string(),
            headline: headline.to_string(),
            source: "wire".to_string(),
            published_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            embedding: vec![1.0, 0.0],
            entities: Vec::new(),
            locations,
        }
    }

    fn permissive() -> LocationParams {
        LocationParams {
            min_confidence: 0.0,
            ..LocationParams::default()
        }
    }

    fn israel(count: u32, headline: bool) -> Location {
        Location::new("Israel", Some("IL"), LocationKind::Country)
            .with_count(count)
            .with_headline(headline)
    }

    #[test]
    fn test_low_confidence_country_is_excluded() {
        let a = article("a", "Ceasefire talks resume", vec![israel(2, true)]);
        let b = article("b", "Talks resume in Cairo", vec![israel(1, true)]);
        let c = article("c", "Talks resume", vec![israel(1, false)]);
        let members = vec![&a, &b, &c];

        let confidence = location_confidence(4, 3, 2, 3);
        assert!((confidence - 0.453_333).abs() < 1e-4);

        let summaries =
            aggregate_locations(&members, &LocationParams::default(), &IsoCountryNames).unwrap();
        assert!(summaries.is_empty());

        let summaries = aggregate_locations(&members, &permissive(), &IsoCountryNames).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].country_code, "IL");
        assert_eq!(summaries[0].mention_count, 4);
        assert!((summaries[0].confidence - confidence).abs() < 1e-12);
        assert!((summaries[0].in_headline_ratio - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_is_bounded() {
        assert_eq!(location_confidence(1000, 3, 3, 3), 1.0);
        assert_eq!(location_confidence(0, 0, 0, 3), 0.0);
        assert_eq!(location_confidence(5, 1, 1, 0), 0.0);
        // Saturated mentions with full coverage and no headlines
        assert!((location_confidence(20, 2, 0, 2) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_headline_match_counts_articles_once() {
        let a = article(
            "a",
            "Flooding across ISRAEL",
            vec![
                israel(1, false),
                Location::new("Haifa", Some("il"), LocationKind::City),
            ],
        );
        let b = article("b", "Weather update", vec![israel(1, false)]);

        let summaries = aggregate_locations(&[&a, &b], &permissive(), &IsoCountryNames).unwrap();
        assert_eq!(summaries[0].country_code, "IL");
        assert_eq!(summaries[0].mention_count, 3);
        assert!((summaries[0].in_headline_ratio - 0.5).abs() < 1e-12);
        assert_eq!(summaries[0].cities.len(), 1);
        assert_eq!(summaries[0].cities[0].in_headline_ratio, 0.0);
    }

    #[test]
    fn test_unknown_and_codeless_mentions_are_discarded() {
        let a = article(
            "a",
            "Somewhere",
            vec![
                Location::new("Atlantis", Some("GR"), LocationKind::Unknown),
                Location::new("Springfield", None, LocationKind::City),
                Location::new("Gotham", Some("unknown"), LocationKind::City),
            ],
        );
        let summaries = aggregate_locations(&[&a], &permissive(), &IsoCountryNames).unwrap();
        assert!(summaries.is_empty());
    }

    #[test]
    fn test_truncation_and_ordering() {
        let a = article(
            "a",
            "Storms",
            vec![
                Location::new("France", Some("FR"), LocationKind::Country).with_count(5),
                Location::new("Lyon", Some("FR"), LocationKind::City).with_count(2),
                Location::new("Nice", Some("FR"), LocationKind::City).with_count(2),
                Location::new("Paris", Some("FR"), LocationKind::City).with_count(3),
                Location::new("Brittany", Some("FR"), LocationKind::Region),
                Location::new("Spain", Some("ES"), LocationKind::Country),
            ],
        );
        let params = LocationParams {
            min_confidence: 0.0,
            max_locations: 1,
            max_regions: 5,
            max_cities: 2,
        };

        let summaries = aggregate_locations(&[&a], &params, &IsoCountryNames).unwrap();
        assert_eq!(summaries.len(), 1);
        let france = &summaries[0];
        assert_eq!(france.name, "France");
        assert_eq!(france.mention_count, 13);
        let cities: Vec<&str> = france.cities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cities, vec!["Paris", "Lyon"]);
        assert_eq!(france.regions.len(), 1);
        assert_eq!(france.regions[0].kind, LocationKind::Region);
    }

    #[test]
    fn test_equal_confidence_ties_break_on_code() {
        let a = article(
            "a",
            "Summit",
            vec![
                Location::new("Norway", Some("NO"), LocationKind::Country),
                Location::new("Denmark", Some("DK"), LocationKind::Country),
            ],
        );
        let summaries = aggregate_locations(&[&a], &permissive(), &IsoCountryNames).unwrap();
        let codes: Vec<&str> = summaries.iter().map(|s| s.country_code.as_str()).collect();
        assert_eq!(codes, vec!["DK", "NO"]);
    }

    #[test]
    fn test_canonical_name_fallbacks() {
        let a = article(
            "a",
            "Local news",
            vec![
                Location::new("Tel Aviv", Some("IL"), LocationKind::City),
                Location::new("Nowhere City", Some("QQ"), LocationKind::City),
            ],
        );
        let summaries = aggregate_locations(&[&a], &permissive(), &IsoCountryNames).unwrap();
        let names: Vec<(&str, &str)> = summaries
            .iter()
            .map(|s| (s.country_code.as_str(), s.name.as_str()))
            .collect();
        assert!(names.contains(&("IL", "Israel")));
        assert!(names.contains(&("QQ", "QQ")));
    }

    #[test]
    fn test_most_frequent_country_name_wins() {
        let a = article(
            "a",
            "Elections",
            vec![
                Location::new("USA", Some("US"), LocationKind::Country).with_count(3),
                Location::new("America", Some("US"), LocationKind::Country).with_count(1),
            ],
        );
        let summaries = aggregate_locations(&[&a], &permissive(), &IsoCountryNames).unwrap();
        assert_eq!(summaries[0].name, "USA");
    }

    #[test]
    fn test_empty_cluster_is_an_error() {
        assert_eq!(
            aggregate_locations(&[], &permissive(), &IsoCountryNames),
            Err(AggregationError::EmptyCluster)
        );
    }
}
