use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::entities::aggregate_entities;
use super::identity::generate_story_id;
use super::title::select_title;
use super::types::{ArticleSummary, ClusterMember, Story, StoryArticles};
use crate::article::Article;
use crate::error::AggregationError;
use crate::location::{aggregate_locations, CountryNameLookup, LocationParams};
use crate::vector::similarity::normalized_centroid;
use crate::TARGET_STORY;

/// Run-wide inputs shared by every story of a run.
#[derive(Clone, Copy)]
pub struct StoryContext<'a> {
    pub fingerprint: &'a str,
    pub created_at: DateTime<Utc>,
    pub location_params: &'a LocationParams,
    pub country_names: &'a dyn CountryNameLookup,
    pub top_entities_limit: usize,
}

/// Builds the story record for one cluster.
///
/// # Arguments
/// * `members` - The cluster's articles with their unit vectors
/// * `ctx` - Fingerprint, run time and aggregation settings
///
/// # Returns
/// * `Ok(Story)` - The assembled story
/// * `Err(AggregationError::EmptyCluster)` - If `members` is empty
pub fn assemble_story(
    members: &[ClusterMember<'_>],
    ctx: &StoryContext<'_>,
) -> Result<Story, AggregationError> {
    let earliest = members
        .iter()
        .min_by(|a, b| a.chronological_key().cmp(&b.chronological_key()))
        .ok_or(AggregationError::EmptyCluster)?;
    let start_published_at = earliest.article.published_at;
    let end_published_at = members
        .iter()
        .map(|m| m.article.published_at)
        .max()
        .unwrap_or(start_published_at);

    let articles: Vec<&Article> = members.iter().map(|m| m.article).collect();
    let ids: Vec<&str> = articles.iter().map(|a| a.article_id.as_str()).collect();
    let story_id = generate_story_id(&ids, ctx.fingerprint);

    let centroid = normalized_centroid(members.iter().map(|m| m.vector));
    if centroid.is_none() {
        warn!(
            target: TARGET_STORY,
            "Centroid of {} cancels out, falling back to earliest article", story_id
        );
    }

    let title = select_title(members, centroid.as_deref());
    let story_embedding = centroid.unwrap_or_else(|| earliest.vector.to_vec());

    let top_entities = aggregate_entities(&articles, ctx.top_entities_limit);
    let locations = aggregate_locations(&articles, ctx.location_params, ctx.country_names)?;

    let sources: Vec<String> = articles
        .iter()
        .map(|a| a.source.trim())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_string)
        .collect();

    debug!(
        target: TARGET_STORY,
        "Assembled {} with {} articles, {} countries, {} entities",
        story_id,
        members.len(),
        locations.len(),
        top_entities.len()
    );

    Ok(Story {
        story_id,
        title,
        article_count: members.len(),
        sources,
        top_entities,
        locations,
        story_embedding,
        start_published_at,
        end_published_at,
        created_at: ctx.created_at,
    })
}

/// Denormalized view of a story with its articles in publication order.
pub fn story_articles(story: &Story, members: &[ClusterMember<'_>]) -> StoryArticles {
    let mut ordered: Vec<&ClusterMember<'_>> = members.iter().collect();
    ordered.sort_by(|a, b| a.chronological_key().cmp(&b.chronological_key()));

    StoryArticles {
        story_id: story.story_id.clone(),
        title: story.title.clone(),
        locations: story.locations.clone(),
        articles: ordered
            .into_iter()
            .map(|m| ArticleSummary {
                article_id: m.article.article_id.clone(),
                headline: m.article.headline.clone(),
                source: m.article.source.clone(),
                published_at: m.article.published_at,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{ArticleEntity, Location, LocationKind};
    use crate::location::IsoCountryNames;
    use crate::story::identity::clustering_fingerprint;
    use crate::vector::similarity::magnitude;
    use chrono::TimeZone;

    fn article(id: &str, headline: &str, source: &str, hour: u32) -> Article {
        Article {
            article_id: id.to_string(),
            headline: headline.to_string(),
            source: source.to_string(),
            published_at: Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap(),
            embedding: Vec::new(),
            entities: vec![ArticleEntity {
                text: "Volcano".to_string(),
                entity_type: "EVENT".to_string(),
                count: 1,
            }],
            locations: vec![
                Location::new("Iceland", Some("IS"), LocationKind::Country)
                    .with_count(8)
                    .with_headline(true),
            ],
        }
    }

    fn context<'a>(fingerprint: &'a str, params: &'a LocationParams) -> StoryContext<'a> {
        StoryContext {
            fingerprint,
            created_at: Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
            location_params: params,
            country_names: &IsoCountryNames,
            top_entities_limit: 10,
        }
    }

    #[test]
    fn test_assembles_story_fields() {
        let a = article("a", "Volcano erupts in Iceland", "bbc", 9);
        let b = article("b", "Iceland eruption continues", "reuters", 7);
        let c = article("c", "Flights cancelled over ash", "bbc", 12);
        let va = vec![1.0f32, 0.0, 0.0];
        let vb = vec![0.8f32, 0.6, 0.0];
        let vc = vec![0.8f32, 0.0, 0.6];
        let members = vec![
            ClusterMember { article: &a, vector: &va },
            ClusterMember { article: &b, vector: &vb },
            ClusterMember { article: &c, vector: &vc },
        ];
        let fp = clustering_fingerprint("hdbscan", 1);
        let params = LocationParams::default();

        let story = assemble_story(&members, &context(&fp, &params)).unwrap();
        assert_eq!(story.article_count, 3);
        assert_eq!(story.title, "Volcano erupts in Iceland");
        assert_eq!(story.sources, vec!["bbc".to_string(), "reuters".to_string()]);
        assert_eq!(story.start_published_at, b.published_at);
        assert_eq!(story.end_published_at, c.published_at);
        assert_eq!(story.top_entities[0].count, 3);
        assert_eq!(story.locations.len(), 1);
        assert_eq!(story.locations[0].name, "Iceland");
        assert!((magnitude(&story.story_embedding) - 1.0).abs() < 1e-5);
        assert_eq!(story.created_at, Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());

        let view = story_articles(&story, &members);
        let order: Vec<&str> = view.articles.iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(view.story_id, story.story_id);
    }

    #[test]
    fn test_degenerate_centroid_falls_back_to_earliest_article() {
        let a = article("a", "Late", "x", 10);
        let b = article("b", "Early", "x", 5);
        let va = vec![1.0f32, 0.0];
        let vb = vec![-1.0f32, 0.0];
        let members = vec![
            ClusterMember { article: &a, vector: &va },
            ClusterMember { article: &b, vector: &vb },
        ];
        let fp = clustering_fingerprint("hdbscan", 1);
        let params = LocationParams::default();

        let story = assemble_story(&members, &context(&fp, &params)).unwrap();
        assert_eq!(story.title, "Early");
        assert_eq!(story.story_embedding, vb);
    }

    #[test]
    fn test_empty_cluster_is_rejected() {
        let fp = clustering_fingerprint("hdbscan", 1);
        let params = LocationParams::default();
        assert_eq!(
            assemble_story(&[], &context(&fp, &params)),
            Err(AggregationError::EmptyCluster)
        );
    }
}
