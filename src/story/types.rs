use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::Article;
use crate::location::CountrySummary;

/// Title used when no member article has a usable headline
pub const UNTITLED_STORY: &str = "Untitled Story";

/// An article of a cluster together with its unit vector.
#[derive(Debug, Clone, Copy)]
pub struct ClusterMember<'a> {
    pub article: &'a Article,
    pub vector: &'a [f32],
}

impl ClusterMember<'_> {
    /// Sort key placing earlier articles first, ids breaking equal timestamps.
    pub fn chronological_key(&self) -> (DateTime<Utc>, &str) {
        (self.article.published_at, self.article.article_id.as_str())
    }
}

/// An entity rolled up over a story's articles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub count: u32,
}

/// A group of articles covering the same event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub story_id: String,
    pub title: String,
    pub article_count: usize,
    pub sources: Vec<String>,
    pub top_entities: Vec<TopEntity>,
    pub locations: Vec<CountrySummary>,
    pub story_embedding: Vec<f32>,
    pub start_published_at: DateTime<Utc>,
    pub end_published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Where one input article ended up; `story_id` is `None` for noise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleStoryMapping {
    pub article_id: String,
    pub story_id: Option<String>,
    pub cluster_label: i32,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub article_id: String,
    pub headline: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
}

/// Denormalized story view for readers that want articles inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryArticles {
    pub story_id: String,
    pub title: String,
    pub locations: Vec<CountrySummary>,
    pub articles: Vec<ArticleSummary>,
}
