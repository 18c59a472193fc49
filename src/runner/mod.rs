//! Orchestration of one clustering run: preprocessing, clustering, and
//! per-cluster story assembly.


use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::clustering::{group_labels, ClusterStats, DensityClusterer, Hdbscan, NOISE_LABEL};
use crate::config::ClusterConfig;
use crate::error::{AggregationError, BatchError};
use crate::io::RejectedArticle;
use crate::location::{CountryNameLookup, IsoCountryNames};
use crate::story::{
    assemble_story, clustering_fingerprint, story_articles, ArticleStoryMapping, ClusterMember,
    Story, StoryArticles, StoryContext,
};
use crate::vector::preprocess_batch;
use crate::{ArticleDiagnostic, TARGET_RUNNER};

/// Everything a run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Ordered by article count descending, then story id
    pub stories: Vec<Story>,
    /// One per input article, in input order
    pub mappings: Vec<ArticleStoryMapping>,
    /// Same order as `stories`
    pub story_articles: Vec<StoryArticles>,
    pub diagnostics: Vec<ArticleDiagnostic>,
    pub stats: ClusterStats,
}

/// Turns an article batch into stories.
pub struct ClusterRunner {
    config: ClusterConfig,
    clusterer: Arc<dyn DensityClusterer>,
    country_names: Arc<dyn CountryNameLookup>,
}

impl ClusterRunner {
    pub fn new(
        config: ClusterConfig,
        clusterer: Arc<dyn DensityClusterer>,
        country_names: Arc<dyn CountryNameLookup>,
    ) -> Self {
        Self {
            config,
            clusterer,
            country_names,
        }
    }

    /// Runner using HDBSCAN built from `config` and the built-in country names.
    pub fn with_defaults(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let clusterer = Hdbscan::new(config.hdbscan_params())?;
        Ok(Self::new(
            config,
            Arc::new(clusterer),
            Arc::new(IsoCountryNames),
        ))
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Fingerprint mixed into every story id of this runner.
    pub fn fingerprint(&self) -> String {
        clustering_fingerprint(&self.clusterer.fingerprint(), self.config.time_window_days)
    }

    /// Clusters one batch and assembles its stories.
    ///
    /// Articles whose embedding breaks the input contract are left unclustered
    /// and reported in `diagnostics`; they never fail the run.
    ///
    /// # Arguments
    /// * `articles` - The window's articles, ids unique and non-blank
    /// * `run_at` - Timestamp recorded as `created_at` / `assigned_at`
    ///
    /// # Returns
    /// * `Ok(RunOutput)` - Stories, mappings, the story view, diagnostics and stats
    /// * `Err` - Invalid configuration, malformed batch or clusterer failure
    pub fn run(&self, articles: &[Article], run_at: DateTime<Utc>) -> Result<RunOutput> {
        self.config.validate()?;
        validate_batch(articles)?;

        if articles.is_empty() {
            info!(target: TARGET_RUNNER, "Empty batch, no stories to build");
            return Ok(RunOutput::default());
        }

        let items: Vec<(&str, &[f32])> = articles
            .iter()
            .map(|a| (a.article_id.as_str(), a.embedding.as_slice()))
            .collect();
        let batch = preprocess_batch(&items, self.config.embedding_dimension);

        let diagnostics: Vec<ArticleDiagnostic> = batch
            .rejected
            .iter()
            .map(|err| ArticleDiagnostic {
                article_id: err.article_id().to_string(),
                reason: err.to_string(),
            })
            .collect();

        let (positions, vectors): (Vec<usize>, Vec<Vec<f32>>) = batch.accepted.into_iter().unzip();

        let labels = if vectors.len() < self.config.min_cluster_size {
            info!(
                target: TARGET_RUNNER,
                "{} usable vectors is below min_cluster_size {}, all articles are noise",
                vectors.len(),
                self.config.min_cluster_size
            );
            vec![NOISE_LABEL; vectors.len()]
        } else {
            self.clusterer.cluster(&vectors)?
        };

        if labels.len() != vectors.len() {
            return Err(anyhow!(
                "Clusterer returned {} labels for {} vectors",
                labels.len(),
                vectors.len()
            ));
        }

        let groups = group_labels(&labels)?;
        debug!(
            target: TARGET_RUNNER,
            "{} clusters, {} noise vectors",
            groups.clusters.len(),
            groups.noise.len()
        );

        let clusters: Vec<(i32, Vec<ClusterMember<'_>>)> = groups
            .clusters
            .iter()
            .map(|(label, members)| {
                let members = members
                    .iter()
                    .map(|k| ClusterMember {
                        article: &articles[positions[*k]],
                        vector: vectors[*k].as_slice(),
                    })
                    .collect();
                (*label, members)
            })
            .collect();

        let fingerprint = self.fingerprint();
        let location_params = self.config.location_params();
        let ctx = StoryContext {
            fingerprint: &fingerprint,
            created_at: run_at,
            location_params: &location_params,
            country_names: self.country_names.as_ref(),
            top_entities_limit: self.config.top_entities_limit,
        };

        let mut assembled = clusters
            .par_iter()
            .map(|(label, members)| {
                let story = assemble_story(members, &ctx)?;
                let view = story_articles(&story, members);
                Ok((*label, story, view))
            })
            .collect::<Result<Vec<(i32, Story, StoryArticles)>, AggregationError>>()?;

        assembled.sort_by(|(_, a, _), (_, b, _)| {
            b.article_count
                .cmp(&a.article_count)
                .then_with(|| a.story_id.cmp(&b.story_id))
        });

        let story_by_label: BTreeMap<i32, &str> = assembled
            .iter()
            .map(|(label, story, _)| (*label, story.story_id.as_str()))
            .collect();

        let mut article_labels = vec![NOISE_LABEL; articles.len()];
        for (k, position) in positions.iter().enumerate() {
            article_labels[*position] = labels[k];
        }

        let mappings: Vec<ArticleStoryMapping> = articles
            .iter()
            .zip(article_labels.iter())
            .map(|(article, label)| ArticleStoryMapping {
                article_id: article.article_id.clone(),
                story_id: story_by_label.get(label).map(|id| id.to_string()),
                cluster_label: *label,
                assigned_at: run_at,
            })
            .collect();

        let mut stories = Vec::with_capacity(assembled.len());
        let mut views = Vec::with_capacity(assembled.len());
        for (_, story, view) in assembled {
            stories.push(story);
            views.push(view);
        }

        let stats = ClusterStats {
            total: articles.len(),
            excluded: diagnostics.len(),
            clustered: stories.iter().map(|s| s.article_count).sum(),
            noise: mappings.iter().filter(|m| m.story_id.is_none()).count(),
            clusters: stories.len(),
        };

        check_partition(&stories, &mappings, &stats)?;

        info!(
            target: TARGET_RUNNER,
            "Built {} stories from {} articles ({} clustered, {} noise, {} excluded)",
            stats.clusters,
            stats.total,
            stats.clustered,
            stats.noise,
            stats.excluded
        );
        if stats.excluded > 0 {
            warn!(
                target: TARGET_RUNNER,
                "{} articles were excluded for invalid embeddings", stats.excluded
            );
        }

        Ok(RunOutput {
            stories,
            mappings,
            story_articles: views,
            diagnostics,
            stats,
        })
    }

    /// Like `run`, also accounting for records the reader could not decode.
    ///
    /// Every rejected record is reported in `diagnostics`. One carrying an
    /// `article_id` not already in the batch is also mapped to noise, so the
    /// mapping still covers every article the input named.
    pub fn run_with_rejected(
        &self,
        articles: &[Article],
        rejected: &[RejectedArticle],
        run_at: DateTime<Utc>,
    ) -> Result<RunOutput> {
        let mut output = self.run(articles, run_at)?;
        if rejected.is_empty() {
            return Ok(output);
        }

        let mut seen: HashSet<String> = articles.iter().map(|a| a.article_id.clone()).collect();
        for record in rejected {
            output.diagnostics.push(record.to_diagnostic());
            output.stats.excluded += 1;

            let Some(id) = record.article_id.as_deref() else {
                continue;
            };
            if id.trim().is_empty() || !seen.insert(id.to_string()) {
                continue;
            }
            output.mappings.push(ArticleStoryMapping {
                article_id: id.to_string(),
                story_id: None,
                cluster_label: NOISE_LABEL,
                assigned_at: run_at,
            });
            output.stats.total += 1;
            output.stats.noise += 1;
        }

        check_partition(&output.stories, &output.mappings, &output.stats)?;
        warn!(
            target: TARGET_RUNNER,
            "{} input records could not be decoded and were left unclustered",
            rejected.len()
        );
        Ok(output)
    }
}

/// Rejects batches with blank or repeated article ids.
pub fn validate_batch(articles: &[Article]) -> Result<(), BatchError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(articles.len());
    for (position, article) in articles.iter().enumerate() {
        let id = article.article_id.as_str();
        if id.trim().is_empty() {
            return Err(BatchError::BlankArticleId { position });
        }
        if !seen.insert(id) {
            return Err(BatchError::DuplicateArticleId {
                article_id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Every article lands in exactly one story or in noise, and labels agree with story ids.
fn check_partition(
    stories: &[Story],
    mappings: &[ArticleStoryMapping],
    stats: &ClusterStats,
) -> Result<()> {
    if stats.clustered + stats.noise != stats.total || mappings.len() != stats.total {
        return Err(anyhow!(
            "Partition broken: {} clustered + {} noise != {} articles",
            stats.clustered,
            stats.noise,
            stats.total
        ));
    }

    let mut ids = HashSet::with_capacity(stories.len());
    for story in stories {
        if !ids.insert(story.story_id.as_str()) {
            return Err(anyhow!("Story id {} produced twice", story.story_id));
        }
    }

    for mapping in mappings {
        let consistent = match &mapping.story_id {
            Some(id) => mapping.cluster_label != NOISE_LABEL && ids.contains(id.as_str()),
            None => mapping.cluster_label == NOISE_LABEL,
        };
        if !consistent {
            return Err(anyhow!(
                "Article {} has label {} but story {:?}",
                mapping.article_id,
                mapping.cluster_label,
                mapping.story_id
            ));
        }
    }

    Ok(())
}
