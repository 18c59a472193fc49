use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use news_cluster::clustering::ClusterSelectionMethod;
use news_cluster::io::{read_articles, write_jsonl};
use news_cluster::logging::configure_logging;
use news_cluster::window::ArticleWindow;
use news_cluster::{ClusterConfig, ClusterRunner};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[clap(name = "cluster-stories", about = "Cluster a window of articles into stories")]
struct Cli {
    /// Article batch, JSON array or JSON Lines
    #[clap(short, long)]
    input: PathBuf,

    /// Directory receiving the output files
    #[clap(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Last day of the window (YYYY-MM-DD); without it every input article is clustered
    #[clap(short, long)]
    period: Option<String>,

    /// Window length in days
    #[clap(short, long)]
    window: Option<u32>,

    #[clap(long)]
    min_cluster_size: Option<usize>,

    #[clap(long)]
    min_samples: Option<usize>,

    /// Run timestamp (RFC 3339), defaults to now
    #[clap(long)]
    run_at: Option<String>,

    /// Select leaf clusters instead of Excess of Mass
    #[clap(long)]
    leaf: bool,

    /// Allow the whole window to form a single story
    #[clap(long)]
    allow_single_cluster: bool,
}

fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    let mut config = ClusterConfig::from_env()?;
    if let Some(days) = cli.window {
        config = config.with_time_window_days(days);
    }
    if let Some(size) = cli.min_cluster_size {
        config = config.with_min_cluster_size(size);
    }
    if let Some(samples) = cli.min_samples {
        config = config.with_min_samples(samples);
    }
    if cli.leaf {
        config = config.with_selection_method(ClusterSelectionMethod::Leaf);
    }
    if cli.allow_single_cluster {
        config = config.with_allow_single_cluster(true);
    }
    config.validate()?;

    let run_at: DateTime<Utc> = match &cli.run_at {
        Some(value) => DateTime::parse_from_rfc3339(value)
            .with_context(|| format!("Invalid --run-at '{}'", value))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let batch = read_articles(&cli.input)?;
    let mut articles = batch.articles;
    let stamp = match &cli.period {
        Some(period) => {
            let window = ArticleWindow::from_period(period, config.time_window_days)?;
            articles = window.select(articles);
            period.trim().to_string()
        }
        None => run_at.format("%Y%m%dT%H%M%SZ").to_string(),
    };

    info!(
        "Clustering {} articles (min_cluster_size={}, min_samples={}, selection={})",
        articles.len(),
        config.min_cluster_size,
        config.effective_min_samples(),
        config.cluster_selection_method
    );
    debug!("Selection: {}", config.cluster_selection_method.description());

    let runner = ClusterRunner::with_defaults(config)?;
    let output = runner.run_with_rejected(&articles, &batch.rejected, run_at)?;

    for diagnostic in &output.diagnostics {
        warn!(
            "Article {} left unclustered: {}",
            diagnostic.article_id, diagnostic.reason
        );
    }

    let stories_path = cli.output_dir.join(format!("stories_{}.jsonl", stamp));
    let map_path = cli
        .output_dir
        .join(format!("article_story_map_{}.jsonl", stamp));
    let view_path = cli
        .output_dir
        .join(format!("story_articles_{}.jsonl", stamp));

    write_jsonl(&stories_path, &output.stories)?;
    write_jsonl(&map_path, &output.mappings)?;
    write_jsonl(&view_path, &output.story_articles)?;

    info!(
        "Wrote {} stories to {} ({} of {} articles clustered, {:.1}%)",
        output.stats.clusters,
        cli.output_dir.display(),
        output.stats.clustered,
        output.stats.total,
        output.stats.clustered_ratio() * 100.0
    );

    Ok(())
}
