pub mod article;
pub mod clustering;
pub mod config;
pub mod environment;
pub mod error;
pub mod io;
pub mod location;
pub mod logging;
pub mod runner;
pub mod story;
pub mod vector;
pub mod window;

pub use article::{Article, ArticleEntity, Location, LocationKind};
pub use config::ClusterConfig;
pub use runner::{ClusterRunner, RunOutput};

pub const TARGET_VECTOR: &str = "vector";
pub const TARGET_CLUSTER: &str = "cluster";
pub const TARGET_LOCATION: &str = "location";
pub const TARGET_STORY: &str = "story";
pub const TARGET_RUNNER: &str = "runner";

/// Per-article record of why an article was kept out of clustering.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArticleDiagnostic {
    pub article_id: String,
    pub reason: String,
}
